//! Index pages and the recursive tree primitives operating on them.
//!
//! Pages are ordinary persistent objects held in a [`PageTable`]. Every read
//! goes through `get` (hydrating stubs) and every mutation through `get_mut`
//! (hydrate + mark dirty), so the table decides what is written back.
//!
//! Levels count up from the leaves: a leaf page is at level 1 and the root
//! at the tree height. Traversals pass the level down from the root; each
//! page also records the level it was created at, which never changes and
//! lets an integrity check catch an unbalanced tree.

use crate::config::PageGeometry;
use crate::errors::{SpatialError, SpatialResult};
use crate::rect::{Coord, Rect};
use crate::split::quadratic_split;
use serde::{Deserialize, Serialize};
use strongbox::persistent::ObjectTable;
use strongbox::Handle;

/// A rectangle and the object it bounds.
///
/// In a leaf page `child` is a data object; in an internal page it is the
/// child index page, and `rect` encloses that page's cover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Branch<C: Coord, const D: usize> {
    pub rect: Rect<C, D>,
    pub child: Handle,
}

impl<C: Coord, const D: usize> Branch<C, D> {
    pub fn new(rect: Rect<C, D>, child: Handle) -> Self {
        Self { rect, child }
    }
}

/// A node of the tree: an ordered sequence of branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct IndexPage<C: Coord, const D: usize> {
    pub(crate) level: u32,
    pub(crate) branches: Vec<Branch<C, D>>,
}

impl<C: Coord, const D: usize> IndexPage<C, D> {
    pub fn new(level: u32) -> Self {
        Self {
            level,
            branches: Vec::new(),
        }
    }

    pub fn with_branches(level: u32, branches: Vec<Branch<C, D>>) -> Self {
        Self { level, branches }
    }

    /// Level the page was created at; 1 for a leaf.
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn is_leaf(&self) -> bool {
        self.level <= 1
    }

    pub fn branches(&self) -> &[Branch<C, D>] {
        &self.branches
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Smallest rectangle enclosing every branch.
    pub fn cover(&self) -> Option<Rect<C, D>> {
        Rect::union_all(self.branches.iter().map(|branch| &branch.rect))
    }
}

impl<C: Coord, const D: usize> Default for IndexPage<C, D> {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Object table holding the pages of one index.
pub type PageTable<C, const D: usize> = ObjectTable<IndexPage<C, D>>;

/// Outcome of a removal below some page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removal {
    NotFound,
    Removed,
}

/// Cover of a page that is required to be non-empty.
pub(crate) fn cover<C: Coord, const D: usize>(
    pages: &mut PageTable<C, D>,
    page: Handle,
) -> SpatialResult<Rect<C, D>> {
    pages.get(page)?.cover().ok_or_else(|| {
        log::error!("Page {} is unexpectedly empty", page);
        SpatialError::CorruptedIndex(format!("page {} is unexpectedly empty", page))
    })
}

/// Inserts `branch` into the page at `target_level` below `page`.
///
/// Returns the branch of a new sibling page if `page` had to be split.
pub(crate) fn insert<C: Coord, const D: usize>(
    pages: &mut PageTable<C, D>,
    page: Handle,
    branch: Branch<C, D>,
    page_level: u32,
    target_level: u32,
    geometry: &PageGeometry,
) -> SpatialResult<Option<Branch<C, D>>> {
    if page_level < target_level || page_level == 0 {
        log::error!(
            "Cannot insert at level {} below page {} at level {}",
            target_level,
            page,
            page_level
        );
        return Err(SpatialError::CorruptedIndex(format!(
            "cannot insert at level {} below page {} at level {}",
            target_level, page, page_level
        )));
    }

    if page_level == target_level {
        pages.get_mut(page)?.branches.push(branch);
    } else {
        let index = choose_subtree(pages, page, &branch.rect)?;
        let child = pages.get(page)?.branches[index].child;

        match insert(pages, child, branch, page_level - 1, target_level, geometry)? {
            Some(sibling) => {
                let child_cover = cover(pages, child)?;
                let node = pages.get_mut(page)?;
                node.branches[index].rect = child_cover;
                node.branches.push(sibling);
            }
            None => {
                let node = pages.get_mut(page)?;
                let enlarged = node.branches[index].rect.union(&branch.rect);
                node.branches[index].rect = enlarged;
            }
        }
    }

    if geometry.overflows(pages.get(page)?.len()) {
        split_page(pages, page, geometry).map(Some)
    } else {
        Ok(None)
    }
}

/// Index of the branch of `page` that needs the least enlargement to hold `rect`.
///
/// Ties go to the smaller resulting area, then to the child with fewer branches,
/// then to the earlier branch.
pub(crate) fn choose_subtree<C: Coord, const D: usize>(
    pages: &mut PageTable<C, D>,
    page: Handle,
    rect: &Rect<C, D>,
) -> SpatialResult<usize> {
    let node = pages.get(page)?;
    if node.is_empty() {
        log::error!("Internal page {} has no branches", page);
        return Err(SpatialError::CorruptedIndex(format!(
            "internal page {} has no branches",
            page
        )));
    }

    let mut best: Vec<(usize, Handle)> = Vec::new();
    let mut best_key: Option<(C::Area, C::Area)> = None;
    for (index, candidate) in node.branches.iter().enumerate() {
        let union_area = candidate.rect.union(rect).area();
        let key = (union_area - candidate.rect.area(), union_area);
        match best_key {
            Some(current) if key > current => {}
            Some(current) if key == current => best.push((index, candidate.child)),
            _ => {
                best_key = Some(key);
                best.clear();
                best.push((index, candidate.child));
            }
        }
    }

    if best.len() == 1 {
        return Ok(best[0].0);
    }

    // only tied children are loaded
    let mut chosen = best[0].0;
    let mut fewest = usize::MAX;
    for (index, child) in best {
        let len = pages.get(child)?.len();
        if len < fewest {
            fewest = len;
            chosen = index;
        }
    }
    Ok(chosen)
}

/// Splits an overflowing page, keeping the first group in place.
fn split_page<C: Coord, const D: usize>(
    pages: &mut PageTable<C, D>,
    page: Handle,
    geometry: &PageGeometry,
) -> SpatialResult<Branch<C, D>> {
    let node = pages.get_mut(page)?;
    let level = node.level;
    let branches = std::mem::take(&mut node.branches);
    let total = branches.len();
    let (kept, moved) = quadratic_split(branches, geometry.min_fill as usize);

    let moved_cover = Rect::union_all(moved.iter().map(|branch| &branch.rect));
    pages.get_mut(page)?.branches = kept;
    let Some(moved_cover) = moved_cover else {
        log::error!("Split of page {} produced an empty group", page);
        return Err(SpatialError::CorruptedIndex(format!(
            "split of page {} produced an empty group",
            page
        )));
    };

    let moved_len = moved.len();
    let sibling = pages.make_persistent(IndexPage::with_branches(level, moved))?;
    log::debug!(
        "Split page {} ({} branches) into {} + {} (new page {})",
        page,
        total,
        total - moved_len,
        moved_len,
        sibling
    );
    Ok(Branch::new(moved_cover, sibling))
}

/// Removes the leaf branch `(rect, child)` below `page`.
///
/// Child pages left under minimum fill are unlinked and queued in `reinsert`
/// together with their level; the caller reinserts their branches and
/// deallocates them. The page itself is exempt from the fill check.
pub(crate) fn remove<C: Coord, const D: usize>(
    pages: &mut PageTable<C, D>,
    page: Handle,
    rect: &Rect<C, D>,
    child: Handle,
    page_level: u32,
    geometry: &PageGeometry,
    reinsert: &mut Vec<(Handle, u32)>,
) -> SpatialResult<Removal> {
    if page_level <= 1 {
        let position = pages
            .get(page)?
            .branches
            .iter()
            .position(|branch| branch.child == child && branch.rect == *rect);
        return match position {
            Some(index) => {
                pages.get_mut(page)?.branches.remove(index);
                Ok(Removal::Removed)
            }
            None => Ok(Removal::NotFound),
        };
    }

    let candidates: Vec<(usize, Handle)> = pages
        .get(page)?
        .branches
        .iter()
        .enumerate()
        .filter(|(_, branch)| branch.rect.intersects(rect))
        .map(|(index, branch)| (index, branch.child))
        .collect();

    for (index, child_page) in candidates {
        let removal = remove(
            pages,
            child_page,
            rect,
            child,
            page_level - 1,
            geometry,
            reinsert,
        )?;
        if removal == Removal::NotFound {
            continue;
        }

        if geometry.underflows(pages.get(child_page)?.len()) {
            pages.get_mut(page)?.branches.remove(index);
            reinsert.push((child_page, page_level - 1));
            log::trace!(
                "Page {} underflowed, queued for reinsertion at level {}",
                child_page,
                page_level - 1
            );
        } else {
            let child_cover = cover(pages, child_page)?;
            pages.get_mut(page)?.branches[index].rect = child_cover;
        }
        return Ok(Removal::Removed);
    }
    Ok(Removal::NotFound)
}

/// Collects every leaf branch below `page` whose rectangle intersects `query`
/// and satisfies `accept`.
pub(crate) fn collect<C: Coord, const D: usize, F>(
    pages: &mut PageTable<C, D>,
    page: Handle,
    page_level: u32,
    query: &Rect<C, D>,
    accept: &F,
    out: &mut Vec<Branch<C, D>>,
) -> SpatialResult<()>
where
    F: Fn(&Rect<C, D>) -> bool,
{
    let matching: Vec<Branch<C, D>> = pages
        .get(page)?
        .branches
        .iter()
        .filter(|branch| branch.rect.intersects(query))
        .copied()
        .collect();

    if page_level <= 1 {
        out.extend(matching.into_iter().filter(|branch| accept(&branch.rect)));
        return Ok(());
    }
    for branch in matching {
        collect(pages, branch.child, page_level - 1, query, accept, out)?;
    }
    Ok(())
}

/// Deallocates `page` and every index page below it. Data objects are untouched.
pub(crate) fn purge<C: Coord, const D: usize>(
    pages: &mut PageTable<C, D>,
    page: Handle,
    page_level: u32,
) -> SpatialResult<usize> {
    let mut freed = 0;
    if page_level > 1 {
        let children: Vec<Handle> = pages
            .get(page)?
            .branches
            .iter()
            .map(|branch| branch.child)
            .collect();
        for child in children {
            freed += purge(pages, child, page_level - 1)?;
        }
    }
    pages.deallocate(page)?;
    Ok(freed + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strongbox::store::{MemoryStore, ObjectStore};

    fn table() -> PageTable<i32, 2> {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        ObjectTable::new(store)
    }

    fn leaf(pages: &mut PageTable<i32, 2>, rects: &[(Rect<i32, 2>, u64)]) -> Handle {
        let branches = rects
            .iter()
            .map(|(rect, data)| Branch::new(*rect, Handle::new(*data)))
            .collect();
        pages
            .make_persistent(IndexPage::with_branches(1, branches))
            .unwrap()
    }

    #[test]
    fn page_cover() {
        let page: IndexPage<i32, 2> = IndexPage::with_branches(1, vec![
            Branch::new(Rect::xy(0, 0, 1, 1), Handle::new(1)),
            Branch::new(Rect::xy(4, -1, 5, 0), Handle::new(2)),
        ]);
        assert_eq!(page.cover(), Some(Rect::xy(0, -1, 5, 1)));
        assert_eq!(IndexPage::<i32, 2>::new(1).cover(), None);
    }

    #[test]
    fn page_reloads_from_store() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let page: IndexPage<f64, 3> = IndexPage::with_branches(
            2,
            vec![
                Branch::new(Rect::new([0.0, 0.5, -1.0], [1.0, 2.5, 0.0]), Handle::new(7)),
                Branch::new(Rect::new([3.0, 3.0, 3.0], [4.0, 4.0, 4.0]), Handle::new(8)),
            ],
        );

        let mut pages: PageTable<f64, 3> = ObjectTable::new(store.clone());
        let handle = pages.make_persistent(page.clone()).unwrap();
        pages.flush_all().unwrap();

        let mut reopened: PageTable<f64, 3> = ObjectTable::new(store);
        let loaded = reopened.get(handle).unwrap();
        assert_eq!(*loaded, page);
        assert_eq!(loaded.level(), 2);
        assert!(!loaded.is_leaf());
    }

    #[test]
    fn choose_subtree_prefers_least_enlargement() {
        let mut pages = table();
        let a = leaf(&mut pages, &[(Rect::xy(0, 0, 10, 10), 100)]);
        let b = leaf(&mut pages, &[(Rect::xy(20, 20, 30, 30), 101)]);
        let root = pages
            .make_persistent(IndexPage::with_branches(2, vec![
                Branch::new(Rect::xy(0, 0, 10, 10), a),
                Branch::new(Rect::xy(20, 20, 30, 30), b),
            ]))
            .unwrap();

        assert_eq!(choose_subtree(&mut pages, root, &Rect::xy(2, 2, 3, 3)).unwrap(), 0);
        assert_eq!(choose_subtree(&mut pages, root, &Rect::xy(25, 31, 26, 32)).unwrap(), 1);
    }

    #[test]
    fn choose_subtree_breaks_ties_by_area_then_child_size() {
        let mut pages = table();
        let small = leaf(&mut pages, &[(Rect::xy(0, 0, 2, 2), 1)]);
        let large = leaf(&mut pages, &[(Rect::xy(0, 0, 4, 4), 2)]);
        let root = pages
            .make_persistent(IndexPage::with_branches(2, vec![
                Branch::new(Rect::xy(0, 0, 4, 4), large),
                Branch::new(Rect::xy(0, 0, 2, 2), small),
            ]))
            .unwrap();
        // both contain the point: zero enlargement, smaller area wins
        assert_eq!(choose_subtree(&mut pages, root, &Rect::xy(1, 1, 1, 1)).unwrap(), 1);

        let crowded = leaf(
            &mut pages,
            &[(Rect::xy(0, 0, 2, 2), 3), (Rect::xy(1, 1, 2, 2), 4)],
        );
        let sparse = leaf(&mut pages, &[(Rect::xy(0, 0, 2, 2), 5)]);
        let root = pages
            .make_persistent(IndexPage::with_branches(2, vec![
                Branch::new(Rect::xy(0, 0, 2, 2), crowded),
                Branch::new(Rect::xy(0, 0, 2, 2), sparse),
            ]))
            .unwrap();
        // identical rectangles: the child with fewer branches wins
        assert_eq!(choose_subtree(&mut pages, root, &Rect::xy(1, 1, 1, 1)).unwrap(), 1);
    }

    #[test]
    fn insert_splits_overflowing_leaf() {
        let mut pages = table();
        let geometry = PageGeometry::new(3, 2).unwrap();
        let page = leaf(
            &mut pages,
            &[
                (Rect::xy(0, 0, 1, 1), 1),
                (Rect::xy(1, 1, 2, 2), 2),
                (Rect::xy(50, 50, 51, 51), 3),
            ],
        );

        let sibling = insert(
            &mut pages,
            page,
            Branch::new(Rect::xy(51, 51, 52, 52), Handle::new(4)),
            1,
            1,
            &geometry,
        )
        .unwrap()
        .expect("page should split");

        let kept = pages.get(page).unwrap().len();
        let moved = pages.get(sibling.child).unwrap().len();
        assert_eq!(kept + moved, 4);
        assert!(kept >= 2 && moved >= 2);
        assert_eq!(sibling.rect, cover(&mut pages, sibling.child).unwrap());
        assert_eq!(pages.get(sibling.child).unwrap().level(), 1);
    }

    #[test]
    fn insert_enlarges_chosen_branch() {
        let mut pages = table();
        let geometry = PageGeometry::new(4, 2).unwrap();
        let child = leaf(&mut pages, &[(Rect::xy(0, 0, 1, 1), 1), (Rect::xy(1, 1, 2, 2), 2)]);
        let root = pages
            .make_persistent(IndexPage::with_branches(2, vec![Branch::new(
                Rect::xy(0, 0, 2, 2),
                child,
            )]))
            .unwrap();

        let split = insert(
            &mut pages,
            root,
            Branch::new(Rect::xy(5, 5, 6, 6), Handle::new(3)),
            2,
            1,
            &geometry,
        )
        .unwrap();
        assert!(split.is_none());
        assert_eq!(pages.get(root).unwrap().branches()[0].rect, Rect::xy(0, 0, 6, 6));
        assert_eq!(pages.get(child).unwrap().len(), 3);
    }

    #[test]
    fn remove_queues_underflowing_children() {
        let mut pages = table();
        let geometry = PageGeometry::new(4, 2).unwrap();
        let left = leaf(&mut pages, &[(Rect::xy(0, 0, 1, 1), 1), (Rect::xy(1, 1, 2, 2), 2)]);
        let right = leaf(
            &mut pages,
            &[(Rect::xy(8, 8, 9, 9), 3), (Rect::xy(9, 9, 10, 10), 4), (Rect::xy(7, 7, 8, 8), 5)],
        );
        let root = pages
            .make_persistent(IndexPage::with_branches(2, vec![
                Branch::new(Rect::xy(0, 0, 2, 2), left),
                Branch::new(Rect::xy(7, 7, 10, 10), right),
            ]))
            .unwrap();

        let mut queue = Vec::new();
        let removal = remove(
            &mut pages,
            root,
            &Rect::xy(9, 9, 10, 10),
            Handle::new(4),
            2,
            &geometry,
            &mut queue,
        )
        .unwrap();
        assert_eq!(removal, Removal::Removed);
        assert!(queue.is_empty());
        assert_eq!(pages.get(root).unwrap().branches()[1].rect, Rect::xy(7, 7, 9, 9));

        let removal = remove(
            &mut pages,
            root,
            &Rect::xy(0, 0, 1, 1),
            Handle::new(1),
            2,
            &geometry,
            &mut queue,
        )
        .unwrap();
        assert_eq!(removal, Removal::Removed);
        assert_eq!(queue, vec![(left, 1)]);
        assert_eq!(pages.get(root).unwrap().len(), 1);
    }

    #[test]
    fn remove_requires_exact_match() {
        let mut pages = table();
        let geometry = PageGeometry::new(4, 2).unwrap();
        let page = leaf(&mut pages, &[(Rect::xy(0, 0, 1, 1), 1)]);
        let mut queue = Vec::new();

        let wrong_rect = remove(
            &mut pages,
            page,
            &Rect::xy(0, 0, 1, 2),
            Handle::new(1),
            1,
            &geometry,
            &mut queue,
        )
        .unwrap();
        let wrong_child = remove(
            &mut pages,
            page,
            &Rect::xy(0, 0, 1, 1),
            Handle::new(2),
            1,
            &geometry,
            &mut queue,
        )
        .unwrap();
        assert_eq!(wrong_rect, Removal::NotFound);
        assert_eq!(wrong_child, Removal::NotFound);
        assert_eq!(pages.get(page).unwrap().len(), 1);
    }

    #[test]
    fn collect_filters_by_query_and_predicate() {
        let mut pages = table();
        let page = leaf(
            &mut pages,
            &[
                (Rect::xy(0, 0, 1, 1), 1),
                (Rect::xy(0, 0, 5, 5), 2),
                (Rect::xy(9, 9, 10, 10), 3),
            ],
        );
        let query = Rect::xy(0, 0, 2, 2);

        let mut all = Vec::new();
        collect(&mut pages, page, 1, &query, &|_: &Rect<i32, 2>| true, &mut all).unwrap();
        assert_eq!(all.len(), 2);

        let mut contained = Vec::new();
        collect(&mut pages, page, 1, &query, &|rect: &Rect<i32, 2>| query.contains(rect), &mut contained)
            .unwrap();
        assert_eq!(contained, vec![Branch::new(Rect::xy(0, 0, 1, 1), Handle::new(1))]);
    }

    #[test]
    fn purge_frees_every_page() {
        let mut pages = table();
        let a = leaf(&mut pages, &[(Rect::xy(0, 0, 1, 1), 1)]);
        let b = leaf(&mut pages, &[(Rect::xy(2, 2, 3, 3), 2)]);
        let root = pages
            .make_persistent(IndexPage::with_branches(2, vec![
                Branch::new(Rect::xy(0, 0, 1, 1), a),
                Branch::new(Rect::xy(2, 2, 3, 3), b),
            ]))
            .unwrap();

        assert_eq!(purge(&mut pages, root, 2).unwrap(), 3);
        assert!(pages.is_empty());
    }
}
