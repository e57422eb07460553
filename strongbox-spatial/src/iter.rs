//! Lazy, fail-fast iteration over an index.

use crate::errors::{SpatialError, SpatialResult};
use crate::page::Branch;
use crate::rect::{Coord, Rect};
use crate::rtree::{SpatialIndex, TreeState};
use smallvec::SmallVec;
use strongbox::Handle;

/// Position within one page on the descent path.
#[derive(Debug, Clone, Copy)]
struct Frame {
    page: Handle,
    level: u32,
    pos: usize,
}

/// Depth-first traversal state, independent of the index lock.
///
/// The cursor remembers the generation it started from. Every step compares it
/// with the index; a mismatch fails the step with `ConcurrentModification` and
/// fuses the cursor.
pub(crate) struct Cursor<C: Coord, const D: usize> {
    query: Option<Rect<C, D>>,
    stack: SmallVec<[Frame; 8]>,
    generation: u64,
    started: bool,
    fused: bool,
}

impl<C: Coord, const D: usize> Cursor<C, D> {
    /// `query: None` visits every entry.
    pub(crate) fn new(query: Option<Rect<C, D>>, generation: u64) -> Self {
        Self {
            query,
            stack: SmallVec::new(),
            generation,
            started: false,
            fused: false,
        }
    }

    fn reset(&mut self, generation: u64) {
        self.stack.clear();
        self.generation = generation;
        self.started = false;
        self.fused = false;
    }

    fn matches(&self, rect: &Rect<C, D>) -> bool {
        self.query.as_ref().map_or(true, |query| query.intersects(rect))
    }

    /// Next matching leaf branch; `None` once exhausted or after an error.
    pub(crate) fn next_branch(
        &mut self,
        state: &mut TreeState<C, D>,
    ) -> Option<SpatialResult<Branch<C, D>>> {
        if self.fused {
            return None;
        }
        match self.advance(state) {
            Ok(Some(branch)) => Some(Ok(branch)),
            Ok(None) => {
                self.fused = true;
                None
            }
            Err(e) => {
                self.fused = true;
                Some(Err(e))
            }
        }
    }

    fn advance(&mut self, state: &mut TreeState<C, D>) -> SpatialResult<Option<Branch<C, D>>> {
        state.check_live()?;
        if state.header.generation != self.generation {
            log::debug!(
                "Iterator started at generation {}, index is at {}",
                self.generation,
                state.header.generation
            );
            return Err(SpatialError::ConcurrentModification);
        }

        if !self.started {
            self.started = true;
            if let Some(root) = state.header.root {
                self.stack.push(Frame {
                    page: root,
                    level: state.header.height,
                    pos: 0,
                });
            }
        }

        while let Some(frame) = self.stack.last().copied() {
            let page = state.pages.get(frame.page)?;
            let found = page.branches()[frame.pos.min(page.len())..]
                .iter()
                .position(|branch| self.matches(&branch.rect))
                .map(|offset| frame.pos + offset);

            let Some(index) = found else {
                self.stack.pop();
                continue;
            };
            let branch = page.branches()[index];
            if let Some(top) = self.stack.last_mut() {
                top.pos = index + 1;
            }

            if frame.level <= 1 {
                return Ok(Some(branch));
            }
            self.stack.push(Frame {
                page: branch.child,
                level: frame.level - 1,
                pos: 0,
            });
        }
        Ok(None)
    }
}

/// Iterator over the handles of matching entries.
///
/// Pages are loaded as the traversal reaches them. Any structural change of
/// the index after the iterator was created makes the next call yield
/// `Err(ConcurrentModification)`; the iterator then ends.
///
/// ```rust
/// use std::sync::Arc;
/// use strongbox::store::MemoryStore;
/// use strongbox::Handle;
/// use strongbox_spatial::{Rect, SpatialConfig, SpatialError, SpatialIndex};
///
/// let index: SpatialIndex<i32, 2> =
///     SpatialIndex::create(Arc::new(MemoryStore::new()), SpatialConfig::default()).unwrap();
/// index.insert(Rect::xy(0, 0, 1, 1), Handle::new(1)).unwrap();
///
/// let mut iter = index.iter(Rect::xy(0, 0, 5, 5));
/// index.insert(Rect::xy(2, 2, 3, 3), Handle::new(2)).unwrap();
/// assert!(matches!(iter.next(), Some(Err(SpatialError::ConcurrentModification))));
/// assert!(iter.next().is_none());
/// ```
pub struct SpatialIter<C: Coord, const D: usize> {
    index: SpatialIndex<C, D>,
    cursor: Cursor<C, D>,
}

impl<C: Coord, const D: usize> SpatialIter<C, D> {
    pub(crate) fn new(index: SpatialIndex<C, D>, cursor: Cursor<C, D>) -> Self {
        Self { index, cursor }
    }

    /// Restarts the traversal against the current state of the index.
    pub fn reset(&mut self) {
        let generation = self.index.generation();
        self.cursor.reset(generation);
    }

    /// Always fails; entries are removed through [`SpatialIndex::remove`].
    pub fn remove(&mut self) -> SpatialResult<()> {
        Err(SpatialError::UnsupportedOperation(
            "remove through a spatial iterator".to_string(),
        ))
    }
}

impl<C: Coord, const D: usize> Iterator for SpatialIter<C, D> {
    type Item = SpatialResult<Handle>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut state = self.index.lock();
        self.cursor
            .next_branch(&mut state)
            .map(|result| result.map(|branch| branch.child))
    }
}

/// Iterator over matching `(rectangle, handle)` entries.
///
/// Same traversal and failure rules as [`SpatialIter`].
pub struct EntryIter<C: Coord, const D: usize> {
    index: SpatialIndex<C, D>,
    cursor: Cursor<C, D>,
}

impl<C: Coord, const D: usize> EntryIter<C, D> {
    pub(crate) fn new(index: SpatialIndex<C, D>, cursor: Cursor<C, D>) -> Self {
        Self { index, cursor }
    }

    pub fn reset(&mut self) {
        let generation = self.index.generation();
        self.cursor.reset(generation);
    }

    pub fn remove(&mut self) -> SpatialResult<()> {
        Err(SpatialError::UnsupportedOperation(
            "remove through a spatial iterator".to_string(),
        ))
    }
}

impl<C: Coord, const D: usize> Iterator for EntryIter<C, D> {
    type Item = SpatialResult<(Rect<C, D>, Handle)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut state = self.index.lock();
        self.cursor
            .next_branch(&mut state)
            .map(|result| result.map(|branch| (branch.rect, branch.child)))
    }
}

#[cfg(test)]
mod tests {
    use crate::{Rect, SpatialConfig, SpatialError, SpatialIndex};
    use std::collections::HashSet;
    use std::sync::Arc;
    use strongbox::store::MemoryStore;
    use strongbox::Handle;

    fn grid(capacity: u32, side: i32) -> SpatialIndex<i32, 2> {
        let index =
            SpatialIndex::create(Arc::new(MemoryStore::new()), SpatialConfig::new().capacity(capacity))
                .unwrap();
        for x in 0..side {
            for y in 0..side {
                let data = Handle::new((x * side + y + 1) as u64);
                index.insert(Rect::xy(x, y, x, y), data).unwrap();
            }
        }
        index
    }

    #[test]
    fn iter_matches_search() {
        let index = grid(4, 8);
        let query = Rect::xy(2, 3, 5, 4);
        let iterated: HashSet<Handle> = index.iter(query).map(|r| r.unwrap()).collect();
        assert_eq!(iterated.len(), 8);
        assert_eq!(iterated, index.search(&query).unwrap());
    }

    #[test]
    fn iter_all_visits_every_entry_once() {
        let index = grid(3, 6);
        let handles: Vec<Handle> = index.iter_all().map(|r| r.unwrap()).collect();
        let unique: HashSet<Handle> = handles.iter().copied().collect();
        assert_eq!(handles.len(), 36);
        assert_eq!(unique.len(), 36);
    }

    #[test]
    fn empty_index_yields_nothing() {
        let index: SpatialIndex<f64, 2> =
            SpatialIndex::create(Arc::new(MemoryStore::new()), SpatialConfig::default()).unwrap();
        assert!(index.iter_all().next().is_none());
        assert!(index.iter(Rect::xy(0.0, 0.0, 1.0, 1.0)).next().is_none());
    }

    #[test]
    fn entries_carry_rectangles() {
        let index = grid(4, 4);
        let entries: Vec<(Rect<i32, 2>, Handle)> =
            index.entries(Rect::xy(1, 1, 1, 2)).map(|r| r.unwrap()).collect();
        assert_eq!(entries.len(), 2);
        for (rect, data) in entries {
            assert_eq!(rect.min()[0], 1);
            assert_eq!(data.raw(), (4 + rect.min()[1] + 1) as u64);
        }
    }

    #[test]
    fn modification_fails_fast() {
        let index = grid(4, 5);
        let mut iter = index.iter_all();
        assert!(iter.next().unwrap().is_ok());

        index.remove(&Rect::xy(0, 0, 0, 0), Handle::new(1)).unwrap();
        assert!(matches!(
            iter.next(),
            Some(Err(SpatialError::ConcurrentModification))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn modification_before_first_step_fails() {
        let index = grid(4, 2);
        let mut entries = index.entries(Rect::xy(0, 0, 10, 10));
        index.clear().unwrap();
        assert!(matches!(
            entries.next(),
            Some(Err(SpatialError::ConcurrentModification))
        ));
    }

    #[test]
    fn reset_revives_iterator() {
        let index = grid(4, 3);
        let mut iter = index.iter_all();
        index.insert(Rect::xy(9, 9, 9, 9), Handle::new(100)).unwrap();
        assert!(iter.next().unwrap().is_err());

        iter.reset();
        let all: Vec<Handle> = iter.map(|r| r.unwrap()).collect();
        assert_eq!(all.len(), 10);
        assert!(all.contains(&Handle::new(100)));
    }

    #[test]
    fn exhausted_iterator_stays_exhausted() {
        let index = grid(4, 2);
        let mut iter = index.iter_all();
        assert_eq!(iter.by_ref().count(), 4);
        index.insert(Rect::xy(5, 5, 5, 5), Handle::new(50)).unwrap();
        assert!(iter.next().is_none());
    }

    #[test]
    fn remove_through_iterator_is_unsupported() {
        let index = grid(4, 2);
        let mut iter = index.iter_all();
        assert!(matches!(
            iter.remove(),
            Err(SpatialError::UnsupportedOperation(_))
        ));
        let mut entries = index.entries(Rect::xy(0, 0, 1, 1));
        assert!(matches!(
            entries.remove(),
            Err(SpatialError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn searching_does_not_invalidate_iterators() {
        let index = grid(4, 4);
        let mut iter = index.iter_all();
        iter.next().unwrap().unwrap();
        index.search(&Rect::xy(0, 0, 3, 3)).unwrap();
        index.flush().unwrap();
        index.release_clean_pages();
        assert_eq!(iter.map(|r| r.unwrap()).count(), 15);
    }
}
