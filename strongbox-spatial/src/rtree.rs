//! The R-tree spatial index engine.

use crate::config::{PageGeometry, SpatialConfig};
use crate::constants::{INDEX_MAGIC, INDEX_VERSION};
use crate::errors::{SpatialError, SpatialResult};
use crate::integrity::{self, IntegrityReport};
use crate::iter::{Cursor, EntryIter, SpatialIter};
use crate::page::{self, Branch, IndexPage, PageTable, Removal};
use crate::rect::{Coord, Rect};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use strongbox::errors::{ErrorKind, StrongboxError};
use strongbox::persistent::ObjectTable;
use strongbox::store::{ObjectStore, StoreStats};
use strongbox::Handle;

/// Root record of an index, itself stored as a persistent object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHeader {
    magic: u32,
    version: u32,
    dimensions: u32,
    /// Root page, `None` while the index is empty
    pub root: Option<Handle>,
    /// Number of page levels; 0 iff empty
    pub height: u32,
    /// Number of leaf entries
    pub count: u32,
    /// Bumped by every structural modification
    pub generation: u64,
    pub geometry: PageGeometry,
}

impl IndexHeader {
    fn new(dimensions: usize, geometry: PageGeometry) -> Self {
        Self {
            magic: INDEX_MAGIC,
            version: INDEX_VERSION,
            dimensions: dimensions as u32,
            root: None,
            height: 0,
            count: 0,
            generation: 0,
            geometry,
        }
    }

    fn validate(&self, dimensions: usize) -> SpatialResult<()> {
        if self.magic != INDEX_MAGIC {
            return Err(SpatialError::CorruptedIndex(format!(
                "invalid index magic {:#x}",
                self.magic
            )));
        }
        if self.version != INDEX_VERSION {
            return Err(SpatialError::CorruptedIndex(format!(
                "unsupported index version {}",
                self.version
            )));
        }
        if self.dimensions as usize != dimensions {
            return Err(SpatialError::InvalidConfig(format!(
                "index has {} dimensions, opened with {}",
                self.dimensions, dimensions
            )));
        }
        if self.root.is_none() != (self.height == 0) {
            return Err(SpatialError::CorruptedIndex(format!(
                "root {:?} inconsistent with height {}",
                self.root, self.height
            )));
        }
        PageGeometry::new(self.geometry.capacity, self.geometry.min_fill)?;
        Ok(())
    }
}

/// Statistics about an index and its store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RTreeStats {
    pub total_entries: u32,
    pub tree_height: u32,
    pub generation: u64,
    /// Pages known to the page table, stubs included
    pub known_pages: u64,
    /// Pages currently hydrated in memory
    pub resident_pages: u64,
    /// Pages awaiting write-back
    pub dirty_pages: u64,
    pub store: StoreStats,
}

/// A disk-resident R-tree mapping rectangles to object handles.
///
/// # Characteristics
/// - **Lazy**: pages are persistent objects, loaded only when a search or
///   update reaches them
/// - **Dirty tracking**: only modified pages are written on `flush`
/// - **Guttman insertion** with quadratic split, deletion with forced reinsertion
/// - **Shared**: clones and iterators share one state behind a mutex
///
/// Structural modifications bump a generation counter; live iterators notice
/// and fail with [`SpatialError::ConcurrentModification`].
///
/// ```rust
/// use std::sync::Arc;
/// use strongbox::store::{MemoryStore, ObjectStore};
/// use strongbox::Handle;
/// use strongbox_spatial::{Rect, SpatialConfig, SpatialIndex};
///
/// # fn main() -> Result<(), strongbox_spatial::SpatialError> {
/// let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
/// let index: SpatialIndex<f64, 2> = SpatialIndex::create(store, SpatialConfig::default())?;
///
/// index.insert(Rect::xy(0.0, 0.0, 1.0, 1.0), Handle::new(7))?;
/// let hits = index.search(&Rect::xy(0.5, 0.5, 2.0, 2.0))?;
/// assert!(hits.contains(&Handle::new(7)));
/// # Ok(())
/// # }
/// ```
pub struct SpatialIndex<C: Coord, const D: usize> {
    inner: Arc<SpatialIndexInner<C, D>>,
}

impl<C: Coord, const D: usize> Clone for SpatialIndex<C, D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Coord, const D: usize> Debug for SpatialIndex<C, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("handle", &self.inner.handle)
            .field("dimensions", &D)
            .finish_non_exhaustive()
    }
}

struct SpatialIndexInner<C: Coord, const D: usize> {
    handle: Handle,
    store: Arc<dyn ObjectStore>,
    state: Mutex<TreeState<C, D>>,
}

impl<C: Coord, const D: usize> SpatialIndex<C, D> {
    /// Creates an empty index whose header lives in `store`.
    pub fn create(store: Arc<dyn ObjectStore>, config: SpatialConfig) -> SpatialResult<Self> {
        let geometry = config.geometry()?;
        let header = IndexHeader::new(D, geometry);

        let mut headers = ObjectTable::new(store.clone());
        let handle = headers.make_persistent(header)?;
        headers.flush(handle)?;

        log::debug!(
            "Created {}-dimensional spatial index {} (capacity {}, minimum fill {})",
            D,
            handle,
            geometry.capacity,
            geometry.min_fill
        );
        Ok(Self::from_parts(store, headers, handle, header))
    }

    /// Opens the index whose header is stored at `handle`.
    ///
    /// The page geometry recorded at creation is used.
    pub fn open(store: Arc<dyn ObjectStore>, handle: Handle) -> SpatialResult<Self> {
        let mut headers = ObjectTable::new(store.clone());
        let header: IndexHeader = *headers.get(handle)?;
        header.validate(D).inspect_err(|e| {
            log::error!("Cannot open spatial index {}: {}", handle, e);
        })?;

        log::debug!(
            "Opened spatial index {}: {} entries, height {}",
            handle,
            header.count,
            header.height
        );
        Ok(Self::from_parts(store, headers, handle, header))
    }

    /// Opens the index registered as the store's root object, or creates one
    /// and registers it.
    pub fn open_or_create(
        store: Arc<dyn ObjectStore>,
        config: SpatialConfig,
    ) -> SpatialResult<Self> {
        let root = store.root()?;
        if root.is_persistent() {
            return Self::open(store, root);
        }
        let index = Self::create(store.clone(), config)?;
        store.set_root(index.handle())?;
        Ok(index)
    }

    fn from_parts(
        store: Arc<dyn ObjectStore>,
        headers: ObjectTable<IndexHeader>,
        handle: Handle,
        header: IndexHeader,
    ) -> Self {
        let state = TreeState {
            pages: ObjectTable::new(store.clone()),
            headers,
            header_handle: handle,
            header,
            header_dirty: false,
            released: false,
        };
        Self {
            inner: Arc::new(SpatialIndexInner {
                handle,
                store,
                state: Mutex::new(state),
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TreeState<C, D>> {
        self.inner.state.lock()
    }

    /// Handle of the index header; pass it to [`open`](Self::open) later.
    pub fn handle(&self) -> Handle {
        self.inner.handle
    }

    pub fn geometry(&self) -> PageGeometry {
        self.lock().header.geometry
    }

    /// Adds an entry. `data` must be a persistent object handle.
    pub fn insert(&self, rect: Rect<C, D>, data: Handle) -> SpatialResult<()> {
        if !data.is_persistent() {
            return Err(StrongboxError::new(
                "Cannot index a transient object",
                ErrorKind::InvalidHandle,
            )
            .into());
        }

        let mut state = self.lock();
        state.check_live()?;
        state.insert_branch(Branch::new(rect, data), 1)?;
        let header = state.header_mut();
        header.count += 1;
        header.generation += 1;
        Ok(())
    }

    /// Removes the entry with exactly this rectangle and handle.
    ///
    /// Pages left under minimum fill are dissolved and their branches
    /// reinserted before this returns.
    pub fn remove(&self, rect: &Rect<C, D>, data: Handle) -> SpatialResult<()> {
        let mut state = self.lock();
        state.check_live()?;

        let IndexHeader {
            root,
            height,
            geometry,
            ..
        } = state.header;
        let Some(root) = root else {
            return Err(key_not_found(rect, data));
        };

        let mut reinsert = Vec::new();
        let removal = page::remove(
            &mut state.pages,
            root,
            rect,
            data,
            height,
            &geometry,
            &mut reinsert,
        )?;
        if removal == Removal::NotFound {
            return Err(key_not_found(rect, data));
        }

        // the tree has changed even if rebalancing fails
        let rebalanced = state
            .reinsert(reinsert)
            .and_then(|()| state.condense_root());
        state.header_mut().generation += 1;
        rebalanced?;

        state.header_mut().count -= 1;
        Ok(())
    }

    /// Handles of all entries whose rectangle intersects `query`.
    pub fn search(&self, query: &Rect<C, D>) -> SpatialResult<HashSet<Handle>> {
        let entries = self.lock().collect(query, |_| true)?;
        Ok(entries.into_iter().map(|branch| branch.child).collect())
    }

    /// Handles of all entries whose rectangle lies entirely within `query`.
    pub fn search_contained(&self, query: &Rect<C, D>) -> SpatialResult<HashSet<Handle>> {
        let entries = self.lock().collect(query, |rect| query.contains(rect))?;
        Ok(entries.into_iter().map(|branch| branch.child).collect())
    }

    /// Lazily iterates the handles of entries intersecting `query`.
    pub fn iter(&self, query: Rect<C, D>) -> SpatialIter<C, D> {
        let generation = self.lock().header.generation;
        SpatialIter::new(self.clone(), Cursor::new(Some(query), generation))
    }

    /// Iterates every entry in the index.
    pub fn iter_all(&self) -> SpatialIter<C, D> {
        let generation = self.lock().header.generation;
        SpatialIter::new(self.clone(), Cursor::new(None, generation))
    }

    /// Like [`iter`](Self::iter), yielding `(rectangle, handle)` pairs.
    pub fn entries(&self, query: Rect<C, D>) -> EntryIter<C, D> {
        let generation = self.lock().header.generation;
        EntryIter::new(self.clone(), Cursor::new(Some(query), generation))
    }

    /// Cover of every entry, `None` if the index is empty.
    pub fn wrapping_rectangle(&self) -> SpatialResult<Option<Rect<C, D>>> {
        let mut state = self.lock();
        state.check_live()?;
        match state.header.root {
            Some(root) => Ok(Some(page::cover(&mut state.pages, root)?)),
            None => Ok(None),
        }
    }

    /// Removes every entry and frees every page. The header is kept.
    pub fn clear(&self) -> SpatialResult<()> {
        let mut state = self.lock();
        state.check_live()?;
        state.clear()
    }

    /// Clears the index and frees its header. Every clone becomes unusable.
    pub fn deallocate(self) -> SpatialResult<()> {
        let mut state = self.lock();
        state.check_live()?;
        state.clear()?;
        state.headers.deallocate(self.inner.handle)?;
        state.released = true;

        if self.inner.store.root()? == self.inner.handle {
            self.inner.store.set_root(Handle::NONE)?;
        }
        log::debug!("Deallocated spatial index {}", self.inner.handle);
        Ok(())
    }

    /// Number of entries.
    pub fn size(&self) -> u32 {
        self.lock().header.count
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn height(&self) -> u32 {
        self.lock().header.height
    }

    pub fn generation(&self) -> u64 {
        self.lock().header.generation
    }

    /// Writes every dirty page and the header to the store.
    pub fn flush(&self) -> SpatialResult<()> {
        let mut state = self.lock();
        state.check_live()?;
        state.flush()
    }

    /// Flushes, then asks the store to make the writes durable.
    pub fn commit(&self) -> SpatialResult<()> {
        self.flush()?;
        self.inner.store.commit()?;
        Ok(())
    }

    /// Turns clean resident pages back into stubs; returns how many.
    pub fn release_clean_pages(&self) -> usize {
        self.lock().pages.evict_clean()
    }

    /// Get comprehensive statistics
    pub fn stats(&self) -> RTreeStats {
        let state = self.lock();
        RTreeStats {
            total_entries: state.header.count,
            tree_height: state.header.height,
            generation: state.header.generation,
            known_pages: state.pages.len() as u64,
            resident_pages: state.pages.resident_count() as u64,
            dirty_pages: state.pages.dirty_count() as u64,
            store: self.inner.store.stats(),
        }
    }

    /// Walks the whole tree and reports every structural violation found.
    pub fn check_integrity(&self) -> SpatialResult<IntegrityReport> {
        let mut state = self.lock();
        state.check_live()?;
        integrity::check(&mut *state)
    }
}

impl<C: Coord, const D: usize> Drop for SpatialIndexInner<C, D> {
    fn drop(&mut self) {
        // best effort flush on drop
        let state = self.state.get_mut();
        if !state.released && !self.store.is_closed() {
            if let Err(e) = state.flush() {
                log::warn!("Failed to flush spatial index {} on drop: {}", self.handle, e);
            }
        }
    }
}

/// Mutable state of an index, guarded by the index mutex.
pub(crate) struct TreeState<C: Coord, const D: usize> {
    pub(crate) pages: PageTable<C, D>,
    headers: ObjectTable<IndexHeader>,
    header_handle: Handle,
    pub(crate) header: IndexHeader,
    header_dirty: bool,
    released: bool,
}

impl<C: Coord, const D: usize> TreeState<C, D> {
    pub(crate) fn check_live(&self) -> SpatialResult<()> {
        if self.released {
            return Err(SpatialError::UnsupportedOperation(format!(
                "spatial index {} has been deallocated",
                self.header_handle
            )));
        }
        Ok(())
    }

    fn header_mut(&mut self) -> &mut IndexHeader {
        self.header_dirty = true;
        &mut self.header
    }

    /// Inserts `branch` into a page at `target_level`, growing the tree on a root split.
    fn insert_branch(&mut self, branch: Branch<C, D>, target_level: u32) -> SpatialResult<()> {
        let IndexHeader {
            root,
            height,
            geometry,
            ..
        } = self.header;

        let Some(root) = root else {
            if target_level != 1 {
                return Err(SpatialError::CorruptedIndex(format!(
                    "cannot insert at level {} into an empty index",
                    target_level
                )));
            }
            let leaf = self
                .pages
                .make_persistent(IndexPage::with_branches(1, vec![branch]))?;
            let header = self.header_mut();
            header.root = Some(leaf);
            header.height = 1;
            log::debug!("Created root leaf {}", leaf);
            return Ok(());
        };

        let split = page::insert(&mut self.pages, root, branch, height, target_level, &geometry)?;
        if let Some(sibling) = split {
            let old_cover = page::cover(&mut self.pages, root)?;
            let new_root = self.pages.make_persistent(IndexPage::with_branches(
                height + 1,
                vec![Branch::new(old_cover, root), sibling],
            ))?;
            let header = self.header_mut();
            header.root = Some(new_root);
            header.height += 1;
            log::debug!(
                "Root {} split, new root {} at height {}",
                root,
                new_root,
                header.height
            );
        }
        Ok(())
    }

    /// Reinserts the branches of dissolved pages, deepest level first, then
    /// deallocates those pages.
    fn reinsert(&mut self, mut queue: Vec<(Handle, u32)>) -> SpatialResult<()> {
        queue.sort_by_key(|&(_, level)| level);
        for (page, level) in queue {
            let branches = self.pages.get(page)?.branches().to_vec();
            log::debug!(
                "Reinserting {} branches of page {} at level {}",
                branches.len(),
                page,
                level
            );
            for branch in branches {
                self.insert_branch(branch, level)?;
            }
            self.pages.deallocate(page)?;
        }
        Ok(())
    }

    /// Drops single-branch internal roots and an empty leaf root.
    fn condense_root(&mut self) -> SpatialResult<()> {
        while let Some(root) = self.header.root {
            let page = self.pages.get(root)?;
            if page.is_empty() {
                self.pages.deallocate(root)?;
                let header = self.header_mut();
                header.root = None;
                header.height = 0;
                log::debug!("Index is empty, root {} released", root);
                return Ok(());
            }
            if self.header.height > 1 && page.len() == 1 {
                let child = page.branches()[0].child;
                self.pages.deallocate(root)?;
                let header = self.header_mut();
                header.root = Some(child);
                header.height -= 1;
                log::debug!(
                    "Collapsed root {} into {}, height {}",
                    root,
                    child,
                    header.height
                );
                continue;
            }
            return Ok(());
        }
        Ok(())
    }

    fn collect<F>(&mut self, query: &Rect<C, D>, accept: F) -> SpatialResult<Vec<Branch<C, D>>>
    where
        F: Fn(&Rect<C, D>) -> bool,
    {
        self.check_live()?;
        let mut out = Vec::new();
        if let Some(root) = self.header.root {
            page::collect(
                &mut self.pages,
                root,
                self.header.height,
                query,
                &accept,
                &mut out,
            )?;
        }
        Ok(out)
    }

    fn clear(&mut self) -> SpatialResult<()> {
        let IndexHeader { root, height, .. } = self.header;
        let freed = match root {
            Some(root) => page::purge(&mut self.pages, root, height)?,
            None => 0,
        };
        let header = self.header_mut();
        header.root = None;
        header.height = 0;
        header.count = 0;
        header.generation += 1;
        log::debug!("Cleared spatial index, {} pages freed", freed);
        Ok(())
    }

    fn flush(&mut self) -> SpatialResult<()> {
        let pages = self.pages.flush_all()?;
        if self.header_dirty {
            *self.headers.get_mut(self.header_handle)? = self.header;
            self.headers.flush_all()?;
            self.header_dirty = false;
        }
        log::trace!("Flushed spatial index {} ({} pages)", self.header_handle, pages);
        Ok(())
    }
}

fn key_not_found<C: Coord, const D: usize>(rect: &Rect<C, D>, data: Handle) -> SpatialError {
    SpatialError::KeyNotFound(format!("{} -> {}", rect, data))
}
