use crate::errors::{ErrorKind, StrongboxError, StrongboxResult};
use crate::handle::Handle;
use crate::store::object_store::{IoCounters, ObjectStore, StoreStats};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory implementation of an object store.
///
/// # Purpose
/// `MemoryStore` keeps every object's bytes in a concurrent map. It is meant
/// for tests and for scratch indexes that never need to outlive the process.
///
/// # Characteristics
/// - **Thread-Safe**: cloning shares the same underlying state
/// - **Handle Reuse**: freed handles are recycled before new ones are minted
/// - **No Persistence**: everything is lost when the last clone is dropped
///
/// # Usage
/// ```rust
/// use strongbox::store::{MemoryStore, ObjectStore};
///
/// let store = MemoryStore::new();
/// let handle = store.allocate().unwrap();
/// store.store(handle, b"payload").unwrap();
/// assert_eq!(store.load(handle).unwrap(), b"payload");
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            inner: Arc::new(MemoryStoreInner::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryStore {
    fn allocate(&self) -> StrongboxResult<Handle> {
        self.inner.allocate()
    }

    fn load(&self, handle: Handle) -> StrongboxResult<Vec<u8>> {
        self.inner.load(handle)
    }

    fn store(&self, handle: Handle, bytes: &[u8]) -> StrongboxResult<()> {
        self.inner.store(handle, bytes)
    }

    fn free(&self, handle: Handle) -> StrongboxResult<()> {
        self.inner.free(handle)
    }

    fn root(&self) -> StrongboxResult<Handle> {
        self.inner.check_opened()?;
        Ok(Handle::new(self.inner.root.load(Ordering::Acquire)))
    }

    fn set_root(&self, handle: Handle) -> StrongboxResult<()> {
        self.inner.check_opened()?;
        self.inner.root.store(handle.raw(), Ordering::Release);
        Ok(())
    }

    fn close(&self) -> StrongboxResult<()> {
        self.inner.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn stats(&self) -> StoreStats {
        self.inner
            .counters
            .snapshot(self.inner.objects.len() as u64)
    }
}

struct MemoryStoreInner {
    closed: AtomicBool,
    /// `None` marks a handle that was allocated but never stored.
    objects: DashMap<Handle, Option<Vec<u8>>>,
    free_handles: Mutex<Vec<Handle>>,
    next_handle: AtomicU64,
    root: AtomicU64,
    counters: IoCounters,
}

impl MemoryStoreInner {
    fn new() -> MemoryStoreInner {
        MemoryStoreInner {
            closed: AtomicBool::new(false),
            objects: DashMap::new(),
            free_handles: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
            root: AtomicU64::new(0),
            counters: IoCounters::new(),
        }
    }

    fn check_opened(&self) -> StrongboxResult<()> {
        if self.closed.load(Ordering::Acquire) {
            log::error!("Memory store is already closed");
            return Err(StrongboxError::new(
                "Memory store is already closed",
                ErrorKind::StoreAlreadyClosed,
            ));
        }
        Ok(())
    }

    fn allocate(&self) -> StrongboxResult<Handle> {
        self.check_opened()?;
        let handle = match self.free_handles.lock().pop() {
            Some(handle) => handle,
            None => Handle::new(self.next_handle.fetch_add(1, Ordering::AcqRel)),
        };
        self.objects.insert(handle, None);
        self.counters.allocated();
        Ok(handle)
    }

    fn load(&self, handle: Handle) -> StrongboxResult<Vec<u8>> {
        self.check_opened()?;
        self.counters.loaded();
        match self.objects.get(&handle) {
            Some(entry) => match entry.value() {
                Some(bytes) => Ok(bytes.clone()),
                None => Err(not_found(handle)),
            },
            None => Err(not_found(handle)),
        }
    }

    fn store(&self, handle: Handle, bytes: &[u8]) -> StrongboxResult<()> {
        self.check_opened()?;
        match self.objects.get_mut(&handle) {
            Some(mut entry) => {
                *entry.value_mut() = Some(bytes.to_vec());
                self.counters.stored();
                Ok(())
            }
            None => Err(not_found(handle)),
        }
    }

    fn free(&self, handle: Handle) -> StrongboxResult<()> {
        self.check_opened()?;
        if self.objects.remove(&handle).is_none() {
            return Err(not_found(handle));
        }
        self.free_handles.lock().push(handle);
        self.counters.freed();
        Ok(())
    }
}

fn not_found(handle: Handle) -> StrongboxError {
    StrongboxError::new(
        &format!("Object {} not found in memory store", handle),
        ErrorKind::ObjectNotFound,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_store_load() {
        let store = MemoryStore::new();
        let handle = store.allocate().unwrap();
        assert!(handle.is_persistent());

        store.store(handle, &[1, 2, 3]).unwrap();
        assert_eq!(store.load(handle).unwrap(), vec![1, 2, 3]);

        store.store(handle, &[4]).unwrap();
        assert_eq!(store.load(handle).unwrap(), vec![4]);
    }

    #[test]
    fn load_before_store_is_not_found() {
        let store = MemoryStore::new();
        let handle = store.allocate().unwrap();
        let err = store.load(handle).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ObjectNotFound);
    }

    #[test]
    fn freed_handle_is_not_found_and_recycled() {
        let store = MemoryStore::new();
        let first = store.allocate().unwrap();
        store.store(first, b"a").unwrap();
        store.free(first).unwrap();

        assert_eq!(store.load(first).unwrap_err().kind(), &ErrorKind::ObjectNotFound);
        assert_eq!(store.free(first).unwrap_err().kind(), &ErrorKind::ObjectNotFound);

        let second = store.allocate().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn store_to_unallocated_handle_fails() {
        let store = MemoryStore::new();
        let err = store.store(Handle::new(99), b"x").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ObjectNotFound);
    }

    #[test]
    fn root_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.root().unwrap(), Handle::NONE);
        store.set_root(Handle::new(5)).unwrap();
        assert_eq!(store.root().unwrap(), Handle::new(5));
    }

    #[test]
    fn clones_share_state() {
        let store = MemoryStore::new();
        let clone = store.clone();
        let handle = store.allocate().unwrap();
        store.store(handle, b"shared").unwrap();
        assert_eq!(clone.load(handle).unwrap(), b"shared");
    }

    #[test]
    fn closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.close().unwrap();
        assert!(store.is_closed());
        let err = store.allocate().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreAlreadyClosed);
    }

    #[test]
    fn stats_track_io() {
        let store = MemoryStore::new();
        let a = store.allocate().unwrap();
        let b = store.allocate().unwrap();
        store.store(a, b"a").unwrap();
        store.load(a).unwrap();
        store.free(b).unwrap();

        let stats = store.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.stores, 1);
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.frees, 1);
        assert_eq!(stats.live_objects, 1);
    }
}
