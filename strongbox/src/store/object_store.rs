use crate::errors::StrongboxResult;
use crate::handle::Handle;
use std::sync::atomic::{AtomicU64, Ordering};

/// Durable home of persistent objects.
///
/// A store assigns handles, keeps the serialized bytes of every object and
/// reclaims storage on request. It knows nothing about the objects' types;
/// the [`ObjectTable`](crate::persistent::ObjectTable) layered on top does the
/// encoding, lazy loading and dirty tracking.
///
/// Stores are shared between tables (`Arc<dyn ObjectStore>`), so every method
/// takes `&self` and implementations guard their state internally. Structural
/// writers are expected to be serialized by the caller.
pub trait ObjectStore: Send + Sync {
    /// Reserves a fresh handle. Nothing is readable under it until `store`.
    fn allocate(&self) -> StrongboxResult<Handle>;

    /// Reads the bytes last stored under `handle`.
    ///
    /// Fails with `ObjectNotFound` if the handle was never stored or has been freed.
    fn load(&self, handle: Handle) -> StrongboxResult<Vec<u8>>;

    /// Writes (or overwrites) the bytes of `handle`.
    fn store(&self, handle: Handle, bytes: &[u8]) -> StrongboxResult<()>;

    /// Reclaims the storage of `handle`; the handle may be handed out again.
    fn free(&self, handle: Handle) -> StrongboxResult<()>;

    /// Handle of the store's root object, `Handle::NONE` if unset.
    fn root(&self) -> StrongboxResult<Handle>;

    /// Registers the store's root object.
    fn set_root(&self, handle: Handle) -> StrongboxResult<()>;

    /// Makes every write so far durable.
    fn commit(&self) -> StrongboxResult<()> {
        Ok(())
    }

    /// Commits and releases the store. Further calls fail with `StoreAlreadyClosed`.
    fn close(&self) -> StrongboxResult<()>;

    fn is_closed(&self) -> bool;

    /// I/O counters since the store was opened.
    fn stats(&self) -> StoreStats;
}

/// Counters reported by [`ObjectStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub allocations: u64,
    pub loads: u64,
    pub stores: u64,
    pub frees: u64,
    /// Handles allocated and not yet freed
    pub live_objects: u64,
}

/// Atomic I/O counters shared by the store implementations.
pub(crate) struct IoCounters {
    allocations: AtomicU64,
    loads: AtomicU64,
    stores: AtomicU64,
    frees: AtomicU64,
}

impl IoCounters {
    pub(crate) fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            frees: AtomicU64::new(0),
        }
    }

    pub(crate) fn allocated(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn loaded(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stored(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn freed(&self) {
        self.frees.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, live_objects: u64) -> StoreStats {
        StoreStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            live_objects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_snapshot() {
        let counters = IoCounters::new();
        counters.allocated();
        counters.allocated();
        counters.loaded();
        counters.stored();
        counters.freed();

        let stats = counters.snapshot(1);
        assert_eq!(
            stats,
            StoreStats {
                allocations: 2,
                loads: 1,
                stores: 1,
                frees: 1,
                live_objects: 1,
            }
        );
    }
}
