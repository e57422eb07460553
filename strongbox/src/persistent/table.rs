use crate::errors::{ErrorKind, StrongboxError, StrongboxResult};
use crate::handle::Handle;
use crate::persistent::codec::{decode, encode};
use crate::persistent::{ObjectState, Persistent};
use crate::store::ObjectStore;
use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::Arc;

enum Slot<T> {
    Raw,
    Loaded { value: T, dirty: bool },
}

impl<T> Slot<T> {
    fn state(&self) -> ObjectState {
        match self {
            Slot::Raw => ObjectState::Raw,
            Slot::Loaded { dirty: true, .. } => ObjectState::Dirty,
            Slot::Loaded { dirty: false, .. } => ObjectState::Clean,
        }
    }
}

/// Arena of persistent objects of one type, keyed by handle.
///
/// The table is the in-memory side of the object substrate. It holds a slot
/// per known handle (a stub or a loaded value) and the set of handles
/// modified since the last [`flush_all`](ObjectTable::flush_all). Reads go
/// through [`get`](ObjectTable::get), which hydrates stubs; writes go through
/// [`get_mut`](ObjectTable::get_mut), which hydrates and marks dirty.
///
/// ```rust
/// use std::sync::Arc;
/// use strongbox::persistent::{ObjectState, ObjectTable};
/// use strongbox::store::MemoryStore;
///
/// let mut table: ObjectTable<String> = ObjectTable::new(Arc::new(MemoryStore::new()));
/// let handle = table.make_persistent("hello".to_string()).unwrap();
/// assert_eq!(table.state(handle), Some(ObjectState::Dirty));
///
/// table.flush_all().unwrap();
/// assert_eq!(table.state(handle), Some(ObjectState::Clean));
/// ```
pub struct ObjectTable<T: Persistent> {
    store: Arc<dyn ObjectStore>,
    slots: HashMap<Handle, Slot<T>>,
    pending: IndexSet<Handle>,
}

impl<T: Persistent> ObjectTable<T> {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            slots: HashMap::new(),
            pending: IndexSet::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Registers a stub for an object the store already holds. No I/O.
    pub fn stub(&mut self, handle: Handle) -> StrongboxResult<()> {
        check_persistent(handle)?;
        self.slots.entry(handle).or_insert(Slot::Raw);
        Ok(())
    }

    /// Loads the object if it is a stub (or unknown). No-op otherwise.
    pub fn hydrate(&mut self, handle: Handle) -> StrongboxResult<()> {
        check_persistent(handle)?;
        if let Some(Slot::Loaded { .. }) = self.slots.get(&handle) {
            return Ok(());
        }

        let bytes = self.store.load(handle)?;
        let value: T = decode(&bytes)?;
        log::trace!("Hydrated object {} ({} bytes)", handle, bytes.len());
        self.slots.insert(
            handle,
            Slot::Loaded {
                value,
                dirty: false,
            },
        );
        Ok(())
    }

    /// Queues the object for write-back.
    pub fn mark_dirty(&mut self, handle: Handle) -> StrongboxResult<()> {
        match self.slots.get_mut(&handle) {
            None => Err(unknown_object(handle)),
            Some(Slot::Raw) => Err(access_to_stub(handle, "mark dirty")),
            Some(Slot::Loaded { dirty, .. }) => {
                if !*dirty {
                    *dirty = true;
                    self.pending.insert(handle);
                }
                Ok(())
            }
        }
    }

    /// Writes the object to the store now, whether or not it is queued.
    pub fn flush(&mut self, handle: Handle) -> StrongboxResult<()> {
        self.write_back(handle)?;
        self.pending.shift_remove(&handle);
        Ok(())
    }

    /// Assigns a handle to `value` and queues it for its first write.
    pub fn make_persistent(&mut self, value: T) -> StrongboxResult<Handle> {
        let handle = self.store.allocate()?;
        self.slots.insert(handle, Slot::Loaded { value, dirty: true });
        self.pending.insert(handle);
        log::trace!("Made object {} persistent", handle);
        Ok(handle)
    }

    /// Reclaims the object's storage. The handle no longer resolves afterwards.
    pub fn deallocate(&mut self, handle: Handle) -> StrongboxResult<()> {
        check_persistent(handle)?;
        self.store.free(handle)?;
        self.slots.remove(&handle);
        self.pending.shift_remove(&handle);
        log::trace!("Deallocated object {}", handle);
        Ok(())
    }

    pub fn get(&mut self, handle: Handle) -> StrongboxResult<&T> {
        self.hydrate(handle)?;
        match self.slots.get(&handle) {
            Some(Slot::Loaded { value, .. }) => Ok(value),
            _ => Err(unknown_object(handle)),
        }
    }

    /// Hydrates and marks dirty, then hands out the value for mutation.
    pub fn get_mut(&mut self, handle: Handle) -> StrongboxResult<&mut T> {
        self.hydrate(handle)?;
        self.mark_dirty(handle)?;
        match self.slots.get_mut(&handle) {
            Some(Slot::Loaded { value, .. }) => Ok(value),
            _ => Err(unknown_object(handle)),
        }
    }

    /// `None` if the table does not know the handle.
    pub fn state(&self, handle: Handle) -> Option<ObjectState> {
        self.slots.get(&handle).map(Slot::state)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.slots.contains_key(&handle)
    }

    /// Number of known handles, stubs included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of objects awaiting write-back.
    pub fn dirty_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of hydrated objects.
    pub fn resident_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| !matches!(slot, Slot::Raw))
            .count()
    }

    /// Writes back every queued object in the order it was first dirtied.
    ///
    /// Objects written before a failure stay clean; the rest stay queued.
    pub fn flush_all(&mut self) -> StrongboxResult<usize> {
        let queued: Vec<Handle> = self.pending.iter().copied().collect();
        for handle in &queued {
            self.write_back(*handle)?;
            self.pending.shift_remove(handle);
        }
        if !queued.is_empty() {
            log::trace!("Flushed {} objects", queued.len());
        }
        Ok(queued.len())
    }

    /// Turns every clean object back into a stub; returns how many.
    pub fn evict_clean(&mut self) -> usize {
        let mut evicted = 0;
        for slot in self.slots.values_mut() {
            if let Slot::Loaded { dirty: false, .. } = slot {
                *slot = Slot::Raw;
                evicted += 1;
            }
        }
        evicted
    }

    fn write_back(&mut self, handle: Handle) -> StrongboxResult<()> {
        match self.slots.get_mut(&handle) {
            None => Err(unknown_object(handle)),
            Some(Slot::Raw) => Err(access_to_stub(handle, "flush")),
            Some(Slot::Loaded { value, dirty }) => {
                let bytes = encode(value)?;
                self.store.store(handle, &bytes)?;
                *dirty = false;
                Ok(())
            }
        }
    }
}

fn check_persistent(handle: Handle) -> StrongboxResult<()> {
    if handle.is_persistent() {
        Ok(())
    } else {
        Err(StrongboxError::new(
            "Transient handle does not denote a stored object",
            ErrorKind::InvalidHandle,
        ))
    }
}

fn unknown_object(handle: Handle) -> StrongboxError {
    StrongboxError::new(
        &format!("Object {} is not known to this table", handle),
        ErrorKind::ObjectNotFound,
    )
}

fn access_to_stub(handle: Handle, action: &str) -> StrongboxError {
    log::error!("Cannot {} object {}: it is an unloaded stub", action, handle);
    StrongboxError::new(
        &format!("Cannot {} object {}: it is an unloaded stub", action, handle),
        ErrorKind::AccessToStub,
    )
}
