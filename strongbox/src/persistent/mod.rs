//! Persistent-object lifecycle.
//!
//! Every storable entity participates in the same state machine:
//!
//! - created transient, with no handle
//! - made persistent: a handle is assigned and the object is written back on
//!   the next flush
//! - loaded lazily: an object known only by its handle is a *stub*
//!   ([`ObjectState::Raw`]) and is hydrated from the store on first access
//! - tracked: a mutated object is *dirty* until it is written back
//! - deallocated: its storage is reclaimed and the handle stops resolving
//!
//! [`ObjectTable`] implements this machine for one object type over a shared
//! [`ObjectStore`](crate::store::ObjectStore).

mod codec;
mod table;

pub use codec::*;
pub use table::*;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load/dirty state of an object held by an [`ObjectTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectState {
    /// Stub: the in-memory value is absent and must be hydrated first
    Raw,
    /// Modified since it was last written to the store
    Dirty,
    /// Identical to what the store holds
    Clean,
}

/// Marker for types that can live in an [`ObjectTable`].
pub trait Persistent: Serialize + DeserializeOwned {}

impl<T: Serialize + DeserializeOwned> Persistent for T {}
