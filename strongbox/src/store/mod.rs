//! Storage backends.
//!
//! Every persistent object ends up as a byte string stored under a
//! [`Handle`](crate::Handle) by an [`ObjectStore`]. The store is a plain
//! capability: it assigns handles, reads and writes bytes and reclaims
//! storage. Typing, lazy loading and dirty tracking happen one layer up in
//! [`ObjectTable`](crate::persistent::ObjectTable).
//!
//! # Implementations
//!
//! - **[`MemoryStore`]**: concurrent in-memory map, for tests and scratch data
//! - **[`FileStore`]**: fixed-size slot file with checksums and a free list
//!
//! Both count their I/O; see [`StoreStats`].

mod config;
mod file;
mod memory;
mod object_store;

pub use config::*;
pub use file::*;
pub use memory::*;
pub use object_store::*;
