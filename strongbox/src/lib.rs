//! # Strongbox - Embedded Object Persistence
//!
//! Strongbox maps application objects onto durable storage and hands them
//! back by identity. It is the substrate that index structures such as the
//! `strongbox-spatial` R-tree are built on: every index page is an ordinary
//! persistent object subject to the same lazy-load and dirty-track rules.
//!
//! ## Key Features
//!
//! - **Opaque identity**: objects are addressed by [`Handle`]
//! - **Lazy loading**: objects known only by handle are stubs, hydrated on first access
//! - **Dirty tracking**: only modified objects are written back
//! - **Pluggable stores**: in-memory and checksummed slot-file backends
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use strongbox::persistent::ObjectTable;
//! use strongbox::store::{MemoryStore, ObjectStore};
//!
//! # fn main() -> strongbox::errors::StrongboxResult<()> {
//! let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
//!
//! let mut names: ObjectTable<String> = ObjectTable::new(store.clone());
//! let handle = names.make_persistent("Ada".to_string())?;
//! names.flush_all()?;
//!
//! // a fresh table over the same store sees a stub and loads it on demand
//! let mut reader: ObjectTable<String> = ObjectTable::new(store);
//! assert_eq!(reader.get(handle)?, "Ada");
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`errors`] - Error type and result alias
//! - [`persistent`] - Object lifecycle: stubs, hydration, dirty tracking
//! - [`store`] - Storage backends

mod handle;

pub mod errors;
pub mod persistent;
pub mod store;

pub use handle::Handle;

#[cfg(test)]
mod tests {
    #[ctor::ctor]
    fn init() {
        colog::init();
    }
}
