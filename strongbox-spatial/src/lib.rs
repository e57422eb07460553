//! # Strongbox Spatial - R-Tree Indexing over Persistent Objects
//!
//! This crate provides a disk-resident R-tree that maps axis-aligned
//! rectangles to handles of persistent objects. Index pages are themselves
//! Strongbox persistent objects, so the tree never has to be fully in memory.
//!
//! ## Features
//!
//! - **Generic**: any dimension `D`, integer or floating point coordinates
//! - **Lazy Loading**: pages are stubs until a search or update reaches them
//! - **Dirty Tracking**: only modified pages are written back on flush
//! - **Persistent**: the index reopens from its header handle after a restart
//! - **Fail-Fast Iterators**: structural changes invalidate live iterators
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strongbox::store::{FileStore, FileStoreConfig, ObjectStore};
//! use strongbox::Handle;
//! use strongbox_spatial::{Rect, SpatialConfig, SpatialIndex};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn ObjectStore> =
//!     Arc::new(FileStore::open(FileStoreConfig::new("places.sbx"))?);
//!
//! // the index is registered as the store's root object
//! let index: SpatialIndex<f64, 2> =
//!     SpatialIndex::open_or_create(store.clone(), SpatialConfig::default())?;
//!
//! index.insert(Rect::xy(0.0, 0.0, 10.0, 10.0), Handle::new(1))?;
//!
//! let query = Rect::xy(5.0, 5.0, 15.0, 15.0);
//! for data in index.iter(query) {
//!     println!("found {}", data?);
//! }
//!
//! index.commit()?;
//! store.close()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod constants;
mod errors;
mod integrity;
mod iter;
mod page;
mod rect;
mod rtree;
mod split;

pub use config::{PageGeometry, SpatialConfig};
pub use constants::*;
pub use errors::{SpatialError, SpatialResult};
pub use integrity::IntegrityReport;
pub use iter::{EntryIter, SpatialIter};
pub use page::{Branch, IndexPage, PageTable};
pub use rect::{Coord, Rect};
pub use rtree::{IndexHeader, RTreeStats, SpatialIndex};

#[cfg(test)]
mod tests {
    #[ctor::ctor]
    fn init() {
        colog::init();
    }
}
