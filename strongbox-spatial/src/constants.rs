//! Constants for the spatial index.

/// Default maximum number of branches per page
pub const DEFAULT_CAPACITY: u32 = 64;

/// Default minimum fill, as a fraction of capacity
pub const DEFAULT_MIN_FILL_RATIO: f64 = 0.5;

/// Smallest capacity that can still be split in two
pub const MIN_CAPACITY: u32 = 2;

/// Magic number stored in every index header ("SBRT")
pub const INDEX_MAGIC: u32 = 0x5342_5254;

/// Index header format version
pub const INDEX_VERSION: u32 = 1;
