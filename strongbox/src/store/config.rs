use crate::errors::{ErrorKind, StrongboxError, StrongboxResult};
use std::path::{Path, PathBuf};

/// Default slot size (16KB) - one object per slot
pub const DEFAULT_SLOT_SIZE: u32 = 16384;

/// Smallest slot able to hold the file header
pub const MIN_SLOT_SIZE: u32 = 512;

/// Configuration of a [`FileStore`](crate::store::FileStore).
///
/// Built with chained setters and validated when the store is opened.
///
/// ```rust
/// use strongbox::store::FileStoreConfig;
///
/// let config = FileStoreConfig::new("/tmp/objects.sbx")
///     .slot_size(4096)
///     .sync_on_commit(false);
/// assert_eq!(config.get_slot_size(), 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStoreConfig {
    path: PathBuf,
    slot_size: u32,
    sync_on_commit: bool,
    create_if_missing: bool,
}

impl FileStoreConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            slot_size: DEFAULT_SLOT_SIZE,
            sync_on_commit: true,
            create_if_missing: true,
        }
    }

    /// Size of every slot in bytes. Only honoured when the file is created;
    /// an existing file keeps the slot size recorded in its header.
    pub fn slot_size(mut self, slot_size: u32) -> Self {
        self.slot_size = slot_size;
        self
    }

    /// Whether `commit` calls `fsync`.
    pub fn sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Whether opening a missing file creates it.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_slot_size(&self) -> u32 {
        self.slot_size
    }

    pub fn is_sync_on_commit(&self) -> bool {
        self.sync_on_commit
    }

    pub fn is_create_if_missing(&self) -> bool {
        self.create_if_missing
    }

    pub(crate) fn validate(&self) -> StrongboxResult<()> {
        if self.path.as_os_str().is_empty() {
            log::error!("File store path is empty");
            return Err(StrongboxError::new(
                "File store path is empty",
                ErrorKind::ValidationError,
            ));
        }
        if self.slot_size < MIN_SLOT_SIZE {
            log::error!("Slot size {} is below the minimum of {}", self.slot_size, MIN_SLOT_SIZE);
            return Err(StrongboxError::new(
                &format!(
                    "Slot size {} is below the minimum of {}",
                    self.slot_size, MIN_SLOT_SIZE
                ),
                ErrorKind::ValidationError,
            ));
        }
        Ok(())
    }
}
