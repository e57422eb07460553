//! Slot-file implementation of an object store.
//!
//! The file is an array of fixed-size slots. Slot 0 holds the file header;
//! slot `n` holds the object with handle `n`. A slot is read or written with
//! exactly one seek and one I/O call, nothing is cached.

use crate::errors::{ErrorKind, StrongboxError, StrongboxResult};
use crate::handle::Handle;
use crate::store::config::{FileStoreConfig, MIN_SLOT_SIZE};
use crate::store::object_store::{IoCounters, ObjectStore, StoreStats};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Magic number identifying a strongbox file ("SBX1")
const MAGIC: u32 = 0x5342_5831;

/// Current file format version
const VERSION: u32 = 1;

/// Bytes taken by a slot record around its payload (tag + checksum + length)
const RECORD_OVERHEAD: usize = 16;

/// Header stored in slot 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FileHeader {
    magic: u32,
    version: u32,
    slot_size: u32,
    /// First handle never handed out
    next_handle: u64,
    /// Head of the free-slot chain (0 = empty)
    free_list_head: u64,
    free_count: u64,
    root: u64,
}

impl FileHeader {
    fn new(slot_size: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            slot_size,
            next_handle: 1,
            free_list_head: 0,
            free_count: 0,
            root: 0,
        }
    }

    fn validate(&self) -> StrongboxResult<()> {
        if self.magic != MAGIC {
            log::error!("Invalid magic number in store header: {:#x}", self.magic);
            return Err(StrongboxError::new(
                "Invalid magic number in store header",
                ErrorKind::FileCorrupted,
            ));
        }
        if self.version != VERSION {
            log::error!("Unsupported store file version {}", self.version);
            return Err(StrongboxError::new(
                &format!("Unsupported store file version {}", self.version),
                ErrorKind::FileCorrupted,
            ));
        }
        if self.slot_size < MIN_SLOT_SIZE {
            log::error!("Store header has an invalid slot size {}", self.slot_size);
            return Err(StrongboxError::new(
                &format!("Store header has an invalid slot size {}", self.slot_size),
                ErrorKind::FileCorrupted,
            ));
        }
        Ok(())
    }

    fn live_objects(&self) -> u64 {
        (self.next_handle - 1).saturating_sub(self.free_count)
    }
}

/// Content of one object slot.
///
/// `Empty` must stay the first variant: a zero-filled slot decodes as `Empty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum SlotRecord {
    /// Allocated, nothing stored yet
    Empty,
    /// Link in the free-slot chain
    Free { next_free: u64 },
    /// Stored object with the CRC32 of its bytes
    Object { checksum: u32, bytes: Vec<u8> },
}

/// Durable object store backed by a single slot file.
///
/// # Characteristics
/// - **Lazy**: `load` reads exactly one slot, no preloading
/// - **Checksummed**: every object carries a CRC32 verified on load
/// - **Handle Reuse**: freed slots are chained into a free list and reused
/// - **Commit**: allocation state lives in the header, written on `commit`
///
/// Objects larger than a slot (minus a small record overhead) are rejected.
///
/// ```rust,no_run
/// use strongbox::store::{FileStore, FileStoreConfig, ObjectStore};
///
/// let store = FileStore::open(FileStoreConfig::new("/tmp/objects.sbx")).unwrap();
/// let handle = store.allocate().unwrap();
/// store.store(handle, b"payload").unwrap();
/// store.commit().unwrap();
/// ```
#[derive(Clone)]
pub struct FileStore {
    inner: Arc<FileStoreInner>,
}

impl FileStore {
    /// Opens the file named by `config`, creating it if it is missing and the
    /// config allows it. An existing file keeps the slot size of its header.
    pub fn open(config: FileStoreConfig) -> StrongboxResult<FileStore> {
        config.validate()?;
        let exists = config.path().exists()
            && std::fs::metadata(config.path())?.len() > 0;

        let inner = if exists {
            FileStoreInner::open_existing(&config)?
        } else if config.is_create_if_missing() {
            FileStoreInner::create(&config)?
        } else {
            log::error!("Store file {} does not exist", config.path().display());
            return Err(StrongboxError::new(
                &format!("Store file {} does not exist", config.path().display()),
                ErrorKind::FileNotFound,
            ));
        };

        Ok(FileStore {
            inner: Arc::new(inner),
        })
    }

    /// Slot size in effect for this file.
    pub fn slot_size(&self) -> u32 {
        self.inner.slot_size
    }

    /// Largest object payload a slot can hold.
    pub fn max_object_size(&self) -> usize {
        self.inner.slot_size as usize - RECORD_OVERHEAD
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

impl ObjectStore for FileStore {
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
        Ok(Handle::new(self.inner.header.read().root))
    }

    fn set_root(&self, handle: Handle) -> StrongboxResult<()> {
        self.inner.check_opened()?;
        self.inner.header.write().root = handle.raw();
        Ok(())
    }

    fn commit(&self) -> StrongboxResult<()> {
        self.inner.check_opened()?;
        self.inner.commit()
    }

    fn close(&self) -> StrongboxResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.inner.commit()?;
        self.inner.closed.store(true, Ordering::Release);
        log::debug!("Closed file store {}", self.inner.path.display());
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn stats(&self) -> StoreStats {
        let live = self.inner.header.read().live_objects();
        self.inner.counters.snapshot(live)
    }
}

struct FileStoreInner {
    path: PathBuf,
    slot_size: u32,
    sync_on_commit: bool,
    // lock order: header before file
    header: RwLock<FileHeader>,
    file: RwLock<File>,
    closed: AtomicBool,
    counters: IoCounters,
}

impl FileStoreInner {
    fn create(config: &FileStoreConfig) -> StrongboxResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(config.path())?;

        let inner = Self {
            path: config.path().to_path_buf(),
            slot_size: config.get_slot_size(),
            sync_on_commit: config.is_sync_on_commit(),
            header: RwLock::new(FileHeader::new(config.get_slot_size())),
            file: RwLock::new(file),
            closed: AtomicBool::new(false),
            counters: IoCounters::new(),
        };
        inner.write_header(&inner.header.read())?;
        log::debug!(
            "Created file store {} with {} byte slots",
            config.path().display(),
            config.get_slot_size()
        );
        Ok(inner)
    }

    fn open_existing(config: &FileStoreConfig) -> StrongboxResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(config.path())?;

        // the header fits in the smallest legal slot
        let mut buffer = vec![0u8; MIN_SLOT_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buffer).map_err(|e| {
            log::error!("Failed to read store header: {}", e);
            StrongboxError::new(
                &format!("Failed to read store header: {}", e),
                ErrorKind::FileCorrupted,
            )
        })?;
        let (header, _): (FileHeader, usize) =
            bincode::serde::decode_from_slice(&buffer, bincode::config::legacy()).map_err(
                |e| {
                    log::error!("Failed to decode store header: {}", e);
                    StrongboxError::new(
                        &format!("Failed to decode store header: {}", e),
                        ErrorKind::FileCorrupted,
                    )
                },
            )?;
        header.validate()?;

        if header.slot_size != config.get_slot_size() {
            log::debug!(
                "Using slot size {} from store header instead of configured {}",
                header.slot_size,
                config.get_slot_size()
            );
        }
        log::debug!(
            "Opened file store {}: {} live objects, root {}",
            config.path().display(),
            header.live_objects(),
            Handle::new(header.root)
        );

        Ok(Self {
            path: config.path().to_path_buf(),
            slot_size: header.slot_size,
            sync_on_commit: config.is_sync_on_commit(),
            header: RwLock::new(header),
            file: RwLock::new(file),
            closed: AtomicBool::new(false),
            counters: IoCounters::new(),
        })
    }

    fn check_opened(&self) -> StrongboxResult<()> {
        if self.closed.load(Ordering::Acquire) {
            log::error!("File store is already closed");
            return Err(StrongboxError::new(
                "File store is already closed",
                ErrorKind::StoreAlreadyClosed,
            ));
        }
        Ok(())
    }

    fn check_handle(&self, header: &FileHeader, handle: Handle) -> StrongboxResult<()> {
        if !handle.is_persistent() {
            return Err(StrongboxError::new(
                "Transient handle has no slot",
                ErrorKind::InvalidHandle,
            ));
        }
        if handle.raw() >= header.next_handle {
            return Err(not_found(handle));
        }
        Ok(())
    }

    fn allocate(&self) -> StrongboxResult<Handle> {
        self.check_opened()?;
        let mut header = self.header.write();

        let handle = if header.free_list_head != 0 {
            let head = Handle::new(header.free_list_head);
            match self.read_record(head)? {
                Some(SlotRecord::Free { next_free }) => {
                    header.free_list_head = next_free;
                    header.free_count = header.free_count.saturating_sub(1);
                    head
                }
                _ => {
                    log::error!("Free list head {} is not a free slot", head);
                    return Err(StrongboxError::new(
                        &format!("Free list head {} is not a free slot", head),
                        ErrorKind::FileCorrupted,
                    ));
                }
            }
        } else {
            let handle = Handle::new(header.next_handle);
            header.next_handle += 1;
            handle
        };

        self.write_record(handle, &SlotRecord::Empty)?;
        self.counters.allocated();
        Ok(handle)
    }

    fn load(&self, handle: Handle) -> StrongboxResult<Vec<u8>> {
        self.check_opened()?;
        let header = self.header.read();
        self.check_handle(&header, handle)?;
        self.counters.loaded();

        match self.read_record(handle)? {
            Some(SlotRecord::Object { checksum, bytes }) => {
                let actual = crc32fast::hash(&bytes);
                if actual != checksum {
                    log::error!(
                        "Checksum mismatch for object {}: expected {:#x}, found {:#x}",
                        handle,
                        checksum,
                        actual
                    );
                    return Err(StrongboxError::new(
                        &format!("Checksum mismatch for object {}", handle),
                        ErrorKind::FileCorrupted,
                    ));
                }
                Ok(bytes)
            }
            _ => Err(not_found(handle)),
        }
    }

    fn store(&self, handle: Handle, bytes: &[u8]) -> StrongboxResult<()> {
        self.check_opened()?;
        let header = self.header.read();
        self.check_handle(&header, handle)?;

        let max = self.slot_size as usize - RECORD_OVERHEAD;
        if bytes.len() > max {
            log::error!(
                "Object {} too large: {} bytes (max {})",
                handle,
                bytes.len(),
                max
            );
            return Err(StrongboxError::new(
                &format!(
                    "Object {} too large: {} bytes (max {})",
                    handle,
                    bytes.len(),
                    max
                ),
                ErrorKind::IOError,
            ));
        }
        if let Some(SlotRecord::Free { .. }) | None = self.read_record(handle)? {
            return Err(not_found(handle));
        }

        let record = SlotRecord::Object {
            checksum: crc32fast::hash(bytes),
            bytes: bytes.to_vec(),
        };
        self.write_record(handle, &record)?;
        self.counters.stored();
        Ok(())
    }

    fn free(&self, handle: Handle) -> StrongboxResult<()> {
        self.check_opened()?;
        let mut header = self.header.write();
        self.check_handle(&header, handle)?;

        if let Some(SlotRecord::Free { .. }) | None = self.read_record(handle)? {
            return Err(not_found(handle));
        }

        self.write_record(
            handle,
            &SlotRecord::Free {
                next_free: header.free_list_head,
            },
        )?;
        header.free_list_head = handle.raw();
        header.free_count += 1;
        self.counters.freed();
        Ok(())
    }

    fn commit(&self) -> StrongboxResult<()> {
        let header = self.header.read();
        self.write_header(&header)?;
        if self.sync_on_commit {
            self.file.write().sync_all()?;
        }
        log::trace!(
            "Committed file store {} (next handle {}, {} free)",
            self.path.display(),
            header.next_handle,
            header.free_count
        );
        Ok(())
    }

    fn write_header(&self, header: &FileHeader) -> StrongboxResult<()> {
        let mut padded = bincode::serde::encode_to_vec(header, bincode::config::legacy())?;
        padded.resize(self.slot_size as usize, 0);

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&padded)?;
        Ok(())
    }

    /// Reads one slot. `None` if the slot lies past the end of the file.
    fn read_record(&self, handle: Handle) -> StrongboxResult<Option<SlotRecord>> {
        let offset = handle.raw() * self.slot_size as u64;
        let mut buffer = vec![0u8; self.slot_size as usize];
        {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(offset))?;
            match file.read_exact(&mut buffer) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }

        let (record, _): (SlotRecord, usize) =
            bincode::serde::decode_from_slice(&buffer, bincode::config::legacy()).map_err(
                |e| {
                    log::error!("Slot {} is unreadable: {}", handle, e);
                    StrongboxError::new(
                        &format!("Slot {} is unreadable: {}", handle, e),
                        ErrorKind::FileCorrupted,
                    )
                },
            )?;
        Ok(Some(record))
    }

    fn write_record(&self, handle: Handle, record: &SlotRecord) -> StrongboxResult<()> {
        let mut padded = bincode::serde::encode_to_vec(record, bincode::config::legacy())?;
        padded.resize(self.slot_size as usize, 0);

        let offset = handle.raw() * self.slot_size as u64;
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&padded)?;
        Ok(())
    }
}

fn not_found(handle: Handle) -> StrongboxError {
    StrongboxError::new(
        &format!("Object {} not found in file store", handle),
        ErrorKind::ObjectNotFound,
    )
}
