//! Error type of the spatial index.

use strongbox::errors::{ErrorKind, StrongboxError};
use thiserror::Error;

/// Errors that can occur in spatial index operations
#[derive(Debug, Error)]
pub enum SpatialError {
    /// The (rectangle, handle) pair to remove is not in the index
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// An iterator observed a structural change of its index
    #[error("Index was modified during iteration")]
    ConcurrentModification,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A rectangle with `min > max` on some axis
    #[error("Invalid rectangle: {0}")]
    InvalidRectangle(String),

    /// Index pages or header are inconsistent with each other
    #[error("Corrupted index: {0}")]
    CorruptedIndex(String),

    /// Failure of the underlying object substrate, passed through unchanged
    #[error(transparent)]
    Store(StrongboxError),
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;

impl SpatialError {
    /// Kind of the equivalent substrate error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpatialError::KeyNotFound(_) => ErrorKind::KeyNotFound,
            SpatialError::ConcurrentModification => ErrorKind::ConcurrentModification,
            SpatialError::UnsupportedOperation(_) => ErrorKind::InvalidOperation,
            SpatialError::InvalidConfig(_) | SpatialError::InvalidRectangle(_) => {
                ErrorKind::ValidationError
            }
            SpatialError::CorruptedIndex(_) => ErrorKind::IndexCorrupted,
            SpatialError::Store(err) => err.kind().clone(),
        }
    }
}

impl From<StrongboxError> for SpatialError {
    fn from(err: StrongboxError) -> Self {
        SpatialError::Store(err)
    }
}

impl From<SpatialError> for StrongboxError {
    fn from(err: SpatialError) -> Self {
        match err {
            SpatialError::Store(inner) => inner,
            other => StrongboxError::new(&other.to_string(), other.kind()),
        }
    }
}
