use backtrace::Backtrace;
use serde::{de, ser};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

/// Error kinds for Strongbox operations
///
/// Each kind describes one category of failure so callers can match on the
/// category instead of parsing messages.
///
/// # Examples
///
/// ```rust
/// use strongbox::errors::{ErrorKind, StrongboxError, StrongboxResult};
///
/// fn example() -> StrongboxResult<()> {
///     Err(StrongboxError::new("Object 7 not found", ErrorKind::ObjectNotFound))
/// }
///
/// assert_eq!(example().unwrap_err().kind(), &ErrorKind::ObjectNotFound);
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Object substrate errors
    /// A stub (raw object) was mutated before being hydrated
    AccessToStub,
    /// The handle does not resolve to a stored object
    ObjectNotFound,
    /// The handle is the transient sentinel or otherwise unusable
    InvalidHandle,

    // Index errors
    /// The addressed key is not present in the index
    KeyNotFound,
    /// An iterator observed a structural change of its index
    ConcurrentModification,
    /// Index pages are inconsistent
    IndexCorrupted,

    // Operation errors
    /// The operation is not valid in the current context
    InvalidOperation,
    /// A configuration or argument failed validation
    ValidationError,

    // IO and storage errors
    /// Generic IO error
    IOError,
    /// The file was not found
    FileNotFound,
    /// Permission denied for file operation
    PermissionDenied,
    /// File data is corrupted
    FileCorrupted,

    // Data encoding errors
    /// Error encoding or decoding an object
    EncodingError,

    // Store state errors
    /// Store has already been closed
    StoreAlreadyClosed,

    /// Error from an extension crate (e.g. "spatial")
    Extension(String),

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::AccessToStub => write!(f, "Access to stub"),
            ErrorKind::ObjectNotFound => write!(f, "Object not found"),
            ErrorKind::InvalidHandle => write!(f, "Invalid handle"),
            ErrorKind::KeyNotFound => write!(f, "Key not found"),
            ErrorKind::ConcurrentModification => write!(f, "Concurrent modification"),
            ErrorKind::IndexCorrupted => write!(f, "Index corrupted"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::ValidationError => write!(f, "Validation error"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::FileNotFound => write!(f, "File not found"),
            ErrorKind::PermissionDenied => write!(f, "Permission denied"),
            ErrorKind::FileCorrupted => write!(f, "File corrupted"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::StoreAlreadyClosed => write!(f, "Store already closed"),
            ErrorKind::Extension(name) => write!(f, "{} error", name),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom Strongbox error type.
///
/// `StrongboxError` carries a message, a kind, an optional cause and the
/// backtrace captured where it was created.
///
/// # Examples
///
/// ```rust
/// use strongbox::errors::{ErrorKind, StrongboxError};
///
/// let cause = StrongboxError::new("short read", ErrorKind::IOError);
/// let err = StrongboxError::new_with_cause("Failed to load object 3", ErrorKind::ObjectNotFound, cause);
/// assert!(err.cause().is_some());
/// ```
#[derive(Clone)]
pub struct StrongboxError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<StrongboxError>>,
    backtrace: Arc<Backtrace>,
}

impl StrongboxError {
    /// Creates a new `StrongboxError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        StrongboxError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Arc::new(Backtrace::new()),
        }
    }

    /// Creates a new `StrongboxError` chained onto a cause.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: StrongboxError) -> Self {
        StrongboxError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&StrongboxError> {
        self.cause.as_deref()
    }
}

impl Display for StrongboxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for StrongboxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace),
        }
    }
}

impl Error for StrongboxError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// `StrongboxResult<T>` is shorthand for `Result<T, StrongboxError>`.
pub type StrongboxResult<T> = Result<T, StrongboxError>;

impl de::Error for StrongboxError {
    fn custom<T: Display>(msg: T) -> Self {
        StrongboxError::new(&msg.to_string(), ErrorKind::EncodingError)
    }
}

impl ser::Error for StrongboxError {
    fn custom<T: Display>(msg: T) -> Self {
        StrongboxError::new(&msg.to_string(), ErrorKind::EncodingError)
    }
}

impl From<std::io::Error> for StrongboxError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::InvalidData => ErrorKind::FileCorrupted,
            _ => ErrorKind::IOError,
        };
        StrongboxError::new(&format!("IO error: {}", err), error_kind)
    }
}

impl From<bincode::error::EncodeError> for StrongboxError {
    fn from(err: bincode::error::EncodeError) -> Self {
        StrongboxError::new(&format!("Encoding error: {}", err), ErrorKind::EncodingError)
    }
}

impl From<bincode::error::DecodeError> for StrongboxError {
    fn from(err: bincode::error::DecodeError) -> Self {
        StrongboxError::new(&format!("Decoding error: {}", err), ErrorKind::EncodingError)
    }
}

impl From<String> for StrongboxError {
    fn from(msg: String) -> Self {
        StrongboxError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for StrongboxError {
    fn from(msg: &str) -> Self {
        StrongboxError::new(msg, ErrorKind::InternalError)
    }
}
