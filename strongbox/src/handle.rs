//! Object identity.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Opaque, process-stable identifier of a persistent object.
///
/// Handles are assigned by an [`ObjectStore`](crate::store::ObjectStore) when an
/// object is first made persistent. [`Handle::NONE`] marks an object that has
/// not been persisted yet. Two handles are equal iff they denote the same
/// stored object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Handle(u64);

impl Handle {
    /// The "not yet persistent" sentinel.
    pub const NONE: Handle = Handle(0);

    pub const fn new(raw: u64) -> Self {
        Handle(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this handle denotes a stored object.
    pub const fn is_persistent(self) -> bool {
        self.0 != 0
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for Handle {
    fn from(raw: u64) -> Self {
        Handle(raw)
    }
}
