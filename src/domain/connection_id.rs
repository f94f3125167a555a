//! Type-safe connection identifier.
//!
//! [`ConnectionId`] is a newtype around the registry's monotonic counter so
//! that connection identifiers cannot be confused with counts or sizes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier handed out by [`super::ConnectionRegistry::register`].
///
/// Ids start at 1 and are never reused within a process, even after the
/// connection they named has been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Placeholder carried by a connection before the registry assigns its id.
    pub const UNASSIGNED: Self = Self(0);

    /// Wraps a raw counter value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns `true` once the registry has assigned this id.
    #[must_use]
    pub const fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<ConnectionId> for u64 {
    fn from(id: ConnectionId) -> Self {
        id.0
    }
}
