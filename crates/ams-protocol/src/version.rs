//! Protocol versioning for safe upgrades.
//!
//! # Version History
//!
//! | Version | Changes |
//! |---------|---------|
//! | 1.0 | `GetAllData` and `GetSysData` commands |
//!
//! Adding a command bumps the minor version. Changing the shape of a
//! request or response bumps the major version.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version for client-server communication.
///
/// Uses major.minor:
/// - Major version bump: breaking changes, incompatible
/// - Minor version bump: additive changes (new commands), backward compatible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Current protocol version.
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    /// Creates a new ProtocolVersion.
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Returns true if this version is in the same major generation as another.
    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }

    /// Returns true if a peer speaking this version can serve a request
    /// made at `requested`.
    ///
    /// The requested version must share the major version and must not be
    /// newer: a request may rely on every command up to its own minor
    /// version.
    pub fn accepts(&self, requested: &ProtocolVersion) -> bool {
        self.is_compatible_with(requested) && !requested.is_newer_than(self)
    }

    /// Returns true if this version is newer than another.
    pub fn is_newer_than(&self, other: &ProtocolVersion) -> bool {
        (self.major, self.minor) > (other.major, other.minor)
    }

    /// Returns true if this version is the current version.
    pub fn is_current(&self) -> bool {
        *self == Self::CURRENT
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
