//! Strong type definitions for channel sessions.
//!
//! Identifiers are newtypes to prevent mixing up devices and sessions.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// OpenFlow transaction id. Replies reuse the id of the request.
pub type Xid = u32;

/// Identifier of the device (datapath) that owns a set of controller
/// connections. Sibling sessions share the same `ResourceId`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a resource id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier of one controller connection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Generate a random session id.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({:016x})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Highest version representable in a single bitmap word.
pub const MAX_LOCAL_VERSION: u8 = 31;

/// The protocol versions one side of a connection can speak.
///
/// Always non-empty. Iteration is in ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct VersionSet(BTreeSet<u8>);

impl VersionSet {
    /// Build a version set, rejecting empty input and versions outside `1..=31`.
    pub fn new(versions: impl IntoIterator<Item = u8>) -> Result<Self, CoreError> {
        let set: BTreeSet<u8> = versions.into_iter().collect();
        if set.is_empty() {
            return Err(CoreError::EmptyVersionSet);
        }
        if let Some(&bad) = set.iter().find(|&&v| v == 0 || v > MAX_LOCAL_VERSION) {
            return Err(CoreError::VersionOutOfRange(bad));
        }
        Ok(Self(set))
    }

    /// The highest supported version.
    pub fn highest(&self) -> u8 {
        // non-empty by construction
        self.0.iter().next_back().copied().unwrap_or(1)
    }

    /// Check whether a version is supported.
    pub fn contains(&self, version: u8) -> bool {
        self.0.contains(&version)
    }

    /// Highest local version that also appears in `other`.
    pub fn highest_common(&self, other: &BTreeSet<u8>) -> Option<u8> {
        self.0.iter().rev().find(|v| other.contains(v)).copied()
    }

    /// Highest local version that is not above `limit`.
    pub fn highest_at_most(&self, limit: u8) -> Option<u8> {
        self.0.range(..=limit).next_back().copied()
    }

    /// Iterate over versions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    /// Borrow the underlying set.
    pub fn as_set(&self) -> &BTreeSet<u8> {
        &self.0
    }
}

impl Default for VersionSet {
    /// OpenFlow 1.3 only.
    fn default() -> Self {
        Self(BTreeSet::from([crate::message::version::OFP_1_3]))
    }
}

impl TryFrom<Vec<u8>> for VersionSet {
    type Error = CoreError;

    fn try_from(versions: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(versions)
    }
}

impl From<VersionSet> for Vec<u8> {
    fn from(set: VersionSet) -> Self {
        set.0.into_iter().collect()
    }
}
