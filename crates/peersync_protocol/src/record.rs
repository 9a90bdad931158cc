//! Records exchanged between members and the coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a record changed since the member's previous cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The uid was not known before.
    Added,
    /// The uid is known with a different hash.
    Modified,
    /// The uid is known but no longer present.
    Deleted,
    /// The uid is known with the same hash.
    Unmodified,
}

impl ChangeKind {
    /// Returns true for kinds the scan reports upstream.
    #[must_use]
    pub fn is_change(self) -> bool {
        !matches!(self, Self::Unmodified)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Unmodified => "unmodified",
        };
        f.write_str(name)
    }
}

/// Format-tagged record content. The bytes are opaque outside the
/// delegate registered for `format`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Format tag selecting the delegate.
    pub format: String,
    /// Encoded content.
    pub data: Vec<u8>,
}

impl Payload {
    /// Creates a payload.
    pub fn new(format: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            format: format.into(),
            data,
        }
    }
}

/// A logical unit of synchronized data as reported by one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable id within the reporting member.
    pub uid: String,
    /// Content fingerprint computed by the member's backend.
    pub hash: String,
    /// Change classification.
    pub kind: ChangeKind,
    /// Content; absent for deletions.
    pub payload: Option<Payload>,
}

impl Record {
    /// Creates a record carrying content.
    pub fn new(uid: impl Into<String>, hash: impl Into<String>, kind: ChangeKind, payload: Payload) -> Self {
        Self {
            uid: uid.into(),
            hash: hash.into(),
            kind,
            payload: Some(payload),
        }
    }

    /// Creates a deletion record.
    pub fn deleted(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            hash: String::new(),
            kind: ChangeKind::Deleted,
            payload: None,
        }
    }

    /// Returns the payload format tag, if any.
    #[must_use]
    pub fn format(&self) -> Option<&str> {
        self.payload.as_ref().map(|p| p.format.as_str())
    }
}
