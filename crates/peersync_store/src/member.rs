//! On-disk layout of a member's state.

use crate::anchor::{AnchorStore, ANCHOR_FILE};
use crate::error::{StoreError, StoreResult};
use crate::ledger::{ChangeLedger, LEDGER_FILE};
use peersync_storage::FileBackend;
use std::path::{Path, PathBuf};

/// Paths of the files holding one member's state.
///
/// Each member gets a directory named after its id under the group root:
///
/// ```text
/// <root>/<member_id>/hashtable.log
/// <root>/<member_id>/anchor.log
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPaths {
    member_id: String,
    dir: PathBuf,
}

impl MemberPaths {
    /// Resolves the state directory of `member_id` under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidMemberId`] if the id is empty, is a
    /// relative path component, or contains a path separator.
    pub fn new(root: impl AsRef<Path>, member_id: &str) -> StoreResult<Self> {
        if member_id.is_empty()
            || member_id == "."
            || member_id == ".."
            || member_id.contains(['/', '\\', '\0'])
        {
            return Err(StoreError::InvalidMemberId(member_id.to_owned()));
        }
        Ok(Self {
            member_id: member_id.to_owned(),
            dir: root.as_ref().join(member_id),
        })
    }

    /// Returns the member id.
    #[must_use]
    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    /// Returns the member's state directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the ledger log path.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    /// Returns the anchor log path.
    #[must_use]
    pub fn anchor_path(&self) -> PathBuf {
        self.dir.join(ANCHOR_FILE)
    }

    /// Opens the member's ledger, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or replayed.
    pub fn open_ledger(&self) -> StoreResult<ChangeLedger> {
        let backend = FileBackend::open_with_create_dirs(&self.ledger_path())?;
        ChangeLedger::open(self.member_id.clone(), Box::new(backend))
    }

    /// Opens the member's anchors, creating the file if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or replayed.
    pub fn open_anchors(&self) -> StoreResult<AnchorStore> {
        let backend = FileBackend::open_with_create_dirs(&self.anchor_path())?;
        AnchorStore::open(Box::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unusable_ids() {
        for id in ["", ".", "..", "a/b", "a\\b"] {
            assert!(matches!(
                MemberPaths::new("/tmp", id),
                Err(StoreError::InvalidMemberId(_))
            ));
        }
    }

    #[test]
    fn layout() {
        let paths = MemberPaths::new("/state", "phone").unwrap();
        assert_eq!(paths.ledger_path(), Path::new("/state/phone/hashtable.log"));
        assert_eq!(paths.anchor_path(), Path::new("/state/phone/anchor.log"));
    }
}
