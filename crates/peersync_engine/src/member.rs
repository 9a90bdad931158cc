//! A registered group member and the state it owns.

use crate::backend::Backend;
use crate::config::SessionConfig;
use crate::error::SyncResult;
use peersync_store::{AnchorStore, ChangeLedger, MemberPaths};
use std::fmt;
use std::path::Path;

/// One member of a sync group: its backend plus the ledger and anchors
/// that persist between runs.
///
/// The coordinator lends a member to exactly one session per run, so the
/// ledger and anchors are never touched by two tasks at once.
pub struct Member {
    pub(crate) config: SessionConfig,
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) ledger: ChangeLedger,
    pub(crate) anchors: AnchorStore,
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("config", &self.config)
            .field("ledger_entries", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

impl Member {
    /// Creates a member from already opened state.
    pub fn new(
        config: SessionConfig,
        backend: impl Backend + 'static,
        ledger: ChangeLedger,
        anchors: AnchorStore,
    ) -> Self {
        Self {
            config,
            backend: Box::new(backend),
            ledger,
            anchors,
        }
    }

    /// Creates a member whose state lives in memory only.
    pub fn in_memory(config: SessionConfig, backend: impl Backend + 'static) -> Self {
        let ledger = ChangeLedger::in_memory(config.member_id.clone());
        Self::new(config, backend, ledger, AnchorStore::in_memory())
    }

    /// Creates a member whose state lives under `root/<member_id>/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the member id is not usable as a directory name
    /// or the state files cannot be opened.
    pub fn open(config: SessionConfig, backend: impl Backend + 'static, root: &Path) -> SyncResult<Self> {
        let paths = MemberPaths::new(root, &config.member_id)?;
        let ledger = paths.open_ledger()?;
        let anchors = paths.open_anchors()?;
        Ok(Self::new(config, backend, ledger, anchors))
    }

    /// Returns the member id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.config.member_id
    }

    /// Returns the member's configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the member's ledger.
    #[must_use]
    pub fn ledger(&self) -> &ChangeLedger {
        &self.ledger
    }

    /// Returns the member's anchors.
    #[must_use]
    pub fn anchors(&self) -> &AnchorStore {
        &self.anchors
    }
}
