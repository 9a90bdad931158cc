//! Storage whose writes can be made to fail, for persisted-state error paths.

use peersync_engine::{Member, SessionConfig};
use peersync_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use peersync_store::{AnchorStore, ChangeLedger};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::scripted::ScriptedBackend;

/// An [`InMemoryBackend`] that fails every write while it is broken.
///
/// Reads keep working. Clones share the data and the switch.
#[derive(Debug, Clone, Default)]
pub struct FaultyStorage {
    inner: InMemoryBackend,
    broken: Arc<AtomicBool>,
}

impl FaultyStorage {
    /// Creates an empty, working store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following write fail, or work again.
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    /// Returns the stored bytes.
    pub fn data(&self) -> Vec<u8> {
        self.inner.data()
    }

    fn check(&self, op: &str) -> StorageResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::other(format!("{op} refused: storage broken"))));
        }
        Ok(())
    }
}

impl StorageBackend for FaultyStorage {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.check("append")?;
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check("flush")?;
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check("sync")?;
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check("truncate")?;
        self.inner.truncate(new_size)
    }

    fn rewrite(&mut self, image: &[u8]) -> StorageResult<()> {
        self.check("rewrite")?;
        self.inner.rewrite(image)
    }
}

/// A member whose ledger and anchors live in [`FaultyStorage`].
pub struct FaultyMember {
    /// Session configuration.
    pub config: SessionConfig,
    /// The member's backend.
    pub backend: ScriptedBackend,
    /// Storage under the ledger.
    pub ledger: FaultyStorage,
    /// Storage under the anchors.
    pub anchors: FaultyStorage,
}

impl FaultyMember {
    /// Creates a member with working storage and [`fast_timeouts`](crate::fast_timeouts).
    pub fn new(id: &str) -> Self {
        Self {
            config: SessionConfig::new(id).with_timeouts(crate::fast_timeouts()),
            backend: ScriptedBackend::new(),
            ledger: FaultyStorage::new(),
            anchors: FaultyStorage::new(),
        }
    }

    /// Opens the member over its storage.
    pub fn open(&self) -> Member {
        let ledger = ChangeLedger::open(self.config.member_id.clone(), Box::new(self.ledger.clone()))
            .expect("Failed to open ledger");
        let anchors = AnchorStore::open(Box::new(self.anchors.clone())).expect("Failed to open anchors");
        Member::new(self.config.clone(), self.backend.clone(), ledger, anchors)
    }
}
