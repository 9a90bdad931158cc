//! Per-member resource identity slots.

use crate::error::StoreResult;
use crate::log::KvLog;
use peersync_storage::StorageBackend;
use tracing::{debug, info};

/// File name of a member's anchor log.
pub const ANCHOR_FILE: &str = "anchor.log";

/// A remembered resource identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Member owning the slot.
    pub member_id: String,
    /// Slot name, such as `"path"` or `"device_serial"`.
    pub field_name: String,
    /// Identity recorded at the last clean sync.
    pub value: String,
}

/// Persistent `(member, field) -> value` slots.
///
/// An anchor records which underlying resource a member was synced
/// against. A value that changed between runs means the ledger no longer
/// describes the resource, and the member has to be slow-synced.
#[derive(Debug)]
pub struct AnchorStore {
    log: KvLog,
}

impl AnchorStore {
    /// Opens the anchors stored in `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be replayed.
    pub fn open(backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        Ok(Self {
            log: KvLog::open(backend)?,
        })
    }

    /// Creates an empty store held in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            log: KvLog::in_memory(),
        }
    }

    /// Returns true if `current` differs from the stored value, meaning the
    /// member needs a slow-sync.
    ///
    /// A missing slot counts as a difference. The check never writes; call
    /// [`update`](Self::update) once the sync that reacts to it has
    /// succeeded.
    #[must_use]
    pub fn check_and_maybe_flag(&self, member_id: &str, field_name: &str, current: &str) -> bool {
        let changed = self.log.get(member_id, field_name) != Some(current);
        if changed {
            info!(
                member = member_id,
                field = field_name,
                "anchor changed, slow-sync required"
            );
        }
        changed
    }

    /// Stores `value` in the slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the update cannot be persisted.
    pub fn update(&mut self, member_id: &str, field_name: &str, value: &str) -> StoreResult<()> {
        if self.log.get(member_id, field_name) == Some(value) {
            return Ok(());
        }
        debug!(member = member_id, field = field_name, "anchor updated");
        self.log.put(member_id, field_name, value)
    }

    /// Returns the stored value of the slot.
    #[must_use]
    pub fn get(&self, member_id: &str, field_name: &str) -> Option<&str> {
        self.log.get(member_id, field_name)
    }

    /// Drops one slot. Returns false if it was not set.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    pub fn remove(&mut self, member_id: &str, field_name: &str) -> StoreResult<bool> {
        self.log.delete(member_id, field_name)
    }

    /// Drops every slot of `member_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    pub fn clear(&mut self, member_id: &str) -> StoreResult<usize> {
        self.log.clear(member_id)
    }

    /// Returns every slot of `member_id` in field order.
    #[must_use]
    pub fn entries(&self, member_id: &str) -> Vec<Anchor> {
        self.log
            .iter(member_id)
            .map(|(field, value)| Anchor {
                member_id: member_id.to_owned(),
                field_name: field.to_owned(),
                value: value.to_owned(),
            })
            .collect()
    }

    /// Makes every update durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend sync fails.
    pub fn sync(&mut self) -> StoreResult<()> {
        self.log.sync()
    }

    /// Returns the underlying log.
    #[must_use]
    pub fn log(&self) -> &KvLog {
        &self.log
    }

    /// Returns the underlying log mutably, for maintenance.
    pub fn log_mut(&mut self) -> &mut KvLog {
        &mut self.log
    }
}
