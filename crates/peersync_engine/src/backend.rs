//! Backend contract between the engine and a member's data source.

use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use peersync_protocol::{ChangeKind, Payload, Record};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

/// One live record produced by a change scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedRecord {
    /// Stable id within the member.
    pub uid: String,
    /// Content fingerprint.
    pub hash: String,
    /// Content.
    pub payload: Payload,
}

/// What a backend reports after writing a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAck {
    /// Uid the record is stored under. May differ from the proposed uid
    /// for additions.
    pub uid: String,
    /// Hash the next scan will report for the record. Empty for deletions.
    pub hash: String,
}

/// A member's data source.
///
/// Every call may suspend and may fail; the session bounds each one with
/// its own deadline. A change scan is [`start_scan`](Self::start_scan)
/// followed by [`scan_next`](Self::scan_next) until it yields `None`; every
/// live record must be yielded, changed or not.
#[async_trait]
pub trait Backend: Send {
    /// Opens the connection to the resource.
    async fn connect(&mut self) -> BackendResult<()>;

    /// Starts enumerating live records. `full` is set for slow-syncs.
    async fn start_scan(&mut self, full: bool) -> BackendResult<()>;

    /// Returns the next live record, or `None` once the scan is complete.
    async fn scan_next(&mut self) -> BackendResult<Option<ScannedRecord>>;

    /// Writes one change. `record.uid` is the member-local uid for
    /// modifications and deletions, and a proposed uid for additions.
    async fn commit(&mut self, record: &Record) -> BackendResult<CommitAck>;

    /// Makes committed changes durable on the resource.
    async fn finalize(&mut self) -> BackendResult<()>;

    /// Releases the connection.
    async fn disconnect(&mut self) -> BackendResult<()>;

    /// Names of the identity slots this backend exposes, such as `"path"`.
    fn watched_identities(&self) -> Vec<String> {
        Vec::new()
    }

    /// Returns the current value of an identity slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be read.
    fn resource_identity(&self, field_name: &str) -> BackendResult<String>;
}

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<String, (String, Payload)>,
    identities: BTreeMap<String, String>,
    pending_scan: VecDeque<ScannedRecord>,
    rejected: BTreeSet<String>,
    revision: u64,
    connected: bool,
    connects: usize,
    disconnects: usize,
    finalizes: usize,
}

impl MemoryState {
    fn next_hash(&mut self) -> String {
        self.revision += 1;
        format!("r{}", self.revision)
    }
}

/// A backend holding its records in memory.
///
/// Clones share the same records, so a test can keep a handle while the
/// session owns another. Hashes are revision counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record as if it was edited on the resource. Returns its hash.
    pub fn put(&self, uid: impl Into<String>, payload: Payload) -> String {
        let mut state = self.state.lock();
        let hash = state.next_hash();
        state.records.insert(uid.into(), (hash.clone(), payload));
        hash
    }

    /// Removes a record as if it was deleted on the resource.
    pub fn remove(&self, uid: &str) -> bool {
        self.state.lock().records.remove(uid).is_some()
    }

    /// Sets an identity slot.
    pub fn set_identity(&self, field_name: impl Into<String>, value: impl Into<String>) {
        self.state
            .lock()
            .identities
            .insert(field_name.into(), value.into());
    }

    /// Makes commits of `uid` fail with a rejection.
    pub fn reject(&self, uid: impl Into<String>) {
        self.state.lock().rejected.insert(uid.into());
    }

    /// Returns the stored payload of `uid`.
    #[must_use]
    pub fn get(&self, uid: &str) -> Option<Payload> {
        self.state.lock().records.get(uid).map(|(_, p)| p.clone())
    }

    /// Returns every stored uid.
    #[must_use]
    pub fn uids(&self) -> Vec<String> {
        self.state.lock().records.keys().cloned().collect()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Returns true if no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns how many times connect, finalize and disconnect were called.
    #[must_use]
    pub fn call_counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock();
        (state.connects, state.finalizes, state.disconnects)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn connect(&mut self) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    async fn start_scan(&mut self, _full: bool) -> BackendResult<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(BackendError::connection("not connected"));
        }
        state.pending_scan = state
            .records
            .iter()
            .map(|(uid, (hash, payload))| ScannedRecord {
                uid: uid.clone(),
                hash: hash.clone(),
                payload: payload.clone(),
            })
            .collect();
        Ok(())
    }

    async fn scan_next(&mut self) -> BackendResult<Option<ScannedRecord>> {
        Ok(self.state.lock().pending_scan.pop_front())
    }

    async fn commit(&mut self, record: &Record) -> BackendResult<CommitAck> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(BackendError::connection("not connected"));
        }
        if state.rejected.contains(&record.uid) {
            return Err(BackendError::rejected(format!("{} is read-only", record.uid)));
        }

        match record.kind {
            ChangeKind::Deleted => {
                if state.records.remove(&record.uid).is_none() {
                    return Err(BackendError::not_found(record.uid.clone()));
                }
                Ok(CommitAck {
                    uid: record.uid.clone(),
                    hash: String::new(),
                })
            }
            ChangeKind::Added | ChangeKind::Modified | ChangeKind::Unmodified => {
                let payload = record
                    .payload
                    .clone()
                    .ok_or_else(|| BackendError::rejected("missing payload"))?;
                let mut uid = record.uid.clone();
                if record.kind == ChangeKind::Added {
                    let mut n = 1;
                    while state.records.contains_key(&uid) {
                        n += 1;
                        uid = format!("{}-{n}", record.uid);
                    }
                } else if !state.records.contains_key(&uid) {
                    return Err(BackendError::not_found(uid));
                }
                let hash = state.next_hash();
                state.records.insert(uid.clone(), (hash.clone(), payload));
                Ok(CommitAck { uid, hash })
            }
        }
    }

    async fn finalize(&mut self) -> BackendResult<()> {
        self.state.lock().finalizes += 1;
        Ok(())
    }

    async fn disconnect(&mut self) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.disconnects += 1;
        Ok(())
    }

    fn watched_identities(&self) -> Vec<String> {
        self.state.lock().identities.keys().cloned().collect()
    }

    fn resource_identity(&self, field_name: &str) -> BackendResult<String> {
        self.state
            .lock()
            .identities
            .get(field_name)
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("identity {field_name}")))
    }
}
