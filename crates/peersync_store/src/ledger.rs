//! Per-member change-detection ledger.

use crate::error::StoreResult;
use crate::log::KvLog;
use peersync_protocol::ChangeKind;
use peersync_storage::StorageBackend;
use std::collections::HashSet;
use tracing::debug;

/// File name of a member's ledger log.
pub const LEDGER_FILE: &str = "hashtable.log";

const REARM_ADDED: &str = "added";
const REARM_MODIFIED: &str = "modified";

/// One record the ledger knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Record uid, unique within the member.
    pub uid: String,
    /// Hash recorded at the last successful observation.
    pub hash: String,
    /// Whether the record has been seen in the current cycle.
    pub reported_this_cycle: bool,
}

/// Persistent `uid -> hash` table for one member.
///
/// A cycle uses it like this:
///
/// 1. [`reset_reports`](Self::reset_reports) (or
///    [`force_full_rescan`](Self::force_full_rescan) for a slow-sync)
/// 2. [`record_seen`](Self::record_seen) for every live record
/// 3. [`deleted_uids`](Self::deleted_uids), emit the deletions downstream
/// 4. [`purge`](Self::purge) the emitted uids
///
/// Hashes are persisted as soon as they are seen. Reported flags live only
/// in memory, so a cycle that dies before step 3 leaves nothing behind
/// that could turn into a false deletion.
///
/// Records whose change never reached the other members are re-armed with
/// [`invalidate`](Self::invalidate). The mark is kept in its own namespace
/// next to the hash, so the stored hash stays the real one.
#[derive(Debug)]
pub struct ChangeLedger {
    member_id: String,
    rearm_namespace: String,
    log: KvLog,
    reported: HashSet<String>,
    full_rescan: bool,
}

impl ChangeLedger {
    /// Opens the ledger of `member_id` stored in `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be replayed.
    pub fn open(member_id: impl Into<String>, backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        Ok(Self::with_log(member_id, KvLog::open(backend)?))
    }

    /// Creates an empty ledger held in memory.
    #[must_use]
    pub fn in_memory(member_id: impl Into<String>) -> Self {
        Self::with_log(member_id, KvLog::in_memory())
    }

    /// Wraps an already opened log.
    #[must_use]
    pub fn with_log(member_id: impl Into<String>, log: KvLog) -> Self {
        let member_id = member_id.into();
        Self {
            rearm_namespace: format!("{member_id}/rearm"),
            member_id,
            log,
            reported: HashSet::new(),
            full_rescan: false,
        }
    }

    /// Returns the member this ledger belongs to.
    #[must_use]
    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    /// Clears every reported flag. Call once before a scan.
    pub fn reset_reports(&mut self) {
        self.reported.clear();
        self.full_rescan = false;
    }

    /// Clears every reported flag for a slow-sync scan.
    ///
    /// Stored hashes are kept, so records that did not change are still
    /// classified [`ChangeKind::Unmodified`] instead of being re-added.
    pub fn force_full_rescan(&mut self) {
        debug!(member = %self.member_id, entries = self.len(), "ledger forced to full rescan");
        self.reported.clear();
        self.full_rescan = true;
    }

    /// Returns true if the current cycle was started as a full rescan.
    #[must_use]
    pub fn is_full_rescan(&self) -> bool {
        self.full_rescan
    }

    /// Classifies a freshly observed record. Does not change any state.
    ///
    /// A re-armed record is reported with the kind it was re-armed with,
    /// whatever its hash.
    #[must_use]
    pub fn classify(&self, uid: &str, hash: &str) -> ChangeKind {
        if let Some(kind) = self.rearmed_as(uid) {
            return kind;
        }
        match self.log.get(&self.member_id, uid) {
            None => ChangeKind::Added,
            Some(stored) if stored == hash => ChangeKind::Unmodified,
            Some(_) => ChangeKind::Modified,
        }
    }

    /// Marks `uid` as seen this cycle and persists `hash` if it changed.
    ///
    /// Returns the classification the record had before the update.
    ///
    /// # Errors
    ///
    /// Returns an error if the new hash cannot be persisted. The record is
    /// not marked as seen in that case.
    pub fn record_seen(&mut self, uid: &str, hash: &str) -> StoreResult<ChangeKind> {
        let kind = self.classify(uid, hash);
        if kind != ChangeKind::Unmodified && self.log.get(&self.member_id, uid) != Some(hash) {
            self.log.put(&self.member_id, uid, hash)?;
        }
        self.clear_rearm(uid)?;
        self.reported.insert(uid.to_owned());
        Ok(kind)
    }

    /// Returns every known uid not seen this cycle, in uid order.
    ///
    /// Only meaningful after every live record went through
    /// [`record_seen`](Self::record_seen). The entries stay in place until
    /// [`purge`](Self::purge) is called.
    #[must_use]
    pub fn deleted_uids(&self) -> Vec<String> {
        self.log
            .iter(&self.member_id)
            .filter(|(uid, _)| !self.reported.contains(*uid))
            .map(|(uid, _)| uid.to_owned())
            .collect()
    }

    /// Removes `uids` from the ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if a removal cannot be persisted. Removals before
    /// the failing one stay applied.
    pub fn purge(&mut self, uids: &[String]) -> StoreResult<()> {
        for uid in uids {
            self.log.delete(&self.member_id, uid)?;
            self.clear_rearm(uid)?;
            self.reported.remove(uid);
        }
        Ok(())
    }

    /// Records the result of writing a change to the member's backend.
    ///
    /// Deletions drop the entry, everything else stores `hash`, so the
    /// write is not reported back as a change on the next scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the update cannot be persisted.
    pub fn apply_committed(&mut self, kind: ChangeKind, uid: &str, hash: &str) -> StoreResult<()> {
        match kind {
            ChangeKind::Deleted => {
                self.log.delete(&self.member_id, uid)?;
                self.reported.remove(uid);
            }
            ChangeKind::Added | ChangeKind::Modified | ChangeKind::Unmodified => {
                if self.log.get(&self.member_id, uid) != Some(hash) {
                    self.log.put(&self.member_id, uid, hash)?;
                }
                self.reported.insert(uid.to_owned());
            }
        }
        self.clear_rearm(uid)
    }

    /// Re-arms `uid` so the next scan reports it as `kind` even when its
    /// hash did not change. Returns false for unknown uids.
    ///
    /// `kind` is the classification the change had when it was dropped.
    /// [`ChangeKind::Deleted`] and [`ChangeKind::Unmodified`] are stored as
    /// [`ChangeKind::Modified`]. The mark is cleared by the next
    /// [`record_seen`](Self::record_seen), [`purge`](Self::purge) or
    /// [`apply_committed`](Self::apply_committed) of the uid.
    ///
    /// # Errors
    ///
    /// Returns an error if the mark cannot be persisted.
    pub fn invalidate(&mut self, uid: &str, kind: ChangeKind) -> StoreResult<bool> {
        if !self.log.contains(&self.member_id, uid) {
            return Ok(false);
        }
        let mark = match kind {
            ChangeKind::Added => REARM_ADDED,
            ChangeKind::Modified | ChangeKind::Deleted | ChangeKind::Unmodified => REARM_MODIFIED,
        };
        if self.log.get(&self.rearm_namespace, uid) != Some(mark) {
            self.log.put(&self.rearm_namespace, uid, mark)?;
        }
        Ok(true)
    }

    /// Returns the kind `uid` was re-armed with, if it is re-armed.
    #[must_use]
    pub fn rearmed_as(&self, uid: &str) -> Option<ChangeKind> {
        match self.log.get(&self.rearm_namespace, uid)? {
            REARM_ADDED => Some(ChangeKind::Added),
            _ => Some(ChangeKind::Modified),
        }
    }

    fn clear_rearm(&mut self, uid: &str) -> StoreResult<()> {
        if self.log.contains(&self.rearm_namespace, uid) {
            self.log.delete(&self.rearm_namespace, uid)?;
        }
        Ok(())
    }

    /// Drops every entry. The next scan reports every record as added.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset cannot be persisted.
    pub fn reset(&mut self) -> StoreResult<usize> {
        self.reported.clear();
        self.log.clear(&self.rearm_namespace)?;
        self.log.clear(&self.member_id)
    }

    /// Returns the stored hash of `uid`.
    #[must_use]
    pub fn hash_of(&self, uid: &str) -> Option<&str> {
        self.log.get(&self.member_id, uid)
    }

    /// Returns every entry in uid order.
    #[must_use]
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.log
            .iter(&self.member_id)
            .map(|(uid, hash)| LedgerEntry {
                uid: uid.to_owned(),
                hash: hash.to_owned(),
                reported_this_cycle: self.reported.contains(uid),
            })
            .collect()
    }

    /// Returns the number of known records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len(&self.member_id)
    }

    /// Returns true if the ledger knows no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes every persisted change durable.
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

#[cfg(test)]
mod tests {
    use super::*;
    use peersync_storage::InMemoryBackend;

    fn cycle(ledger: &mut ChangeLedger, records: &[(&str, &str)]) -> Vec<(String, ChangeKind)> {
        ledger.reset_reports();
        let mut seen: Vec<(String, ChangeKind)> = records
            .iter()
            .map(|(uid, hash)| ((*uid).to_owned(), ledger.record_seen(uid, hash).unwrap()))
            .collect();
        let deleted = ledger.deleted_uids();
        seen.extend(deleted.iter().map(|uid| (uid.clone(), ChangeKind::Deleted)));
        ledger.purge(&deleted).unwrap();
        seen
    }

    #[test]
    fn classify_does_not_mutate() {
        let ledger = ChangeLedger::in_memory("m1");
        assert_eq!(ledger.classify("a", "h1"), ChangeKind::Added);
        assert_eq!(ledger.classify("a", "h1"), ChangeKind::Added);
        assert!(ledger.is_empty());
    }

    #[test]
    fn added_then_unmodified_then_modified() {
        let mut ledger = ChangeLedger::in_memory("m1");
        assert_eq!(cycle(&mut ledger, &[("a", "h1")])[0].1, ChangeKind::Added);
        assert_eq!(cycle(&mut ledger, &[("a", "h1")])[0].1, ChangeKind::Unmodified);
        assert_eq!(cycle(&mut ledger, &[("a", "h2")])[0].1, ChangeKind::Modified);
        assert_eq!(ledger.hash_of("a"), Some("h2"));
    }

    #[test]
    fn unseen_entries_are_deleted() {
        let mut ledger = ChangeLedger::in_memory("m1");
        cycle(&mut ledger, &[("A", "h1"), ("B", "h2")]);

        ledger.reset_reports();
        ledger.record_seen("A", "h1").unwrap();
        assert_eq!(ledger.deleted_uids(), vec!["B".to_owned()]);

        // deleted_uids does not purge on its own
        assert_eq!(ledger.len(), 2);
        ledger.purge(&["B".to_owned()]).unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn full_rescan_keeps_hashes() {
        let mut ledger = ChangeLedger::in_memory("m1");
        cycle(&mut ledger, &[("a", "h1"), ("b", "h2")]);

        ledger.force_full_rescan();
        assert!(ledger.is_full_rescan());
        assert_eq!(ledger.record_seen("a", "h1").unwrap(), ChangeKind::Unmodified);
        assert_eq!(ledger.record_seen("b", "h2").unwrap(), ChangeKind::Unmodified);
        assert!(ledger.deleted_uids().is_empty());
    }

    #[test]
    fn unmodified_records_do_not_grow_the_log() {
        let backend = InMemoryBackend::new();
        let mut ledger = ChangeLedger::open("m1", Box::new(backend.clone())).unwrap();
        cycle(&mut ledger, &[("a", "h1")]);
        let size = backend.data().len();

        cycle(&mut ledger, &[("a", "h1")]);
        assert_eq!(backend.data().len(), size);
    }

    #[test]
    fn interrupted_scan_leaves_no_false_deletions() {
        let backend = InMemoryBackend::new();
        {
            let mut ledger = ChangeLedger::open("m1", Box::new(backend.clone())).unwrap();
            cycle(&mut ledger, &[("a", "h1"), ("b", "h2")]);

            // scan dies after one record
            ledger.reset_reports();
            ledger.record_seen("a", "h1").unwrap();
        }

        let mut ledger = ChangeLedger::open("m1", Box::new(backend)).unwrap();
        assert_eq!(ledger.len(), 2);
        let kinds = cycle(&mut ledger, &[("a", "h1"), ("b", "h2")]);
        assert!(kinds.iter().all(|(_, kind)| *kind == ChangeKind::Unmodified));
    }

    #[test]
    fn committed_writes_are_not_echoed() {
        let mut ledger = ChangeLedger::in_memory("m1");
        ledger.apply_committed(ChangeKind::Added, "x", "hx").unwrap();
        assert_eq!(cycle(&mut ledger, &[("x", "hx")])[0].1, ChangeKind::Unmodified);

        ledger.apply_committed(ChangeKind::Deleted, "x", "").unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn invalidated_entry_reports_modified() {
        let mut ledger = ChangeLedger::in_memory("m1");
        cycle(&mut ledger, &[("a", "h1")]);
        assert!(ledger.invalidate("a", ChangeKind::Modified).unwrap());
        assert!(!ledger.invalidate("zzz", ChangeKind::Modified).unwrap());
        assert_eq!(ledger.hash_of("a"), Some("h1"));
        assert_eq!(cycle(&mut ledger, &[("a", "h1")])[0].1, ChangeKind::Modified);
        assert_eq!(cycle(&mut ledger, &[("a", "h1")])[0].1, ChangeKind::Unmodified);
    }

    #[test]
    fn undelivered_addition_is_offered_as_added_again() {
        let mut ledger = ChangeLedger::in_memory("m1");
        ledger.reset_reports();
        assert_eq!(ledger.record_seen("x", "hx").unwrap(), ChangeKind::Added);
        assert!(ledger.invalidate("x", ChangeKind::Added).unwrap());

        assert_eq!(cycle(&mut ledger, &[("x", "hx")])[0].1, ChangeKind::Added);
        assert_eq!(ledger.rearmed_as("x"), None);
    }

    #[test]
    fn empty_hash_is_an_ordinary_hash() {
        let mut ledger = ChangeLedger::in_memory("m1");
        cycle(&mut ledger, &[("a", "")]);
        assert!(ledger.invalidate("a", ChangeKind::Modified).unwrap());
        assert_eq!(cycle(&mut ledger, &[("a", "")])[0].1, ChangeKind::Modified);

        assert_eq!(cycle(&mut ledger, &[("a", "")])[0].1, ChangeKind::Unmodified);
        assert_eq!(cycle(&mut ledger, &[("a", "h1")])[0].1, ChangeKind::Modified);
    }

    #[test]
    fn rearm_mark_survives_reopen_and_leaves_entries_alone() {
        let backend = InMemoryBackend::new();
        {
            let mut ledger = ChangeLedger::open("m1", Box::new(backend.clone())).unwrap();
            cycle(&mut ledger, &[("a", "h1"), ("b", "h2")]);
            ledger.invalidate("b", ChangeKind::Modified).unwrap();
        }

        let mut ledger = ChangeLedger::open("m1", Box::new(backend)).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.entries()[1].hash, "h2");
        let kinds = cycle(&mut ledger, &[("a", "h1"), ("b", "h2")]);
        assert_eq!(kinds[0].1, ChangeKind::Unmodified);
        assert_eq!(kinds[1].1, ChangeKind::Modified);
    }

    #[test]
    fn purge_and_commit_clear_the_mark() {
        let mut ledger = ChangeLedger::in_memory("m1");
        cycle(&mut ledger, &[("a", "h1"), ("b", "h2")]);
        ledger.invalidate("a", ChangeKind::Modified).unwrap();
        ledger.invalidate("b", ChangeKind::Modified).unwrap();

        ledger.purge(&["a".to_owned()]).unwrap();
        ledger.apply_committed(ChangeKind::Modified, "b", "h3").unwrap();
        assert_eq!(ledger.rearmed_as("a"), None);
        assert_eq!(ledger.rearmed_as("b"), None);
        assert_eq!(cycle(&mut ledger, &[("a", "h1")])[0].1, ChangeKind::Added);
    }

    #[test]
    fn reset_drops_everything() {
        let mut ledger = ChangeLedger::in_memory("m1");
        cycle(&mut ledger, &[("a", "h1"), ("b", "h2")]);
        assert_eq!(ledger.reset().unwrap(), 2);
        assert_eq!(cycle(&mut ledger, &[("a", "h1")])[0].1, ChangeKind::Added);
    }

    #[test]
    fn entries_carry_reported_flag() {
        let mut ledger = ChangeLedger::in_memory("m1");
        cycle(&mut ledger, &[("a", "h1"), ("b", "h2")]);
        ledger.reset_reports();
        ledger.record_seen("b", "h2").unwrap();

        let entries = ledger.entries();
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].reported_this_cycle);
        assert!(entries[1].reported_this_cycle);
    }
}
