//! Drives every member of a group through one run.

use crate::cancel::CancelHandle;
use crate::config::CoordinatorConfig;
use crate::error::{FailureKind, SessionIssue, SyncError, SyncResult};
use crate::mapping::{MappingTable, MemoryMappingTable};
use crate::member::Member;
use crate::planner::Planner;
use crate::report::{MemberOutcome, SyncReport};
use crate::resolver::{ConflictResolver, IgnoreConflicts};
use crate::session::{BatchItem, Committed, MemberSession, MemberSlot, Origin, ScanReport, SessionState};
use crate::status::{EngineEvent, EnginePhase, MemberEvent, StatusFeed, SyncEvent};
use peersync_protocol::{ChangeKind, Environment, Record};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Counters over every run of a coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Runs that produced a report.
    pub runs_completed: u64,
    /// Changes reported by member scans.
    pub changes_reported: u64,
    /// Records written to members.
    pub records_committed: u64,
    /// Conflicts met.
    pub conflicts_encountered: u64,
    /// Wall time of the last run.
    pub last_run_duration: Option<Duration>,
}

/// Reconciles a group of members.
///
/// Each [`run`](Self::run) starts one session per member concurrently,
/// correlates the reported changes by entity, classifies entities reported
/// by more than one member, and sends every member the batch it has to
/// commit. A failing member never holds back the others.
///
/// # Example
///
/// ```ignore
/// use peersync_engine::{Member, MemoryBackend, SessionConfig, SyncCoordinator};
/// use peersync_protocol::Environment;
///
/// let mut coordinator = SyncCoordinator::new(Environment::new());
/// coordinator.add_member(Member::in_memory(SessionConfig::new("phone"), MemoryBackend::new()))?;
/// coordinator.add_member(Member::in_memory(SessionConfig::new("laptop"), MemoryBackend::new()))?;
///
/// let report = coordinator.run().await?;
/// assert!(report.failed_members().is_empty());
/// ```
pub struct SyncCoordinator {
    env: Environment,
    config: CoordinatorConfig,
    mapping: Box<dyn MappingTable>,
    resolver: Box<dyn ConflictResolver>,
    feed: StatusFeed,
    cancel: CancelHandle,
    members: Vec<Member>,
    stats: CoordinatorStats,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("config", &self.config)
            .field("members", &self.members)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Creates a coordinator with an in-memory mapping table that ignores
    /// every conflict.
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            config: CoordinatorConfig::default(),
            mapping: Box::new(MemoryMappingTable::new()),
            resolver: Box::new(IgnoreConflicts),
            feed: StatusFeed::new(),
            cancel: CancelHandle::new(),
            members: Vec::new(),
            stats: CoordinatorStats::default(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the mapping table.
    #[must_use]
    pub fn with_mapping(mut self, mapping: impl MappingTable + 'static) -> Self {
        self.mapping = Box::new(mapping);
        self
    }

    /// Sets the conflict resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl ConflictResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Publishes events on `feed` instead of a private feed.
    #[must_use]
    pub fn with_status_feed(mut self, feed: StatusFeed) -> Self {
        self.feed = feed;
        self
    }

    /// Registers a member.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DuplicateMember`] if the id is taken.
    pub fn add_member(&mut self, member: Member) -> SyncResult<()> {
        if self.members.iter().any(|m| m.id() == member.id()) {
            return Err(SyncError::DuplicateMember(member.id().to_owned()));
        }
        debug!(member = %member.id(), "member registered");
        self.members.push(member);
        Ok(())
    }

    /// Removes a member.
    pub fn remove_member(&mut self, member_id: &str) -> Option<Member> {
        let index = self.members.iter().position(|m| m.id() == member_id)?;
        Some(self.members.remove(index))
    }

    /// Returns the registered members.
    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Returns the mapping table.
    #[must_use]
    pub fn mapping(&self) -> &dyn MappingTable {
        self.mapping.as_ref()
    }

    /// Returns the environment.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Subscribes to run events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SyncEvent> {
        self.feed.subscribe()
    }

    /// Returns a handle that cancels the current run. The handle stays
    /// cancelled until [`CancelHandle::reset`] is called.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns the counters over every run.
    #[must_use]
    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    /// Runs one sync pass over every member.
    ///
    /// Member failures do not fail the run; they are listed in the report.
    /// That includes a session task that panicked: its member ends in
    /// [`FailureKind::Panicked`] and stays registered.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoMembers`] if no member is registered, or
    /// [`SyncError::SessionTask`] if a finished session did not release
    /// its member.
    pub async fn run(&mut self) -> SyncResult<SyncReport> {
        if self.members.is_empty() {
            return Err(SyncError::NoMembers);
        }
        let started = Instant::now();
        let registered: Vec<String> = self.members.iter().map(|m| m.id().to_owned()).collect();
        info!(members = registered.len(), "sync run started");

        let (reports_tx, mut reports_rx) = mpsc::unbounded_channel();
        let mut tasks = Vec::with_capacity(registered.len());
        for member in self.members.drain(..) {
            let id = member.id().to_owned();
            let slot = MemberSlot::new(member);
            let session = MemberSession::new(slot.lease().await, self.feed.clone(), self.cancel.token());
            tasks.push((id, slot, tokio::spawn(session.run(reports_tx.clone()))));
        }
        drop(reports_tx);

        let mut reports: Vec<ScanReport> = Vec::new();
        while let Some(report) = reports_rx.recv().await {
            debug!(member = %report.member, changes = report.changes.len(), "changes reported");
            reports.push(report);
        }
        reports.sort_by_key(|r| registered.iter().position(|m| *m == r.member));
        self.feed.engine(EngineEvent::PhaseComplete(EnginePhase::ChangesReported));

        let mut changes: Vec<(String, Vec<Record>)> = Vec::with_capacity(reports.len());
        let mut replies: Vec<(String, oneshot::Sender<_>)> = Vec::with_capacity(reports.len());
        let mut reported: HashMap<String, usize> = HashMap::new();
        for report in reports {
            self.stats.changes_reported += report.changes.len() as u64;
            reported.insert(report.member.clone(), report.changes.len());
            changes.push((report.member.clone(), report.changes));
            replies.push((report.member, report.reply));
        }

        let mut plan = Planner::new(
            &self.env,
            &self.config,
            self.mapping.as_mut(),
            self.resolver.as_ref(),
            &self.feed,
            &registered,
        )
        .plan(&changes);

        let mut sent: HashMap<String, Vec<BatchItem>> = HashMap::new();
        for (member, reply) in replies {
            let batch = plan.batches.remove(&member).unwrap_or_default();
            debug!(%member, writes = batch.changes.len(), rearmed = batch.invalidate.len(), "batch dispatched");
            let items = batch.changes.clone();
            if reply.send(batch).is_err() {
                debug!(%member, "session ended before its batch arrived");
            }
            sent.insert(member, items);
        }
        self.feed.engine(EngineEvent::PhaseComplete(EnginePhase::BatchesDispatched));

        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut undelivered: Vec<Origin> = Vec::new();
        let mut lost = None;
        for (member, slot, task) in tasks {
            let (outcome, committed) = match task.await {
                Ok(end) => (end.outcome, end.committed),
                Err(e) => {
                    error!(%member, error = %e, "session task panicked");
                    self.feed.member(&member, MemberEvent::Failed(FailureKind::Panicked));
                    let outcome = MemberOutcome {
                        member: member.clone(),
                        final_state: SessionState::Failed(FailureKind::Panicked),
                        changes_reported: reported.get(&member).copied().unwrap_or(0),
                        committed: 0,
                        issues: Vec::new(),
                        slow_sync: false,
                        error: Some(e.to_string()),
                    };
                    (outcome, Vec::new())
                }
            };

            for committed in &committed {
                if committed.kind == ChangeKind::Deleted {
                    self.mapping.unbind(&member, &committed.ack.uid);
                } else {
                    self.mapping.bind(&member, &committed.ack.uid, committed.entity);
                }
            }
            let items = sent.remove(&member).unwrap_or_default();
            undelivered.extend(self.settle_unwritten(&member, items, &committed, &outcome.issues));
            self.stats.records_committed += committed.len() as u64;
            outcomes.push(outcome);

            match slot.reclaim() {
                Ok(restored) => self.members.push(restored),
                Err(_) => {
                    warn!(%member, "session did not release its member");
                    lost.get_or_insert(SyncError::SessionTask {
                        member,
                        message: "member still leased after the session ended".into(),
                    });
                }
            }
        }
        self.feed.engine(EngineEvent::PhaseComplete(EnginePhase::SessionsJoined));

        if let Some(e) = lost {
            return Err(e);
        }
        self.rearm_undelivered(undelivered, &mut outcomes);

        let report = SyncReport::new(outcomes, plan.conflicts, started.elapsed());
        self.stats.runs_completed += 1;
        self.stats.conflicts_encountered += report.conflicts.len() as u64;
        self.stats.last_run_duration = Some(report.duration);
        info!(
            status = ?report.status,
            failed = report.failed_members().len(),
            conflicts = report.conflicts.len(),
            "sync run finished"
        );
        self.feed.engine(EngineEvent::Finished(report.status));
        Ok(report)
    }

    /// Follows up on the items of `member`'s batch that were not written.
    ///
    /// Deletions are deferred until the member reports again. Writes the
    /// session never attempted return their origins, to be re-armed. A
    /// write that failed with a record error is not retried.
    fn settle_unwritten(
        &mut self,
        member: &str,
        items: Vec<BatchItem>,
        committed: &[Committed],
        issues: &[SessionIssue],
    ) -> Vec<Origin> {
        let mut origins = Vec::new();
        for item in items {
            if item.record.kind == ChangeKind::Deleted {
                let acked = committed
                    .iter()
                    .any(|c| c.kind == ChangeKind::Deleted && c.ack.uid == item.record.uid);
                if !acked {
                    debug!(%member, uid = %item.record.uid, "deletion not written, deferred");
                    self.mapping.defer_delete(member, &item.record.uid);
                }
                continue;
            }
            let written = committed.iter().any(|c| c.entity == item.entity);
            let rejected = issues.iter().any(
                |issue| matches!(issue, SessionIssue::RecordCommitError { uid, .. } if *uid == item.record.uid),
            );
            if !written && !rejected {
                debug!(%member, entity = %item.entity, "write not attempted, origin re-armed");
                origins.extend(item.origins);
            }
        }
        origins
    }

    /// Re-arms the origins of writes that never reached their member, so
    /// the change is reported again next run.
    fn rearm_undelivered(&mut self, origins: Vec<Origin>, outcomes: &mut [MemberOutcome]) {
        for origin in origins {
            let Some(member) = self.members.iter_mut().find(|m| m.id() == origin.member) else {
                continue;
            };
            if let Err(e) = member.ledger.invalidate(&origin.uid, origin.kind) {
                warn!(member = %origin.member, uid = %origin.uid, error = %e, "could not re-arm undelivered change");
                if let Some(outcome) = outcomes.iter_mut().find(|o| o.member == origin.member) {
                    outcome.issues.push(SessionIssue::RearmError {
                        uid: origin.uid,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::SessionConfig;
    use crate::report::RunStatus;
    use peersync_protocol::Payload;

    fn member(id: &str, backend: &MemoryBackend) -> Member {
        Member::in_memory(SessionConfig::new(id), backend.clone())
    }

    fn payload(text: &str) -> Payload {
        Payload::new("text", text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn run_without_members_fails() {
        let mut coordinator = SyncCoordinator::new(Environment::new());
        assert!(matches!(coordinator.run().await, Err(SyncError::NoMembers)));
    }

    #[test]
    fn duplicate_member_is_rejected() {
        let backend = MemoryBackend::new();
        let mut coordinator = SyncCoordinator::new(Environment::new());
        coordinator.add_member(member("a", &backend)).unwrap();
        let err = coordinator.add_member(member("a", &backend)).unwrap_err();
        assert!(matches!(err, SyncError::DuplicateMember(id) if id == "a"));
        assert!(coordinator.remove_member("a").is_some());
        assert!(coordinator.members().is_empty());
    }

    #[tokio::test]
    async fn records_spread_and_settle() {
        let a = MemoryBackend::new();
        let b = MemoryBackend::new();
        a.put("note-1", payload("hello"));

        let mut coordinator = SyncCoordinator::new(Environment::new());
        coordinator.add_member(member("a", &a)).unwrap();
        coordinator.add_member(member("b", &b)).unwrap();

        let report = coordinator.run().await.unwrap();
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(b.get("note-1"), Some(payload("hello")));
        let entity = coordinator.mapping().entity_of("a", "note-1").unwrap();
        assert_eq!(coordinator.mapping().uid_in(entity, "b"), Some("note-1".to_owned()));

        // nothing echoes back
        let report = coordinator.run().await.unwrap();
        assert!(report.members.iter().all(|m| m.changes_reported == 0));
        assert_eq!(coordinator.stats().runs_completed, 2);
        assert_eq!(coordinator.members().len(), 2);
    }

    #[tokio::test]
    async fn deletions_spread() {
        let a = MemoryBackend::new();
        let b = MemoryBackend::new();
        a.put("note-1", payload("hello"));

        let mut coordinator = SyncCoordinator::new(Environment::new());
        coordinator.add_member(member("a", &a)).unwrap();
        coordinator.add_member(member("b", &b)).unwrap();
        coordinator.run().await.unwrap();

        b.remove("note-1");
        let report = coordinator.run().await.unwrap();
        assert_eq!(report.member("b").unwrap().changes_reported, 1);
        assert!(a.is_empty());
        assert!(coordinator.mapping().entity_of("a", "note-1").is_none());
    }
}
