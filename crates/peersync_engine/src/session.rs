//! Member session state machine.
//!
//! A session walks one member through a run:
//!
//! ```text
//! Idle -> Connecting -> Connected -> ScanningChanges -> Committing
//!      -> Finalizing -> Disconnecting -> Done
//! ```
//!
//! Any phase before `Disconnecting` may end in `Failed(kind)` instead. A
//! failed session still makes one time-bounded disconnect attempt.

use crate::backend::{Backend, CommitAck};
use crate::cancel::CancelToken;
use crate::error::{BackendError, BackendErrorKind, BackendResult, FailureKind, SessionIssue, SyncError};
use crate::mapping::EntityId;
use crate::member::Member;
use crate::report::MemberOutcome;
use crate::status::{ChangeEvent, MemberEvent, StatusFeed};
use peersync_protocol::{ChangeKind, Record};
use peersync_store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// The state of a member session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Not started.
    Idle,
    /// Connecting to the backend.
    Connecting,
    /// Connected, scan not started.
    Connected,
    /// Scanning for changes, then waiting for the commit batch.
    ScanningChanges,
    /// Writing the commit batch.
    Committing,
    /// Finalizing the backend and the persisted state.
    Finalizing,
    /// Releasing the backend.
    Disconnecting,
    /// The session failed.
    Failed(FailureKind),
    /// The session completed.
    Done,
}

impl SessionState {
    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Returns true for `Failed`.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns true if the state machine allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connected, ScanningChanges)
                | (ScanningChanges, Committing)
                | (Committing, Finalizing)
                | (Finalizing, Disconnecting)
                | (Disconnecting, Done)
                | (Connecting | Connected | ScanningChanges | Committing | Finalizing, Failed(_))
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(kind) => write!(f, "Failed({kind})"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// A change the coordinator wants written to a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BatchItem {
    pub entity: EntityId,
    pub record: Record,
    /// Reported records the write was planned from. Empty for deletions.
    pub origins: Vec<Origin>,
}

/// A record of one member a planned write came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Origin {
    pub member: String,
    pub uid: String,
    pub kind: ChangeKind,
}

/// What a session receives after reporting its changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CommitBatch {
    pub changes: Vec<BatchItem>,
    /// Ledger entries to re-arm so they are reported again next run, with
    /// the kind they were reported as.
    pub invalidate: Vec<(String, ChangeKind)>,
}

/// The change report of a session that finished scanning.
#[derive(Debug)]
pub(crate) struct ScanReport {
    pub member: String,
    pub changes: Vec<Record>,
    pub reply: oneshot::Sender<CommitBatch>,
}

/// A record the backend acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Committed {
    pub entity: EntityId,
    pub kind: ChangeKind,
    pub ack: CommitAck,
}

/// Everything a session hands back when it ends.
#[derive(Debug)]
pub(crate) struct SessionEnd {
    pub outcome: MemberOutcome,
    pub committed: Vec<Committed>,
}

/// Holds a member while a session borrows it.
///
/// The session keeps the lock for its whole run and releases it when it is
/// dropped, whether it finished or its task panicked, so the member can be
/// reclaimed afterwards.
#[derive(Debug)]
pub(crate) struct MemberSlot(Arc<Mutex<Member>>);

impl MemberSlot {
    pub(crate) fn new(member: Member) -> Self {
        Self(Arc::new(Mutex::new(member)))
    }

    /// Locks the member for a session.
    pub(crate) async fn lease(&self) -> OwnedMutexGuard<Member> {
        Arc::clone(&self.0).lock_owned().await
    }

    /// Takes the member back. Fails while a session still holds it.
    pub(crate) fn reclaim(self) -> Result<Member, Self> {
        Arc::try_unwrap(self.0).map(Mutex::into_inner).map_err(Self)
    }
}

enum Interrupt {
    Timeout,
    Cancelled,
    Backend(BackendError),
}

impl Interrupt {
    fn halt(self, on_timeout: FailureKind, on_error: FailureKind, phase: &str) -> Halt {
        match self {
            Self::Timeout => Halt::Failed(on_timeout, format!("{phase} timed out")),
            Self::Cancelled => Halt::Failed(FailureKind::Cancelled, format!("cancelled during {phase}")),
            Self::Backend(e) => Halt::Failed(on_error, format!("{phase} failed: {e}")),
        }
    }
}

enum Halt {
    Failed(FailureKind, String),
    Engine(SyncError),
}

impl From<SyncError> for Halt {
    fn from(e: SyncError) -> Self {
        Self::Engine(e)
    }
}

fn ledger_failed(e: StoreError) -> Halt {
    Halt::Failed(FailureKind::LedgerPersistError, format!("ledger: {e}"))
}

/// Runs `call` under `limit`, giving up early if the run is cancelled.
async fn bounded<T, F>(cancel: &mut CancelToken, limit: Duration, call: F) -> Result<T, Interrupt>
where
    F: Future<Output = BackendResult<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Interrupt::Cancelled),
        result = tokio::time::timeout(limit, call) => match result {
            Err(_) => Err(Interrupt::Timeout),
            Ok(Err(e)) => Err(Interrupt::Backend(e)),
            Ok(Ok(value)) => Ok(value),
        },
    }
}

fn live_changes(changes: &[Record]) -> Vec<(String, ChangeKind)> {
    changes
        .iter()
        .filter(|r| r.kind != ChangeKind::Deleted)
        .map(|r| (r.uid.clone(), r.kind))
        .collect()
}

fn remaining(deadline: Instant, per_call: Duration) -> Duration {
    per_call.min(deadline.saturating_duration_since(Instant::now()))
}

/// Drives one member through one run.
///
/// The session holds the member's lease for the duration of the run.
pub(crate) struct MemberSession {
    member: OwnedMutexGuard<Member>,
    state: SessionState,
    feed: StatusFeed,
    cancel: CancelToken,
    changes_reported: usize,
    committed: Vec<Committed>,
    issues: Vec<SessionIssue>,
    identities: Vec<(String, String)>,
    slow_sync: bool,
}

impl MemberSession {
    pub(crate) fn new(member: OwnedMutexGuard<Member>, feed: StatusFeed, cancel: CancelToken) -> Self {
        Self {
            member,
            state: SessionState::Idle,
            feed,
            cancel,
            changes_reported: 0,
            committed: Vec::new(),
            issues: Vec::new(),
            identities: Vec::new(),
            slow_sync: false,
        }
    }

    /// Runs the session to a terminal state.
    ///
    /// The session sends exactly one [`ScanReport`] on `reports` if its scan
    /// succeeds, and drops `reports` in every case before committing.
    pub(crate) async fn run(mut self, reports: mpsc::UnboundedSender<ScanReport>) -> SessionEnd {
        let (kind, message) = match self.drive(reports).await {
            Ok(()) => return self.finish(None),
            Err(Halt::Failed(kind, message)) => (kind, message),
            Err(Halt::Engine(e)) => (FailureKind::Internal, e.to_string()),
        };
        warn!(member = %self.member.id(), %kind, %message, "member session failed");
        if let Err(e) = self.enter(SessionState::Failed(kind)) {
            warn!(member = %self.member.id(), error = %e, "forcing failed state");
            self.state = SessionState::Failed(kind);
        }
        self.feed.member(self.member.id(), MemberEvent::Failed(kind));
        self.cleanup().await;
        self.finish(Some(message))
    }

    fn finish(self, message: Option<String>) -> SessionEnd {
        let outcome = MemberOutcome {
            member: self.member.id().to_owned(),
            final_state: self.state,
            changes_reported: self.changes_reported,
            committed: self.committed.len(),
            issues: self.issues,
            slow_sync: self.slow_sync,
            error: message,
        };
        SessionEnd {
            outcome,
            committed: self.committed,
        }
    }

    fn enter(&mut self, next: SessionState) -> Result<(), SyncError> {
        if !self.state.can_transition_to(next) {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(member = %self.member.id(), from = %self.state, to = %next, "session transition");
        self.state = next;
        Ok(())
    }

    async fn drive(&mut self, reports: mpsc::UnboundedSender<ScanReport>) -> Result<(), Halt> {
        self.connect().await?;
        let batch = self.scan(reports).await?;
        self.commit(batch).await?;
        self.finalize().await?;

        self.enter(SessionState::Disconnecting)?;
        self.disconnect().await;
        self.enter(SessionState::Done)?;
        info!(member = %self.member.id(), committed = self.committed.len(), "member session done");
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), Halt> {
        self.enter(SessionState::Connecting)?;
        let limit = self.member.config.timeouts.connect;
        bounded(&mut self.cancel, limit, self.member.backend.connect())
            .await
            .map_err(|i| i.halt(FailureKind::ConnectError, FailureKind::ConnectError, "connect"))?;
        self.enter(SessionState::Connected)?;
        self.feed.member(self.member.id(), MemberEvent::Connected);
        Ok(())
    }

    fn check_anchors(&mut self) {
        let member_id = self.member.config.member_id.clone();
        for field in self.member.backend.watched_identities() {
            match self.member.backend.resource_identity(&field) {
                Ok(value) => {
                    if self.member.anchors.check_and_maybe_flag(&member_id, &field, &value) {
                        self.slow_sync = true;
                        self.feed.member(&member_id, MemberEvent::SlowSync { field: field.clone() });
                    }
                    self.identities.push((field, value));
                }
                Err(e) => {
                    warn!(member = %member_id, %field, error = %e, "identity unreadable, forcing slow-sync");
                    self.slow_sync = true;
                    self.feed.member(&member_id, MemberEvent::SlowSync { field });
                }
            }
        }
    }

    async fn scan(&mut self, reports: mpsc::UnboundedSender<ScanReport>) -> Result<CommitBatch, Halt> {
        self.enter(SessionState::ScanningChanges)?;
        self.check_anchors();
        if self.slow_sync {
            info!(member = %self.member.id(), "slow-sync");
            self.member.ledger.force_full_rescan();
        } else {
            self.member.ledger.reset_reports();
        }

        let mut changes = Vec::new();
        if let Err(halt) = self.collect_changes(&mut changes).await {
            self.rearm(&live_changes(&changes))?;
            return Err(halt);
        }
        let live = live_changes(&changes);

        let deleted = self.member.ledger.deleted_uids();
        for uid in &deleted {
            self.feed.change(
                self.member.id(),
                uid,
                ChangeEvent::Received {
                    kind: ChangeKind::Deleted,
                },
            );
            changes.push(Record::deleted(uid.clone()));
        }

        self.changes_reported = changes.len();
        debug!(member = %self.member.id(), changes = changes.len(), deleted = deleted.len(), "scan complete");

        let (reply, batch) = oneshot::channel();
        let report = ScanReport {
            member: self.member.id().to_owned(),
            changes,
            reply,
        };
        if reports.send(report).is_err() {
            self.rearm(&live)?;
            return Err(Halt::Failed(FailureKind::Cancelled, "coordinator gone".into()));
        }
        drop(reports);
        self.feed.member(
            self.member.id(),
            MemberEvent::SentChanges {
                count: self.changes_reported,
            },
        );

        let received = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err("cancelled waiting for commit batch"),
            batch = batch => batch.map_err(|_| "coordinator dropped the batch"),
        };
        let batch = match received {
            Ok(batch) => batch,
            Err(message) => {
                self.rearm(&live)?;
                return Err(Halt::Failed(FailureKind::Cancelled, message.to_owned()));
            }
        };

        // unpurged deletions are reported again next run
        self.member.ledger.purge(&deleted).map_err(ledger_failed)?;
        Ok(batch)
    }

    /// Runs the backend scan, collecting every changed record.
    async fn collect_changes(&mut self, changes: &mut Vec<Record>) -> Result<(), Halt> {
        let timeouts = self.member.config.timeouts;
        let deadline = Instant::now() + timeouts.scan;
        let scan_failed = |i: Interrupt| i.halt(FailureKind::ScanTimeout, FailureKind::ScanError, "scan");

        bounded(
            &mut self.cancel,
            remaining(deadline, timeouts.scan_record),
            self.member.backend.start_scan(self.slow_sync),
        )
        .await
        .map_err(scan_failed)?;

        loop {
            let next = bounded(
                &mut self.cancel,
                remaining(deadline, timeouts.scan_record),
                self.member.backend.scan_next(),
            )
            .await
            .map_err(scan_failed)?;
            let Some(scanned) = next else {
                return Ok(());
            };

            let kind = self
                .member
                .ledger
                .record_seen(&scanned.uid, &scanned.hash)
                .map_err(ledger_failed)?;
            if kind.is_change() {
                self.feed
                    .change(self.member.id(), &scanned.uid, ChangeEvent::Received { kind });
                changes.push(Record::new(scanned.uid, scanned.hash, kind, scanned.payload));
            }
        }
    }

    /// Re-arms changes that were recorded but may not have been delivered,
    /// so the next scan offers them again.
    ///
    /// A change that cannot be re-armed would be lost, so that fails the
    /// session with [`FailureKind::LedgerPersistError`].
    fn rearm(&mut self, changes: &[(String, ChangeKind)]) -> Result<(), Halt> {
        for (uid, kind) in changes {
            self.member.ledger.invalidate(uid, *kind).map_err(ledger_failed)?;
        }
        debug!(member = %self.member.id(), count = changes.len(), "changes re-armed");
        Ok(())
    }

    async fn commit(&mut self, batch: CommitBatch) -> Result<(), Halt> {
        self.enter(SessionState::Committing)?;
        for (uid, kind) in &batch.invalidate {
            self.member.ledger.invalidate(uid, *kind).map_err(ledger_failed)?;
        }

        let timeouts = self.member.config.timeouts;
        let deadline = Instant::now() + timeouts.commit;
        let mut errors = 0;

        for item in batch.changes {
            let result = bounded(
                &mut self.cancel,
                remaining(deadline, timeouts.commit_record),
                self.member.backend.commit(&item.record),
            )
            .await
            .or_else(|i| match i {
                // deleting a record that is already gone is done
                Interrupt::Backend(e)
                    if e.kind == BackendErrorKind::NotFound && item.record.kind == ChangeKind::Deleted =>
                {
                    debug!(member = %self.member.id(), uid = %item.record.uid, "record already deleted");
                    Ok(CommitAck {
                        uid: item.record.uid.clone(),
                        hash: String::new(),
                    })
                }
                other => Err(other),
            });

            match result {
                Ok(ack) => {
                    self.member
                        .ledger
                        .apply_committed(item.record.kind, &ack.uid, &ack.hash)
                        .map_err(ledger_failed)?;
                    self.feed.change(
                        self.member.id(),
                        &ack.uid,
                        ChangeEvent::Written {
                            kind: item.record.kind,
                        },
                    );
                    self.committed.push(Committed {
                        entity: item.entity,
                        kind: item.record.kind,
                        ack,
                    });
                }
                Err(Interrupt::Backend(e)) if !e.is_fatal() => {
                    warn!(member = %self.member.id(), uid = %item.record.uid, error = %e, "record commit failed");
                    self.feed.change(
                        self.member.id(),
                        &item.record.uid,
                        ChangeEvent::WriteError {
                            message: e.to_string(),
                        },
                    );
                    errors += 1;
                    self.issues.push(SessionIssue::RecordCommitError {
                        uid: item.record.uid,
                        error: e,
                    });
                }
                Err(i) => return Err(i.halt(FailureKind::CommitTimeout, FailureKind::CommitError, "commit")),
            }
        }

        self.feed.member(
            self.member.id(),
            MemberEvent::Committed {
                count: self.committed.len(),
                errors,
            },
        );
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), Halt> {
        self.enter(SessionState::Finalizing)?;
        let limit = self.member.config.timeouts.finalize;
        bounded(&mut self.cancel, limit, self.member.backend.finalize())
            .await
            .map_err(|i| i.halt(FailureKind::FinalizeTimeout, FailureKind::FinalizeError, "finalize"))?;

        let record_errors = self.issues.iter().filter(|i| i.is_record_error()).count();
        if record_errors == 0 {
            if let Err(e) = self.persist_anchors() {
                warn!(member = %self.member.id(), error = %e, "anchor update failed");
                self.issues.push(SessionIssue::AnchorPersistError {
                    message: e.to_string(),
                });
            }
        } else {
            info!(member = %self.member.id(), record_errors, "record errors, anchors left unchanged");
        }

        self.member.ledger.sync().map_err(ledger_failed)?;
        self.feed.member(self.member.id(), MemberEvent::Finalized);
        Ok(())
    }

    fn persist_anchors(&mut self) -> Result<(), StoreError> {
        let member_id = self.member.config.member_id.clone();
        for (field, value) in &self.identities {
            self.member.anchors.update(&member_id, field, value)?;
        }
        self.member.anchors.sync()
    }

    /// Disconnects, recording any problem as an issue.
    async fn disconnect(&mut self) {
        let limit = self.member.config.timeouts.disconnect;
        let message = match tokio::time::timeout(limit, self.member.backend.disconnect()).await {
            Ok(Ok(())) => {
                self.feed.member(self.member.id(), MemberEvent::Disconnected);
                return;
            }
            Ok(Err(e)) => format!("disconnect failed: {e}"),
            Err(_) => "disconnect timed out".to_owned(),
        };
        warn!(member = %self.member.id(), %message, "disconnect problem");
        self.issues.push(SessionIssue::DisconnectError { message });
    }

    async fn cleanup(&mut self) {
        debug!(member = %self.member.id(), state = %self.state, "disconnecting after failure");
        self.disconnect().await;
    }
}
