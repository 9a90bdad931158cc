//! Results of a sync run.

use crate::error::SessionIssue;
use crate::mapping::EntityId;
use crate::resolver::Resolution;
use crate::session::SessionState;
use peersync_protocol::Classification;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every member reached `Done` without record errors.
    Success,
    /// At least one member failed or had record errors.
    PartialSuccess,
}

/// How one member's session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberOutcome {
    /// Member id.
    pub member: String,
    /// Terminal session state.
    pub final_state: SessionState,
    /// Changes the scan reported.
    pub changes_reported: usize,
    /// Records written to the member.
    pub committed: usize,
    /// Problems that did not fail the session.
    pub issues: Vec<SessionIssue>,
    /// Whether the scan was a slow-sync.
    pub slow_sync: bool,
    /// Description of the failure, if the session failed.
    pub error: Option<String>,
}

impl MemberOutcome {
    /// Returns true if the session reached `Done`.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.final_state == SessionState::Done
    }

    /// Returns the number of records that could not be written.
    #[must_use]
    pub fn record_errors(&self) -> usize {
        self.issues.iter().filter(|i| i.is_record_error()).count()
    }
}

/// A conflict met during the run and what was done about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSummary {
    /// Entity in conflict.
    pub entity: EntityId,
    /// Members that reported a version.
    pub members: Vec<String>,
    /// Worst pairwise classification.
    pub classification: Classification,
    /// Applied resolution.
    pub resolution: Resolution,
}

/// Everything a run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Overall result.
    pub status: RunStatus,
    /// One outcome per member, in registration order.
    pub members: Vec<MemberOutcome>,
    /// Conflicts met.
    pub conflicts: Vec<ConflictSummary>,
    /// Wall time of the run.
    pub duration: Duration,
}

impl SyncReport {
    pub(crate) fn new(members: Vec<MemberOutcome>, conflicts: Vec<ConflictSummary>, duration: Duration) -> Self {
        let status = if members.iter().all(|m| m.is_done() && m.record_errors() == 0) {
            RunStatus::Success
        } else {
            RunStatus::PartialSuccess
        };
        Self {
            status,
            members,
            conflicts,
            duration,
        }
    }

    /// Returns the members whose session failed.
    #[must_use]
    pub fn failed_members(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| m.final_state.is_failed())
            .map(|m| m.member.as_str())
            .collect()
    }

    /// Returns the outcome of `member`.
    #[must_use]
    pub fn member(&self, member: &str) -> Option<&MemberOutcome> {
        self.members.iter().find(|m| m.member == member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, FailureKind};

    fn outcome(member: &str, final_state: SessionState, issues: Vec<SessionIssue>) -> MemberOutcome {
        MemberOutcome {
            member: member.into(),
            final_state,
            changes_reported: 0,
            committed: 0,
            issues,
            slow_sync: false,
            error: None,
        }
    }

    #[test]
    fn success_needs_clean_members() {
        let report = SyncReport::new(
            vec![
                outcome("a", SessionState::Done, vec![]),
                outcome(
                    "b",
                    SessionState::Done,
                    vec![SessionIssue::DisconnectError {
                        message: "late".into(),
                    }],
                ),
            ],
            vec![],
            Duration::ZERO,
        );
        assert_eq!(report.status, RunStatus::Success);
        assert!(report.failed_members().is_empty());
    }

    #[test]
    fn record_errors_make_partial_success() {
        let report = SyncReport::new(
            vec![outcome(
                "a",
                SessionState::Done,
                vec![SessionIssue::RecordCommitError {
                    uid: "x".into(),
                    error: BackendError::rejected("no"),
                }],
            )],
            vec![],
            Duration::ZERO,
        );
        assert_eq!(report.status, RunStatus::PartialSuccess);
        assert!(report.failed_members().is_empty());
    }

    #[test]
    fn failed_members_are_listed() {
        let report = SyncReport::new(
            vec![
                outcome("a", SessionState::Done, vec![]),
                outcome("b", SessionState::Failed(FailureKind::ConnectError), vec![]),
            ],
            vec![],
            Duration::ZERO,
        );
        assert_eq!(report.status, RunStatus::PartialSuccess);
        assert_eq!(report.failed_members(), vec!["b"]);
        assert!(report.member("a").unwrap().is_done());
    }
}
