//! Error types for the sync engine.

use peersync_protocol::ProtocolError;
use peersync_store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type of backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that stop the engine itself, as opposed to one member.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Persisted member state could not be read or written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A payload could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A member id is registered twice.
    #[error("member {0} is already registered")]
    DuplicateMember(String),

    /// The coordinator has no member to sync.
    #[error("no members registered")]
    NoMembers,

    /// A finished session task did not hand its member back.
    #[error("session task for member {member} failed: {message}")]
    SessionTask {
        /// Member of the lost task.
        member: String,
        /// Description.
        message: String,
    },

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

/// Category of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendErrorKind {
    /// The connection to the resource is gone.
    Connection,
    /// The backend gave up waiting on its own.
    Timeout,
    /// The addressed record does not exist.
    NotFound,
    /// The backend refused the record.
    Rejected,
    /// Local I/O failed.
    Io,
    /// Anything else.
    Other,
}

/// An error reported by a backend.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct BackendError {
    /// Failure category.
    pub kind: BackendErrorKind,
    /// Backend supplied description.
    pub message: String,
}

impl BackendError {
    /// Creates an error.
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Connection, message)
    }

    /// Creates a rejection.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Rejected, message)
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotFound, message)
    }

    /// Returns true if the error leaves the connection unusable, so the
    /// rest of a commit batch must be abandoned.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind == BackendErrorKind::Connection
    }
}

/// Why a member session ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Connecting failed or timed out.
    ConnectError,
    /// The change scan timed out.
    ScanTimeout,
    /// The backend failed during the change scan.
    ScanError,
    /// A fatal backend error aborted the commit batch.
    CommitError,
    /// The commit batch or one of its records timed out.
    CommitTimeout,
    /// The backend failed to finalize.
    FinalizeError,
    /// Finalizing timed out.
    FinalizeTimeout,
    /// The member's ledger could not be persisted.
    LedgerPersistError,
    /// The run was cancelled.
    Cancelled,
    /// The session task panicked. The member is kept for the next run.
    Panicked,
    /// The session broke one of the engine's own rules.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A problem that did not fail the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionIssue {
    /// One record of the commit batch could not be written.
    RecordCommitError {
        /// Uid of the record in the member.
        uid: String,
        /// Backend error.
        error: BackendError,
    },
    /// Disconnecting failed or timed out.
    DisconnectError {
        /// Description.
        message: String,
    },
    /// Anchors could not be persisted; the next run slow-syncs.
    AnchorPersistError {
        /// Description.
        message: String,
    },
    /// A change that another member never received could not be re-armed,
    /// so it is not offered again.
    RearmError {
        /// Uid of the record in this member.
        uid: String,
        /// Description.
        message: String,
    },
}

impl SessionIssue {
    /// Returns true for record-level commit errors.
    #[must_use]
    pub fn is_record_error(&self) -> bool {
        matches!(self, Self::RecordCommitError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_errors_are_fatal() {
        assert!(BackendError::connection("gone").is_fatal());
        assert!(!BackendError::rejected("bad record").is_fatal());
        assert!(!BackendError::new(BackendErrorKind::Timeout, "slow").is_fatal());
    }

    #[test]
    fn error_display() {
        let err = BackendError::not_found("uid-1");
        assert_eq!(err.to_string(), "NotFound: uid-1");

        let err = SyncError::DuplicateMember("phone".into());
        assert!(err.to_string().contains("phone"));
        assert_eq!(FailureKind::ScanTimeout.to_string(), "ScanTimeout");
    }
}
