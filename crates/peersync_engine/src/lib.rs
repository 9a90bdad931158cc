//! # peersync engine
//!
//! Session state machine and coordinator for multi-peer sync.
//!
//! This crate provides:
//! - The [`Backend`] contract every member's data source implements
//! - A member session state machine (connect → scan → commit → finalize → disconnect)
//!   with per-call deadlines and cancellation
//! - [`SyncCoordinator`] driving all members of a group concurrently
//! - Entity mapping across members and a pluggable conflict resolver
//! - A status feed of member, record and run events
//!
//! ## Architecture
//!
//! One run goes through three steps:
//! 1. Every member session connects and scans its backend against its
//!    ledger, then reports its changes
//! 2. The coordinator correlates the changes by entity, classifies the
//!    entities reported by several members, and plans one commit batch per
//!    member
//! 3. Every session commits its batch, finalizes, then disconnects
//!
//! ## Key Invariants
//!
//! - A member's ledger and anchors are owned by exactly one session per run
//! - A failed member never blocks or fails another member, even when its
//!   session panics
//! - A deletion waits for every member that holds the record
//! - Anchors move only after a run without record errors
//! - A failed session still attempts to disconnect

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cancel;
mod config;
mod coordinator;
mod error;
mod mapping;
mod member;
mod planner;
mod report;
mod resolver;
mod session;
mod status;

pub use backend::{Backend, CommitAck, MemoryBackend, ScannedRecord};
pub use cancel::{CancelHandle, CancelToken};
pub use config::{CoordinatorConfig, PhaseTimeouts, SessionConfig};
pub use coordinator::{CoordinatorStats, SyncCoordinator};
pub use error::{
    BackendError, BackendErrorKind, BackendResult, FailureKind, SessionIssue, SyncError, SyncResult,
};
pub use mapping::{EntityId, MappingTable, MemoryMappingTable};
pub use member::Member;
pub use report::{ConflictSummary, MemberOutcome, RunStatus, SyncReport};
pub use resolver::{Conflict, ConflictResolver, IgnoreConflicts, Resolution};
pub use session::SessionState;
pub use status::{ChangeEvent, EngineEvent, EnginePhase, MemberEvent, StatusFeed, SyncEvent};
