//! # peersync store
//!
//! The only state peersync persists between runs, per member:
//!
//! - [`ChangeLedger`] - `uid -> hash` table used to classify each observed
//!   record as added, modified, unmodified or deleted since the last cycle
//! - [`AnchorStore`] - `field -> value` slots holding resource identities;
//!   a changed identity forces a slow-sync
//!
//! Both sit on a [`KvLog`], an append-only checksummed key-value log over a
//! `peersync_storage` backend. Mutations are appended one record at a time
//! and replay is idempotent, so a crash loses at most the mutation that was
//! being written.
//!
//! ## Example
//!
//! ```rust
//! use peersync_protocol::ChangeKind;
//! use peersync_store::ChangeLedger;
//!
//! let mut ledger = ChangeLedger::in_memory("phone");
//! ledger.reset_reports();
//! assert_eq!(ledger.record_seen("uid-1", "h1").unwrap(), ChangeKind::Added);
//! assert!(ledger.deleted_uids().is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod anchor;
mod error;
mod ledger;
mod log;
mod member;

pub use anchor::{Anchor, AnchorStore, ANCHOR_FILE};
pub use error::{StoreError, StoreResult};
pub use ledger::{ChangeLedger, LedgerEntry, LEDGER_FILE};
pub use log::{compute_crc32, CompactionStats, KvLog, LogEntry, ReplayReport, LOG_MAGIC, LOG_VERSION};
pub use member::MemberPaths;
