//! # peersync storage
//!
//! Byte-store backends underneath the persisted member state of peersync.
//!
//! A backend knows nothing about ledgers or anchors. It stores bytes,
//! appends bytes, and can atomically swap its whole content for a new
//! image (used by log compaction). The log format lives one layer up in
//! `peersync_store`.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral state, used by tests
//! - [`FileBackend`] - one file per log, durable across restarts
//!
//! ## Example
//!
//! ```rust
//! use peersync_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"uid-1").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"uid-1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
