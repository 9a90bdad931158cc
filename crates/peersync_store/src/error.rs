//! Error types for the persisted member state.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the key-value log and the stores built on it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying byte store failed.
    #[error("storage error: {0}")]
    Storage(#[from] peersync_storage::StorageError),

    /// A log entry in the middle of the log failed validation.
    #[error("log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Offset of the damaged entry.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// A log entry could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A log entry exceeds the 4-byte length field.
    #[error("log entry too large: {0} bytes")]
    EntryTooLarge(usize),

    /// A member id cannot be used as a directory name.
    #[error("invalid member id: {0:?}")]
    InvalidMemberId(String),
}

impl StoreError {
    pub(crate) fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }
}
