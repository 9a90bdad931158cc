//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding or comparing payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// No delegate is registered for the format tag.
    #[error("unknown format: {0}")]
    UnknownFormat(String),

    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A format delegate rejected a payload.
    #[error("format {format} failed: {message}")]
    Delegate {
        /// Format tag of the delegate.
        format: String,
        /// Delegate supplied description.
        message: String,
    },
}
