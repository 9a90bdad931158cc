//! CLI command implementations.

pub mod compact;
pub mod dump_anchors;
pub mod dump_hash;
pub mod reset;
pub mod verify;

use clap::ValueEnum;
use peersync_store::{MemberPaths, StoreError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How listings are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per entry.
    Text,
    /// A JSON array.
    Json,
}

/// Errors of the maintenance commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The member has no state directory under the root.
    #[error("no state for member {member:?} under {}", root.display())]
    UnknownMember {
        /// Member id.
        member: String,
        /// State root.
        root: PathBuf,
    },

    /// A log could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A raw log file could not be read.
    #[error(transparent)]
    Storage(#[from] peersync_storage::StorageError),

    /// Output could not be encoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// At least one log is damaged.
    #[error("verification failed")]
    VerifyFailed,
}

/// Resolves the state of an existing member.
pub(crate) fn existing_member(root: &Path, member: &str) -> Result<MemberPaths, CliError> {
    let paths = MemberPaths::new(root, member)?;
    if !paths.dir().is_dir() {
        return Err(CliError::UnknownMember {
            member: member.to_owned(),
            root: root.to_path_buf(),
        });
    }
    Ok(paths)
}
