//! Error types for snapsum
//!
//! Three kinds of failure exist. Usage errors (bad command, missing
//! repository, duplicate removal under a weak hash mode) are reported to the
//! user before anything is touched. Corrupted states abort the running
//! command and never truncate history. Per-file I/O problems during a walk or
//! a duplicate removal are not errors at all: they are logged and skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in snapsum
pub type Result<T> = std::result::Result<T, SnapsumError>;

/// Main error type for all snapsum operations
#[derive(Debug, Error)]
pub enum SnapsumError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors raised by the directory walker
    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    /// The command cannot run with the given arguments or repository state
    #[error("{0}")]
    Usage(String),

    /// No repository marker directory at the given root
    #[error("Not a snapsum repository: {0:?}")]
    RepositoryNotFound(PathBuf),

    /// `init` on a directory that already holds a repository
    #[error("Repository already exists at {0:?}")]
    RepositoryAlreadyExists(PathBuf),

    /// A persisted state failed to decompress, parse or verify
    #[error("Corrupted state {path:?}: {reason}")]
    CorruptedState {
        /// Path of the state file
        path: PathBuf,
        /// What went wrong while loading it
        reason: String,
    },

    /// Decompression errors
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Pattern parsing error
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// Unknown hash mode name
    #[error("Invalid hash mode '{0}', expected one of: none, small-block, medium-block, full")]
    InvalidHashMode(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnapsumError {
    /// Create a usage error with a custom message
    pub fn usage(msg: impl Into<String>) -> Self {
        SnapsumError::Usage(msg.into())
    }

    /// Create a decompression error with a custom message
    pub fn decompression(msg: impl Into<String>) -> Self {
        SnapsumError::Decompression(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SnapsumError::Internal(msg.into())
    }

    /// Create a corrupted-state error for the given file
    pub fn corrupted(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SnapsumError::CorruptedState {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this error was caused by how the tool was invoked
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            SnapsumError::Usage(_)
                | SnapsumError::RepositoryNotFound(_)
                | SnapsumError::RepositoryAlreadyExists(_)
                | SnapsumError::InvalidHashMode(_)
                | SnapsumError::InvalidPattern(_)
        )
    }

    /// Check if this error indicates corruption of stored states
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SnapsumError::CorruptedState { .. } | SnapsumError::Decompression(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SnapsumError::RepositoryNotFound(path) => {
                format!(
                    "{:?} is not a snapsum repository. Run 'snapsum init' first.",
                    path
                )
            }
            SnapsumError::RepositoryAlreadyExists(path) => {
                format!("{:?} already holds a snapsum repository.", path)
            }
            SnapsumError::CorruptedState { path, reason } => {
                format!(
                    "State file {:?} is corrupted ({}). History was left untouched; \
                     use 'snapsum rollback' to discard the last state if it is the broken one.",
                    path, reason
                )
            }
            _ => self.to_string(),
        }
    }
}
