//! Error types for `warcsync`.

use std::path::PathBuf;

/// Result type for controller operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors returned by the `warcsync` crate.
///
/// Only [`SyncError::Indexer`] is considered transient by the tracker: it is logged and
/// retried on the next poll. Everything else that escapes a poll is treated as fatal.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested path does not exist.
    #[error("missing path: {0}")]
    MissingPath(PathBuf),

    /// Invalid configuration (missing or nonsensical field).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be parsed.
    #[error("config parse error in {path}: {source}")]
    Config {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// The indexing routine failed or produced no output.
    #[error("indexer failed: {0}")]
    Indexer(String),

    /// A supervised child process could not be started or signalled.
    #[error("process {name}: {reason}")]
    Process {
        /// Short name of the child (first word of its command line).
        name: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Operation not supported by this backend.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// Lock acquisition failed (poisoned in-memory state).
    #[error("lock failed on {resource}: {reason}")]
    LockFailed {
        /// What we were trying to lock.
        resource: String,
        /// Human-readable reason.
        reason: String,
    },
}

impl SyncError {
    /// Whether this error means "the path is gone" (the file was moved or deleted).
    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::MissingPath(_) => true,
            SyncError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
