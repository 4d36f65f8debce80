//! Error types for mnemo-store
//!
//! This module defines the single error type shared by every crate in the
//! workspace. We use `thiserror` for automatic `Display`/`Error` impls.
//!
//! ### Error categories
//!
//! - **LockTimeout**: a [`crate::error::Error::LockTimeout`] propagates to
//!   the caller with no state change.
//! - **Conflict**: version mismatch detected by the version tracker;
//!   `safe_update` retries a bounded number of times before this escapes.
//! - **StoreCorrupt**: a shard referenced by an index or the WAL is missing
//!   or unparsable. `rebuild_indexes()` is the prescribed recovery.
//! - **MigrationFailed**: the legacy-layout backup is preserved and the
//!   workspace is left unchanged.
//! - **Io** / **Serialization**: underlying filesystem or (de)serialization
//!   failures, carrying path context where available.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all mnemo-store crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying filesystem error, with the path that triggered it.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timed out waiting to acquire a file lock.
    #[error("timed out acquiring lock on {0}")]
    LockTimeout(PathBuf),

    /// Optimistic version check failed after exhausting retries.
    #[error("version conflict on {path} after {attempts} attempts")]
    Conflict {
        /// Path whose version snapshot no longer matched.
        path: PathBuf,
        /// Number of retries attempted before giving up.
        attempts: u32,
    },

    /// A shard referenced by an index or the WAL is missing or unparsable.
    #[error("store corrupt: {0}")]
    StoreCorrupt(String),

    /// Legacy-layout migration failed; backup is preserved, workspace
    /// is unchanged.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Input failed validation (e.g. unknown field on load).
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Wrap an [`io::Error`] with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// True if retrying the operation that produced this error is
    /// meaningful (conflict, lock timeout). Used by callers deciding
    /// whether to loop `safe_update`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. } | Error::LockTimeout(_))
    }
}
