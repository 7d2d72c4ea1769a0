//! Error types for the FileSnap library
//!
//! This module defines all error types that can occur while capturing,
//! persisting, comparing or restoring snapshots. Capture, compare, save and
//! load fail fast with one of these; restore only surfaces content failures
//! here, metadata failures are reported as warnings on the restore result.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Type alias for Results in the FileSnap library
pub type Result<T> = std::result::Result<T, SnapError>;

/// Main error type for all FileSnap operations
#[derive(Debug, Error)]
pub enum SnapError {
    /// Source directory or persisted snapshot file does not exist
    #[error("Not found: {0:?}")]
    NotFound(PathBuf),

    /// A required argument was absent or empty
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The snapshot is not in a state that permits the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Persisted data could not be turned back into a snapshot
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    /// I/O failure on a specific path
    #[error("IO error on {path:?}: {source}")]
    Io {
        /// Path the operation was working on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Decompression errors
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Recomputed content hash disagrees with the recorded one
    #[error("Hash mismatch for {path:?} - expected: {expected}, actual: {actual}")]
    HashMismatch {
        /// Entry path relative to the snapshot base
        path: PathBuf,
        /// Recorded hash
        expected: String,
        /// Recomputed hash
        actual: String,
    },

    /// Ignore pattern could not be compiled
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),

    /// Worker pool could not be built
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Operation stopped through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnapError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        SnapError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create an invalid argument error with a custom message
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        SnapError::InvalidArgument(msg.into())
    }

    /// Create an invalid state error with a custom message
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        SnapError::InvalidState(msg.into())
    }

    /// Create a corrupt data error with a custom message
    pub fn corrupt(msg: impl Into<String>) -> Self {
        SnapError::CorruptData(msg.into())
    }

    /// Create a compression error with a custom message
    pub fn compression(msg: impl Into<String>) -> Self {
        SnapError::Compression(msg.into())
    }

    /// Create a decompression error with a custom message
    pub fn decompression(msg: impl Into<String>) -> Self {
        SnapError::Decompression(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SnapError::Internal(msg.into())
    }

    /// Check if retrying the same call could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            SnapError::Cancelled => true,
            SnapError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Check if this error indicates damaged persisted data
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SnapError::CorruptData(_)
                | SnapError::HashMismatch { .. }
                | SnapError::Decompression(_)
                | SnapError::Json(_)
        )
    }
}
