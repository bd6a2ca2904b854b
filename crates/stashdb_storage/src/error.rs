//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An I/O error occurred on a specific file.
    #[error("I/O error on {path}: {source}")]
    File {
        /// The file being touched.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// A value could not be converted to or from its file representation.
    #[error("format error: {0}")]
    Format(String),

    /// The id cannot be used as a file name stem.
    #[error("invalid record id {id:?}: {reason}")]
    InvalidId {
        /// The rejected id.
        id: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A transactional write was attempted before an operation id was assigned.
    #[error("no operation id assigned to the transaction context")]
    NoOperation,

    /// The storage directory is in an unexpected state.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}

impl StorageError {
    /// Wraps an I/O error with the path it happened on.
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Creates a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    /// Returns true if the error means "the file is not there".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io(e) | Self::File { source: e, .. } => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Format(e.to_string())
    }
}
