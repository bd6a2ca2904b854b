//! CLI error type.

use stashdb_core::CoreError;
use stashdb_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The directory holds no redo log, so it is not a storage directory.
    #[error("no database found at {}", .0.display())]
    NotADatabase(PathBuf),

    /// Verification found problems.
    #[error("verification failed with {0} problem(s)")]
    VerificationFailed(usize),

    /// Output could not be encoded.
    #[error("could not encode output: {0}")]
    Output(#[from] serde_json::Error),

    /// Engine error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// I/O error while scanning the directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
