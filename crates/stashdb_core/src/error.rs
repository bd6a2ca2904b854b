//! Error types for stashdb core.

use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Maximum number of causes kept by an [`CoreError::Aggregate`].
pub const MAX_AGGREGATED: usize = 20;

/// Errors that can occur in stashdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] stashdb_storage::StorageError),

    /// A record or write command could not be converted to or from JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller passed input that can never succeed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the input.
        message: String,
    },

    /// No collection is registered under the name.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// A collection with the same name is already registered.
    #[error("collection already registered: {name}")]
    DuplicateCollection {
        /// Name of the collection.
        name: String,
    },

    /// A listener rejected the record before any I/O.
    #[error("validation failed: {message}")]
    Validation {
        /// Reason given by the listener.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The redo-log entry could not be written or the pre-images could not
    /// be captured. Nothing was changed.
    #[error("could not start transaction: {source}")]
    TransactionBegin {
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// A commit failed and the automatic rollback failed as well.
    ///
    /// The backups and the redo-log entry are left in place; only the
    /// recovery procedure can repair the affected records.
    #[error("commit failed ({source}) and rollback failed ({rollback})")]
    RollbackFailed {
        /// The commit failure.
        #[source]
        source: Box<CoreError>,
        /// The rollback failure.
        rollback: Box<CoreError>,
    },

    /// Several independent items failed.
    #[error("{message}: {}", AggregateCauses(.errors, .dropped))]
    Aggregate {
        /// What was being done.
        message: String,
        /// The first failures, at most [`MAX_AGGREGATED`].
        errors: Vec<CoreError>,
        /// Failures beyond the retained ones.
        dropped: usize,
    },
}

struct AggregateCauses<'a>(&'a [CoreError], &'a usize);

impl fmt::Display for AggregateCauses<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "[{}] {e}", i + 1)?;
        }
        if *self.1 > 0 {
            write!(f, "; and {} more", self.1)?;
        }
        Ok(())
    }
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates a duplicate collection error.
    pub fn duplicate_collection(name: impl Into<String>) -> Self {
        Self::DuplicateCollection { name: name.into() }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps a failure of the begin phase.
    pub fn transaction_begin(source: CoreError) -> Self {
        Self::TransactionBegin {
            source: Box::new(source),
        }
    }

    /// Combines a commit failure with the failure of its rollback.
    pub fn rollback_failed(source: CoreError, rollback: CoreError) -> Self {
        Self::RollbackFailed {
            source: Box::new(source),
            rollback: Box::new(rollback),
        }
    }

    /// Builds an aggregate from collected failures, keeping the first
    /// [`MAX_AGGREGATED`].
    pub fn aggregate(message: impl Into<String>, mut errors: Vec<CoreError>) -> Self {
        let dropped = errors.len().saturating_sub(MAX_AGGREGATED);
        errors.truncate(MAX_AGGREGATED);
        Self::Aggregate {
            message: message.into(),
            errors,
            dropped,
        }
    }

    /// Returns true for caller-fault errors raised before any I/O.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::CollectionNotFound { .. }
                | Self::DuplicateCollection { .. }
                | Self::Validation { .. }
        )
    }

    /// Returns true if the error left records that only recovery can repair.
    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            Self::RollbackFailed { .. } => true,
            Self::Aggregate { errors, .. } => errors.iter().any(Self::is_unrecoverable),
            _ => false,
        }
    }
}

/// Runs `action` on every item, even after failures.
///
/// Returns one [`CoreError::Aggregate`] holding every failure, or `Ok` if
/// all items succeeded.
pub fn collect_all<I, F>(message: impl FnOnce() -> String, items: I, mut action: F) -> CoreResult<()>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> CoreResult<()>,
{
    let errors: Vec<CoreError> = items
        .into_iter()
        .filter_map(|item| action(item).err())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoreError::aggregate(message(), errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_all_attempts_every_item() {
        let mut seen = Vec::new();
        let result = collect_all(
            || "batch".into(),
            1..=5,
            |i| {
                seen.push(i);
                if i % 2 == 0 {
                    Err(CoreError::invalid_argument(format!("item {i}")))
                } else {
                    Ok(())
                }
            },
        );

        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        match result.unwrap_err() {
            CoreError::Aggregate {
                message,
                errors,
                dropped,
            } => {
                assert_eq!(message, "batch");
                assert_eq!(errors.len(), 2);
                assert_eq!(dropped, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn collect_all_ok_when_nothing_fails() {
        assert!(collect_all(|| unreachable!(), [1, 2], |_| Ok(())).is_ok());
    }

    #[test]
    fn aggregate_is_capped() {
        let errors = (0..25)
            .map(|i| CoreError::invalid_argument(i.to_string()))
            .collect();
        let err = CoreError::aggregate("many", errors);

        match &err {
            CoreError::Aggregate {
                errors, dropped, ..
            } => {
                assert_eq!(errors.len(), MAX_AGGREGATED);
                assert_eq!(*dropped, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().ends_with("and 5 more"));
    }

    #[test]
    fn unrecoverable_is_found_inside_aggregates() {
        let failed = CoreError::rollback_failed(
            CoreError::invalid_operation("commit"),
            CoreError::invalid_operation("rollback"),
        );
        assert!(failed.is_unrecoverable());

        let wrapped = CoreError::aggregate("recovery", vec![failed]);
        assert!(wrapped.is_unrecoverable());
        assert!(!CoreError::invalid_argument("x").is_unrecoverable());
    }

    #[test]
    fn input_errors() {
        assert!(CoreError::validation("bad").is_input_error());
        assert!(CoreError::collection_not_found("c").is_input_error());
        assert!(!CoreError::invalid_operation("x").is_input_error());
    }
}
