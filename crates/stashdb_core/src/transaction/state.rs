//! Transaction state.

use std::fmt;

/// State of a transaction.
///
/// ```text
/// Active -> Begun -> BackedUp -> Committed  -> Closed
///                             \-> RolledBack -> Closed
///                             \-> Unrecoverable -> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Collecting write commands; nothing touched yet.
    Active,
    /// The redo-log entry is written; pre-images are being captured.
    Begun,
    /// Every pre-image is captured; the mutation may be applied.
    BackedUp,
    /// The mutation was applied.
    Committed,
    /// The mutation was undone, or never applied.
    RolledBack,
    /// The commit failed and so did its rollback. Backups and the redo-log
    /// entry stay in place for the recovery procedure.
    Unrecoverable,
    /// Cleanup ran; the handle is finished.
    Closed,
}

impl TransactionState {
    /// Returns true while write commands can still be added.
    #[must_use]
    pub fn accepts_commands(self) -> bool {
        self == Self::Active
    }

    /// Returns true once the handle reached a final outcome.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            Self::Committed | Self::RolledBack | Self::Unrecoverable | Self::Closed
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Begun => "begun",
            Self::BackedUp => "backed up",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
            Self::Unrecoverable => "unrecoverable",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
