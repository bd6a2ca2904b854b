//! Crash recovery.
//!
//! Every redo-log entry left behind marks an operation that began and
//! never finished. Its backups were taken before the interruption, so the
//! operation is replayed from the backed-up state: the commit is applied
//! again (rolling back to the pre-image if that fails) and the cleanup
//! erases the entry and the backups.

use crate::command::WriteCommand;
use crate::error::{collect_all, CoreError, CoreResult};
use crate::transaction::TransactionManager;
use tracing::{debug, info, warn};

/// Outcome of a recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Operations replayed to completion.
    pub replayed: usize,
    /// How many of them were composite transactions.
    pub composite: usize,
    /// Redo-log staging files removed.
    pub staging_removed: usize,
}

impl RecoveryReport {
    /// Returns true if nothing needed repair.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.replayed == 0 && self.staging_removed == 0
    }
}

/// Replays every pending operation in ascending operation-id order.
pub(crate) fn recover(manager: &TransactionManager) -> CoreResult<RecoveryReport> {
    if manager.registry().is_empty() {
        return Err(CoreError::invalid_operation(
            "register the collections before running recovery",
        ));
    }

    let mut report = RecoveryReport {
        staging_removed: manager.redo_log().remove_stale_staging()?,
        ..RecoveryReport::default()
    };

    let pending = manager.redo_log().incomplete()?;
    if pending.is_empty() {
        debug!("no interrupted operations");
        return Ok(report);
    }
    info!(count = pending.len(), "replaying interrupted operations");

    collect_all(
        || "could not recover database".to_string(),
        pending,
        |(op_id, command)| {
            let composite = matches!(command, WriteCommand::Composite { .. });
            let description = command.to_string();
            manager
                .replay(op_id, command)
                .inspect_err(|e| warn!(op = %op_id, command = %description, error = %e, "replay failed"))?;
            debug!(op = %op_id, command = %description, "replayed");
            report.replayed += 1;
            if composite {
                report.composite += 1;
            }
            Ok(())
        },
    )?;

    info!(replayed = report.replayed, "recovery finished");
    Ok(report)
}
