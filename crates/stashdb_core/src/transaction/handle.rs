//! Transaction handle.

use crate::command::WriteCommand;
use crate::error::{CoreError, CoreResult};
use crate::transaction::manager::Engine;
use crate::transaction::state::TransactionState;
use crate::types::CollectionId;
use stashdb_storage::{OpId, TxContext};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A transaction over one write command.
///
/// Explicit transactions start empty; collection calls ending in `_in_tx`
/// append their commands instead of executing them. [`commit`] then drives
/// the whole composite through begin, backup and commit, rolling back
/// automatically if the commit fails. [`close`] performs the cleanup (redo
/// entry erased, backups released) exactly once, whatever the outcome.
///
/// Changes are not visible to readers, this transaction included, until
/// the transaction is closed.
///
/// Dropping a transaction without closing it closes it and logs a warning.
///
/// # Example
///
/// ```rust,ignore
/// let mut tx = db.begin();
/// users.save_in_tx(&mut tx, &mut alice)?;
/// users.delete_by_id_in_tx(&mut tx, &bob_id)?;
/// tx.commit()?;
/// tx.close();
/// ```
///
/// [`commit`]: Transaction::commit
/// [`close`]: Transaction::close
pub struct Transaction {
    engine: Arc<Engine>,
    command: WriteCommand,
    ctx: TxContext,
    state: TransactionState,
    /// Every pre-image is captured; rollback and cleanup have work to do.
    backed_up: bool,
    cleaned: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("op_id", &self.ctx.op_id())
            .field("state", &self.state)
            .field("command", &self.command.to_string())
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(engine: Arc<Engine>, command: WriteCommand) -> Self {
        engine.active.fetch_add(1, Ordering::SeqCst);
        Self {
            engine,
            command,
            ctx: TxContext::new(),
            state: TransactionState::Active,
            backed_up: false,
            cleaned: false,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The redo-log operation id, once begin ran.
    #[must_use]
    pub fn op_id(&self) -> Option<OpId> {
        self.ctx.op_id()
    }

    /// The collected write command.
    #[must_use]
    pub fn command(&self) -> &WriteCommand {
        &self.command
    }

    /// Returns true if the transaction saves `id` in `collection`.
    #[must_use]
    pub fn is_any_create(&self, collection: &CollectionId, id: &str) -> bool {
        self.command.is_any_create(collection, id)
    }

    /// Appends a write command.
    pub(crate) fn push(&mut self, collection: CollectionId, command: WriteCommand) -> CoreResult<()> {
        if !self.state.accepts_commands() {
            return Err(CoreError::invalid_operation(format!(
                "cannot add {command} to a transaction that is {}",
                self.state
            )));
        }
        if !self.command.push(collection, command) {
            return Err(CoreError::invalid_operation(
                "autocommit transactions hold exactly one command",
            ));
        }
        Ok(())
    }

    /// Reuses the id of a redo-logged operation whose backups already exist.
    ///
    /// Used to replay an interrupted operation: the following [`commit`]
    /// skips begin and backup.
    ///
    /// [`commit`]: Transaction::commit
    pub fn skip_begin(&mut self, op_id: OpId) -> CoreResult<()> {
        if self.state != TransactionState::Active {
            return Err(CoreError::invalid_operation(format!(
                "cannot replay into a transaction that is {}",
                self.state
            )));
        }
        self.ctx.set_op_id(op_id);
        self.backed_up = true;
        self.state = TransactionState::BackedUp;
        Ok(())
    }

    /// Applies the collected commands, rolling back on failure.
    ///
    /// # Errors
    ///
    /// - [`CoreError::TransactionBegin`] if the redo-log entry or a backup
    ///   could not be written; nothing was changed
    /// - the commit failure itself if the automatic rollback succeeded
    /// - [`CoreError::RollbackFailed`] if the rollback failed as well
    pub fn commit(&mut self) -> CoreResult<()> {
        match self.state {
            TransactionState::Active | TransactionState::BackedUp => {}
            other => {
                return Err(CoreError::invalid_operation(format!(
                    "cannot commit a transaction that is {other}"
                )))
            }
        }

        if !self.backed_up && self.command.is_empty() {
            self.state = TransactionState::Committed;
            return Ok(());
        }

        self.begin()?;

        match self.command.commit(&self.engine.registry, &mut self.ctx) {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!(ctx = %self.ctx, command = %self.command, "committed");
                Ok(())
            }
            Err(e) => {
                warn!(ctx = %self.ctx, command = %self.command, error = %e, "commit failed, rolling back");
                self.rollback_after(Some(e))
            }
        }
    }

    /// Undoes the transaction.
    ///
    /// Before [`commit`] this only discards the collected commands. After
    /// a commit and before [`close`], the captured pre-images are restored.
    ///
    /// [`commit`]: Transaction::commit
    /// [`close`]: Transaction::close
    pub fn rollback(&mut self) -> CoreResult<()> {
        match self.state {
            TransactionState::Active => {
                self.state = TransactionState::RolledBack;
                Ok(())
            }
            TransactionState::RolledBack => Ok(()),
            TransactionState::BackedUp | TransactionState::Committed => self.rollback_after(None),
            other => Err(CoreError::invalid_operation(format!(
                "cannot roll back a transaction that is {other}"
            ))),
        }
    }

    /// Finishes the transaction, running cleanup if it is still due.
    pub fn close(mut self) {
        self.finish();
    }

    fn begin(&mut self) -> CoreResult<()> {
        if self.backed_up {
            return Ok(());
        }

        let log = &self.engine.redo_log;
        let op_id = self.command.begin(log).map_err(CoreError::transaction_begin)?;
        self.ctx.set_op_id(op_id);
        self.state = TransactionState::Begun;

        if let Err(e) = self.command.backup(&self.engine.registry, &mut self.ctx) {
            // nothing was mutated; the operation never happened
            if let Err(end_err) = self.command.end(log, op_id) {
                warn!(op = %op_id, error = %end_err, "could not erase redo log entry after failed backup");
            }
            self.state = TransactionState::RolledBack;
            self.cleaned = true;
            return Err(CoreError::transaction_begin(e));
        }

        self.backed_up = true;
        self.state = TransactionState::BackedUp;
        debug!(op = %op_id, command = %self.command, "begun");
        Ok(())
    }

    fn rollback_after(&mut self, failure: Option<CoreError>) -> CoreResult<()> {
        if !self.backed_up {
            self.state = TransactionState::RolledBack;
            return failure.map_or(Ok(()), Err);
        }

        match self.command.rollback(&self.engine.registry, &mut self.ctx) {
            Ok(()) => {
                self.state = TransactionState::RolledBack;
                debug!(ctx = %self.ctx, "rolled back");
                self.cleanup();
                failure.map_or(Ok(()), Err)
            }
            Err(rollback) => {
                self.state = TransactionState::Unrecoverable;
                error!(
                    ctx = %self.ctx,
                    command = %self.command,
                    error = %rollback,
                    "rollback failed, records left for recovery"
                );
                match failure {
                    Some(source) => Err(CoreError::rollback_failed(source, rollback)),
                    None => Err(rollback),
                }
            }
        }
    }

    /// Erases the redo entry, then releases the backups. Runs at most once.
    fn cleanup(&mut self) {
        if self.cleaned || !self.backed_up || self.state == TransactionState::Unrecoverable {
            return;
        }
        self.cleaned = true;

        let Some(op_id) = self.ctx.op_id() else {
            return;
        };
        if let Err(e) = self.command.end(&self.engine.redo_log, op_id) {
            warn!(op = %op_id, error = %e, "could not erase redo log entry, backups kept for recovery");
            return;
        }
        if let Err(e) = self.command.clear_backup(&self.engine.registry, &mut self.ctx) {
            warn!(op = %op_id, error = %e, "could not clear backups");
        }
        debug!(op = %op_id, "cleaned up");
    }

    fn finish(&mut self) {
        if self.state == TransactionState::Closed {
            return;
        }
        if self.state == TransactionState::Unrecoverable {
            error!(ctx = %self.ctx, command = %self.command, "closing unrecoverable transaction, run recovery");
            self.command.abandon(&self.engine.registry, &self.ctx);
        }
        self.cleanup();
        self.state = TransactionState::Closed;
        self.engine.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TransactionState::Closed {
            warn!(ctx = %self.ctx, command = %self.command, "transaction dropped without close");
            self.finish();
        }
    }
}
