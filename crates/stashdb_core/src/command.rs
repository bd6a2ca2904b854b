//! Write commands.
//!
//! A write command is the serializable description of a mutation. It is
//! persisted to the redo log on begin, and it drives the per-record
//! lifecycle against the collections it touches:
//!
//! ```text
//! begin -> backup -> commit -> clear_backup -> end
//!                      \-> rollback -> clear_backup -> end
//! ```

use crate::error::{collect_all, CoreResult};
use crate::redo_log::RedoLog;
use crate::registry::{CollectionHandle, Registry};
use crate::types::CollectionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stashdb_storage::{OpId, TxContext};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// One mutation, or a composite of many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteCommand {
    /// Create or replace one record.
    Save {
        /// Owning collection.
        collection: CollectionId,
        /// Record id as a file stem.
        id: String,
        /// The record.
        item: Value,
    },
    /// Remove one record.
    Delete {
        /// Owning collection.
        collection: CollectionId,
        /// Record id as a file stem.
        id: String,
    },
    /// Several commands applied as one transaction.
    Composite {
        /// Sub-commands with the collection that applies each.
        commands: Vec<(CollectionId, WriteCommand)>,
    },
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Backup,
    Commit,
    Rollback,
    ClearBackup,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Backup => "back up",
            Self::Commit => "commit",
            Self::Rollback => "roll back",
            Self::ClearBackup => "clear backup of",
        })
    }
}

impl WriteCommand {
    /// Creates an empty composite.
    #[must_use]
    pub fn composite() -> Self {
        Self::Composite {
            commands: Vec::new(),
        }
    }

    /// Short name of the command kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Save { .. } => "save",
            Self::Delete { .. } => "delete",
            Self::Composite { .. } => "composite",
        }
    }

    /// The owning collection of a single command.
    #[must_use]
    pub fn collection(&self) -> Option<&CollectionId> {
        match self {
            Self::Save { collection, .. } | Self::Delete { collection, .. } => Some(collection),
            Self::Composite { .. } => None,
        }
    }

    /// Returns true for a composite without sub-commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Composite { commands } => commands.iter().all(|(_, c)| c.is_empty()),
            Self::Save { .. } | Self::Delete { .. } => false,
        }
    }

    /// Every `(collection, id)` the command touches, in application order.
    #[must_use]
    pub fn touched(&self) -> Vec<(CollectionId, String)> {
        let mut out = Vec::new();
        self.collect_touched(None, &mut out);
        out
    }

    fn collect_touched(&self, owner: Option<&CollectionId>, out: &mut Vec<(CollectionId, String)>) {
        match self {
            Self::Save { collection, id, .. } | Self::Delete { collection, id } => {
                out.push((owner.unwrap_or(collection).clone(), id.clone()));
            }
            Self::Composite { commands } => {
                for (cid, cmd) in commands {
                    cmd.collect_touched(Some(cid), out);
                }
            }
        }
    }

    /// Appends a sub-command to a composite.
    ///
    /// Returns false, leaving the command unchanged, if `self` is not a
    /// composite.
    pub fn push(&mut self, collection: CollectionId, command: WriteCommand) -> bool {
        match self {
            Self::Composite { commands } => {
                commands.push((collection, command));
                true
            }
            Self::Save { .. } | Self::Delete { .. } => false,
        }
    }

    /// Returns true if the command saves `id` in `collection`.
    ///
    /// Lets a delete inside an open transaction accept a record that was
    /// created earlier in the same transaction and is not committed yet.
    #[must_use]
    pub fn is_any_create(&self, collection: &CollectionId, id: &str) -> bool {
        self.is_any_create_in(None, collection, id)
    }

    fn is_any_create_in(&self, owner: Option<&CollectionId>, collection: &CollectionId, id: &str) -> bool {
        match self {
            Self::Save {
                collection: own,
                id: saved,
                ..
            } => owner.unwrap_or(own) == collection && saved == id,
            Self::Delete { .. } => false,
            Self::Composite { commands } => commands
                .iter()
                .any(|(cid, cmd)| cmd.is_any_create_in(Some(cid), collection, id)),
        }
    }

    /// Durably records the command; returns the assigned operation id.
    pub fn begin(&self, log: &RedoLog) -> CoreResult<OpId> {
        log.begin(self)
    }

    /// Captures the pre-image of every touched record.
    ///
    /// A composite attempts every sub-command. If any of them fails, the
    /// pre-images that were captured are released again before the error
    /// is returned, so a failed backup holds no references.
    pub fn backup(&self, registry: &Registry, ctx: &mut TxContext) -> CoreResult<()> {
        let Self::Composite { commands } = self else {
            return self.run(registry, ctx, Step::Backup);
        };

        let mut backed_up = Vec::with_capacity(commands.len());
        let result = collect_all(
            || format!("could not back up records for {self}"),
            commands.iter().enumerate(),
            |(i, (cid, cmd))| {
                let handle = registry.get(cid)?;
                cmd.run_with(&handle, registry, ctx, Step::Backup)?;
                backed_up.push(i);
                Ok(())
            },
        );

        if result.is_err() {
            for i in backed_up {
                let (cid, cmd) = &commands[i];
                let released = registry
                    .get(cid)
                    .and_then(|h| cmd.run_with(&h, registry, ctx, Step::ClearBackup));
                if let Err(e) = released {
                    warn!(collection = %cid, error = %e, "could not release backup after failed begin");
                }
            }
        }
        result
    }

    /// Applies the mutation.
    pub fn commit(&self, registry: &Registry, ctx: &mut TxContext) -> CoreResult<()> {
        self.run(registry, ctx, Step::Commit)
    }

    /// Restores every pre-image.
    pub fn rollback(&self, registry: &Registry, ctx: &mut TxContext) -> CoreResult<()> {
        self.run(registry, ctx, Step::Rollback)
    }

    /// Releases every pre-image.
    pub fn clear_backup(&self, registry: &Registry, ctx: &mut TxContext) -> CoreResult<()> {
        self.run(registry, ctx, Step::ClearBackup)
    }

    /// Drops the in-memory state every touched collection keeps for this
    /// operation. Unknown collections are skipped.
    pub fn abandon(&self, registry: &Registry, ctx: &TxContext) {
        let mut seen = BTreeSet::new();
        for (cid, _) in self.touched() {
            if !seen.insert(cid.clone()) {
                continue;
            }
            if let Ok(handle) = registry.get(&cid) {
                handle.abandon(ctx);
            }
        }
    }

    /// Erases the redo-log entry.
    pub fn end(&self, log: &RedoLog, op_id: OpId) -> CoreResult<()> {
        log.end(op_id)
    }

    fn run(&self, registry: &Registry, ctx: &mut TxContext, step: Step) -> CoreResult<()> {
        match self {
            Self::Composite { commands } => collect_all(
                || format!("could not {step} records for {self}"),
                commands,
                |(cid, cmd)| {
                    let handle = registry.get(cid)?;
                    cmd.run_with(&handle, registry, ctx, step)
                },
            ),
            Self::Save { collection, .. } | Self::Delete { collection, .. } => {
                let handle = registry.get(collection)?;
                self.run_with(&handle, registry, ctx, step)
            }
        }
    }

    fn run_with(
        &self,
        handle: &Arc<dyn CollectionHandle>,
        registry: &Registry,
        ctx: &mut TxContext,
        step: Step,
    ) -> CoreResult<()> {
        match (self, step) {
            (Self::Composite { .. }, _) => self.run(registry, ctx, step),
            (Self::Save { id, .. } | Self::Delete { id, .. }, Step::Backup) => handle.backup(id, ctx),
            (Self::Save { id, item, .. }, Step::Commit) => handle.commit_save(id, item, ctx),
            (Self::Delete { id, .. }, Step::Commit) => handle.commit_delete(id, ctx),
            (Self::Save { id, .. } | Self::Delete { id, .. }, Step::Rollback) => handle.rollback(id, ctx),
            (Self::Save { id, .. } | Self::Delete { id, .. }, Step::ClearBackup) => {
                handle.clear_backup(id, ctx)
            }
        }
    }
}

impl fmt::Display for WriteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Save { collection, id, .. } => write!(f, "save {collection}/{id}"),
            Self::Delete { collection, id } => write!(f, "delete {collection}/{id}"),
            Self::Composite { commands } => write!(f, "composite of {}", commands.len()),
        }
    }
}
