//! Redo log service.
//!
//! Each pending operation is one file `_redo.log/<opId><ext>` holding the
//! serialized write command. The file is written before any record is
//! touched and deleted once the operation has fully finished, so its
//! presence at startup is the only sign of an interrupted transaction.

use crate::command::WriteCommand;
use crate::error::{CoreError, CoreResult};
use stashdb_storage::{fsutil, FileFormat, FormatExt, OpId, PathLocks, STAGING_SUFFIX};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Durable record of operations that have begun and not yet ended.
#[derive(Debug)]
pub struct RedoLog {
    dir: PathBuf,
    format: Arc<dyn FileFormat>,
    locks: Arc<PathLocks>,
    last_op: AtomicU64,
}

impl RedoLog {
    /// Opens the log directory, creating it if needed.
    ///
    /// The operation counter continues after the greatest pending id so a
    /// new operation never reuses the id of one awaiting recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or listed.
    pub fn open(dir: impl Into<PathBuf>, format: Arc<dyn FileFormat>, locks: Arc<PathLocks>) -> CoreResult<Self> {
        let dir = dir.into();
        fsutil::create_dir_all(&dir)?;

        let log = Self {
            dir,
            format,
            locks,
            last_op: AtomicU64::new(0),
        };
        let greatest = log
            .entry_names()?
            .into_iter()
            .filter_map(|(stem, _)| stem.parse::<OpId>().ok())
            .max();
        if let Some(op_id) = greatest {
            log.last_op.store(op_id.as_u64(), Ordering::SeqCst);
        }
        Ok(log)
    }

    /// The log directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry for `op_id`.
    #[must_use]
    pub fn entry_path(&self, op_id: OpId) -> PathBuf {
        self.dir.join(format!("{op_id}{}", self.format.extension()))
    }

    /// Returns true if an entry for `op_id` exists.
    #[must_use]
    pub fn is_pending(&self, op_id: OpId) -> bool {
        fsutil::exists(&self.entry_path(op_id))
    }

    /// Assigns an operation id and durably writes the command under it.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be serialized or written.
    pub fn begin(&self, command: &WriteCommand) -> CoreResult<OpId> {
        let op_id = OpId(self.last_op.fetch_add(1, Ordering::SeqCst).wrapping_add(1));
        let data = self.format.encode(command)?;

        let path = self.entry_path(op_id);
        let staging = fsutil::with_suffix(&path, STAGING_SUFFIX);
        let lock = self.locks.intern(&path);
        let _guard = lock.lock();

        fsutil::save(&staging, &data)?;
        fsutil::rename(&staging, &path)?;
        debug!(op = %op_id, command = %command, "redo log entry written");
        Ok(op_id)
    }

    /// Deletes the entry for `op_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry exists but cannot be deleted.
    pub fn end(&self, op_id: OpId) -> CoreResult<()> {
        let path = self.entry_path(op_id);
        let lock = self.locks.intern(&path);
        let _guard = lock.lock();

        if fsutil::delete(&path)? {
            debug!(op = %op_id, "redo log entry erased");
        } else {
            debug!(op = %op_id, "redo log entry already gone");
        }
        Ok(())
    }

    /// Reads every pending entry, ordered by operation id.
    ///
    /// # Errors
    ///
    /// Every unreadable entry is attempted; the failures are returned
    /// together as one aggregate error.
    pub fn incomplete(&self) -> CoreResult<BTreeMap<OpId, WriteCommand>> {
        let mut pending = BTreeMap::new();
        let mut errors = Vec::new();

        for (stem, name) in self.entry_names()? {
            let parsed = stem
                .parse::<OpId>()
                .map_err(|e| CoreError::invalid_operation(format!("redo log entry {name:?} has no numeric id: {e}")))
                .and_then(|op_id| {
                    let data = fsutil::read(&self.dir.join(&name))?;
                    let command: WriteCommand = self.format.decode(&data)?;
                    Ok((op_id, command))
                });
            match parsed {
                Ok((op_id, command)) => {
                    pending.insert(op_id, command);
                }
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(pending)
        } else {
            Err(CoreError::aggregate("could not read all incomplete operations", errors))
        }
    }

    /// Deletes staging files left by a crash during begin.
    ///
    /// Returns how many were removed.
    pub fn remove_stale_staging(&self) -> CoreResult<usize> {
        let mut removed = 0;
        for name in fsutil::list_files(&self.dir)? {
            if name.ends_with(STAGING_SUFFIX) && fsutil::delete(&self.dir.join(&name))? {
                debug!(file = %name, "removed stale redo log staging file");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Lists `(stem, file name)` of entries, skipping staging files.
    fn entry_names(&self) -> CoreResult<Vec<(String, String)>> {
        let ext = self.format.extension();
        Ok(fsutil::list_files(&self.dir)?
            .into_iter()
            .filter_map(|name| {
                let stem = name.strip_suffix(ext)?.to_string();
                Some((stem, name))
            })
            .collect())
    }
}
