//! CLI command implementations.

pub mod document;
pub mod inspect;
pub mod pending;
pub mod recover;
pub mod verify;

use crate::error::{CliError, CliResult};
use stashdb_core::{CollectionId, RedoLog, REDO_LOG_DIR};
use stashdb_storage::{fsutil, JsonFormat, PathLocks, BACKUP_SUFFIX, STAGING_SUFFIX};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Files of one collection directory, split by role.
#[derive(Debug, Default)]
pub struct CollectionFiles {
    /// Collection name.
    pub name: String,
    /// Live record files.
    pub live: Vec<String>,
    /// `.old` backup files.
    pub backups: Vec<String>,
    /// `.new` staging files.
    pub staging: Vec<String>,
}

/// Fails unless `root` holds a redo-log directory.
pub fn require_database(root: &Path) -> CliResult<PathBuf> {
    let redo = root.join(REDO_LOG_DIR);
    if !redo.is_dir() {
        return Err(CliError::NotADatabase(root.to_path_buf()));
    }
    Ok(redo)
}

/// Opens the redo log of the storage directory at `root`.
pub fn open_redo_log(root: &Path) -> CliResult<RedoLog> {
    let dir = require_database(root)?;
    Ok(RedoLog::open(dir, Arc::new(JsonFormat::compact()), PathLocks::global())?)
}

/// Every collection directory under `root`, sorted by name.
pub fn scan(root: &Path) -> CliResult<Vec<CollectionFiles>> {
    let mut collections = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if CollectionId::new(name.as_str()).is_err() {
            continue;
        }

        let mut files = CollectionFiles {
            name,
            ..CollectionFiles::default()
        };
        for file in fsutil::list_files(&entry.path())? {
            if file.ends_with(BACKUP_SUFFIX) {
                files.backups.push(file);
            } else if file.ends_with(STAGING_SUFFIX) {
                files.staging.push(file);
            } else {
                files.live.push(file);
            }
        }
        collections.push(files);
    }
    collections.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(collections)
}
