//! Small file helpers shared by the record backend and the redo log.
//!
//! Every helper attaches the offending path to its error. None of them takes
//! a path lock; callers hold the lock of the live file they are working on.

use crate::error::{StorageError, StorageResult};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Reads a whole UTF-8 file.
pub fn read(path: &Path) -> StorageResult<String> {
    fs::read_to_string(path).map_err(|e| StorageError::file(path, e))
}

/// Returns true if `path` is a regular, readable file.
#[must_use]
pub fn exists(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Writes `data` to `path`, replacing any previous content, and syncs it.
pub fn save(path: &Path, data: &str) -> StorageResult<()> {
    let write = || -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(data.as_bytes())?;
        file.sync_all()
    };
    write().map_err(|e| StorageError::file(path, e))
}

/// Atomically moves `from` over `to`.
///
/// On the platforms we support a same-directory rename replaces the target
/// in one step: a concurrent reader sees either the old or the new file.
pub fn rename(from: &Path, to: &Path) -> StorageResult<()> {
    fs::rename(from, to).map_err(|e| StorageError::file(from, e))
}

/// Copies `from` to `to`, replacing `to` if present.
pub fn copy(from: &Path, to: &Path) -> StorageResult<()> {
    fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| StorageError::file(from, e))
}

/// Deletes a file.
///
/// Returns `Ok(false)` if the file was already gone.
pub fn delete(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::file(path, e)),
    }
}

/// Creates a directory and its parents.
pub fn create_dir_all(path: &Path) -> StorageResult<()> {
    fs::create_dir_all(path).map_err(|e| StorageError::file(path, e))
}

/// Lists the file names (not directories) directly inside `dir`.
///
/// A missing directory lists as empty.
pub fn list_files(dir: &Path) -> StorageResult<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::file(dir, e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::file(dir, e))?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Appends a suffix to the final component of a path: `a/1.json` + `.old`.
#[must_use]
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
