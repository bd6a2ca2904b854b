//! Path-level lock registry.
//!
//! Every file operation on a record (and on a redo-log entry) serializes on
//! one shared lock object per canonical path. Two operations on the same
//! file never interleave; operations on different files never contend.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

static GLOBAL: Lazy<Arc<PathLocks>> = Lazy::new(|| Arc::new(PathLocks::new()));

/// Interns canonical file paths to shared locks.
///
/// Entries are never evicted: the registry holds one small lock per file
/// ever touched by the process, which matches the "one file per record"
/// layout of an embedded store.
///
/// # Example
///
/// ```rust
/// use stashdb_storage::PathLocks;
/// use std::path::Path;
///
/// let locks = PathLocks::new();
/// let a = locks.intern(Path::new("data/users/1.json"));
/// let b = locks.intern(Path::new("data/users/../users/1.json"));
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// ```
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    ///
    /// All databases opened by one process share it, so two handles on the
    /// same storage path still serialize per file.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Returns the lock shared by every caller naming the same file.
    pub fn intern(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = canonical(path);
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(key).or_default())
    }

    /// Number of distinct paths seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns true if no path was interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

/// Canonicalizes a path that may not exist yet.
///
/// The parent directory is resolved through the file system when it exists;
/// otherwise the path is made absolute and `.`/`..` components are folded
/// lexically.
fn canonical(path: &Path) -> PathBuf {
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(dir) = std::fs::canonicalize(parent) {
            return dir.join(name);
        }
    }

    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut folded = PathBuf::new();
    for component in absolute.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                folded.pop();
            }
            other => folded.push(other),
        }
    }
    folded
}
