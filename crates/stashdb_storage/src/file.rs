//! File-per-record storage backend.

use crate::backend::{Lookup, RecordStore};
use crate::context::TxContext;
use crate::error::{StorageError, StorageResult};
use crate::format::{FileFormat, FormatExt};
use crate::fsutil;
use crate::inflight::{Acquired, InFlight, Released};
use crate::lock::PathLocks;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Suffix of the pre-image kept while a transaction holds a record.
pub const BACKUP_SUFFIX: &str = ".old";

/// Suffix of the transient staging file used for atomic writes.
pub const STAGING_SUFFIX: &str = ".new";

/// Checks that an id can be used as a file stem.
///
/// # Errors
///
/// Returns [`StorageError::InvalidId`] for empty ids and ids containing a
/// dot or a path separator.
pub fn check_stem(id: &str) -> StorageResult<()> {
    let reason = if id.is_empty() {
        "id is empty"
    } else if id.contains('.') {
        "id contains '.'"
    } else if id.contains('/') || id.contains('\\') {
        "id contains a path separator"
    } else {
        return Ok(());
    };
    Err(StorageError::InvalidId {
        id: id.to_string(),
        reason,
    })
}

/// Stores each record of a collection as `<dir>/<id><ext>`.
///
/// Writes go to `<id><ext>.new` and are renamed over the live file, so a
/// reader sees either the previous or the next content. While at least one
/// transaction holds an id, `<id><ext>.old` holds the record's pre-image
/// and reads are answered from it.
///
/// # Thread Safety
///
/// Every id-scoped operation holds the id's lock from the shared
/// [`PathLocks`] registry for the duration of that single operation.
/// Operations on different ids never contend.
///
/// # Example
///
/// ```no_run
/// use stashdb_storage::{FileBackend, JsonFormat, PathLocks, RecordStore, TxContext, OpId};
/// use std::sync::Arc;
///
/// let store: FileBackend<serde_json::Value> = FileBackend::open(
///     "data/users",
///     Arc::new(JsonFormat::compact()),
///     PathLocks::global(),
/// ).unwrap();
///
/// let ctx = TxContext::with_op_id(OpId(1));
/// store.backup("1", &ctx).unwrap();
/// store.save("1", r#"{"name":"a"}"#, &ctx).unwrap();
/// store.clear_backup("1", &ctx).unwrap();
/// ```
pub struct FileBackend<T> {
    dir: PathBuf,
    format: Arc<dyn FileFormat>,
    locks: Arc<PathLocks>,
    in_flight: InFlight,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for FileBackend<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("dir", &self.dir)
            .field("format", &self.format)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl<T> FileBackend<T> {
    /// Opens the collection directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(
        dir: impl Into<PathBuf>,
        format: Arc<dyn FileFormat>,
        locks: Arc<PathLocks>,
    ) -> StorageResult<Self> {
        let dir = dir.into();
        fsutil::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            format,
            locks,
            in_flight: InFlight::new(),
            _marker: PhantomData,
        })
    }

    /// The collection directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The in-flight reference table.
    #[must_use]
    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Path of the live record file.
    pub fn live_path(&self, id: &str) -> StorageResult<PathBuf> {
        check_stem(id)?;
        Ok(self.dir.join(format!("{id}{}", self.format.extension())))
    }

    fn paths(&self, id: &str) -> StorageResult<Paths> {
        let live = self.live_path(id)?;
        Ok(Paths {
            old: fsutil::with_suffix(&live, BACKUP_SUFFIX),
            new: fsutil::with_suffix(&live, STAGING_SUFFIX),
            live,
        })
    }

    /// Writes `from`'s content through the staging file over `to`.
    fn copy_atomic(from: &Path, staging: &Path, to: &Path) -> StorageResult<()> {
        fsutil::copy(from, staging)?;
        fsutil::rename(staging, to)
    }
}

struct Paths {
    live: PathBuf,
    old: PathBuf,
    new: PathBuf,
}

impl<T> RecordStore<T> for FileBackend<T>
where
    T: DeserializeOwned,
{
    fn find_all_ids(&self) -> StorageResult<Vec<String>> {
        let names = fsutil::list_files(&self.dir)?;
        let stems: BTreeSet<&str> = names
            .iter()
            .filter_map(|name| name.split('.').next())
            .filter(|stem| !stem.is_empty())
            .collect();

        let mut ids = Vec::with_capacity(stems.len());
        for stem in stems {
            let Ok(paths) = self.paths(stem) else {
                continue;
            };
            let committed = if self.in_flight.is_held(stem) {
                // mid-create and mid-delete ids have no pre-image
                fsutil::exists(&paths.old)
            } else {
                fsutil::exists(&paths.live)
            };
            if committed {
                ids.push(stem.to_string());
            }
        }
        Ok(ids)
    }

    fn exists(&self, id: &str) -> bool {
        let Ok(paths) = self.paths(id) else {
            return false;
        };
        if !self.in_flight.is_held(id) {
            return fsutil::exists(&paths.live);
        }
        let lock = self.locks.intern(&paths.live);
        let _guard = lock.lock();
        fsutil::exists(&paths.old)
    }

    fn read(&self, id: &str) -> StorageResult<Lookup<T>> {
        let paths = self.paths(id)?;
        let data = {
            let lock = self.locks.intern(&paths.live);
            let _guard = lock.lock();
            let source = if self.in_flight.is_held(id) {
                &paths.old
            } else {
                &paths.live
            };
            match fsutil::read(source) {
                Ok(data) => data,
                Err(e) if e.is_not_found() => return Ok(Lookup::Missing),
                Err(e) => return Err(e),
            }
        };

        match self.format.decode::<T>(&data) {
            Ok(value) => Ok(Lookup::Found(value)),
            Err(e) => {
                warn!(dir = %self.dir.display(), id, error = %e, "stored record does not decode, treating as absent");
                Ok(Lookup::Corrupt)
            }
        }
    }

    fn save(&self, id: &str, data: &str, ctx: &TxContext) -> StorageResult<()> {
        let paths = self.paths(id)?;
        let lock = self.locks.intern(&paths.live);
        let _guard = lock.lock();

        fsutil::save(&paths.new, data)?;
        fsutil::rename(&paths.new, &paths.live)?;
        trace!(id, %ctx, "saved");
        Ok(())
    }

    fn delete(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        let paths = self.paths(id)?;
        let lock = self.locks.intern(&paths.live);
        let _guard = lock.lock();

        if !fsutil::delete(&paths.live)? {
            debug!(id, %ctx, "record already deleted");
        }
        Ok(())
    }

    fn backup(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        let paths = self.paths(id)?;
        let lock = self.locks.intern(&paths.live);
        let _guard = lock.lock();

        let first = !self.in_flight.is_held(id);
        let live_exists = fsutil::exists(&paths.live);

        if first && live_exists {
            Self::copy_atomic(&paths.live, &paths.new, &paths.old)?;
        } else if first {
            trace!(path = %paths.live.display(), "nothing to back up");
            // a leftover pre-image from a crash must not be restored over a create
            if fsutil::delete(&paths.old)? {
                debug!(path = %paths.old.display(), "removed stale backup before create");
            }
        }

        if self.in_flight.acquire(id) == Acquired::Shared {
            trace!(id, %ctx, "backup shared with an in-flight transaction");
        }
        Ok(())
    }

    fn rollback(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        let paths = self.paths(id)?;
        let lock = self.locks.intern(&paths.live);
        let _guard = lock.lock();

        let live_exists = fsutil::exists(&paths.live);
        let backup_exists = fsutil::exists(&paths.old);

        match (backup_exists, live_exists) {
            (false, false) => {
                warn!(
                    backup = %paths.old.display(),
                    original = %paths.live.display(),
                    %ctx,
                    "neither backup nor original exists, nothing to roll back"
                );
            }
            (false, true) => {
                // undo a create
                fsutil::delete(&paths.live)?;
            }
            (true, _) => {
                // undo an update or a delete
                Self::copy_atomic(&paths.old, &paths.new, &paths.live)?;
            }
        }
        debug!(id, %ctx, "rolled back");
        Ok(())
    }

    fn clear_backup(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        let paths = self.paths(id)?;
        let lock = self.locks.intern(&paths.live);
        let _guard = lock.lock();

        let backup_exists = fsutil::exists(&paths.old);
        if !backup_exists {
            trace!(path = %paths.old.display(), "nothing to clear");
        }

        match self.in_flight.release(id) {
            Released::Last if backup_exists => {
                fsutil::delete(&paths.old)?;
            }
            Released::NotHeld if backup_exists => {
                debug!(id, %ctx, "removing orphaned backup");
                fsutil::delete(&paths.old)?;
            }
            Released::Last | Released::NotHeld | Released::Shared => {}
        }
        Ok(())
    }

    fn format(&self) -> &dyn FileFormat {
        self.format.as_ref()
    }
}
