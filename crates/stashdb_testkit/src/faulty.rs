//! Fault injection for record stores.

use stashdb_storage::{FileFormat, Lookup, RecordStore, StorageError, StorageResult, TxContext};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps a record store and fails selected operations on demand.
///
/// While armed with [`fail_every_nth_write`](Self::fail_every_nth_write),
/// every n-th `save` or `delete` returns an I/O error without reaching the
/// wrapped store. Backups, rollbacks and backup releases can be failed
/// separately.
///
/// Clone the `Arc` before registering to keep control over the faults.
pub struct FaultyStore<T> {
    inner: Arc<dyn RecordStore<T>>,
    every: AtomicUsize,
    writes: AtomicUsize,
    fail_backup: AtomicBool,
    fail_rollback: AtomicBool,
    fail_clear_backup: AtomicBool,
    injected: AtomicUsize,
}

impl<T> FaultyStore<T> {
    /// Wraps `inner` with every fault disarmed.
    pub fn new(inner: Arc<dyn RecordStore<T>>) -> Self {
        Self {
            inner,
            every: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_backup: AtomicBool::new(false),
            fail_rollback: AtomicBool::new(false),
            fail_clear_backup: AtomicBool::new(false),
            injected: AtomicUsize::new(0),
        }
    }

    /// Fails every `n`-th write from now on; 0 disarms.
    pub fn fail_every_nth_write(&self, n: usize) {
        self.writes.store(0, Ordering::SeqCst);
        self.every.store(n, Ordering::SeqCst);
    }

    /// Fails every backup while set.
    pub fn fail_backups(&self, value: bool) {
        self.fail_backup.store(value, Ordering::SeqCst);
    }

    /// Fails every rollback while set.
    pub fn fail_rollbacks(&self, value: bool) {
        self.fail_rollback.store(value, Ordering::SeqCst);
    }

    /// Fails every backup release while set.
    pub fn fail_clear_backups(&self, value: bool) {
        self.fail_clear_backup.store(value, Ordering::SeqCst);
    }

    /// Disarms every fault.
    pub fn disarm(&self) {
        self.fail_every_nth_write(0);
        self.fail_backups(false);
        self.fail_rollbacks(false);
        self.fail_clear_backups(false);
    }

    /// Number of faults injected so far.
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn fault(&self, what: &str, id: &str) -> StorageError {
        self.injected.fetch_add(1, Ordering::SeqCst);
        StorageError::Io(io::Error::other(format!("injected {what} fault for {id}")))
    }

    fn check_write(&self, what: &str, id: &str) -> StorageResult<()> {
        let every = self.every.load(Ordering::SeqCst);
        if every == 0 {
            return Ok(());
        }
        let count = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if count % every == 0 {
            return Err(self.fault(what, id));
        }
        Ok(())
    }
}

impl<T: Send + Sync> RecordStore<T> for FaultyStore<T> {
    fn find_all_ids(&self) -> StorageResult<Vec<String>> {
        self.inner.find_all_ids()
    }

    fn exists(&self, id: &str) -> bool {
        self.inner.exists(id)
    }

    fn read(&self, id: &str) -> StorageResult<Lookup<T>> {
        self.inner.read(id)
    }

    fn save(&self, id: &str, data: &str, ctx: &TxContext) -> StorageResult<()> {
        self.check_write("save", id)?;
        self.inner.save(id, data, ctx)
    }

    fn delete(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        self.check_write("delete", id)?;
        self.inner.delete(id, ctx)
    }

    fn backup(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        if self.fail_backup.load(Ordering::SeqCst) {
            return Err(self.fault("backup", id));
        }
        self.inner.backup(id, ctx)
    }

    fn rollback(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        if self.fail_rollback.load(Ordering::SeqCst) {
            return Err(self.fault("rollback", id));
        }
        self.inner.rollback(id, ctx)
    }

    fn clear_backup(&self, id: &str, ctx: &TxContext) -> StorageResult<()> {
        if self.fail_clear_backup.load(Ordering::SeqCst) {
            return Err(self.fault("clear backup", id));
        }
        self.inner.clear_backup(id, ctx)
    }

    fn abandon(&self, ctx: &TxContext) {
        self.inner.abandon(ctx);
    }

    fn format(&self) -> &dyn FileFormat {
        self.inner.format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use stashdb_storage::{FileBackend, JsonFormat, OpId, PathLocks};
    use tempfile::tempdir;

    #[test]
    fn fails_every_nth_write() {
        let dir = tempdir().unwrap();
        let backend: FileBackend<Value> =
            FileBackend::open(dir.path(), Arc::new(JsonFormat::compact()), Arc::new(PathLocks::new())).unwrap();
        let store = FaultyStore::new(Arc::new(backend));
        let ctx = TxContext::with_op_id(OpId(1));

        store.fail_every_nth_write(2);
        assert!(store.save("1", "{}", &ctx).is_ok());
        assert!(store.save("2", "{}", &ctx).is_err());
        assert!(store.save("3", "{}", &ctx).is_ok());
        assert_eq!(store.injected(), 1);
        assert!(store.exists("1"));
        assert!(!store.exists("2"));

        store.disarm();
        assert!(store.save("2", "{}", &ctx).is_ok());
    }
}
