//! Transaction manager.

use crate::command::WriteCommand;
use crate::error::CoreResult;
use crate::redo_log::RedoLog;
use crate::registry::Registry;
use crate::transaction::handle::Transaction;
use stashdb_storage::OpId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// State shared by the manager and every transaction it hands out.
#[derive(Debug)]
pub(crate) struct Engine {
    pub(crate) redo_log: RedoLog,
    pub(crate) registry: Registry,
    pub(crate) active: AtomicUsize,
}

/// Hands out transactions over the registered collections.
///
/// The manager provides:
/// - explicit transactions via [`begin`](Self::begin)
/// - single-command autocommit transactions for collection writes
/// - replay of redo-logged operations during recovery
///
/// ## Concurrency
///
/// Transactions hold no global lock. Each record file is guarded by its
/// own path lock for the duration of one file operation, so two concurrent
/// transactions writing the same record both succeed and the later commit
/// wins.
#[derive(Debug)]
pub struct TransactionManager {
    engine: Arc<Engine>,
}

impl TransactionManager {
    /// Creates a transaction manager.
    pub fn new(redo_log: RedoLog, registry: Registry) -> Self {
        Self {
            engine: Arc::new(Engine {
                redo_log,
                registry,
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// The redo log.
    #[must_use]
    pub fn redo_log(&self) -> &RedoLog {
        &self.engine.redo_log
    }

    /// The collection registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.engine.registry
    }

    /// Begins an explicit transaction.
    #[must_use]
    pub fn begin(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.engine), WriteCommand::composite())
    }

    /// Runs one command in its own transaction and closes it.
    pub(crate) fn execute(&self, command: WriteCommand) -> CoreResult<()> {
        let mut tx = Transaction::new(Arc::clone(&self.engine), command);
        let result = tx.commit();
        tx.close();
        result
    }

    /// Re-applies an operation found in the redo log.
    ///
    /// The backups taken before the interruption are kept, so the commit is
    /// a roll-forward and the cleanup erases the entry.
    pub(crate) fn replay(&self, op_id: OpId, command: WriteCommand) -> CoreResult<()> {
        let mut tx = Transaction::new(Arc::clone(&self.engine), command);
        let result = tx.skip_begin(op_id).and_then(|()| tx.commit());
        tx.close();
        result
    }

    /// Number of transactions not yet closed.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.engine.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::registry::{CollectionHandle, StoreHandle};
    use crate::transaction::TransactionState;
    use crate::types::CollectionId;
    use serde_json::{json, Value};
    use stashdb_storage::{fsutil, FileBackend, JsonFormat, PathLocks, RecordStore};
    use std::path::Path;
    use tempfile::tempdir;

    fn manager(dir: &Path) -> TransactionManager {
        let locks = Arc::new(PathLocks::new());
        let format = Arc::new(JsonFormat::compact());
        let redo_log = RedoLog::open(dir.join("_redo.log"), format.clone(), locks.clone()).unwrap();
        let registry = Registry::new();
        let store: FileBackend<Value> = FileBackend::open(dir.join("docs"), format, locks).unwrap();
        let handle = StoreHandle::new(docs(), Arc::new(store) as Arc<dyn RecordStore<Value>>);
        registry.register(Arc::new(handle) as Arc<dyn CollectionHandle>).unwrap();
        TransactionManager::new(redo_log, registry)
    }

    fn docs() -> CollectionId {
        CollectionId::new("docs").unwrap()
    }

    fn save(id: &str, value: i64) -> WriteCommand {
        WriteCommand::Save {
            collection: docs(),
            id: id.into(),
            item: json!({ "id": id, "value": value }),
        }
    }

    fn content(dir: &Path, id: &str) -> Option<String> {
        std::fs::read_to_string(dir.join("docs").join(format!("{id}.json"))).ok()
    }

    #[test]
    fn execute_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());

        mgr.execute(save("1", 7)).unwrap();

        assert_eq!(content(dir.path(), "1").as_deref(), Some(r#"{"id":"1","value":7}"#));
        assert!(fsutil::list_files(mgr.redo_log().dir()).unwrap().is_empty());
        assert_eq!(fsutil::list_files(&dir.path().join("docs")).unwrap(), vec!["1.json"]);
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn rollback_after_commit_restores_pre_image() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.execute(save("1", 1)).unwrap();

        let mut tx = mgr.begin();
        tx.push(docs(), save("1", 2)).unwrap();
        tx.push(docs(), save("2", 2)).unwrap();
        tx.commit().unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(mgr.active_count(), 1);

        tx.rollback().unwrap();
        assert_eq!(tx.state(), TransactionState::RolledBack);
        tx.close();

        assert_eq!(content(dir.path(), "1").as_deref(), Some(r#"{"id":"1","value":1}"#));
        assert_eq!(content(dir.path(), "2"), None);
        assert!(fsutil::list_files(mgr.redo_log().dir()).unwrap().is_empty());
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn rollback_before_commit_is_a_no_op() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());

        let mut tx = mgr.begin();
        tx.push(docs(), save("1", 1)).unwrap();
        tx.rollback().unwrap();
        tx.close();

        assert_eq!(content(dir.path(), "1"), None);
        assert!(fsutil::list_files(mgr.redo_log().dir()).unwrap().is_empty());
    }

    #[test]
    fn commit_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());

        let mut tx = mgr.begin();
        tx.push(docs(), save("1", 1)).unwrap();
        tx.commit().unwrap();
        assert!(matches!(tx.commit(), Err(CoreError::InvalidOperation { .. })));
        assert!(tx.push(docs(), save("2", 1)).is_err());
        tx.close();
    }

    #[test]
    fn empty_transaction_writes_nothing() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());

        let mut tx = mgr.begin();
        tx.commit().unwrap();
        assert_eq!(tx.op_id(), None);
        tx.close();
        assert!(fsutil::list_files(mgr.redo_log().dir()).unwrap().is_empty());
    }

    #[test]
    fn unknown_collection_fails_begin_and_leaves_nothing() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let ghost = CollectionId::new("ghost").unwrap();

        let mut tx = mgr.begin();
        tx.push(docs(), save("1", 1)).unwrap();
        tx.push(
            ghost.clone(),
            WriteCommand::Delete {
                collection: ghost,
                id: "1".into(),
            },
        )
        .unwrap();

        let err = tx.commit().unwrap_err();
        assert!(matches!(err, CoreError::TransactionBegin { .. }));
        assert_eq!(tx.state(), TransactionState::RolledBack);
        tx.close();

        assert_eq!(content(dir.path(), "1"), None);
        assert!(fsutil::list_files(mgr.redo_log().dir()).unwrap().is_empty());
        assert!(fsutil::list_files(&dir.path().join("docs")).unwrap().is_empty());
    }

    #[test]
    fn dropped_transaction_is_closed() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        {
            let mut tx = mgr.begin();
            tx.push(docs(), save("1", 1)).unwrap();
            tx.commit().unwrap();
        }
        assert_eq!(mgr.active_count(), 0);
        assert!(fsutil::list_files(mgr.redo_log().dir()).unwrap().is_empty());
        assert_eq!(fsutil::list_files(&dir.path().join("docs")).unwrap(), vec!["1.json"]);
    }

    #[test]
    fn replay_rolls_forward_and_erases_entry() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());
        let command = save("1", 3);
        let op = mgr.redo_log().begin(&command).unwrap();

        mgr.replay(op, command).unwrap();

        assert!(!mgr.redo_log().is_pending(op));
        assert_eq!(content(dir.path(), "1").as_deref(), Some(r#"{"id":"1","value":3}"#));
    }
}
