//! Database handle.

use crate::collection::Collection;
use crate::command::WriteCommand;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::id::IdGenerator;
use crate::listener::RecordValidation;
use crate::record::Record;
use crate::recovery::{self, RecoveryReport};
use crate::redo_log::RedoLog;
use crate::registry::{Registry, StoreHandle};
use crate::transaction::{Transaction, TransactionManager};
use crate::types::{CollectionId, REDO_LOG_DIR};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use stashdb_storage::{fsutil, CacheDecorator, FileBackend, FileFormat, OpId, PathLocks, RecordStore, StorageError};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Canonical roots of the databases open in this process.
static OPEN_ROOTS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Claims a storage root for one `Database` until dropped.
#[derive(Debug)]
struct RootGuard(PathBuf);

impl RootGuard {
    fn claim(root: &Path) -> CoreResult<Self> {
        let canonical = root.canonicalize().map_err(|e| StorageError::file(root, e))?;
        if !OPEN_ROOTS.lock().insert(canonical.clone()) {
            return Err(CoreError::invalid_operation(format!(
                "database at {} is already open",
                root.display()
            )));
        }
        Ok(Self(canonical))
    }
}

impl Drop for RootGuard {
    fn drop(&mut self) {
        OPEN_ROOTS.lock().remove(&self.0);
    }
}

/// The main database handle.
///
/// `Database` is the entry point for stashdb. It provides:
/// - Collection registration
/// - Explicit transactions
/// - Crash recovery
///
/// # Opening a Database
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use stashdb_core::{Config, Database, Record};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Note {
///     id: Option<i64>,
///     text: String,
/// }
///
/// impl Record for Note {
///     type Id = i64;
///     fn id(&self) -> Option<i64> { self.id }
///     fn set_id(&mut self, id: i64) { self.id = Some(id); }
/// }
///
/// let dir = tempfile::tempdir()?;
/// let db = Database::open(Config::new().storage_path(dir.path()))?;
/// let notes = db.register::<Note>("notes")?;
/// db.recover()?;
///
/// let mut note = Note { id: None, text: "hello".into() };
/// notes.save(&mut note)?;
/// assert_eq!(note.id, Some(1));
/// assert_eq!(notes.find_one(&1), Some(note));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Recovery
///
/// Opening never repairs anything by itself. After an abnormal shutdown,
/// register every collection and call [`recover`](Self::recover) before
/// using the data.
pub struct Database {
    config: Config,
    root: PathBuf,
    format: Arc<dyn FileFormat>,
    locks: Arc<PathLocks>,
    manager: Arc<TransactionManager>,
    _root: RootGuard,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("root", &self.root)
            .field("collections", &self.manager.registry())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens the database rooted at `config.storage_path`.
    ///
    /// Creates the root and the redo-log directory if missing.
    ///
    /// A root is owned by one handle at a time: record files carry
    /// per-handle in-flight state, so a second handle would read through
    /// the first one's uncommitted writes. Drop the handle before opening
    /// the root again.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if a handle on the same
    /// root is still open, or an error if the directories cannot be
    /// created or listed.
    pub fn open(config: Config) -> CoreResult<Self> {
        let root = config.storage_path.clone();
        fsutil::create_dir_all(&root)?;
        let guard = RootGuard::claim(&root)?;

        let format = config.format.file_format();
        let locks = PathLocks::global();
        let redo_log = RedoLog::open(root.join(REDO_LOG_DIR), Arc::clone(&format), Arc::clone(&locks))?;
        let manager = Arc::new(TransactionManager::new(redo_log, Registry::new()));

        info!(path = %root.display(), "database opened");
        Ok(Self {
            config,
            root,
            format,
            locks,
            manager,
            _root: guard,
        })
    }

    /// The configuration the database was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The storage root.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Directory of the collection `name`.
    #[must_use]
    pub fn collection_dir(&self, name: &CollectionId) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Names of the registered collections, sorted.
    #[must_use]
    pub fn collections(&self) -> Vec<CollectionId> {
        self.manager.registry().names()
    }

    /// The transaction manager.
    #[must_use]
    pub fn transactions(&self) -> &TransactionManager {
        &self.manager
    }

    /// Registers a collection, cached if the configuration says so.
    ///
    /// # Errors
    ///
    /// Returns an input error for unusable or already registered names, or
    /// an I/O error if the collection directory cannot be prepared.
    pub fn register<T: Record>(&self, name: &str) -> CoreResult<Collection<T>> {
        if self.config.cache {
            self.register_cached(name)
        } else {
            self.register_uncached(name)
        }
    }

    /// Registers a collection read straight from its files.
    pub fn register_uncached<T: Record>(&self, name: &str) -> CoreResult<Collection<T>> {
        let id = self.unregistered(name)?;
        let backend = self.backend::<T>(&id)?;
        self.attach(id, Arc::new(backend))
    }

    /// Registers a collection served from an in-memory cache.
    ///
    /// Every record is loaded now; records that fail to decode are logged
    /// and left out.
    pub fn register_cached<T: Record>(&self, name: &str) -> CoreResult<Collection<T>> {
        let id = self.unregistered(name)?;
        let backend = self.backend::<T>(&id)?;
        let cached = CacheDecorator::new(backend)?;
        self.attach(id, Arc::new(cached))
    }

    /// Registers a collection over a caller-supplied store.
    pub fn register_with_store<T: Record>(
        &self,
        name: &str,
        store: Arc<dyn RecordStore<T>>,
    ) -> CoreResult<Collection<T>> {
        let id = self.unregistered(name)?;
        self.attach(id, store)
    }

    /// Removes a collection from the registry. Its files are kept.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CollectionNotFound`] for unknown names.
    pub fn deregister(&self, name: &str) -> CoreResult<()> {
        self.manager.registry().deregister(&CollectionId::new(name)?)
    }

    /// Begins an explicit transaction.
    #[must_use]
    pub fn begin(&self) -> Transaction {
        self.manager.begin()
    }

    /// Runs `f` in a transaction, committing if it succeeds.
    ///
    /// The transaction is closed in every case. If `f` fails, nothing it
    /// collected is applied.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// db.transaction(|tx| {
    ///     users.save_in_tx(tx, &mut alice)?;
    ///     users.delete_by_id_in_tx(tx, &bob_id)
    /// })?;
    /// ```
    pub fn transaction<F, R>(&self, f: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Transaction) -> CoreResult<R>,
    {
        let mut tx = self.begin();
        let result = f(&mut tx).and_then(|value| tx.commit().map(|()| value));
        tx.close();
        result
    }

    /// Replays every interrupted operation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if no collection is
    /// registered, and an aggregate of every replay that failed.
    pub fn recover(&self) -> CoreResult<RecoveryReport> {
        recovery::recover(&self.manager)
    }

    /// Operations begun and not yet finished, by operation id.
    pub fn pending_operations(&self) -> CoreResult<BTreeMap<OpId, WriteCommand>> {
        self.manager.redo_log().incomplete()
    }

    fn unregistered(&self, name: &str) -> CoreResult<CollectionId> {
        let id = CollectionId::new(name)?;
        if self.manager.registry().contains(&id) {
            return Err(CoreError::duplicate_collection(name));
        }
        Ok(id)
    }

    fn backend<T: Record>(&self, id: &CollectionId) -> CoreResult<FileBackend<T>> {
        Ok(FileBackend::open(
            self.collection_dir(id),
            Arc::clone(&self.format),
            Arc::clone(&self.locks),
        )?)
    }

    fn attach<T: Record>(&self, id: CollectionId, store: Arc<dyn RecordStore<T>>) -> CoreResult<Collection<T>> {
        let ids: Arc<dyn IdGenerator<T::Id>> = Arc::from(self.config.id_strategy.generator::<T::Id>());
        let collection = Collection::new(id.clone(), Arc::clone(&store), ids, Arc::clone(&self.manager));
        if self.config.validation {
            collection.add_listener(RecordValidation);
        }
        collection.seed_ids()?;

        self.manager
            .registry()
            .register(Arc::new(StoreHandle::new(id.clone(), store)))?;
        debug!(collection = %id, record = std::any::type_name::<T>(), "collection registered");
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionState;
    use crate::{IdStrategy, Validator};
    use serde::{Deserialize, Serialize};
    use stashdb_storage::Lookup;
    use tempfile::{tempdir, TempDir};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pojo {
        id: Option<String>,
        #[serde(rename = "intValue")]
        int_value: i32,
        #[serde(rename = "stringValue")]
        string_value: String,
    }

    impl Pojo {
        fn new(value: i32) -> Self {
            Self {
                id: None,
                int_value: value,
                string_value: value.to_string(),
            }
        }
    }

    impl Record for Pojo {
        type Id = String;

        fn id(&self) -> Option<String> {
            self.id.clone()
        }

        fn set_id(&mut self, id: String) {
            self.id = Some(id);
        }

        fn validate(&self) -> Result<(), String> {
            if self.int_value < 0 {
                return Err("intValue must not be negative".into());
            }
            Ok(())
        }
    }

    fn open(config: Config) -> (TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open(config.storage_path(dir.path())).unwrap();
        (dir, db)
    }

    #[test]
    fn open_creates_redo_log_directory() {
        let (dir, _db) = open(Config::new());
        assert!(dir.path().join(REDO_LOG_DIR).is_dir());
    }

    #[test]
    fn save_assigns_counter_ids() {
        let (dir, db) = open(Config::new());
        let pojos = db.register::<Pojo>("pojos").unwrap();

        let mut first = Pojo::new(1);
        let mut second = Pojo::new(2);
        pojos.save(&mut first).unwrap();
        pojos.save(&mut second).unwrap();

        assert_eq!(first.id.as_deref(), Some("1"));
        assert_eq!(second.id.as_deref(), Some("2"));
        assert!(dir.path().join("pojos/2.json").is_file());
        assert_eq!(pojos.find_all().unwrap(), vec![first, second]);
    }

    #[test]
    fn counter_continues_after_reopen() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(Config::new().storage_path(dir.path())).unwrap();
            let pojos = db.register::<Pojo>("pojos").unwrap();
            for i in 0..3 {
                pojos.save(&mut Pojo::new(i)).unwrap();
            }
        }
        let db = Database::open(Config::new().storage_path(dir.path())).unwrap();
        let pojos = db.register::<Pojo>("pojos").unwrap();
        let mut next = Pojo::new(9);
        pojos.save(&mut next).unwrap();
        assert_eq!(next.id.as_deref(), Some("4"));
    }

    #[test]
    fn second_open_of_same_root_is_rejected() {
        let (dir, db) = open(Config::new());
        let err = Database::open(Config::new().storage_path(dir.path().join("."))).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        drop(db);
        let db = Database::open(Config::new().storage_path(dir.path())).unwrap();
        assert_eq!(db.path(), dir.path());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (_dir, db) = open(Config::new());
        db.register::<Pojo>("pojos").unwrap();
        let err = db.register::<Pojo>("pojos").unwrap_err();
        assert!(matches!(err, CoreError::DuplicateCollection { .. }));

        db.deregister("pojos").unwrap();
        db.register::<Pojo>("pojos").unwrap();
    }

    #[test]
    fn validation_rejects_before_io() {
        let (dir, db) = open(Config::new());
        let pojos = db.register::<Pojo>("pojos").unwrap();

        let err = pojos.save(&mut Pojo::new(-1)).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        assert!(fsutil::list_files(&dir.path().join("pojos")).unwrap().is_empty());
        assert!(db.pending_operations().unwrap().is_empty());
    }

    #[test]
    fn validation_can_be_disabled() {
        let (_dir, db) = open(Config::new().validation(false));
        let pojos = db.register::<Pojo>("pojos").unwrap();
        pojos.save(&mut Pojo::new(-1)).unwrap();
        assert_eq!(pojos.count().unwrap(), 1);
    }

    #[test]
    fn custom_validator_runs_on_save() {
        let (_dir, db) = open(Config::new());
        let pojos = db.register::<Pojo>("pojos").unwrap();
        pojos.add_listener(Validator::new("small", |p: &Pojo| {
            if p.int_value < 100 {
                Ok(())
            } else {
                Err("too big".into())
            }
        }));

        pojos.save(&mut Pojo::new(5)).unwrap();
        assert!(pojos.save(&mut Pojo::new(500)).is_err());
        assert_eq!(pojos.count().unwrap(), 1);
    }

    struct KeepSeven;

    impl crate::RecordListener<Pojo> for KeepSeven {
        fn on_before_delete(&self, record: &Pojo) -> CoreResult<()> {
            if record.int_value == 7 {
                return Err(CoreError::invalid_argument("seven is kept"));
            }
            Ok(())
        }
    }

    #[test]
    fn bulk_deletes_run_listeners_and_delete_by_id_does_not() {
        let (_dir, db) = open(Config::new());
        let pojos = db.register::<Pojo>("pojos").unwrap();
        pojos.add_listener(KeepSeven);
        let mut batch = vec![Pojo::new(1), Pojo::new(7)];
        pojos.save_all(&mut batch).unwrap();

        assert!(pojos.delete_all().unwrap_err().is_input_error());
        assert!(pojos.delete_all_of(&batch).is_err());
        assert!(pojos.delete(&batch[1]).is_err());
        assert_eq!(pojos.count().unwrap(), 2);

        pojos.delete_by_id(&"2".to_string()).unwrap();
        assert_eq!(pojos.count().unwrap(), 1);
    }

    #[test]
    fn provided_strategy_requires_ids() {
        let (_dir, db) = open(Config::new().id_strategy(IdStrategy::Provided));
        let pojos = db.register::<Pojo>("pojos").unwrap();

        let err = pojos.save(&mut Pojo::new(1)).unwrap_err();
        assert!(err.is_input_error());

        let mut named = Pojo::new(1);
        named.id = Some("alice".into());
        pojos.save(&mut named).unwrap();
        assert_eq!(pojos.find_one(&"alice".to_string()), Some(named));
    }

    #[test]
    fn unusable_ids_are_input_errors() {
        let (_dir, db) = open(Config::new());
        let pojos = db.register::<Pojo>("pojos").unwrap();

        let mut dotted = Pojo::new(1);
        dotted.id = Some("a.b".into());
        assert!(pojos.save(&mut dotted).unwrap_err().is_input_error());
        assert_eq!(pojos.lookup(&"a.b".to_string()), Lookup::Missing);
        assert!(!pojos.exists_by_id(&"../x".to_string()));
    }

    #[test]
    fn delete_rules() {
        let (_dir, db) = open(Config::new());
        let pojos = db.register::<Pojo>("pojos").unwrap();

        let transient = Pojo::new(1);
        assert!(pojos.delete(&transient).unwrap_err().is_input_error());
        assert!(pojos.delete_by_id(&"42".to_string()).unwrap_err().is_input_error());

        let mut stored = Pojo::new(1);
        pojos.save(&mut stored).unwrap();
        pojos.delete(&stored).unwrap();
        assert!(!pojos.exists_by_id(&"1".to_string()));
        assert!(pojos.delete(&stored).is_err());
    }

    #[test]
    fn delete_all_of_skips_existence_check() {
        let (_dir, db) = open(Config::new());
        let pojos = db.register::<Pojo>("pojos").unwrap();
        let mut kept = Pojo::new(1);
        pojos.save(&mut kept).unwrap();

        let mut ghost = Pojo::new(2);
        ghost.id = Some("99".into());
        pojos.delete_all_of(&[kept, ghost]).unwrap();
        assert_eq!(pojos.count().unwrap(), 0);

        pojos.delete_all_of(&[]).unwrap();
        assert!(pojos.delete_all_of(&[Pojo::new(3)]).unwrap_err().is_input_error());
    }

    #[test]
    fn save_all_and_delete_all() {
        let (dir, db) = open(Config::new());
        let pojos = db.register::<Pojo>("pojos").unwrap();

        pojos.save_all(&mut []).unwrap();
        let mut batch: Vec<Pojo> = (1..=3).map(Pojo::new).collect();
        pojos.save_all(&mut batch).unwrap();
        assert!(batch.iter().all(|p| p.id.is_some()));
        assert_eq!(pojos.count().unwrap(), 3);

        pojos.delete_all().unwrap();
        assert_eq!(pojos.count().unwrap(), 0);
        assert!(fsutil::list_files(&dir.path().join("pojos")).unwrap().is_empty());
        assert!(db.pending_operations().unwrap().is_empty());
    }

    #[test]
    fn find_all_by_id_is_ordered_by_id() {
        let (_dir, db) = open(Config::new());
        let pojos = db.register::<Pojo>("pojos").unwrap();
        let mut batch: Vec<Pojo> = (1..=4).map(Pojo::new).collect();
        pojos.save_all(&mut batch).unwrap();

        let found = pojos
            .find_all_by_id(&["3".to_string(), "1".to_string(), "7".to_string()])
            .unwrap();
        let ids: Vec<_> = found.iter().filter_map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn transaction_helper_commits_or_discards() {
        let (_dir, db) = open(Config::new());
        let pojos = db.register::<Pojo>("pojos").unwrap();

        db.transaction(|tx| {
            pojos.save_in_tx(tx, &mut Pojo::new(1))?;
            pojos.save_in_tx(tx, &mut Pojo::new(2))
        })
        .unwrap();
        assert_eq!(pojos.count().unwrap(), 2);

        let result: CoreResult<()> = db.transaction(|tx| {
            pojos.save_in_tx(tx, &mut Pojo::new(3))?;
            Err(CoreError::invalid_operation("changed my mind"))
        });
        assert!(result.is_err());
        assert_eq!(pojos.count().unwrap(), 2);
        assert_eq!(db.transactions().active_count(), 0);
    }

    #[test]
    fn writes_are_visible_after_close() {
        let (_dir, db) = open(Config::new().cache(true));
        let pojos = db.register::<Pojo>("pojos").unwrap();

        let mut tx = db.begin();
        let mut pojo = Pojo::new(1);
        pojos.save_in_tx(&mut tx, &mut pojo).unwrap();
        tx.commit().unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(pojos.count().unwrap(), 0);

        tx.close();
        assert_eq!(pojos.find_all().unwrap(), vec![pojo]);
    }

    #[test]
    fn recover_requires_collections() {
        let (_dir, db) = open(Config::new());
        assert!(matches!(db.recover(), Err(CoreError::InvalidOperation { .. })));

        db.register::<Pojo>("pojos").unwrap();
        assert!(db.recover().unwrap().is_clean());
    }
}
