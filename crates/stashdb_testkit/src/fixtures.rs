//! Test fixtures and database helpers.
//!
//! Provides sample record types and temporary databases that can be
//! reopened to simulate a process restart.

use serde::{Deserialize, Serialize};
use stashdb_core::{Config, Database, Record, REDO_LOG_DIR};
use stashdb_storage::fsutil;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Sample record with a string id and two value fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pojo {
    /// Record id, `None` while transient.
    pub id: Option<String>,
    /// Integer payload.
    pub int_value: i32,
    /// String payload.
    pub string_value: String,
}

impl Pojo {
    /// Transient record with both fields derived from `value`.
    pub fn new(value: i32) -> Self {
        Self {
            id: None,
            int_value: value,
            string_value: value.to_string(),
        }
    }

    /// Record with a fixed id.
    pub fn with_id(id: &str, value: i32) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::new(value)
        }
    }

    /// The id, for records known to be stored.
    pub fn key(&self) -> String {
        self.id.clone().unwrap_or_default()
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
}

/// Sample record with a numeric id pointing at a [`Pojo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    /// Record id, `None` while transient.
    pub id: Option<u64>,
    /// Id of the owning [`Pojo`].
    pub parent_id: String,
    /// Display name, must not be empty.
    pub name: String,
}

impl Child {
    /// Transient child of `parent`.
    pub fn new(parent: &str, name: &str) -> Self {
        Self {
            id: None,
            parent_id: parent.to_string(),
            name: name.to_string(),
        }
    }
}

impl Record for Child {
    type Id = u64;

    fn id(&self) -> Option<u64> {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name must not be empty".into());
        }
        Ok(())
    }
}

/// A database in a temporary directory, removed on drop.
pub struct TestDatabase {
    db: Option<Database>,
    config: Config,
    dir: TempDir,
}

impl TestDatabase {
    /// Opens a database with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::new())
    }

    /// Opens a database whose collections are cached.
    pub fn cached() -> Self {
        Self::with_config(Config::new().cache(true))
    }

    /// Opens a database with `config`, overriding its storage path.
    pub fn with_config(config: Config) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let config = config.storage_path(dir.path());
        let db = Database::open(config.clone()).expect("Failed to open database");
        Self {
            db: Some(db),
            config,
            dir,
        }
    }

    /// The open database handle.
    pub fn db(&self) -> &Database {
        self.db.as_ref().expect("database is open")
    }

    /// Drops the database handle and opens a fresh one on the same files.
    ///
    /// Every collection must be registered again, as after a restart.
    pub fn reopen(&mut self) {
        // the root is claimed until the old handle is gone
        self.db = None;
        self.db = Some(Database::open(self.config.clone()).expect("Failed to reopen database"));
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Directory of a collection.
    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.root().join(collection)
    }

    /// Path of a live record file.
    pub fn record_path(&self, collection: &str, id: &str) -> PathBuf {
        self.collection_path(collection).join(format!("{id}.json"))
    }

    /// Names of every file in a collection directory, sorted.
    pub fn files(&self, collection: &str) -> Vec<String> {
        fsutil::list_files(&self.collection_path(collection)).expect("Failed to list collection")
    }

    /// Backup and staging files in a collection directory.
    pub fn shadow_files(&self, collection: &str) -> Vec<String> {
        self.files(collection)
            .into_iter()
            .filter(|name| name.ends_with(".old") || name.ends_with(".new"))
            .collect()
    }

    /// Names of the files in the redo-log directory.
    pub fn redo_entries(&self) -> Vec<String> {
        fsutil::list_files(&self.root().join(REDO_LOG_DIR)).expect("Failed to list redo log")
    }

    /// Raw content of a live record file.
    pub fn raw(&self, collection: &str, id: &str) -> Option<String> {
        std::fs::read_to_string(self.record_path(collection, id)).ok()
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        self.db()
    }
}

/// Runs a test with a temporary database.
///
/// # Example
///
/// ```rust
/// use stashdb_testkit::{with_temp_db, Pojo};
///
/// with_temp_db(|db| {
///     let pojos = db.register::<Pojo>("pojos").unwrap();
///     pojos.save(&mut Pojo::new(1)).unwrap();
///     assert_eq!(pojos.count().unwrap(), 1);
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::new();
    f(test_db.db())
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use stashdb_core::Collection;

    /// Creates a database holding `count` pojos with ids `1..=count`.
    pub fn populated_database(count: i32) -> (TestDatabase, Collection<Pojo>) {
        let test_db = TestDatabase::new();
        let pojos = test_db.register::<Pojo>("pojos").expect("Failed to register");
        let mut batch: Vec<Pojo> = (1..=count).map(Pojo::new).collect();
        pojos.save_all(&mut batch).expect("Failed to save pojos");
        (test_db, pojos)
    }
}
