//! Crash simulation for StashDB.
//!
//! A crash is simulated by writing the files an interrupted operation
//! leaves behind directly, then reopening the database and running
//! recovery.
//!
//! ## Crash Points
//!
//! 1. **After begin** - redo entry written, no backup yet
//! 2. **After backup** - redo entry and `.old` present, live file untouched
//! 3. **Mid-commit** - some records of a composite already rewritten
//! 4. **After commit** - every record rewritten, cleanup never ran
//!
//! ## Usage
//!
//! ```rust
//! use serde_json::json;
//! use stashdb_testkit::crash::CrashImage;
//! use stashdb_testkit::{Pojo, TestDatabase};
//!
//! let mut test_db = TestDatabase::new();
//! let image = CrashImage::new(test_db.root());
//! image.write_record("pojos", "1", &json!({"id": "1", "intValue": 1, "stringValue": "1"}));
//! image.interrupted_save(7, "pojos", "1", &json!({"id": "1", "intValue": 2, "stringValue": "2"}));
//!
//! test_db.reopen();
//! let pojos = test_db.register::<Pojo>("pojos").unwrap();
//! test_db.recover().unwrap();
//! assert_eq!(pojos.find_one(&"1".to_string()).unwrap().int_value, 2);
//! ```

use serde_json::Value;
use stashdb_core::{CollectionId, WriteCommand, REDO_LOG_DIR};
use stashdb_storage::fsutil::with_suffix;
use std::fs;
use std::path::{Path, PathBuf};

/// Where an interrupted operation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// The redo entry was written; no backup was taken.
    AfterBegin,
    /// Every backup was taken; no record was rewritten.
    AfterBackup,
    /// Every record was rewritten; cleanup never ran.
    AfterCommit,
}

/// Writes the on-disk state of interrupted operations under a storage root.
#[derive(Debug, Clone)]
pub struct CrashImage {
    root: PathBuf,
}

impl CrashImage {
    /// Targets the database stored at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of a live record file.
    pub fn record_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root.join(collection).join(format!("{id}.json"))
    }

    /// Path of a redo-log entry.
    pub fn redo_path(&self, op_id: u64) -> PathBuf {
        self.root.join(REDO_LOG_DIR).join(format!("{op_id}.json"))
    }

    /// Writes a committed record.
    pub fn write_record(&self, collection: &str, id: &str, value: &Value) {
        write(&self.record_path(collection, id), &value.to_string());
    }

    /// Writes a backup file holding `value`.
    pub fn write_backup(&self, collection: &str, id: &str, value: &Value) {
        write(&with_suffix(&self.record_path(collection, id), ".old"), &value.to_string());
    }

    /// Writes a staging file holding `content`.
    pub fn write_staging(&self, collection: &str, id: &str, content: &str) {
        write(&with_suffix(&self.record_path(collection, id), ".new"), content);
    }

    /// Overwrites a record file with arbitrary content.
    pub fn corrupt_record(&self, collection: &str, id: &str, content: &str) {
        write(&self.record_path(collection, id), content);
    }

    /// Writes a redo-log entry.
    pub fn write_redo(&self, op_id: u64, command: &WriteCommand) {
        let data = serde_json::to_string(command).expect("Failed to encode write command");
        write(&self.redo_path(op_id), &data);
    }

    /// Writes a redo-log staging file, as left by a crash inside begin.
    pub fn write_redo_staging(&self, op_id: u64, content: &str) {
        write(&with_suffix(&self.redo_path(op_id), ".new"), content);
    }

    /// Leaves a save of `value` interrupted after its backup was taken.
    pub fn interrupted_save(&self, op_id: u64, collection: &str, id: &str, value: &Value) {
        self.interrupt(op_id, &save(collection, id, value), CrashPoint::AfterBackup);
    }

    /// Leaves a delete interrupted after its backup was taken.
    pub fn interrupted_delete(&self, op_id: u64, collection: &str, id: &str) {
        self.interrupt(op_id, &delete(collection, id), CrashPoint::AfterBackup);
    }

    /// Leaves `command` interrupted at `point`.
    ///
    /// Backups are taken from the live files currently on disk.
    pub fn interrupt(&self, op_id: u64, command: &WriteCommand, point: CrashPoint) {
        self.write_redo(op_id, command);
        if point == CrashPoint::AfterBegin {
            return;
        }

        for (collection, id) in command.touched() {
            let live = self.record_path(collection.as_str(), &id);
            if live.is_file() {
                fs::copy(&live, with_suffix(&live, ".old")).expect("Failed to write backup");
            }
        }

        if point == CrashPoint::AfterCommit {
            self.apply(command, None);
        }
    }

    /// Applies the record writes of `command` directly, as a commit would.
    ///
    /// A composite stops after `limit` sub-commands when one is given,
    /// simulating a crash in the middle of the commit.
    pub fn apply(&self, command: &WriteCommand, limit: Option<usize>) {
        match command {
            WriteCommand::Save { collection, id, item } => {
                self.write_record(collection.as_str(), id, item);
            }
            WriteCommand::Delete { collection, id } => {
                let path = self.record_path(collection.as_str(), id);
                if path.is_file() {
                    fs::remove_file(path).expect("Failed to delete record");
                }
            }
            WriteCommand::Composite { commands } => {
                let limit = limit.unwrap_or(commands.len());
                for (_, sub) in commands.iter().take(limit) {
                    self.apply(sub, None);
                }
            }
        }
    }
}

/// Save command for `collection/id`.
pub fn save(collection: &str, id: &str, value: &Value) -> WriteCommand {
    WriteCommand::Save {
        collection: collection_id(collection),
        id: id.to_string(),
        item: value.clone(),
    }
}

/// Delete command for `collection/id`.
pub fn delete(collection: &str, id: &str) -> WriteCommand {
    WriteCommand::Delete {
        collection: collection_id(collection),
        id: id.to_string(),
    }
}

/// Composite of `commands`.
pub fn composite(commands: Vec<WriteCommand>) -> WriteCommand {
    let mut out = WriteCommand::composite();
    for command in commands {
        let owner = command.collection().cloned().expect("Composite of composites");
        out.push(owner, command);
    }
    out
}

fn collection_id(name: &str) -> CollectionId {
    CollectionId::new(name).expect("Invalid collection name")
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create directory");
    }
    fs::write(path, content).expect("Failed to write file");
}
