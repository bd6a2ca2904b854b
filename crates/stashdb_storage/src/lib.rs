//! # StashDB Storage
//!
//! File-level building blocks for StashDB.
//!
//! This crate stores each record of a collection as one file and makes
//! every single-file mutation atomic with a staging file and a rename. It
//! knows nothing about write commands, the redo log or transactions: those
//! live in `stashdb_core` and drive the [`RecordStore`] protocol.
//!
//! ## On-disk layout
//!
//! ```text
//! <collection>/<id>.json       live record
//! <collection>/<id>.json.old   pre-image, only while a transaction holds the id
//! <collection>/<id>.json.new   staging file, only for the duration of one rename
//! ```
//!
//! ## Available Stores
//!
//! - [`FileBackend`] - one file per record, reference-counted backups
//! - [`CacheDecorator`] - whole-collection in-memory view over another store
//!
//! ## Example
//!
//! ```rust
//! use stashdb_storage::{FileBackend, JsonFormat, Lookup, OpId, PathLocks, RecordStore, TxContext};
//! use std::sync::Arc;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store: FileBackend<serde_json::Value> =
//!     FileBackend::open(dir.path().join("users"), Arc::new(JsonFormat::compact()), PathLocks::global())
//!         .unwrap();
//!
//! let ctx = TxContext::with_op_id(OpId(1));
//! store.backup("1", &ctx).unwrap();
//! store.save("1", r#"{"name":"ada"}"#, &ctx).unwrap();
//! store.clear_backup("1", &ctx).unwrap();
//!
//! assert!(matches!(store.read("1").unwrap(), Lookup::Found(_)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cache;
mod context;
mod error;
mod file;
mod format;
pub mod fsutil;
mod inflight;
mod lock;

pub use backend::{Lookup, RecordStore};
pub use cache::CacheDecorator;
pub use context::{OpId, TxContext};
pub use error::{StorageError, StorageResult};
pub use file::{check_stem, FileBackend, BACKUP_SUFFIX, STAGING_SUFFIX};
pub use format::{FileFormat, FormatExt, JsonFormat};
pub use inflight::{Acquired, BackupState, InFlight, Released};
pub use lock::PathLocks;
