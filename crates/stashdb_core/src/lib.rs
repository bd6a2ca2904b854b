//! # StashDB Core
//!
//! Transactional engine for StashDB.
//!
//! This crate provides:
//! - Typed collections of records, one JSON file per record
//! - Write commands and the redo log that makes them durable
//! - Transactions with automatic rollback from captured pre-images
//! - Recovery of operations interrupted by a crash
//!
//! ## Isolation
//!
//! Record files are locked per file operation, not per transaction. Two
//! transactions that write the same record concurrently both succeed and
//! the later commit wins; nothing detects the lost update. Readers only
//! see a transaction's writes once it is closed.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod command;
mod config;
mod database;
mod error;
mod id;
mod listener;
mod record;
mod recovery;
mod redo_log;
mod registry;
mod transaction;
mod types;

pub use collection::Collection;
pub use command::WriteCommand;
pub use config::{Config, FormatKind};
pub use database::Database;
pub use error::{collect_all, CoreError, CoreResult, MAX_AGGREGATED};
pub use id::{IdGenerator, IdStrategy, LongCounterIdGenerator, ProvidedIdGenerator, UuidIdGenerator};
pub use listener::{RecordListener, Validator};
pub use record::{Record, RecordId};
pub use recovery::RecoveryReport;
pub use redo_log::RedoLog;
pub use registry::{CollectionHandle, Registry};
pub use transaction::{Transaction, TransactionManager, TransactionState};
pub use types::{CollectionId, REDO_LOG_DIR};

pub use stashdb_storage::{Lookup, OpId, RecordStore, TxContext};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
