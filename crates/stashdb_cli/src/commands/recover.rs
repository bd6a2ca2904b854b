//! Recover command implementation.

use super::document::Document;
use super::{require_database, scan};
use crate::error::CliResult;
use stashdb_core::{Config, Database, IdStrategy, RecoveryReport};
use std::path::Path;
use tracing::info;

/// Registers every collection directory and replays interrupted operations.
pub fn recover(path: &Path) -> CliResult<RecoveryReport> {
    require_database(path)?;
    let config = Config::new()
        .storage_path(path)
        .id_strategy(IdStrategy::Provided)
        .validation(false);
    let db = Database::open(config)?;

    for collection in scan(path)? {
        db.register_uncached::<Document>(&collection.name)?;
    }
    info!(collections = db.collections().len(), "registered collections");

    Ok(db.recover()?)
}

/// Runs the recover command.
pub fn run(path: &Path) -> CliResult<()> {
    let report = recover(path)?;
    if report.is_clean() {
        println!("Nothing to recover");
    } else {
        println!(
            "Replayed {} operation(s) ({} composite), removed {} staging file(s)",
            report.replayed, report.composite, report.staging_removed
        );
    }
    Ok(())
}
