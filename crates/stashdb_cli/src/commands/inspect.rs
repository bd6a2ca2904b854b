//! Inspect command implementation.

use super::{open_redo_log, scan};
use crate::error::CliResult;
use serde::Serialize;
use std::path::Path;

/// Storage directory summary.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Storage root.
    pub path: String,
    /// Per-collection statistics.
    pub collections: Vec<CollectionStats>,
    /// Number of pending redo-log entries.
    pub pending_operations: usize,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Live record files.
    pub records: usize,
    /// `.old` backup files.
    pub backups: usize,
    /// `.new` staging files.
    pub staging: usize,
}

/// Collects the summary of the storage directory at `path`.
pub fn inspect(path: &Path) -> CliResult<InspectResult> {
    let pending = open_redo_log(path)?.incomplete()?;
    let collections = scan(path)?
        .into_iter()
        .map(|c| CollectionStats {
            name: c.name,
            records: c.live.len(),
            backups: c.backups.len(),
            staging: c.staging.len(),
        })
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        collections,
        pending_operations: pending.len(),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let result = inspect(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("StashDB Storage Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Collections:");
    if result.collections.is_empty() {
        println!("  (none)");
    }
    for c in &result.collections {
        println!(
            "  {:<20} records: {:>6}  backups: {:>3}  staging: {:>3}",
            c.name, c.records, c.backups, c.staging
        );
    }
    println!();
    println!("Pending operations: {}", result.pending_operations);
}

#[cfg(test)]
mod tests {
    use super::*;
    use stashdb_core::REDO_LOG_DIR;
    use tempfile::tempdir;

    #[test]
    fn counts_records_and_pending_entries() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("notes")).unwrap();
        std::fs::write(root.join("notes/1.json"), r#"{"id":"1"}"#).unwrap();
        std::fs::write(root.join("notes/1.json.old"), r#"{"id":"1"}"#).unwrap();
        std::fs::create_dir_all(root.join(REDO_LOG_DIR)).unwrap();
        std::fs::write(
            root.join(REDO_LOG_DIR).join("4.json"),
            r#"{"kind":"delete","collection":"notes","id":"1"}"#,
        )
        .unwrap();

        let result = inspect(root).unwrap();
        assert_eq!(result.pending_operations, 1);
        assert_eq!(result.collections.len(), 1);
        assert_eq!(result.collections[0].records, 1);
        assert_eq!(result.collections[0].backups, 1);
    }
}
