//! Pending command implementation.

use super::open_redo_log;
use crate::error::CliResult;
use serde::Serialize;
use std::path::Path;

/// One interrupted operation.
#[derive(Debug, Serialize)]
pub struct PendingEntry {
    /// Operation id.
    pub op_id: u64,
    /// Command kind: save, delete or composite.
    pub kind: &'static str,
    /// Touched records as `collection/id`.
    pub touched: Vec<String>,
}

/// Lists the pending redo-log entries in replay order.
pub fn pending(path: &Path) -> CliResult<Vec<PendingEntry>> {
    let entries = open_redo_log(path)?
        .incomplete()?
        .into_iter()
        .map(|(op_id, command)| PendingEntry {
            op_id: op_id.as_u64(),
            kind: command.kind(),
            touched: command
                .touched()
                .into_iter()
                .map(|(collection, id)| format!("{collection}/{id}"))
                .collect(),
        })
        .collect();
    Ok(entries)
}

/// Runs the pending command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let entries = pending(path)?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No pending operations");
        return Ok(());
    }
    println!("{} pending operation(s):", entries.len());
    for entry in &entries {
        println!("  #{:<8} {:<10} {}", entry.op_id, entry.kind, entry.touched.join(", "));
    }
    Ok(())
}
