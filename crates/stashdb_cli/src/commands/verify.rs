//! Verify command implementation.

use super::{require_database, scan};
use crate::error::{CliError, CliResult};
use stashdb_storage::fsutil;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of record files checked.
    pub records_checked: usize,
    /// Number of records that parse as JSON.
    pub valid_records: usize,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks every record file, every shadow file and the redo log.
pub fn verify(path: &Path) -> CliResult<VerifyResult> {
    let redo = require_database(path)?;
    let mut result = VerifyResult::default();

    for collection in scan(path)? {
        let dir = path.join(&collection.name);
        for file in &collection.live {
            result.records_checked += 1;
            let parsed = fsutil::read(&dir.join(file))
                .map_err(|e| e.to_string())
                .and_then(|data| {
                    serde_json::from_str::<serde_json::Value>(&data).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(_) => result.valid_records += 1,
                Err(e) => result.errors.push(format!("{}/{file}: {e}", collection.name)),
            }
        }
        for file in collection.backups.iter().chain(&collection.staging) {
            result
                .errors
                .push(format!("{}/{file}: leftover shadow file", collection.name));
        }
    }

    for entry in fsutil::list_files(&redo)? {
        result
            .errors
            .push(format!("redo log entry {entry} is pending, run recover"));
    }
    Ok(result)
}

/// Runs the verify command.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying storage at {}", path.display());
    println!();

    let result = verify(path)?;
    println!(
        "  records checked: {}, valid: {}",
        result.records_checked, result.valid_records
    );
    for error in &result.errors {
        println!("    ERROR: {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Storage verification passed");
        Ok(())
    } else {
        println!("✗ Storage verification failed");
        Err(CliError::VerificationFailed(result.errors.len()))
    }
}
