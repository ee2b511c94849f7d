//! Verify command implementation.

use super::{display_path, open_existing, CliError};
use bucketsql_core::{CatalogIssue, Database};
use std::path::Path;
use tracing::info;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Number of catalog rows checked.
    pub buckets_checked: usize,
    /// List of problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying database at {:?}", path);
    println!();

    let db = open_existing(path)?;
    info!("Checking catalog of {:?}", path);
    let result = verify(&db)?;
    println!("  buckets checked: {}", result.buckets_checked);
    for error in &result.errors {
        println!("    ERROR: {}", error);
    }

    println!();
    if result.is_ok() {
        println!("✓ Database verification passed");
        Ok(())
    } else {
        println!("✗ Database verification failed");
        Err(CliError::VerificationFailed(result.errors.len()).into())
    }
}

/// Checks the catalog against the schema in one read transaction.
pub fn verify(db: &Database) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let (buckets_checked, issues) = db.view(|tx| {
        let issues = tx.check_consistency()?;
        let checked = tx.catalog_entries().map(|entries| entries.len()).unwrap_or(0);
        Ok((checked, issues))
    })?;

    Ok(VerifyResult {
        buckets_checked,
        errors: issues.iter().map(describe).collect(),
    })
}

fn describe(issue: &CatalogIssue) -> String {
    match issue {
        CatalogIssue::MalformedEntry {
            path,
            table,
            message,
        } => format!(
            "catalog row 0x{} -> {table:?} does not decode: {message}",
            hex::encode(path)
        ),
        CatalogIssue::MissingTable { id, table } => format!(
            "bucket {} has no table {table}",
            display_path(id.segments())
        ),
        CatalogIssue::WrongColumns { table, columns } => {
            format!("table {table} has columns {columns:?}, expected [key, val]")
        }
        CatalogIssue::OrphanTable { table } => {
            format!("table {table} is not referenced by the catalog")
        }
    }
}
