//! Inspect command implementation.

use super::{display_path, open_existing, open_path};
use bucketsql_core::Database;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Number of buckets.
    pub bucket_count: usize,
    /// Entries across all buckets.
    pub total_entries: u64,
    /// Per-bucket statistics, ordered by identifier.
    pub buckets: Vec<BucketStats>,
}

/// Statistics for a single bucket.
#[derive(Debug, Serialize)]
pub struct BucketStats {
    /// Readable path.
    pub path: String,
    /// Canonical identifier (hex).
    pub id: String,
    /// Nesting depth.
    pub depth: usize,
    /// Backing table.
    pub table: String,
    /// Sequence counter.
    pub sequence: u64,
    /// Number of entries.
    pub entries: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_existing(path)?;
    info!("Inspecting {:?}", path);
    let mut result = collect(&db)?;
    result.path = path.display().to_string();
    result.file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Gathers bucket statistics in one read transaction.
pub fn collect(db: &Database) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let buckets = db.view(|tx| {
        let mut stats = Vec::new();
        for entry in tx.catalog_entries()? {
            let path = entry.id.to_path();
            let entries = match open_path(tx, path.segments())? {
                Some(bucket) => bucket.len()?,
                None => 0,
            };
            stats.push(BucketStats {
                path: display_path(path.segments().iter().map(Vec::as_slice)),
                id: hex::encode(entry.id.as_bytes()),
                depth: path.len(),
                table: entry.table.into_string(),
                sequence: entry.sequence,
                entries,
            });
        }
        Ok(stats)
    })?;

    Ok(InspectResult {
        path: db.location().to_string(),
        file_size: 0,
        bucket_count: buckets.len(),
        total_entries: buckets.iter().map(|b| b.entries).sum(),
        buckets,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("BucketSQL Database Inspection");
    println!("=============================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {}", format_size(result.file_size));
    println!();
    println!("Buckets: {}", result.bucket_count);
    println!("Entries: {}", result.total_entries);

    if !result.buckets.is_empty() {
        println!();
        for bucket in &result.buckets {
            println!(
                "  {:<32} {:<40} seq={} entries={}",
                bucket.path, bucket.table, bucket.sequence, bucket.entries
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
