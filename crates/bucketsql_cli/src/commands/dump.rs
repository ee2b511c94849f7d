//! Dump command implementation.

use super::{display_path, open_existing, open_path, CliError};
use bucketsql_core::{CoreResult, Database};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// A single dumped entry.
#[derive(Debug, Serialize)]
pub struct DumpedEntry {
    /// Key (hex).
    pub key: String,
    /// Value (hex).
    pub value: String,
}

/// Dump output for one bucket.
#[derive(Debug, Serialize)]
pub struct DumpResult {
    /// Readable bucket path.
    pub bucket: String,
    /// Backing table.
    pub table: String,
    /// Sequence counter.
    pub sequence: u64,
    /// Nested buckets directly below this one.
    pub nested: Vec<String>,
    /// Entries in key order.
    pub entries: Vec<DumpedEntry>,
    /// True if `limit` cut the listing short.
    pub truncated: bool,
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    segments: &[Vec<u8>],
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_existing(path)?;
    info!("Dumping bucket from {:?}", path);
    let result = dump(&db, segments, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Bucket {} ({})", result.bucket, result.table);
            println!("Sequence: {}", result.sequence);
            for nested in &result.nested {
                println!("  [bucket] {}", nested);
            }
            for entry in &result.entries {
                println!("  {} => {}", entry.key, entry.value);
            }
            if result.truncated {
                println!("  ... (limit reached)");
            }
        }
    }

    Ok(())
}

/// Reads the entries of the bucket at `segments`.
pub fn dump(
    db: &Database,
    segments: &[Vec<u8>],
    limit: Option<usize>,
) -> Result<DumpResult, Box<dyn std::error::Error>> {
    let name = display_path(segments.iter().map(Vec::as_slice));
    let found = db.view(|tx| {
        let Some(bucket) = open_path(tx, segments)? else {
            return Ok(None);
        };

        let limit = limit.unwrap_or(usize::MAX);
        let mut entries = Vec::new();
        let mut truncated = false;
        for entry in bucket.iter() {
            let (key, value) = entry?;
            if entries.len() == limit {
                truncated = true;
                break;
            }
            entries.push(DumpedEntry {
                key: hex::encode(key),
                value: hex::encode(value),
            });
        }

        let depth = bucket.id().depth();
        let nested = tx
            .catalog_entries()?
            .into_iter()
            .filter(|entry| entry.id.depth() == depth + 1 && entry.id.is_within(bucket.id()))
            .filter_map(|entry| entry.id.segments().last().map(super::display_bytes))
            .collect();

        debug!(table = %bucket.table_name(), entries = entries.len(), "read bucket");
        let sequence = bucket.sequence()?;
        CoreResult::Ok(Some(DumpResult {
            bucket: name.clone(),
            table: bucket.table_name().to_string(),
            sequence,
            nested,
            entries,
            truncated,
        }))
    })?;

    found.ok_or_else(|| CliError::BucketNotFound(name).into())
}
