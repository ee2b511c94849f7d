//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use bucketsql_core::{Config, Database};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// File name used for file-backed test databases.
pub const TEST_DB_FILE: &str = "test.bucketsql";

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::open_in_memory().expect("Failed to open in-memory database"),
            temp_dir: None,
        }
    }

    /// Creates a new file-based test database.
    pub fn file() -> Self {
        Self::file_with_config(Config::default())
    }

    /// Creates a new file-based test database with custom configuration.
    pub fn file_with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_with_config(&temp_dir.path().join(TEST_DB_FILE), config)
            .expect("Failed to open file database");

        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join(TEST_DB_FILE))
    }

    /// Closes and reopens a file-based database, keeping the directory.
    ///
    /// # Panics
    ///
    /// Panics on an in-memory database, which cannot be reopened.
    pub fn reopen(self) -> Self {
        let Self { db, temp_dir } = self;
        let temp_dir = temp_dir.expect("In-memory databases cannot be reopened");
        let config = db.config().clone();
        db.close().expect("Failed to close database");
        drop(db);

        let db = Database::open_with_config(&temp_dir.path().join(TEST_DB_FILE), config)
            .expect("Failed to reopen database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust
/// use bucketsql_testkit::with_temp_db;
///
/// with_temp_db(|db| {
///     assert!(db.catalog_entries().unwrap().is_empty());
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database with one top-level bucket holding `count` entries.
    ///
    /// Keys are big-endian `u32` counters so they iterate in insertion order.
    pub fn populated_database(bucket: &[u8], count: u32) -> TestDatabase {
        let test_db = TestDatabase::memory();
        test_db
            .db
            .update(|tx| {
                let b = tx.create_top_level_bucket(bucket)?;
                for i in 0..count {
                    b.put(&i.to_be_bytes(), format!("value-{i}").as_bytes())?;
                }
                Ok(())
            })
            .expect("Failed to populate bucket");
        test_db
    }

    /// Creates a chain of nested buckets, one per segment, and returns the
    /// database.
    pub fn nested_database(segments: &[&[u8]]) -> TestDatabase {
        let test_db = TestDatabase::memory();
        test_db
            .db
            .update(|tx| {
                let Some((first, rest)) = segments.split_first() else {
                    return Ok(());
                };
                let mut bucket = tx.create_top_level_bucket(first)?;
                for segment in rest {
                    bucket = bucket.create_bucket(segment)?;
                }
                Ok(())
            })
            .expect("Failed to create nested buckets");
        test_db
    }
}
