//! Database handle.

use crate::catalog::{Catalog, CatalogEntry};
use crate::config::Config;
use crate::error::{CoreError, CoreResult, StorageContext};
use crate::transaction::{Transaction, TxMode};
use bucketsql_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use std::fmt;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// The main database handle.
///
/// `Database` owns a single backend connection. Each transaction holds that
/// connection exclusively until it ends, so beginning a transaction blocks
/// while another one on the same handle is open.
///
/// # Opening a Database
///
/// ```rust
/// use bucketsql_core::Database;
///
/// let db = Database::open_in_memory().unwrap();
/// db.update(|tx| {
///     let accounts = tx.create_top_level_bucket(b"accounts")?;
///     accounts.put(b"alice", b"100")?;
///     Ok(())
/// })
/// .unwrap();
///
/// db.view(|tx| {
///     let accounts = tx.read_bucket(b"accounts")?.expect("bucket exists");
///     assert_eq!(accounts.get(b"alice"), Some(b"100".to_vec()));
///     Ok(())
/// })
/// .unwrap();
/// ```
pub struct Database {
    /// Configuration.
    config: Config,
    /// Where the data lives, for diagnostics.
    location: String,
    /// The backend connection.
    conn: Mutex<Connection>,
    /// Whether the database is open.
    is_open: RwLock<bool>,
}

impl Database {
    /// Opens a database file, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened (`Storage`)
    /// - The file was written with another format version (`InvalidFormat`)
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database file with custom configuration.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use bucketsql_core::{Config, Database};
    /// use std::path::Path;
    ///
    /// let config = Config::default().create_if_missing(false);
    /// let db = Database::open_with_config(Path::new("wallet.db"), config)?;
    /// # Ok::<(), bucketsql_core::CoreError>(())
    /// ```
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let backend = FileBackend::new(path).create_if_missing(config.create_if_missing);
        Self::open_with_backend(config, Box::new(backend))
    }

    /// Opens a fresh in-memory database.
    ///
    /// Data is lost when the handle is dropped.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Config::default(), Box::new(InMemoryBackend::new()))
    }

    /// Opens a database on the given backend.
    ///
    /// The catalog is created on first open.
    pub fn open_with_backend(config: Config, backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let location = backend.describe();
        let conn = backend
            .open_connection(&config.connection_options())
            .map_err(|err| CoreError::storage(format!("opening {location}"), err))?;
        conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);

        prepare_schema(&conn, config.format_version)?;
        info!(location = %location, "database opened");

        Ok(Self {
            config,
            location,
            conn: Mutex::new(conn),
            is_open: RwLock::new(true),
        })
    }

    /// Begins a read-only transaction.
    pub fn begin_read_tx(&self) -> CoreResult<Transaction<'_>> {
        self.begin(TxMode::ReadOnly)
    }

    /// Begins a read-write transaction.
    ///
    /// Takes the backend's write lock immediately. Another writer on the same
    /// file waits up to the configured busy timeout.
    pub fn begin_read_write_tx(&self) -> CoreResult<Transaction<'_>> {
        self.begin(TxMode::ReadWrite)
    }

    fn begin(&self, mode: TxMode) -> CoreResult<Transaction<'_>> {
        self.ensure_open()?;
        Transaction::begin(self.conn.lock(), mode, self.config.scan_batch_size)
    }

    /// Executes a function within a read-write transaction.
    ///
    /// If the function returns `Ok`, the transaction is committed.
    /// If it returns `Err`, the transaction is rolled back.
    pub fn update<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> CoreResult<T>,
    {
        let mut tx = self.begin_read_write_tx()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback()?;
                Err(err)
            }
        }
    }

    /// Executes a function within a read-only transaction.
    pub fn view<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> CoreResult<T>,
    {
        let mut tx = self.begin_read_tx()?;
        let result = f(&tx);
        tx.rollback()?;
        result
    }

    /// Returns every catalog entry, ordered by identifier.
    pub fn catalog_entries(&self) -> CoreResult<Vec<CatalogEntry>> {
        self.view(|tx| tx.catalog_entries())
    }

    /// Writes a snapshot of the database to `writer`.
    ///
    /// Not supported by this backend; always fails with
    /// [`CoreError::Unsupported`].
    pub fn copy_to<W: Write>(&self, _writer: W) -> CoreResult<()> {
        self.ensure_open()?;
        Err(CoreError::Unsupported { operation: "copy" })
    }

    /// Closes the database.
    ///
    /// Waits for an open transaction to end. Later calls to begin a
    /// transaction fail with [`CoreError::DatabaseClosed`]; closing twice is a
    /// no-op.
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }

        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA optimize")
            .storage_context(|| format!("closing {}", self.location))?;
        conn.flush_prepared_statement_cache();

        *is_open = false;
        debug!(location = %self.location, "database closed");
        Ok(())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns where the database lives.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("location", &self.location)
            .field("is_open", &self.is_open())
            .finish()
    }
}

/// Creates the catalog on a fresh database or checks the format of an
/// existing one.
fn prepare_schema(conn: &Connection, format_version: u32) -> CoreResult<()> {
    let stored: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .storage_context(|| "reading the format version")?;

    if Catalog::is_initialized(conn)? {
        if stored != format_version {
            return Err(CoreError::invalid_format(format!(
                "format version {stored}, expected {format_version}"
            )));
        }
        return Ok(());
    }
    if stored != 0 {
        return Err(CoreError::invalid_format(format!(
            "format version {stored} set but the bucket catalog is missing"
        )));
    }

    conn.execute_batch("BEGIN IMMEDIATE")
        .storage_context(|| "creating the bucket catalog")?;
    let created = Catalog::initialize(conn).and_then(|()| {
        conn.execute_batch(&format!("PRAGMA user_version = {format_version}"))
            .storage_context(|| "stamping the format version")
    });
    match created {
        Ok(()) => conn
            .execute_batch("COMMIT")
            .storage_context(|| "creating the bucket catalog")?,
        Err(err) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                warn!(error = %rollback, "failed to roll back catalog creation");
            }
            return Err(err);
        }
    }
    debug!(format_version, "created bucket catalog");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_in_memory_creates_catalog() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.is_open());
        assert!(db.catalog_entries().unwrap().is_empty());
    }

    #[test]
    fn update_commits_on_ok() {
        let db = Database::open_in_memory().unwrap();
        db.update(|tx| {
            tx.create_top_level_bucket(b"a")?.put(b"k", b"v")?;
            Ok(())
        })
        .unwrap();

        let value = db
            .view(|tx| Ok(tx.read_bucket(b"a")?.and_then(|b| b.get(b"k"))))
            .unwrap();
        assert_eq!(value, Some(b"v".to_vec()));
    }

    #[test]
    fn update_rolls_back_on_err() {
        let db = Database::open_in_memory().unwrap();
        let result: CoreResult<()> = db.update(|tx| {
            tx.create_top_level_bucket(b"a")?;
            Err(CoreError::invalid_state("caller gave up"))
        });
        assert!(result.is_err());
        assert!(db.catalog_entries().unwrap().is_empty());
    }

    #[test]
    fn closed_database_rejects_transactions() {
        let db = Database::open_in_memory().unwrap();
        db.close().unwrap();
        db.close().unwrap();

        assert!(!db.is_open());
        assert!(matches!(db.begin_read_tx(), Err(CoreError::DatabaseClosed)));
        assert!(matches!(
            db.begin_read_write_tx(),
            Err(CoreError::DatabaseClosed)
        ));
    }

    #[test]
    fn copy_is_unsupported() {
        let db = Database::open_in_memory().unwrap();
        let err = db.copy_to(Vec::new()).unwrap_err();
        assert!(matches!(err, CoreError::Unsupported { operation: "copy" }));
    }

    #[test]
    fn reopen_file_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallet.db");
        {
            let db = Database::open(&path).unwrap();
            db.update(|tx| {
                let bucket = tx.create_top_level_bucket(b"persist")?;
                bucket.put(b"k", b"v")?;
                bucket.set_sequence(9)?;
                Ok(())
            })
            .unwrap();
            db.close().unwrap();
        }

        let db = Database::open(&path).unwrap();
        db.view(|tx| {
            let bucket = tx.read_bucket(b"persist")?.expect("bucket survives reopen");
            assert_eq!(bucket.get(b"k"), Some(b"v".to_vec()));
            assert_eq!(bucket.sequence()?, 9);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn missing_file_without_create_fails() {
        let dir = tempdir().unwrap();
        let config = Config::default().create_if_missing(false);
        let err = Database::open_with_config(&dir.path().join("absent.db"), config).unwrap_err();
        assert!(matches!(err, CoreError::Storage { .. }));
    }

    #[test]
    fn format_version_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallet.db");
        Database::open(&path).unwrap();

        let mut config = Config::default();
        config.format_version = 2;
        let err = Database::open_with_config(&path, config).unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat { .. }));
    }
}
