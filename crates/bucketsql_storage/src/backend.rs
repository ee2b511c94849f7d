//! Storage backend trait definition.

use crate::error::StorageResult;
use rusqlite::Connection;
use std::time::Duration;

/// `synchronous` pragma setting applied to every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Sync at every critical moment (safest).
    #[default]
    Full,
    /// Sync less often; safe with WAL journaling.
    Normal,
    /// Leave syncing to the OS.
    Off,
}

impl SyncMode {
    /// Returns the pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
            Self::Off => "off",
        }
    }
}

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Durability level.
    pub sync_mode: SyncMode,
    /// Use write-ahead journaling (file databases only).
    pub wal_journal: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            sync_mode: SyncMode::Full,
            wal_journal: true,
        }
    }
}

impl ConnectionOptions {
    /// Applies these settings to an open connection.
    ///
    /// # Errors
    ///
    /// Returns an error if any pragma is rejected.
    pub fn apply(&self, conn: &Connection, persistent: bool) -> StorageResult<()> {
        conn.busy_timeout(self.busy_timeout)?;
        if persistent && self.wal_journal {
            conn.execute_batch("PRAGMA journal_mode = wal;")?;
        }
        conn.execute_batch(&format!(
            "PRAGMA synchronous = {}; PRAGMA foreign_keys = ON;",
            self.sync_mode.pragma_value()
        ))?;
        Ok(())
    }
}

/// A source of connections to the relational engine.
///
/// Backends know where the database lives and how to open it. They know
/// nothing about buckets or the catalog; BucketSQL owns the schema.
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Opens a connection with `options` applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    fn open_connection(&self, options: &ConnectionOptions) -> StorageResult<Connection>;

    /// Returns a human-readable description, e.g. the file path.
    fn describe(&self) -> String;
}
