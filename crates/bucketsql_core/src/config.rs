//! Database configuration.

use bucketsql_storage::{ConnectionOptions, SyncMode};
use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the database file if it doesn't exist.
    pub create_if_missing: bool,

    /// How long to wait on a database locked by another connection.
    pub busy_timeout: Duration,

    /// Durability level of commits.
    pub sync_mode: SyncMode,

    /// Rows fetched per round trip by bucket iteration.
    pub scan_batch_size: usize,

    /// Prepared statements cached per connection.
    pub statement_cache_capacity: usize,

    /// Schema version stored in `PRAGMA user_version`.
    pub format_version: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            busy_timeout: Duration::from_secs(5),
            sync_mode: SyncMode::Full,
            scan_batch_size: 256,
            statement_cache_capacity: 64,
            format_version: 1,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the busy timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets the durability level.
    #[must_use]
    pub const fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Sets the iteration page size. Zero is treated as one.
    #[must_use]
    pub const fn scan_batch_size(mut self, rows: usize) -> Self {
        self.scan_batch_size = if rows == 0 { 1 } else { rows };
        self
    }

    /// Sets the prepared statement cache size.
    #[must_use]
    pub const fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    pub(crate) fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            busy_timeout: self.busy_timeout,
            sync_mode: self.sync_mode,
            wal_journal: true,
        }
    }
}
