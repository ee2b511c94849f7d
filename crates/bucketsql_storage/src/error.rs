//! Error types for storage operations.

use rusqlite::ffi;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to the relational backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQL engine reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The database file does not exist and creation was not allowed.
    #[error("database file not found: {}", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },
}

impl StorageError {
    fn extended_code(&self) -> Option<i32> {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => Some(err.extended_code),
            _ => None,
        }
    }

    /// Returns true if a primary key constraint rejected the statement.
    #[must_use]
    pub fn is_primary_key_violation(&self) -> bool {
        self.extended_code() == Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    }

    /// Returns true if a `UNIQUE` constraint rejected the statement.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        self.extended_code() == Some(ffi::SQLITE_CONSTRAINT_UNIQUE)
    }
}
