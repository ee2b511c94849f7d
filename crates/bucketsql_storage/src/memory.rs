//! In-memory storage backend for testing.

use crate::backend::{ConnectionOptions, StorageBackend};
use crate::error::StorageResult;
use rusqlite::Connection;

/// An in-memory backend.
///
/// Every connection gets its own private database, suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// # Example
///
/// ```rust
/// use bucketsql_storage::{ConnectionOptions, InMemoryBackend, StorageBackend};
///
/// let backend = InMemoryBackend::new();
/// let conn = backend.open_connection(&ConnectionOptions::default()).unwrap();
/// conn.execute_batch("CREATE TABLE t (k BLOB)").unwrap();
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryBackend;

impl InMemoryBackend {
    /// Creates a new in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl StorageBackend for InMemoryBackend {
    fn open_connection(&self, options: &ConnectionOptions) -> StorageResult<Connection> {
        let conn = Connection::open_in_memory()?;
        options.apply(&conn, false)?;
        Ok(conn)
    }

    fn describe(&self) -> String {
        ":memory:".to_string()
    }
}
