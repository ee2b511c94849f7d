//! File-based storage backend for persistent databases.

use crate::backend::{ConnectionOptions, StorageBackend};
use crate::error::{StorageError, StorageResult};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A backend that stores the database in a single file.
///
/// # Example
///
/// ```no_run
/// use bucketsql_storage::{ConnectionOptions, FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::new(Path::new("wallet.db"));
/// let conn = backend.open_connection(&ConnectionOptions::default()).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
    create_if_missing: bool,
}

impl FileBackend {
    /// Creates a backend for `path`, creating the file on first open.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            create_if_missing: true,
        }
    }

    /// Sets whether a missing file may be created.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Returns the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn open_connection(&self, options: &ConnectionOptions) -> StorageResult<Connection> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.create_if_missing {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        } else if !self.path.exists() {
            return Err(StorageError::NotFound {
                path: self.path.clone(),
            });
        }

        let conn = Connection::open_with_flags(&self.path, flags)?;
        options.apply(&conn, true)?;
        debug!(path = %self.path.display(), "opened file database");
        Ok(conn)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
