//! # BucketSQL Storage
//!
//! Backend selection and connection setup for BucketSQL.
//!
//! This crate provides the lowest-level storage abstraction: where the
//! relational database lives and how connections to it are configured.
//! Backends hand out plain SQLite connections and never interpret the
//! tables on them.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - For persistent storage in a single database file
//!
//! ## Example
//!
//! ```rust
//! use bucketsql_storage::{ConnectionOptions, InMemoryBackend, StorageBackend};
//!
//! let backend = InMemoryBackend::new();
//! let conn = backend.open_connection(&ConnectionOptions::default()).unwrap();
//! let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
//! assert_eq!(one, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{ConnectionOptions, StorageBackend, SyncMode};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
