//! # BucketSQL Core
//!
//! Nested key/value buckets stored in SQLite.
//!
//! This crate provides:
//! - A catalog mapping bucket paths to generated tables
//! - Transactions with commit callbacks
//! - Buckets with ordered iteration, cursors and sequence counters
//!
//! Every bucket lives in its own table. The `bucketindex` catalog maps each
//! bucket's canonical identifier to that table and to its sequence counter.
//! Creating or deleting a bucket runs DDL inside the caller's transaction, so
//! the catalog and the schema commit or roll back together.
//!
//! ## Example
//!
//! ```rust
//! use bucketsql_core::{Database, ReadCursor};
//!
//! let db = Database::open_in_memory().unwrap();
//! let mut tx = db.begin_read_write_tx().unwrap();
//! {
//!     let wallet = tx.create_top_level_bucket(b"wallet").unwrap();
//!     let addresses = wallet.create_bucket(b"addresses").unwrap();
//!     addresses.put(b"a1", b"tb1q...").unwrap();
//!     assert_eq!(addresses.next_sequence().unwrap(), 1);
//!
//!     let mut cursor = addresses.read_cursor();
//!     let (key, _) = cursor.first().unwrap().unwrap();
//!     assert_eq!(key, b"a1");
//! }
//! tx.commit().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod catalog;
mod config;
mod cursor;
mod database;
mod error;
mod transaction;

pub use bucket::{Bucket, BucketIter};
pub use catalog::{CatalogEntry, CatalogIssue, CATALOG_TABLE};
pub use config::Config;
pub use cursor::{BucketCursor, Entry, ReadCursor, ReadWriteCursor};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use transaction::{Transaction, TransactionState, TxMode};

pub use bucketsql_codec::{BucketId, BucketPath, TableName};
pub use bucketsql_storage::{FileBackend, InMemoryBackend, StorageBackend, SyncMode};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
