//! # BucketSQL Codec
//!
//! Canonical identifiers for nested buckets.
//!
//! This crate turns a chain of opaque bucket names into:
//! - a [`BucketId`]: an injective byte encoding, used as the catalog key
//! - a [`TableName`]: a catalog-safe SQL identifier candidate
//!
//! ## Encoding Rules
//!
//! - Each segment is prefixed by its compact-size length
//! - Segments are concatenated outermost first
//! - Only minimal length prefixes decode
//!
//! ## Usage
//!
//! ```
//! use bucketsql_codec::{candidate_name, BucketId, BucketPath};
//!
//! let path = BucketPath::root(b"wallet".to_vec()).child(b"utxo".to_vec());
//! let id = BucketId::encode(&path);
//! assert_eq!(id, BucketId::root(b"wallet").child(b"utxo"));
//! assert_eq!(candidate_name(&id, 0).as_str(), "bkt-wallet-utxo");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod path;
mod table_name;
pub mod varint;

pub use error::{CodecError, CodecResult};
pub use path::{BucketId, BucketPath, Segments};
pub use table_name::{
    candidate_name, escape_byte, TableName, ESCAPE_PLACEHOLDER, MAX_TABLE_NAME_LEN,
    SEGMENT_SEPARATOR, TABLE_PREFIX,
};
