//! # BucketSQL Testkit
//!
//! Test utilities for BucketSQL.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Property-based test generators using proptest
//! - Encoding test vectors for bucket identifiers and table names
//!
//! ## Usage
//!
//! ```rust
//! use bucketsql_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     db.update(|tx| {
//!         tx.create_top_level_bucket(b"test")?;
//!         Ok(())
//!     })
//!     .unwrap();
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
pub use vectors::*;
