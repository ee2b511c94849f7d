//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use bucketsql_codec::BucketPath;
use proptest::prelude::*;

/// Strategy for generating one path segment.
///
/// Biased towards the short, punctuation-heavy names that collide after
/// escaping, with the occasional empty or long segment.
pub fn segment_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        4 => prop::collection::vec(prop::sample::select(b"ab./ -_\x00".to_vec()), 0..4),
        2 => prop::collection::vec(any::<u8>(), 0..16),
        1 => prop::collection::vec(any::<u8>(), 60..90),
    ]
}

/// Strategy for generating non-empty bucket paths.
pub fn bucket_path_strategy() -> impl Strategy<Value = BucketPath> {
    prop::collection::vec(segment_strategy(), 1..5).prop_map(|segments| BucketPath::from_segments(segments))
}

/// Strategy for generating keys.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..32)
}

/// Strategy for generating values.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// An operation on a single bucket.
#[derive(Debug, Clone)]
pub enum BucketOperation {
    /// Store a value.
    Put {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Remove a key.
    Delete {
        /// Key
        key: Vec<u8>,
    },
    /// Look up a key.
    Get {
        /// Key
        key: Vec<u8>,
    },
    /// Advance the sequence counter.
    NextSequence,
}

/// Strategy for generating bucket operations.
///
/// Keys are drawn from a small pool so that operations hit the same entries.
pub fn bucket_operation_strategy() -> impl Strategy<Value = BucketOperation> {
    let key = prop::collection::vec(0u8..4, 0..3);
    prop_oneof![
        4 => (key.clone(), value_strategy()).prop_map(|(key, value)| BucketOperation::Put { key, value }),
        2 => key.clone().prop_map(|key| BucketOperation::Delete { key }),
        2 => key.prop_map(|key| BucketOperation::Get { key }),
        1 => Just(BucketOperation::NextSequence),
    ]
}

/// Strategy for generating a batch of bucket operations.
pub fn bucket_operations_strategy(max: usize) -> impl Strategy<Value = Vec<BucketOperation>> {
    prop::collection::vec(bucket_operation_strategy(), 0..max)
}
