//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding bucket identifiers.
///
/// Encoding is total; only bytes read back from storage can be malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A length prefix was not written in its shortest form.
    #[error("non-canonical length prefix: {value} encoded in {width} bytes")]
    NonCanonicalLength {
        /// The decoded value.
        value: u64,
        /// The number of bytes used to encode it.
        width: usize,
    },

    /// A length prefix does not fit the platform's address space.
    #[error("integer overflow")]
    IntegerOverflow,

    /// A bucket identifier with no segments.
    #[error("empty bucket identifier")]
    EmptyIdentifier,

    /// A string that is not a valid generated table name.
    #[error("invalid table name {name:?}: {message}")]
    InvalidTableName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid table name error.
    pub fn invalid_table_name(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTableName {
            name: name.into(),
            message: message.into(),
        }
    }
}
