//! Error types for BucketSQL core.

use bucketsql_codec::{BucketId, CodecError};
use bucketsql_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in BucketSQL core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required bucket does not exist.
    #[error("bucket not found: {bucket}")]
    NotFound {
        /// The bucket that was looked up.
        bucket: BucketId,
    },

    /// A bucket was created on a path that is already materialized.
    #[error("bucket already exists: {bucket}")]
    AlreadyExists {
        /// The bucket that was being created.
        bucket: BucketId,
    },

    /// The relational backend failed.
    #[error("storage error while {context}: {source}")]
    Storage {
        /// What was being done when the backend failed.
        context: String,
        /// The backend failure.
        #[source]
        source: StorageError,
    },

    /// Operation not permitted in the current transaction or cursor state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A catalog row could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Invalid database format or version.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// The operation is not supported by this backend.
    #[error("operation not supported: {operation}")]
    Unsupported {
        /// Name of the operation.
        operation: &'static str,
    },
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(bucket: &BucketId) -> Self {
        Self::NotFound {
            bucket: bucket.clone(),
        }
    }

    /// Creates an already exists error.
    pub fn already_exists(bucket: &BucketId) -> Self {
        Self::AlreadyExists {
            bucket: bucket.clone(),
        }
    }

    /// Creates a storage error with operation context.
    pub fn storage(context: impl Into<String>, source: impl Into<StorageError>) -> Self {
        Self::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns true for [`CoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for [`CoreError::AlreadyExists`].
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Attaches operation context to backend results.
pub(crate) trait StorageContext<T> {
    /// Wraps an error in [`CoreError::Storage`] with the given context.
    fn storage_context<C, F>(self, context: F) -> CoreResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> StorageContext<T> for Result<T, E>
where
    E: Into<StorageError>,
{
    fn storage_context<C, F>(self, context: F) -> CoreResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|err| CoreError::storage(context(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_carries_context() {
        let failed: Result<(), rusqlite::Error> = Err(rusqlite::Error::QueryReturnedNoRows);
        let err = failed.storage_context(|| "reading sequence").unwrap_err();
        assert!(err.to_string().starts_with("storage error while reading sequence"));
    }

    #[test]
    fn display_uses_table_name_form() {
        let err = CoreError::not_found(&BucketId::root(b"acct"));
        assert_eq!(err.to_string(), "bucket not found: bkt-acct");
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
    }
}
