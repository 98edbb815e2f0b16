//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A bucket on the requested path does not exist.
    #[error("bucket not found: {path}")]
    BucketNotFound {
        /// Display form of the bucket path.
        path: String,
    },

    /// A key that should hold a value holds a nested bucket, or vice versa.
    #[error("incompatible value at {path}: {message}")]
    IncompatibleValue {
        /// Display form of the bucket path.
        path: String,
        /// What was expected.
        message: String,
    },

    /// Keys must not be empty.
    #[error("empty key")]
    EmptyKey,

    /// The commit log is corrupted.
    #[error("commit log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Byte offset of the bad frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A log frame could not be encoded or decoded.
    #[error("log frame encoding failed: {0}")]
    Encoding(String),

    /// The store is closed.
    #[error("store is closed")]
    Closed,
}

impl StorageError {
    /// Creates a bucket-not-found error from a bucket path.
    pub fn bucket_not_found(path: &[Vec<u8>]) -> Self {
        Self::BucketNotFound {
            path: display_path(path),
        }
    }

    /// Creates an incompatible-value error for a bucket path.
    pub fn incompatible(path: &[Vec<u8>], message: impl Into<String>) -> Self {
        Self::IncompatibleValue {
            path: display_path(path),
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }
}

/// Renders a bucket path as `a/b/c` for error messages.
pub(crate) fn display_path(path: &[Vec<u8>]) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.iter()
        .map(|segment| String::from_utf8_lossy(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
