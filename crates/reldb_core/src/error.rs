//! Error types for reldb core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in reldb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Ordered store error.
    #[error("storage error: {0}")]
    Storage(#[from] reldb_storage::StorageError),

    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] reldb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A required bucket is missing; the store was not initialized or is damaged.
    #[error("store not initialized: missing bucket {bucket}")]
    NotInitialized {
        /// Name of the missing bucket.
        bucket: String,
    },

    /// No entry with the given ID, or no entry matched the filters.
    #[error("entry not found{}", .id.as_deref().map(|id| format!(": {id}")).unwrap_or_default())]
    EntryNotFound {
        /// The ID looked up, if the lookup was by ID.
        id: Option<String>,
    },

    /// The relationship key is not configured for this store.
    #[error("relationship not found: {key}")]
    RelationshipNotFound {
        /// The unknown key.
        key: String,
    },

    /// Another process holds the store directory lock.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The filter set is not usable for this operation.
    #[error("invalid filters: {message}")]
    InvalidFilters {
        /// What is wrong with the filters.
        message: String,
    },

    /// An entry's relationship slots do not line up with the configured keys.
    #[error("invalid relationships: expected {expected} slots, got {actual}")]
    InvalidRelationships {
        /// Number of configured relationship keys.
        expected: usize,
        /// Number of slots on the entry.
        actual: usize,
    },

    /// Encryption key has the wrong length.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected key size.
        expected: usize,
        /// Actual key size.
        actual: usize,
    },

    /// The context was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// A touch context was left idle for longer than its idle timeout.
    #[error("transaction idle timeout")]
    TouchTimeout,

    /// A cursor has no further entries in the requested direction.
    ///
    /// This is an end-of-sequence signal, not a fault. It is only returned
    /// by raw cursor calls; iteration helpers absorb it.
    #[error("cursor exhausted")]
    Exhausted,

    /// A write was attempted on a read-only mirror.
    #[error("cannot write to a mirror store")]
    MirrorWriteAttempted,

    /// The call succeeded but shared a batch with a failing call.
    #[error("batch failed: another call in the same batch returned an error")]
    BatchGroupFailed,

    /// A batch ran but could not be committed.
    #[error("batch commit failed: {message}")]
    BatchCommitFailed {
        /// The underlying failure.
        message: String,
    },

    /// A transaction function panicked.
    #[error("transaction function panicked: {message}")]
    Panicked {
        /// The panic payload, when it was a string.
        message: String,
    },

    /// The store or transaction is closed.
    #[error("store is closed")]
    Closed,

    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of what went wrong.
        message: String,
    },
}

impl CoreError {
    /// Creates a not-initialized error.
    pub fn not_initialized(bucket: impl Into<String>) -> Self {
        Self::NotInitialized {
            bucket: bucket.into(),
        }
    }

    /// Creates an entry-not-found error for an ID lookup.
    pub fn entry_not_found(id: impl Into<String>) -> Self {
        Self::EntryNotFound {
            id: Some(id.into()),
        }
    }

    /// Creates an entry-not-found error for a filtered lookup with no match.
    pub fn no_match() -> Self {
        Self::EntryNotFound { id: None }
    }

    /// Creates a relationship-not-found error.
    pub fn relationship_not_found(key: impl Into<String>) -> Self {
        Self::RelationshipNotFound { key: key.into() }
    }

    /// Creates an invalid-filters error.
    pub fn invalid_filters(message: impl Into<String>) -> Self {
        Self::InvalidFilters {
            message: message.into(),
        }
    }

    /// Creates a panicked error.
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::Panicked {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for "entry not found" and "relationship not found".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EntryNotFound { .. } | Self::RelationshipNotFound { .. }
        )
    }

    /// Returns true for the cursor end-of-sequence signal.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    /// Returns true for cancellation, deadline and idle-timeout errors.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::DeadlineExceeded | Self::TouchTimeout
        )
    }
}

impl CoreError {
    /// Converts a codec error, lifting key size failures to [`CoreError::InvalidKeySize`].
    pub(crate) fn from_key_error(err: reldb_codec::CodecError) -> Self {
        match err {
            reldb_codec::CodecError::InvalidKeySize { expected, actual } => {
                Self::InvalidKeySize { expected, actual }
            }
            other => Self::Codec(other),
        }
    }
}
