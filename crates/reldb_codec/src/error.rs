//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("{codec} encoding failed: {message}")]
    EncodingFailed {
        /// Codec that failed.
        codec: &'static str,
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode bytes into a value.
    #[error("{codec} decoding failed: {message}")]
    DecodingFailed {
        /// Codec that failed.
        codec: &'static str,
        /// Description of the decoding error.
        message: String,
    },

    /// Encryption key has the wrong length.
    #[error("invalid encryption key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Required key length.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {message}")]
    KeyDerivationFailed {
        /// Description of the failure.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Ciphertext is truncated, tampered with, or was sealed with another key.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(codec: &'static str, message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            codec,
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(codec: &'static str, message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            codec,
            message: message.into(),
        }
    }

    /// Create a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }
}
