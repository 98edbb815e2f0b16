//! # reldb Codec
//!
//! Value encoders for reldb entries.
//!
//! The engine never looks inside stored values; it hands them to a [`Codec`]
//! chosen when the store is opened.
//!
//! - [`JsonCodec`] - plain JSON (the default)
//! - [`CborCodec`] - compact binary CBOR
//! - [`EncryptedCodec`] - AES-256-GCM sealing around another codec
//!
//! ## Usage
//!
//! ```
//! use reldb_codec::{Codec, JsonCodec};
//!
//! let bytes = JsonCodec.marshal(&vec!["a", "b"]).unwrap();
//! let back: Vec<String> = JsonCodec.unmarshal(&bytes).unwrap();
//! assert_eq!(back, ["a", "b"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod encrypted;
mod error;
mod json;

pub use cbor::CborCodec;
pub use encrypted::{EncryptedCodec, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{CodecError, CodecResult};
pub use json::JsonCodec;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Turns values into bytes and back.
pub trait Codec: Send + Sync + 'static {
    /// Encodes a value.
    fn marshal<T: Serialize>(&self, value: &T) -> CodecResult<Vec<u8>>;

    /// Decodes a value.
    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T>;

    /// Short name used in errors and logs.
    fn name(&self) -> &'static str;
}
