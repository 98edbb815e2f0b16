//! Plain JSON encoding.

use crate::error::{CodecError, CodecResult};
use crate::Codec;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes values as JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn marshal<T: Serialize>(&self, value: &T) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CodecError::encoding_failed(self.name(), e.to_string()))
    }

    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::decoding_failed(self.name(), e.to_string()))
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
