//! Compact CBOR encoding.

use crate::error::{CodecError, CodecResult};
use crate::Codec;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes values as CBOR via `ciborium`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl Codec for CborCodec {
    fn marshal<T: Serialize>(&self, value: &T) -> CodecResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(value, &mut bytes)
            .map_err(|e| CodecError::encoding_failed(self.name(), e.to_string()))?;
        Ok(bytes)
    }

    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(self.name(), e.to_string()))
    }

    fn name(&self) -> &'static str {
        "cbor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn map_round_trip() {
        let mut map = BTreeMap::new();
        map.insert("users".to_string(), vec!["u1".to_string(), "u2".to_string()]);
        let bytes = CborCodec.marshal(&map).unwrap();
        let back: BTreeMap<String, Vec<String>> = CborCodec.unmarshal(&bytes).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn truncated_input_fails() {
        let bytes = CborCodec.marshal(&"a fairly long string value").unwrap();
        let result: CodecResult<String> = CborCodec.unmarshal(&bytes[..bytes.len() - 3]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { codec: "cbor", .. })));
    }
}
