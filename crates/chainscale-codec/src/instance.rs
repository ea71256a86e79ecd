//! Codec instances: a value bound to the codec that encodes it.

use serde_json::Value as Json;
use std::fmt;

use crate::codec::CodecRef;
use crate::error::CodecError;
use crate::json::to_hex;
use crate::value::Value;

/// An encoded value paired with the type used to decode it. Immutable.
#[derive(Debug, Clone)]
pub struct TypedValue {
    codec: CodecRef,
    value: Value,
    encoded: Vec<u8>,
}

impl TypedValue {
    /// Decode `bytes` completely.
    pub fn decode(codec: CodecRef, bytes: &[u8]) -> Result<Self, CodecError> {
        let value = codec.decode_all(bytes)?;
        Ok(Self {
            codec,
            value,
            encoded: bytes.to_vec(),
        })
    }

    /// Decode from the front of `bytes`; returns the instance and bytes consumed.
    pub fn decode_prefix(codec: CodecRef, bytes: &[u8]) -> Result<(Self, usize), CodecError> {
        let (value, used) = codec.decode_prefix(bytes)?;
        let instance = Self {
            codec,
            value,
            encoded: bytes[..used].to_vec(),
        };
        Ok((instance, used))
    }

    /// Encode `value`; fails if its shape does not match `codec`.
    pub fn from_value(codec: CodecRef, value: Value) -> Result<Self, CodecError> {
        let encoded = codec.encode(&value)?;
        Ok(Self {
            codec,
            value,
            encoded,
        })
    }

    pub fn from_json(codec: CodecRef, json: &Json) -> Result<Self, CodecError> {
        let value = codec.from_json(json)?;
        Self::from_value(codec, value)
    }

    pub fn codec(&self) -> &CodecRef {
        &self.codec
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.encoded
    }

    pub fn byte_length(&self) -> usize {
        self.encoded.len()
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.encoded)
    }

    pub fn to_json(&self) -> Result<Json, CodecError> {
        self.codec.to_json(&self.value)
    }

    pub fn to_human(&self) -> Json {
        self.value.to_human()
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded && self.value == other.value
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
