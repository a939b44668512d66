//! Serialization policy for cached values.
//!
//! Values are stored as bytes. Structured values go in as JSON, text goes in
//! verbatim, and anything else is an opaque binary payload behind a marker so
//! reads can tell it apart from text. Decoding tries the binary marker, then
//! JSON, then UTF-8 text, and finally hands back the raw bytes.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::traits::KvError;

/// Prefix for opaque binary payloads. Never valid leading JSON or typical text.
const BINARY_MARKER: &[u8] = b"\x00tcbin\x01";

/// A value read from or written to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// Structured value, stored as JSON.
    Json(Value),
    /// Plain text, stored verbatim.
    Text(String),
    /// Opaque binary payload, stored behind the binary marker.
    Binary(Vec<u8>),
    /// Bytes exactly as stored; produced when auto-deserialization is off.
    Raw(Vec<u8>),
}

impl CacheValue {
    /// Build a value from any serializable type: JSON when representable,
    /// otherwise a bincode payload.
    pub fn serialized<T: Serialize>(value: &T) -> Result<Self, KvError> {
        match serde_json::to_value(value) {
            Ok(json) => Ok(CacheValue::Json(json)),
            Err(_) => bincode::serde::encode_to_vec(value, bincode::config::standard())
                .map(CacheValue::Binary)
                .map_err(|e| KvError::Serialization(e.to_string())),
        }
    }

    /// Bytes to hand to the store.
    pub fn encode(&self) -> Result<Vec<u8>, KvError> {
        match self {
            CacheValue::Json(value) => {
                serde_json::to_vec(value).map_err(|e| KvError::Serialization(e.to_string()))
            }
            CacheValue::Text(text) => Ok(text.as_bytes().to_vec()),
            CacheValue::Binary(bytes) => {
                let mut out = Vec::with_capacity(BINARY_MARKER.len() + bytes.len());
                out.extend_from_slice(BINARY_MARKER);
                out.extend_from_slice(bytes);
                Ok(out)
            }
            CacheValue::Raw(bytes) => Ok(bytes.clone()),
        }
    }

    /// Interpret stored bytes.
    ///
    /// Text that happens to be valid JSON (e.g. `"42"`) decodes as JSON.
    pub fn decode(bytes: Vec<u8>, auto_deserialize: bool) -> Self {
        if !auto_deserialize {
            return CacheValue::Raw(bytes);
        }
        if let Some(payload) = bytes.strip_prefix(BINARY_MARKER) {
            return CacheValue::Binary(payload.to_vec());
        }
        if let Ok(json) = serde_json::from_slice::<Value>(&bytes) {
            return CacheValue::Json(json);
        }
        match String::from_utf8(bytes) {
            Ok(text) => CacheValue::Text(text),
            Err(e) => CacheValue::Raw(e.into_bytes()),
        }
    }

    /// Decode into a typed value.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, KvError> {
        match self {
            CacheValue::Json(value) => {
                serde_json::from_value(value).map_err(|e| KvError::Serialization(e.to_string()))
            }
            CacheValue::Text(text) => serde_json::from_value(Value::String(text))
                .map_err(|e| KvError::Serialization(e.to_string())),
            CacheValue::Binary(bytes) => {
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                    .map(|(value, _)| value)
                    .map_err(|e| KvError::Serialization(e.to_string()))
            }
            CacheValue::Raw(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| KvError::Serialization(e.to_string()))
            }
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            CacheValue::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for CacheValue {
    fn from(value: Value) -> Self {
        CacheValue::Json(value)
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::Text(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(value: Vec<u8>) -> Self {
        CacheValue::Binary(value)
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Json(Value::from(value))
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        CacheValue::Json(Value::Bool(value))
    }
}
