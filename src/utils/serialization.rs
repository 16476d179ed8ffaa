// src/utils/serialization.rs
//! Serialization utilities for credential segments.
//!
//! Provides:
//! - JSON serialization/deserialization helpers
//! - Unpadded base64url encoding used by compact credential tokens

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// Serializes a value to a JSON string.
pub fn serialize<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

/// Deserializes a value from a JSON string.
pub fn deserialize<T: DeserializeOwned>(data: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

/// Encodes raw bytes as unpadded base64url.
pub fn base64url_encode(data: &[u8]) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

/// Decodes unpadded base64url.
pub fn base64url_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::decode_config(data, base64::URL_SAFE_NO_PAD)
}

/// Serializes `data` to JSON and base64url-encodes it as one token segment.
pub fn encode_section<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    Ok(base64url_encode(serialize(data)?.as_bytes()))
}

/// Inserts `key` into a JSON object only when `value` is present.
///
/// Mirrors how optional fields are left out of signed payloads rather
/// than serialized as `null`.
pub fn insert_opt<T: Serialize>(
    map: &mut Map<String, Value>,
    key: &str,
    value: Option<T>,
) -> Result<(), serde_json::Error> {
    if let Some(value) = value {
        map.insert(key.to_string(), serde_json::to_value(value)?);
    }
    Ok(())
}
