//! Canonical JSON, digests and worker message encoding.

use std::collections::BTreeMap;
use std::iter::FromIterator;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};

use crate::errors::{ErrorInfo, TrajError};

fn serde_error(code: &str, err: impl ToString) -> TrajError {
    TrajError::Serde(ErrorInfo::new(code, err.to_string()))
}

fn canonicalize(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let ordered = map
                .into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect::<BTreeMap<_, _>>();
            JsonValue::Object(Map::from_iter(ordered))
        }
        JsonValue::Array(values) => {
            let canonical_values = values.into_iter().map(canonicalize).collect();
            JsonValue::Array(canonical_values)
        }
        other => other,
    }
}

/// Serializes a value into canonical JSON bytes with deterministic ordering.
///
/// Non-finite floats inside a [`crate::Value`] are written as tagged strings.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, TrajError> {
    let value = serde_json::to_value(value).map_err(|err| serde_error("json_serialize", err))?;
    let canonical = canonicalize(value);
    let mut bytes = Vec::new();
    serde_json::to_writer(&mut bytes, &canonical).map_err(|err| serde_error("json_write", err))?;
    Ok(bytes)
}

/// Deserializes a value from JSON bytes.
pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, TrajError> {
    serde_json::from_slice(data).map_err(|err| serde_error("json_deserialize", err))
}

/// Computes a stable hexadecimal hash for the provided serializable payload.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, TrajError> {
    let bytes = to_canonical_json_bytes(value)?;
    let digest = Sha256::digest(bytes);
    Ok(format!("{:x}", digest))
}

/// Encodes a message crossing the worker boundary.
pub fn to_message_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, TrajError> {
    bincode::serialize(value).map_err(|err| serde_error("message_encode", err))
}

/// Decodes a message produced by [`to_message_bytes`].
pub fn from_message_bytes<T: DeserializeOwned>(data: &[u8]) -> Result<T, TrajError> {
    bincode::deserialize(data).map_err(|err| serde_error("message_decode", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_bytes_ignore_key_order() {
        let a = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = json!({"a": {"x": 3, "y": 2}, "b": 1});
        assert_eq!(
            to_canonical_json_bytes(&a).unwrap(),
            to_canonical_json_bytes(&b).unwrap()
        );
        assert_eq!(stable_hash_string(&a).unwrap(), stable_hash_string(&b).unwrap());
    }
}
