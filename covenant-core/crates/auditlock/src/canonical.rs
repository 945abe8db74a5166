//! Canonical JSON encoding used everywhere hashing is involved.
//!
//! The canonical form is UTF-8, keys sorted lexicographically, no
//! insignificant whitespace, numbers in serde_json's shortest round-trip
//! form. The indented on-disk form produced by [`pretty_bytes`] may diverge
//! from the hashed form; hashes are always computed over [`canonical_bytes`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crypto_primitives::sha256_hex;

/// Normalize a JSON value: sort every object's keys recursively.
pub fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut sorted = BTreeMap::new();
            for (key, val) in obj {
                sorted.insert(key.clone(), canonical_value(val));
            }
            let mut result = Map::new();
            for (key, val) in sorted {
                result.insert(key, val);
            }
            Value::Object(result)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonical_value).collect()),
        _ => value.clone(),
    }
}

/// Serialize to compact canonical bytes (the hashing input form).
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(&canonical_value(value)).expect("canonical JSON values always serialize")
}

/// Canonical form as a string, one logical line.
pub fn canonical_string(value: &Value) -> String {
    serde_json::to_string(&canonical_value(value)).expect("canonical JSON values always serialize")
}

/// Serialize to the indented on-disk form: sorted keys, two-space indent.
pub fn pretty_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec_pretty(&canonical_value(value))
        .expect("canonical JSON values always serialize")
}

/// SHA-256 (lowercase hex) of the canonical encoding of `value`.
pub fn sha256_of_value(value: &Value) -> String {
    sha256_hex(&canonical_bytes(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_recursively() {
        let value = json!({
            "z_key": {"inner_z": 1, "inner_a": 2},
            "a_key": "first"
        });

        let encoded = String::from_utf8(canonical_bytes(&value)).unwrap();
        assert_eq!(
            encoded,
            r#"{"a_key":"first","z_key":{"inner_a":2,"inner_z":1}}"#
        );
    }

    #[test]
    fn test_arrays_keep_order() {
        let value = json!({"list": [3, 1, 2]});
        let encoded = String::from_utf8(canonical_bytes(&value)).unwrap();
        assert_eq!(encoded, r#"{"list":[3,1,2]}"#);
    }

    #[test]
    fn test_hash_independent_of_presentation_order() {
        let a = json!({"x": 1, "y": {"b": 2, "a": 3}});
        let b = json!({"y": {"a": 3, "b": 2}, "x": 1});
        assert_eq!(sha256_of_value(&a), sha256_of_value(&b));
    }

    #[test]
    fn test_pretty_form_diverges_but_same_value() {
        let value = json!({"b": 1, "a": 2});
        let pretty = pretty_bytes(&value);
        let compact = canonical_bytes(&value);
        assert_ne!(pretty, compact);

        let reparsed: Value = serde_json::from_slice(&pretty).unwrap();
        assert_eq!(sha256_of_value(&reparsed), sha256_of_value(&value));
    }
}
