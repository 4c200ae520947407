//! Canonical JSON hashing.
//!
//! Every integrity guarantee in magistrate bottoms out here: ledger chain
//! links, promoted canon hashes, and export manifests all hash the canonical
//! serialization produced by this module. Canonicalization recursively sorts
//! object keys (arrays keep their order), so two semantically equal values
//! hash identically regardless of key insertion order.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

fn normalize(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), normalize(&obj[key]));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Serializes a JSON value with recursively sorted object keys.
pub fn canonical_json(value: &Value) -> String {
    // Serializing a Value cannot fail; the normalized tree contains no
    // non-string map keys.
    serde_json::to_string(&normalize(value)).unwrap_or_default()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash of a canonical JSON rendering of `value`.
pub fn hash_value(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// Ledger chain hash: `sha256(prev_hash + "\n" + content)`, with the empty
/// string standing in for a missing predecessor on the genesis entry.
pub fn chain_hash(prev: Option<&str>, content: &str) -> String {
    sha256_hex(format!("{}\n{}", prev.unwrap_or(""), content).as_bytes())
}
