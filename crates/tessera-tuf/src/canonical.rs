//! Canonical JSON encoding and content digests.
//!
//! Signed bodies are hashed and signed over their canonical form (sorted
//! keys, minimal whitespace, deterministic number formatting) so that the
//! hash references recorded in snapshot match byte-exactly across
//! implementations.

use olpc_cjson::CanonicalFormatter;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::TufError;

/// Serialize a value to canonical JSON bytes.
pub fn to_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, TufError> {
    let mut bytes = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut bytes, CanonicalFormatter::new());
    value.serialize(&mut ser)?;
    Ok(bytes)
}

/// Compute the SHA-256 hex digest of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_sorts_keys() {
        let value = serde_json::json!({ "zebra": 1, "apple": 2, "mango": { "b": 1, "a": 2 } });
        let bytes = to_canonical_json(&value).expect("canonicalize");
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"apple":2,"mango":{"a":2,"b":1},"zebra":1}"#
        );
    }

    #[test]
    fn canonical_is_stable() {
        let value = serde_json::json!({ "k": ["a", "b"], "n": 42 });
        let one = to_canonical_json(&value).unwrap();
        let two = to_canonical_json(&value).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn sha256_known_value() {
        // SHA-256 of the empty string
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
