//! SHA-256 hashing helpers shared by transactions, blocks and the Merkle tree.
//!
//! Structured values are hashed through `serde_json::Value`, whose object
//! maps are `BTreeMap`s, so keys always come out sorted and two equal maps
//! built in different insertion orders produce the same digest.

use crate::error::{ChainError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub type HexHash = String;

/// SHA-256 of raw bytes as lowercase hex.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> HexHash {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// Serialize `value` to canonical JSON: sorted keys, compact separators.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)
        .map_err(|e| ChainError::Serialization(format!("Canonicalization failed: {}", e)))?;
    serde_json::to_string(&value)
        .map_err(|e| ChainError::Serialization(format!("Canonicalization failed: {}", e)))
}

/// Hash a structured value in canonical form.
pub fn hash_canonical<T: Serialize + ?Sized>(value: &T) -> Result<HexHash> {
    Ok(sha256_hex(canonical_json(value)?))
}

/// Hash a sequence. Element order is significant; keys inside elements are sorted.
pub fn hash_list<T: Serialize>(items: &[T]) -> Result<HexHash> {
    hash_canonical(items)
}

/// Hash of the concatenated hex strings. Used for Merkle parents.
pub fn combine_hashes(hashes: &[&str]) -> HexHash {
    let mut hasher = Sha256::new();
    for h in hashes {
        hasher.update(h.as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn verify_hash(data: impl AsRef<[u8]>, expected: &str) -> bool {
    sha256_hex(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_canonical_hash_ignores_key_order() {
        let mut a = serde_json::Map::new();
        a.insert("zeta".into(), json!(1));
        a.insert("alpha".into(), json!({"y": 2, "x": [1, 2]}));

        let mut b = serde_json::Map::new();
        b.insert("alpha".into(), json!({"x": [1, 2], "y": 2}));
        b.insert("zeta".into(), json!(1));

        assert_eq!(hash_canonical(&a).unwrap(), hash_canonical(&b).unwrap());
        assert_eq!(canonical_json(&a).unwrap(), r#"{"alpha":{"x":[1,2],"y":2},"zeta":1}"#);
    }

    #[test]
    fn test_hash_list_is_order_sensitive() {
        let forward = hash_list(&["a", "b"]).unwrap();
        let reverse = hash_list(&["b", "a"]).unwrap();
        assert_ne!(forward, reverse);
    }

    #[test]
    fn test_combine_matches_concatenation() {
        assert_eq!(combine_hashes(&["ab", "cd"]), sha256_hex("abcd"));
        assert_ne!(combine_hashes(&["ab", "cd"]), combine_hashes(&["cd", "ab"]));
    }

    #[test]
    fn test_verify_hash() {
        let digest = sha256_hex("ledger");
        assert!(verify_hash("ledger", &digest));
        assert!(!verify_hash("ledger!", &digest));
    }
}
