//! Plan fingerprints.
//!
//! A fingerprint is the blake3 digest of a plan snapshot's JSON form. Every
//! map in the plan model is a `BTreeMap`, so equal plans serialize to equal
//! bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// Lowercase hex, as recorded in run manifests.
    pub fn to_hex(&self) -> String {
        self.0.iter().fold(String::with_capacity(64), |mut s, b| {
            use fmt::Write as _;
            let _ = write!(s, "{b:02x}");
            s
        })
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    Hash256(*blake3::hash(bytes).as_bytes())
}

/// Digest of `value` serialized as JSON.
pub fn hash_serde<T: Serialize>(value: &T) -> Result<Hash256> {
    let json = serde_json::to_vec(value).map_err(|e| Error::Hash(e.to_string()))?;
    Ok(hash_bytes(&json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_hex_is_64_lowercase_chars() {
        let hex = hash_bytes(b"JOIN(L1,L2)").to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_map_insertion_order_does_not_change_fingerprint() {
        let mut a = BTreeMap::new();
        a.insert("rows", 10);
        a.insert("cost", 3);
        let mut b = BTreeMap::new();
        b.insert("cost", 3);
        b.insert("rows", 10);
        assert_eq!(hash_serde(&a).unwrap(), hash_serde(&b).unwrap());

        b.insert("rows", 11);
        assert_ne!(hash_serde(&a).unwrap(), hash_serde(&b).unwrap());
    }
}
