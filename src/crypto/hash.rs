//! Hashing utilities
//!
//! SHA-256 helpers used for identity derivation and call selectors.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// First four bytes of the SHA-256 of a call signature
///
/// `selector("updateOwner(address,bool)")` identifies the call in an
/// encoded payload.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = sha256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        let hash = sha256(data);
        assert_eq!(hash.len(), 32);
        assert_eq!(
            sha256_hex(data),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_selector_is_hash_prefix() {
        let sig = "confirm(uint64)";
        let hash = sha256(sig.as_bytes());
        assert_eq!(selector(sig), [hash[0], hash[1], hash[2], hash[3]]);
        assert_ne!(selector(sig), selector("execute(uint64)"));
    }
}
