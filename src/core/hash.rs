// Hashing utilities

use crate::core::{Hash256, PubKeyHash};
use sha2::{Digest, Sha256};

/// Single SHA256 hash, used for block hashes, transaction ids and Merkle nodes
pub fn sha256(data: &[u8]) -> Hash256 {
    Hash256::new(Sha256::digest(data).into())
}

/// SHA256(SHA256(data)) - address checksums
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// RIPEMD160(SHA256(data)) - public key hash
pub fn hash160(data: &[u8]) -> PubKeyHash {
    use ripemd::{Digest as RipemdDigest, Ripemd160};
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_double_sha256_differs_from_single() {
        assert_ne!(&double_sha256(b"hello world"), sha256(b"hello world").as_bytes());
    }

    #[test]
    fn test_hash160() {
        let hash = hash160(b"test data");
        assert_eq!(hash.len(), 20);
        assert_eq!(hash, hash160(b"test data"));
    }
}
