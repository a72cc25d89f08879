// Base58Check addresses

use crate::core::{double_sha256, PubKeyHash, TxOutput};
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version byte prefixed to the public key hash
pub const ADDRESS_VERSION: u8 = 0x00;
const CHECKSUM_LEN: usize = 4;

/// Address: base58(version || pub key hash || checksum)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create address from public key hash
    pub fn from_pub_key_hash(hash: &PubKeyHash) -> Self {
        let mut payload = Vec::with_capacity(1 + hash.len() + CHECKSUM_LEN);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(hash);
        let checksum = checksum(&payload);
        payload.extend_from_slice(&checksum);

        Self(bs58::encode(payload).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the public key hash, checking version and checksum
    pub fn to_pub_key_hash(&self) -> Result<PubKeyHash> {
        let invalid = || LedgerError::InvalidAddress(self.0.clone());

        let payload = bs58::decode(&self.0).into_vec().map_err(|_| invalid())?;
        if payload.len() != 1 + 20 + CHECKSUM_LEN {
            return Err(invalid());
        }

        let (versioned, actual) = payload.split_at(payload.len() - CHECKSUM_LEN);
        if versioned[0] != ADDRESS_VERSION || checksum(versioned) != actual {
            return Err(invalid());
        }

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&versioned[1..]);
        Ok(hash)
    }
}

impl FromStr for Address {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let address = Self(s.to_string());
        address.to_pub_key_hash()?;
        Ok(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether `address` decodes with a valid version and checksum
pub fn validate_address(address: &str) -> bool {
    address.parse::<Address>().is_ok()
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = double_sha256(payload);
    let mut checksum = [0u8; CHECKSUM_LEN];
    checksum.copy_from_slice(&hash[..CHECKSUM_LEN]);
    checksum
}

impl TxOutput {
    /// Lock this output to the owner of `address`
    pub fn lock(&mut self, address: &Address) -> Result<()> {
        self.pub_key_hash = address.to_pub_key_hash()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trip() {
        let hash = [0x12; 20];
        let address = Address::from_pub_key_hash(&hash);

        assert!(validate_address(address.as_str()));
        assert_eq!(address.to_pub_key_hash().unwrap(), hash);
        assert_eq!(address.as_str().parse::<Address>().unwrap(), address);
    }

    #[test]
    fn test_version_zero_encodes_leading_one() {
        let address = Address::from_pub_key_hash(&[0xab; 20]);
        assert!(address.as_str().starts_with('1'));
    }

    #[test]
    fn test_rejects_bad_checksum() {
        let address = Address::from_pub_key_hash(&[7; 20]);
        let mut payload = bs58::decode(address.as_str()).into_vec().unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 1;
        let tampered = bs58::encode(payload).into_string();

        assert!(!validate_address(&tampered));
        assert!(matches!(
            tampered.parse::<Address>(),
            Err(LedgerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(!validate_address(""));
        assert!(!validate_address("0OIl"));
        assert!(!validate_address("1111"));
    }

    #[test]
    fn test_lock_output() {
        let address = Address::from_pub_key_hash(&[3; 20]);
        let mut output = TxOutput::new(5, [0; 20]);
        output.lock(&address).unwrap();
        assert!(output.is_locked_with_key(&[3; 20]));
    }
}
