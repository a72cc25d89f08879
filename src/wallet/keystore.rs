// Key management

use crate::core::{hash160, PubKeyHash};
use crate::error::{LedgerError, Result};
use crate::wallet::Address;
use p256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// What the ledger needs from a key owner when building and signing
pub trait KeyHolder {
    /// Uncompressed SEC1 public key
    fn public_key(&self) -> Vec<u8>;
    fn signing_key(&self) -> &SigningKey;
    fn pub_key_hash(&self) -> PubKeyHash {
        hash160(&self.public_key())
    }
}

/// P-256 key pair
#[derive(Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    public_key: Vec<u8>,
}

impl Wallet {
    /// Generate a new key pair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Create from secret key bytes
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|e| LedgerError::Signing(format!("invalid secret key: {}", e)))?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        Self {
            signing_key,
            public_key,
        }
    }

    pub fn secret_bytes(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    pub fn address(&self) -> Address {
        Address::from_pub_key_hash(&self.pub_key_hash())
    }
}

impl KeyHolder for Wallet {
    fn public_key(&self) -> Vec<u8> {
        self.public_key.clone()
    }

    fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

/// Serializable key pair (for storage)
#[derive(Serialize, Deserialize)]
struct StoredWallet {
    secret_key: String,
}

#[derive(Serialize, Deserialize, Default)]
struct StoredWallets {
    wallets: HashMap<Address, StoredWallet>,
}

/// Wallets - every key pair of one node, persisted as JSON
#[derive(Default)]
pub struct Wallets {
    wallets: HashMap<Address, Wallet>,
}

impl Wallets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a key pair and return its address
    pub fn create_wallet(&mut self) -> Address {
        let wallet = Wallet::generate();
        let address = wallet.address();
        self.wallets.insert(address.clone(), wallet);
        address
    }

    pub fn get_wallet(&self, address: &Address) -> Result<&Wallet> {
        self.wallets
            .get(address)
            .ok_or_else(|| LedgerError::WalletNotFound(address.to_string()))
    }

    /// Addresses in sorted order
    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.wallets.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Save wallets to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let stored = StoredWallets {
            wallets: self
                .wallets
                .iter()
                .map(|(address, wallet)| {
                    (
                        address.clone(),
                        StoredWallet {
                            secret_key: hex::encode(wallet.secret_bytes()),
                        },
                    )
                })
                .collect(),
        };

        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| LedgerError::Config(format!("failed to serialize wallets: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path.as_ref(), json)?;

        log::debug!("Saved {} wallets to {}", self.len(), path.as_ref().display());
        Ok(())
    }

    /// Load wallets from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let stored: StoredWallets = serde_json::from_str(&json)
            .map_err(|e| LedgerError::Config(format!("failed to parse wallet file: {}", e)))?;

        let mut wallets = HashMap::new();
        for (address, entry) in stored.wallets {
            let secret = hex::decode(&entry.secret_key)
                .map_err(|e| LedgerError::Config(format!("invalid secret key for {}: {}", address, e)))?;
            let wallet = Wallet::from_secret_bytes(&secret)?;

            if wallet.address() != address {
                return Err(LedgerError::InvalidAddress(address.to_string()));
            }
            wallets.insert(address, wallet);
        }

        Ok(Self { wallets })
    }

    /// Load the wallet file, or start empty when it does not exist yet
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }
}
