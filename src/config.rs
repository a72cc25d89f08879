// Ledger configuration

use crate::consensus::{ProofOfWork, DEFAULT_TARGET_BITS};
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Reward paid by every coinbase transaction
pub const DEFAULT_SUBSIDY: u64 = 10;

pub const GENESIS_COINBASE_DATA: &str =
    "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

/// Settings shared by every component of one ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory of the sled database
    pub data_dir: PathBuf,
    /// Wallet file name, relative to `data_dir`
    pub wallet_file: PathBuf,
    /// Fixed proof-of-work difficulty
    pub target_bits: u32,
    pub subsidy: u64,
    pub genesis_coinbase_data: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wallet_file: PathBuf::from("wallet.json"),
            target_bits: DEFAULT_TARGET_BITS,
            subsidy: DEFAULT_SUBSIDY,
            genesis_coinbase_data: GENESIS_COINBASE_DATA.to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref()).map_err(|e| {
            LedgerError::Config(format!("failed to read {}: {}", path.as_ref().display(), e))
        })?;

        let config: Self = serde_json::from_str(&json)
            .map_err(|e| LedgerError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;

        log::info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=255).contains(&self.target_bits) {
            return Err(LedgerError::Config(format!(
                "target_bits must be within 1..=255, got {}",
                self.target_bits
            )));
        }
        Ok(())
    }

    pub fn pow(&self) -> ProofOfWork {
        ProofOfWork::new(self.target_bits)
    }

    pub fn wallet_path(&self) -> PathBuf {
        self.data_dir.join(&self.wallet_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.target_bits, 16);
        assert_eq!(config.subsidy, 10);
        assert_eq!(config.wallet_path(), PathBuf::from("./data/wallet.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LedgerConfig = serde_json::from_str(r#"{"target_bits": 8}"#).unwrap();
        assert_eq!(config.target_bits, 8);
        assert_eq!(config.subsidy, DEFAULT_SUBSIDY);
        assert_eq!(config.genesis_coinbase_data, GENESIS_COINBASE_DATA);
    }

    #[test]
    fn test_rejects_out_of_range_difficulty() {
        let config = LedgerConfig {
            target_bits: 0,
            ..LedgerConfig::default()
        };
        assert!(matches!(config.validate(), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("ledger-config-{}.json", std::process::id()));
        fs::write(&path, r#"{"subsidy": 25, "data_dir": "/tmp/ledger"}"#).unwrap();

        let config = LedgerConfig::load(&path).unwrap();
        assert_eq!(config.subsidy, 25);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ledger"));

        fs::remove_file(&path).unwrap();
    }
}
