// Minimal UTXO ledger
// Proof-of-work block chain with P-256 signed transactions and a UTXO index

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod wallet;

// Re-exports for convenience
pub use cli::{Cli, CliHandler};
pub use config::LedgerConfig;
pub use consensus::ProofOfWork;
pub use crate::core::{Block, Hash256, PubKeyHash, Transaction, TxInput, TxOutput};
pub use error::{LedgerError, Result};
pub use network::Node;
pub use storage::{AddBlockOutcome, Blockchain, OutPoint, Storage, UtxoSet};
pub use wallet::{Address, KeyHolder, TransactionBuilder, Wallet, Wallets};
