// Error types for the ledger

use crate::core::Hash256;
use sled::transaction::TransactionError;
use thiserror::Error;

/// Errors produced by ledger operations
///
/// Setup errors (`StoreNotFound`, `StoreAlreadyExists`) and lookup misses are
/// recoverable by the caller. `CorruptEncoding` and `Storage` mean the store
/// itself is damaged or unreachable.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("No existing blockchain found. Create one first.")]
    StoreNotFound,

    #[error("Blockchain already exists.")]
    StoreAlreadyExists,

    #[error("Block not found: {0}")]
    BlockNotFound(Hash256),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Hash256),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(Hash256),

    #[error("Invalid block: {0}")]
    InvalidBlock(Hash256),

    #[error("A block needs at least one transaction")]
    EmptyBlock,

    #[error("Not enough funds: have {available}, need {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Output values overflow a u64")]
    ValueOverflow,

    #[error("Corrupt encoding: {0}")]
    CorruptEncoding(String),

    #[error("Database error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Mining cancelled")]
    MiningCancelled,

    #[error("Nonce space exhausted")]
    NonceExhausted,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Whether the caller can branch on this error instead of aborting
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LedgerError::StoreNotFound
                | LedgerError::StoreAlreadyExists
                | LedgerError::BlockNotFound(_)
                | LedgerError::TransactionNotFound(_)
                | LedgerError::InvalidTransaction(_)
                | LedgerError::InvalidBlock(_)
                | LedgerError::EmptyBlock
                | LedgerError::InsufficientFunds { .. }
                | LedgerError::MiningCancelled
                | LedgerError::InvalidAddress(_)
                | LedgerError::WalletNotFound(_)
        )
    }
}

impl From<TransactionError<LedgerError>> for LedgerError {
    fn from(e: TransactionError<LedgerError>) -> Self {
        match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => LedgerError::Storage(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
