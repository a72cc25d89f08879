// Wallet and transaction building

mod address;
mod keystore;
mod tx_builder;

pub use address::{validate_address, Address, ADDRESS_VERSION};
pub use keystore::{KeyHolder, Wallet, Wallets};
pub use tx_builder::TransactionBuilder;
