// Transaction builder

use crate::core::{Transaction, TxInput, TxOutput};
use crate::error::{LedgerError, Result};
use crate::storage::{OutPoint, UtxoSet};
use crate::wallet::{Address, KeyHolder, Wallets};

/// Builds signed payments from the UTXO set
pub struct TransactionBuilder<'a> {
    wallets: &'a Wallets,
    utxo_set: &'a UtxoSet<'a>,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(wallets: &'a Wallets, utxo_set: &'a UtxoSet<'a>) -> Self {
        Self { wallets, utxo_set }
    }

    /// Build a signed transaction paying `amount` from `from` to `to`
    pub fn build(&self, from: &Address, to: &Address, amount: u64) -> Result<Transaction> {
        let wallet = self.wallets.get_wallet(from)?;
        self.build_with(wallet, to, amount)
    }

    /// Build and sign with any key holder.
    ///
    /// Outputs are picked first-fit from the UTXO set. Whatever the
    /// selection holds beyond `amount` goes back to the sender as change.
    pub fn build_with<K: KeyHolder>(&self, key: &K, to: &Address, amount: u64) -> Result<Transaction> {
        let sender = key.pub_key_hash();
        let (available, outpoints) = self.utxo_set.find_spendable_outputs(&sender, amount)?;

        if available < amount || outpoints.is_empty() {
            return Err(LedgerError::InsufficientFunds {
                available,
                required: amount,
            });
        }

        let public_key = key.public_key();
        let inputs: Vec<TxInput> = outpoints
            .iter()
            .map(|outpoint| TxInput::new(outpoint.txid, outpoint.vout, public_key.clone()))
            .collect();

        let mut payment = TxOutput::new(amount, [0; 20]);
        payment.lock(to)?;
        let mut outputs = vec![payment];

        let change = available - amount;
        if change > 0 {
            outputs.push(TxOutput::new(change, sender));
        }

        let mut tx = Transaction::new(inputs, outputs);
        self.utxo_set
            .blockchain()
            .sign_transaction(&mut tx, key.signing_key())?;

        log::debug!(
            "Built transaction {} spending {} outputs ({} change)",
            tx.id,
            outpoints.len(),
            change
        );
        Ok(tx)
    }

    /// Get balance for address
    pub fn get_balance(&self, address: &Address) -> Result<u64> {
        self.utxo_set.get_balance(&address.to_pub_key_hash()?)
    }

    /// List UTXOs for address
    pub fn list_utxos(&self, address: &Address) -> Result<Vec<(OutPoint, TxOutput)>> {
        self.utxo_set.find_unspent(&address.to_pub_key_hash()?)
    }
}
