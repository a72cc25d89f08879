// UTXO (Unspent Transaction Output) set management

use crate::core::{corrupt, read_array, read_varint, write_varint};
use crate::core::{Block, Hash256, PubKeyHash, Serializable, TxOutput};
use crate::error::{LedgerError, Result};
use crate::storage::Blockchain;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use sled::Batch;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};

/// UTXO identifier - transaction hash + output index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// Value stored under a transaction id in the chainstate tree.
///
/// Each output keeps the index it had in its transaction, so an entry
/// stays addressable by `(txid, vout)` after earlier outputs are spent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct UnspentOutputs(Vec<(u32, TxOutput)>);

impl UnspentOutputs {
    fn remove(&mut self, vout: u32) -> bool {
        let before = self.0.len();
        self.0.retain(|(index, _)| *index != vout);
        self.0.len() != before
    }
}

impl Serializable for UnspentOutputs {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_varint(writer, self.0.len() as u64)?;
        for (index, output) in &self.0 {
            writer.write_all(&index.to_le_bytes())?;
            output.write_to(writer)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let count = read_varint(reader).map_err(corrupt)? as usize;
        let mut outputs = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let index = u32::from_le_bytes(read_array(reader).map_err(corrupt)?);
            outputs.push((index, TxOutput::read_from(reader)?));
        }
        Ok(Self(outputs))
    }
}

/// Index of unspent outputs kept beside a `Blockchain`.
///
/// It is a cache: `reindex` rebuilds it from a full replay and must always
/// agree with `Blockchain::find_utxo`.
pub struct UtxoSet<'a> {
    chain: &'a Blockchain,
}

impl<'a> UtxoSet<'a> {
    pub fn new(chain: &'a Blockchain) -> Self {
        Self { chain }
    }

    pub fn blockchain(&self) -> &Blockchain {
        self.chain
    }

    /// Drop the index and rebuild it from one full chain replay
    pub fn reindex(&self) -> Result<()> {
        let tree = self.chain.chainstate_tree();
        let utxo = self.chain.find_utxo()?;

        let mut batch = Batch::default();
        for key in tree.iter().keys() {
            batch.remove(key?);
        }
        for (txid, outputs) in &utxo {
            batch.insert(txid.as_bytes().as_slice(), UnspentOutputs(outputs.clone()).serialize());
        }
        tree.apply_batch(batch)?;

        log::info!("Reindexed UTXO set: {} transactions with unspent outputs", utxo.len());
        Ok(())
    }

    /// Apply a newly connected block to the index
    pub fn update(&self, block: &Block) -> Result<()> {
        self.chain
            .chainstate_tree()
            .transaction(|tx| apply_block(tx, block))?;

        log::debug!("Updated UTXO set with block {}", block.hash);
        Ok(())
    }

    fn entries(&self) -> impl Iterator<Item = Result<(Hash256, UnspentOutputs)>> + '_ {
        self.chain.chainstate_tree().iter().map(|item| {
            let (key, value) = item?;
            Ok((Hash256::from_slice(&key)?, UnspentOutputs::deserialize(&value)?))
        })
    }

    /// First-fit selection in index order of outputs worth at least `amount`.
    ///
    /// Returns the accumulated value and the chosen outputs; the caller
    /// decides whether the total is enough.
    pub fn find_spendable_outputs(&self, pub_key_hash: &PubKeyHash, amount: u64) -> Result<(u64, Vec<OutPoint>)> {
        let mut accumulated = 0u64;
        let mut selected = Vec::new();

        'entries: for entry in self.entries() {
            let (txid, outputs) = entry?;
            for (index, output) in outputs.0 {
                if accumulated >= amount {
                    break 'entries;
                }
                if output.is_locked_with_key(pub_key_hash) {
                    accumulated = accumulated.saturating_add(output.value);
                    selected.push(OutPoint::new(txid, index));
                }
            }
        }

        Ok((accumulated, selected))
    }

    /// Unspent outputs locked to `pub_key_hash`
    pub fn find_utxo(&self, pub_key_hash: &PubKeyHash) -> Result<Vec<TxOutput>> {
        Ok(self
            .find_unspent(pub_key_hash)?
            .into_iter()
            .map(|(_, output)| output)
            .collect())
    }

    /// Unspent outputs locked to `pub_key_hash`, with their locations
    pub fn find_unspent(&self, pub_key_hash: &PubKeyHash) -> Result<Vec<(OutPoint, TxOutput)>> {
        let mut found = Vec::new();
        for entry in self.entries() {
            let (txid, outputs) = entry?;
            found.extend(
                outputs
                    .0
                    .into_iter()
                    .filter(|(_, output)| output.is_locked_with_key(pub_key_hash))
                    .map(|(index, output)| (OutPoint::new(txid, index), output)),
            );
        }
        Ok(found)
    }

    /// Sum of unspent outputs locked to `pub_key_hash`
    pub fn get_balance(&self, pub_key_hash: &PubKeyHash) -> Result<u64> {
        self.find_utxo(pub_key_hash)?
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.value))
            .ok_or(LedgerError::ValueOverflow)
    }

    /// Number of transactions with at least one unspent output
    pub fn count_transactions(&self) -> Result<usize> {
        Ok(self.chain.chainstate_tree().len())
    }

    /// Whole index, grouped by transaction id
    pub fn snapshot(&self) -> Result<HashMap<Hash256, Vec<(u32, TxOutput)>>> {
        self.entries()
            .map(|entry| entry.map(|(txid, outputs)| (txid, outputs.0)))
            .collect()
    }
}

/// `UtxoSet::update` inside a write transaction on the chainstate tree.
///
/// Transactions are applied in block order, so an output created and spent
/// within the same block never survives.
pub(crate) fn apply_block(tx: &TransactionalTree, block: &Block) -> ConflictableTransactionResult<(), LedgerError> {
    for transaction in &block.transactions {
        if !transaction.is_coinbase() {
            for input in &transaction.vin {
                let Some(txid) = input.txid else { continue };
                let key = txid.as_bytes().as_slice();

                let Some(data) = tx.get(key)? else {
                    log::warn!("Input {}:{} spends an output missing from the UTXO set", txid, input.vout);
                    continue;
                };
                let mut outputs = UnspentOutputs::deserialize(&data).map_err(ConflictableTransactionError::Abort)?;

                let spent = u32::try_from(input.vout).is_ok_and(|vout| outputs.remove(vout));
                if !spent {
                    log::warn!("Output {}:{} is not in the UTXO set", txid, input.vout);
                }

                if outputs.0.is_empty() {
                    tx.remove(key)?;
                } else {
                    tx.insert(key, outputs.serialize())?;
                }
            }
        }

        if transaction.vout.is_empty() {
            continue;
        }
        let fresh = UnspentOutputs(
            transaction
                .vout
                .iter()
                .cloned()
                .enumerate()
                .map(|(index, output)| (index as u32, output))
                .collect(),
        );
        tx.insert(transaction.id.as_bytes().as_slice(), fresh.serialize())?;
    }
    Ok(())
}
