// Ledger node - the write path and the surface used by peer sync

use crate::core::{Block, Serializable, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::{apply_block, put_block, put_mined_block, AddBlockOutcome, Blockchain, UtxoSet};
use sled::transaction::TransactionResult;
use sled::Transactional;
use std::sync::atomic::AtomicBool;

/// Ledger node
///
/// Owns the chain and keeps the UTXO set in step with it. Blocks are
/// persisted together with their UTXO update in one transaction over both
/// trees.
pub struct Node {
    chain: Blockchain,
}

impl Node {
    pub fn new(chain: Blockchain) -> Self {
        Self { chain }
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn utxo_set(&self) -> UtxoSet<'_> {
        UtxoSet::new(&self.chain)
    }

    /// Verify, mine and connect `transactions` as the new tip
    pub fn mine(&self, transactions: Vec<Transaction>) -> Result<Block> {
        self.mine_cancellable(transactions, &AtomicBool::new(false))
    }

    pub fn mine_cancellable(&self, transactions: Vec<Transaction>, cancel: &AtomicBool) -> Result<Block> {
        let block = self.chain.prepare_block(transactions, cancel)?;
        let data = block.serialize();

        let result: TransactionResult<(), LedgerError> = (self.chain.blocks_tree(), self.chain.chainstate_tree())
            .transaction(|(blocks, chainstate)| {
                put_mined_block(blocks, &block, &data)?;
                apply_block(chainstate, &block)?;
                Ok(())
            });
        result?;

        log::info!("Mined block {} at height {}", block.hash, block.height);
        Ok(block)
    }

    /// Accept a block from a peer.
    ///
    /// The proof of work and the stored hash are checked; the transactions
    /// are not. A block that extends the tip updates the UTXO set in the same
    /// transaction. A new tip on another branch triggers a reindex.
    pub fn submit_external_block(&self, block: &Block) -> Result<AddBlockOutcome> {
        let pow = self.chain.pow();
        if block.hash != pow.hash(block, block.nonce) || !pow.validate(block) {
            log::warn!("Rejecting block {}: proof of work does not check out", block.hash);
            return Err(LedgerError::InvalidBlock(block.hash));
        }

        let data = block.serialize();
        let result: TransactionResult<(AddBlockOutcome, bool), LedgerError> =
            (self.chain.blocks_tree(), self.chain.chainstate_tree()).transaction(|(blocks, chainstate)| {
                let outcome = put_block(blocks, block, &data)?;
                let extends_tip = match outcome {
                    AddBlockOutcome::NewTip { previous_tip } => block.prev_block_hash == Some(previous_tip),
                    _ => false,
                };
                if extends_tip {
                    apply_block(chainstate, block)?;
                }
                Ok((outcome, extends_tip))
            });
        let (outcome, extends_tip) = result?;

        match outcome {
            AddBlockOutcome::AlreadyKnown => log::debug!("Block {} already known", block.hash),
            AddBlockOutcome::Stored => log::info!("Stored side block {} at height {}", block.hash, block.height),
            AddBlockOutcome::NewTip { previous_tip } => {
                log::info!("Block {} at height {} is the new tip", block.hash, block.height);
                if !extends_tip {
                    log::info!("Tip moved off {} to another branch, reindexing", previous_tip);
                    self.utxo_set().reindex()?;
                }
            }
        }
        Ok(outcome)
    }

    /// Check a transaction from a peer against the chain
    pub fn submit_external_transaction(&self, tx: &Transaction) -> Result<bool> {
        match self.chain.verify_transaction(tx) {
            Ok(true) => Ok(true),
            Ok(false) => {
                log::warn!("Rejecting transaction {}: verification failed", tx.id);
                Ok(false)
            }
            Err(LedgerError::TransactionNotFound(prev)) => {
                log::warn!("Rejecting transaction {}: unknown input {}", tx.id, prev);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
