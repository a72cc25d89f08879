// Blockchain database using sled

use crate::config::LedgerConfig;
use crate::consensus::ProofOfWork;
use crate::core::{Block, Hash256, PubKeyHash, Serializable, Transaction, TxOutput};
use crate::error::{LedgerError, Result};
use crate::storage::{OutPoint, Storage};
use p256::ecdsa::SigningKey;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use sled::Tree;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;

/// Reserved key in the blocks tree holding the tip hash
const TIP_KEY: &[u8] = b"l";

/// What `add_block` did with a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddBlockOutcome {
    /// The hash was already stored; nothing changed
    AlreadyKnown,
    /// Stored, but not higher than the current tip
    Stored,
    /// Stored and made the new tip
    NewTip { previous_tip: Hash256 },
}

/// Append-only chain of blocks with a tip pointer
#[derive(Clone)]
pub struct Blockchain {
    blocks: Tree,
    chainstate: Tree,
    pow: ProofOfWork,
    subsidy: u64,
}

impl Blockchain {
    /// Create a new chain whose genesis coinbase pays `reward_to`
    pub fn create(storage: &Storage, reward_to: &PubKeyHash, config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        let chain = Self::with_trees(storage, config)?;
        if chain.blocks.contains_key(TIP_KEY)? {
            return Err(LedgerError::StoreAlreadyExists);
        }

        let coinbase = Transaction::coinbase(
            reward_to,
            config.genesis_coinbase_data.as_bytes(),
            config.subsidy,
        );
        let genesis = Block::genesis(coinbase, &chain.pow)?;
        let data = genesis.serialize();

        chain.blocks.transaction(|tx| {
            if tx.get(TIP_KEY)?.is_some() {
                return Err(ConflictableTransactionError::Abort(LedgerError::StoreAlreadyExists));
            }
            tx.insert(genesis.hash.as_bytes().as_slice(), data.as_slice())?;
            tx.insert(TIP_KEY, genesis.hash.as_bytes().as_slice())?;
            Ok(())
        })?;

        log::info!("Created blockchain with genesis block {}", genesis.hash);
        Ok(chain)
    }

    /// Open an existing chain
    pub fn open(storage: &Storage, config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        let chain = Self::with_trees(storage, config)?;
        if !chain.blocks.contains_key(TIP_KEY)? {
            return Err(LedgerError::StoreNotFound);
        }

        log::debug!("Opened blockchain at tip {}", chain.tip()?);
        Ok(chain)
    }

    fn with_trees(storage: &Storage, config: &LedgerConfig) -> Result<Self> {
        Ok(Self {
            blocks: storage.blocks()?,
            chainstate: storage.chainstate()?,
            pow: config.pow(),
            subsidy: config.subsidy,
        })
    }

    pub fn pow(&self) -> &ProofOfWork {
        &self.pow
    }

    pub fn subsidy(&self) -> u64 {
        self.subsidy
    }

    pub(crate) fn blocks_tree(&self) -> &Tree {
        &self.blocks
    }

    pub(crate) fn chainstate_tree(&self) -> &Tree {
        &self.chainstate
    }

    /// Hash of the current tip
    pub fn tip(&self) -> Result<Hash256> {
        match self.blocks.get(TIP_KEY)? {
            Some(data) => Hash256::from_slice(&data),
            None => Err(LedgerError::StoreNotFound),
        }
    }

    /// Get a block by hash
    pub fn get_block(&self, hash: &Hash256) -> Result<Block> {
        match self.blocks.get(hash.as_bytes())? {
            Some(data) => Block::deserialize(&data),
            None => Err(LedgerError::BlockNotFound(*hash)),
        }
    }

    pub fn has_block(&self, hash: &Hash256) -> Result<bool> {
        Ok(self.blocks.contains_key(hash.as_bytes())?)
    }

    /// Store a block received from elsewhere.
    ///
    /// Known hashes are a no-op. A new block becomes the tip only when it is
    /// strictly higher than the current tip.
    pub fn add_block(&self, block: &Block) -> Result<AddBlockOutcome> {
        let data = block.serialize();
        let outcome = self.blocks.transaction(|tx| put_block(tx, block, &data))?;

        match outcome {
            AddBlockOutcome::AlreadyKnown => log::debug!("Block {} already known", block.hash),
            AddBlockOutcome::Stored => log::info!("Stored block {} at height {}", block.hash, block.height),
            AddBlockOutcome::NewTip { .. } => {
                log::info!("Block {} at height {} is the new tip", block.hash, block.height)
            }
        }
        Ok(outcome)
    }

    /// Verify `transactions`, mine them on top of the tip and make the result the tip
    pub fn mine_block(&self, transactions: Vec<Transaction>) -> Result<Block> {
        self.mine_block_cancellable(transactions, &AtomicBool::new(false))
    }

    pub fn mine_block_cancellable(&self, transactions: Vec<Transaction>, cancel: &AtomicBool) -> Result<Block> {
        let block = self.prepare_block(transactions, cancel)?;
        let data = block.serialize();
        self.blocks.transaction(|tx| put_mined_block(tx, &block, &data))?;

        log::info!("Mined block {} at height {}", block.hash, block.height);
        Ok(block)
    }

    /// Verify every transaction and mine a block at tip height + 1.
    /// Nothing is persisted.
    ///
    /// Every input must spend an output that is unspent on the active chain,
    /// and no two inputs in the batch may spend the same output.
    pub(crate) fn prepare_block(&self, transactions: Vec<Transaction>, cancel: &AtomicBool) -> Result<Block> {
        if transactions.is_empty() {
            return Err(LedgerError::EmptyBlock);
        }

        for tx in &transactions {
            match self.verify_transaction(tx) {
                Ok(true) => {}
                Ok(false) | Err(LedgerError::TransactionNotFound(_)) => {
                    log::warn!("Rejecting invalid transaction {}", tx.id);
                    return Err(LedgerError::InvalidTransaction(tx.id));
                }
                Err(e) => return Err(e),
            }
        }

        let referenced: HashSet<Hash256> = transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .flat_map(|tx| tx.vin.iter().filter_map(|input| input.txid))
            .collect();
        let unspent = self.unspent_outpoints(&referenced)?;

        let mut claimed = HashSet::new();
        for tx in transactions.iter().filter(|tx| !tx.is_coinbase()) {
            for input in &tx.vin {
                let outpoint = match (input.txid, u32::try_from(input.vout)) {
                    (Some(txid), Ok(vout)) => OutPoint::new(txid, vout),
                    _ => return Err(LedgerError::InvalidTransaction(tx.id)),
                };
                if !unspent.contains(&outpoint) {
                    log::warn!("Rejecting transaction {}: output {} is already spent", tx.id, outpoint);
                    return Err(LedgerError::InvalidTransaction(tx.id));
                }
                if !claimed.insert(outpoint) {
                    log::warn!("Rejecting transaction {}: output {} is spent twice in the batch", tx.id, outpoint);
                    return Err(LedgerError::InvalidTransaction(tx.id));
                }
            }
        }

        let tip = self.tip()?;
        let height = self.get_block(&tip)?.height;

        Block::mine_cancellable(transactions, Some(tip), height + 1, &self.pow, cancel)
    }

    /// Walk from the tip back to genesis
    pub fn iter(&self) -> Result<BlockchainIterator> {
        Ok(BlockchainIterator {
            current: Some(self.tip()?),
            chain: self.clone(),
        })
    }

    /// Height of the tip block
    pub fn get_best_height(&self) -> Result<u64> {
        Ok(self.get_block(&self.tip()?)?.height)
    }

    /// Hashes of every block from tip to genesis
    pub fn get_block_hashes(&self) -> Result<Vec<Hash256>> {
        self.iter()?.map(|block| block.map(|b| b.hash)).collect()
    }

    /// Find a transaction on the active chain by id
    pub fn find_transaction(&self, id: &Hash256) -> Result<Transaction> {
        for block in self.iter()? {
            if let Some(tx) = block?.transactions.into_iter().find(|tx| tx.id == *id) {
                return Ok(tx);
            }
        }
        Err(LedgerError::TransactionNotFound(*id))
    }

    /// Visit every unspent output on the active chain, newest first.
    ///
    /// Transactions are walked in reverse chronological order (blocks from
    /// the tip back, transactions within a block from last to first), so an
    /// output's spender has always been seen before the output itself.
    fn for_each_unspent<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&Transaction, u32, &TxOutput) -> bool,
    {
        let mut spent: HashSet<(Hash256, i32)> = HashSet::new();

        for block in self.iter()? {
            let block = block?;
            for tx in block.transactions.iter().rev() {
                for (index, output) in tx.vout.iter().enumerate() {
                    if spent.contains(&(tx.id, index as i32)) {
                        continue;
                    }
                    if !visit(tx, index as u32, output) {
                        return Ok(());
                    }
                }

                if !tx.is_coinbase() {
                    for input in &tx.vin {
                        if let Some(txid) = input.txid {
                            spent.insert((txid, input.vout));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Full replay: unspent outputs of the transactions in `txids`
    fn unspent_outpoints(&self, txids: &HashSet<Hash256>) -> Result<HashSet<OutPoint>> {
        let mut unspent = HashSet::new();
        if txids.is_empty() {
            return Ok(unspent);
        }
        self.for_each_unspent(|tx, index, _| {
            if txids.contains(&tx.id) {
                unspent.insert(OutPoint::new(tx.id, index));
            }
            true
        })?;
        Ok(unspent)
    }

    /// Full replay: every unspent output, grouped by transaction id
    pub fn find_utxo(&self) -> Result<HashMap<Hash256, Vec<(u32, TxOutput)>>> {
        let mut utxo: HashMap<Hash256, Vec<(u32, TxOutput)>> = HashMap::new();
        self.for_each_unspent(|tx, index, output| {
            utxo.entry(tx.id).or_default().push((index, output.clone()));
            true
        })?;

        for outputs in utxo.values_mut() {
            outputs.sort_by_key(|(index, _)| *index);
        }
        Ok(utxo)
    }

    /// Full replay: unspent outputs locked to `pub_key_hash`
    pub fn find_unspent_outputs(&self, pub_key_hash: &PubKeyHash) -> Result<Vec<(OutPoint, TxOutput)>> {
        let mut found = Vec::new();
        self.for_each_unspent(|tx, index, output| {
            if output.is_locked_with_key(pub_key_hash) {
                found.push((OutPoint::new(tx.id, index), output.clone()));
            }
            true
        })?;
        Ok(found)
    }

    /// Full replay: transactions holding an unspent output for `pub_key_hash`
    pub fn find_unspent_transactions(&self, pub_key_hash: &PubKeyHash) -> Result<Vec<Transaction>> {
        let mut seen = HashSet::new();
        let mut txs = Vec::new();
        self.for_each_unspent(|tx, _, output| {
            if output.is_locked_with_key(pub_key_hash) && seen.insert(tx.id) {
                txs.push(tx.clone());
            }
            true
        })?;
        Ok(txs)
    }

    /// Full replay: first-fit selection of outputs worth at least `amount`
    pub fn find_spendable_outputs(&self, pub_key_hash: &PubKeyHash, amount: u64) -> Result<(u64, Vec<OutPoint>)> {
        let mut accumulated = 0u64;
        let mut selected = Vec::new();
        self.for_each_unspent(|tx, index, output| {
            if accumulated >= amount {
                return false;
            }
            if output.is_locked_with_key(pub_key_hash) {
                accumulated = accumulated.saturating_add(output.value);
                selected.push(OutPoint::new(tx.id, index));
            }
            accumulated < amount
        })?;
        Ok((accumulated, selected))
    }

    /// Previous transactions referenced by `tx`'s inputs, keyed by id
    fn previous_transactions(&self, tx: &Transaction) -> Result<HashMap<Hash256, Transaction>> {
        let mut prev_txs = HashMap::new();
        for txid in tx.vin.iter().filter_map(|input| input.txid) {
            if !prev_txs.contains_key(&txid) {
                prev_txs.insert(txid, self.find_transaction(&txid)?);
            }
        }
        Ok(prev_txs)
    }

    /// Sign `tx` with `key` against the outputs it spends
    pub fn sign_transaction(&self, tx: &mut Transaction, key: &SigningKey) -> Result<()> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let prev_txs = self.previous_transactions(tx)?;
        tx.sign(key, &prev_txs)
    }

    /// Check `tx`'s signatures and value balance against the chain
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = self.previous_transactions(tx)?;
        tx.verify(&prev_txs)
    }
}

/// Iterator from the tip back to genesis, following `prev_block_hash`
pub struct BlockchainIterator {
    current: Option<Hash256>,
    chain: Blockchain,
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current.take()?;
        match self.chain.get_block(&hash) {
            Ok(block) => {
                self.current = block.prev_block_hash;
                Some(Ok(block))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

fn abort(e: LedgerError) -> ConflictableTransactionError<LedgerError> {
    ConflictableTransactionError::Abort(e)
}

/// `add_block` inside a write transaction on the blocks tree
pub(crate) fn put_block(
    tx: &TransactionalTree,
    block: &Block,
    data: &[u8],
) -> ConflictableTransactionResult<AddBlockOutcome, LedgerError> {
    let key = block.hash.as_bytes().as_slice();
    if tx.get(key)?.is_some() {
        return Ok(AddBlockOutcome::AlreadyKnown);
    }
    tx.insert(key, data)?;

    let tip_bytes = tx.get(TIP_KEY)?.ok_or_else(|| abort(LedgerError::StoreNotFound))?;
    let tip = Hash256::from_slice(&tip_bytes).map_err(abort)?;
    let tip_data = tx
        .get(tip.as_bytes().as_slice())?
        .ok_or_else(|| abort(LedgerError::BlockNotFound(tip)))?;
    let tip_block = Block::deserialize(&tip_data).map_err(abort)?;

    if block.height > tip_block.height {
        tx.insert(TIP_KEY, key)?;
        Ok(AddBlockOutcome::NewTip { previous_tip: tip })
    } else {
        Ok(AddBlockOutcome::Stored)
    }
}

/// Store a locally mined block and move the tip to it unconditionally
pub(crate) fn put_mined_block(
    tx: &TransactionalTree,
    block: &Block,
    data: &[u8],
) -> ConflictableTransactionResult<(), LedgerError> {
    let key = block.hash.as_bytes().as_slice();
    tx.insert(key, data)?;
    tx.insert(TIP_KEY, key)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{hash160, TxInput};
    use rand::rngs::OsRng;

    fn config() -> LedgerConfig {
        LedgerConfig {
            target_bits: 8,
            ..LedgerConfig::default()
        }
    }

    fn key_pair() -> (SigningKey, PubKeyHash) {
        let key = SigningKey::random(&mut OsRng);
        let pkh = hash160(key.verifying_key().to_encoded_point(false).as_bytes());
        (key, pkh)
    }

    fn new_chain(reward_to: &PubKeyHash) -> Blockchain {
        let storage = Storage::temporary().unwrap();
        Blockchain::create(&storage, reward_to, &config()).unwrap()
    }

    /// Unmined block with an arbitrary height on top of `prev`
    fn block_at(prev: Hash256, height: u64, tag: u8) -> Block {
        let coinbase = Transaction::coinbase(&[tag; 20], &[tag], 10);
        let mut block = Block {
            timestamp: 1_700_000_000,
            transactions: vec![coinbase],
            prev_block_hash: Some(prev),
            hash: Hash256::zero(),
            nonce: 0,
            height,
        };
        block.hash = config().pow().hash(&block, 0);
        block
    }

    #[test]
    fn test_create_and_open() {
        let storage = Storage::temporary().unwrap();
        assert!(matches!(
            Blockchain::open(&storage, &config()),
            Err(LedgerError::StoreNotFound)
        ));

        let chain = Blockchain::create(&storage, &[1; 20], &config()).unwrap();
        let reopened = Blockchain::open(&storage, &config()).unwrap();
        assert_eq!(chain.tip().unwrap(), reopened.tip().unwrap());

        assert!(matches!(
            Blockchain::create(&storage, &[1; 20], &config()),
            Err(LedgerError::StoreAlreadyExists)
        ));
    }

    #[test]
    fn test_genesis_pays_subsidy() {
        let chain = new_chain(&[7; 20]);
        let genesis = chain.get_block(&chain.tip().unwrap()).unwrap();

        assert_eq!(chain.get_best_height().unwrap(), 0);
        assert!(genesis.is_genesis());
        assert_eq!(genesis.transactions.len(), 1);
        assert!(genesis.transactions[0].is_coinbase());
        assert_eq!(genesis.transactions[0].vout, vec![TxOutput::new(10, [7; 20])]);
        assert!(chain.pow().validate(&genesis));
    }

    #[test]
    fn test_get_block_not_found() {
        let chain = new_chain(&[1; 20]);
        let missing = Hash256::new([9; 32]);
        assert!(matches!(
            chain.get_block(&missing),
            Err(LedgerError::BlockNotFound(h)) if h == missing
        ));
        assert!(!chain.has_block(&missing).unwrap());
    }

    #[test]
    fn test_add_block_is_idempotent() {
        let chain = new_chain(&[1; 20]);
        let block = block_at(chain.tip().unwrap(), 1, 2);

        assert!(matches!(chain.add_block(&block).unwrap(), AddBlockOutcome::NewTip { .. }));
        let tip = chain.tip().unwrap();
        let stored = chain.blocks.len();

        assert_eq!(chain.add_block(&block).unwrap(), AddBlockOutcome::AlreadyKnown);
        assert_eq!(chain.tip().unwrap(), tip);
        assert_eq!(chain.blocks.len(), stored);
    }

    #[test]
    fn test_height_rule() {
        let chain = new_chain(&[1; 20]);
        let genesis = chain.tip().unwrap();

        let b1 = block_at(genesis, 5, 1);
        chain.add_block(&b1).unwrap();
        assert_eq!(chain.tip().unwrap(), b1.hash);

        let b2 = block_at(genesis, 3, 2);
        assert_eq!(chain.add_block(&b2).unwrap(), AddBlockOutcome::Stored);
        assert_eq!(chain.tip().unwrap(), b1.hash);
        assert!(chain.has_block(&b2.hash).unwrap());

        // equal height does not replace the tip either
        let tie = block_at(genesis, 5, 3);
        assert_eq!(chain.add_block(&tie).unwrap(), AddBlockOutcome::Stored);
        assert_eq!(chain.tip().unwrap(), b1.hash);

        let b3 = block_at(b1.hash, 6, 4);
        assert_eq!(
            chain.add_block(&b3).unwrap(),
            AddBlockOutcome::NewTip { previous_tip: b1.hash }
        );
        assert_eq!(chain.tip().unwrap(), b3.hash);
        assert_eq!(chain.get_best_height().unwrap(), 6);
    }

    #[test]
    fn test_iteration_and_block_hashes() {
        let chain = new_chain(&[1; 20]);
        let genesis = chain.tip().unwrap();
        let first = chain
            .mine_block(vec![Transaction::coinbase(&[1; 20], b"", 10)])
            .unwrap();
        let second = chain
            .mine_block(vec![Transaction::coinbase(&[1; 20], b"", 10)])
            .unwrap();

        assert_eq!(first.height, 1);
        assert_eq!(second.height, 2);
        assert_eq!(second.prev_block_hash, Some(first.hash));
        assert_eq!(
            chain.get_block_hashes().unwrap(),
            vec![second.hash, first.hash, genesis]
        );

        let heights: Vec<u64> = chain.iter().unwrap().map(|b| b.unwrap().height).collect();
        assert_eq!(heights, vec![2, 1, 0]);
    }

    #[test]
    fn test_iteration_reports_dangling_reference() {
        let chain = new_chain(&[1; 20]);
        let orphan = block_at(Hash256::new([0xee; 32]), 10, 1);
        chain.add_block(&orphan).unwrap();

        let mut iter = chain.iter().unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(iter.next(), Some(Err(LedgerError::BlockNotFound(_)))));
    }

    #[test]
    fn test_find_transaction() {
        let chain = new_chain(&[1; 20]);
        let genesis = chain.get_block(&chain.tip().unwrap()).unwrap();
        let coinbase = &genesis.transactions[0];

        assert_eq!(&chain.find_transaction(&coinbase.id).unwrap(), coinbase);
        assert!(matches!(
            chain.find_transaction(&Hash256::new([3; 32])),
            Err(LedgerError::TransactionNotFound(_))
        ));
    }

    #[test]
    fn test_sign_verify_mine() {
        let (key, alice) = key_pair();
        let chain = new_chain(&alice);
        let funding = chain.get_block(&chain.tip().unwrap()).unwrap().transactions[0].clone();

        let mut tx = Transaction::new(
            vec![TxInput::new(funding.id, 0, Vec::new())],
            vec![TxOutput::new(4, [2; 20]), TxOutput::new(6, alice)],
        );
        chain.sign_transaction(&mut tx, &key).unwrap();
        assert!(chain.verify_transaction(&tx).unwrap());

        let block = chain.mine_block(vec![tx.clone()]).unwrap();
        assert_eq!(chain.tip().unwrap(), block.hash);
        assert_eq!(chain.find_transaction(&tx.id).unwrap(), tx);
    }

    #[test]
    fn test_mine_rejects_invalid_transaction() {
        let (key, alice) = key_pair();
        let chain = new_chain(&alice);
        let tip = chain.tip().unwrap();
        let funding = chain.get_block(&tip).unwrap().transactions[0].clone();

        let mut tx = Transaction::new(
            vec![TxInput::new(funding.id, 0, Vec::new())],
            vec![TxOutput::new(11, [2; 20])],
        );
        chain.sign_transaction(&mut tx, &key).unwrap();

        assert!(matches!(
            chain.mine_block(vec![tx]),
            Err(LedgerError::InvalidTransaction(_))
        ));
        assert_eq!(chain.tip().unwrap(), tip);
        assert_eq!(chain.blocks.len(), 2);
    }

    #[test]
    fn test_mine_rejects_unknown_reference() {
        let chain = new_chain(&[1; 20]);
        let tx = Transaction::new(
            vec![TxInput::new(Hash256::new([4; 32]), 0, Vec::new())],
            vec![TxOutput::new(1, [2; 20])],
        );
        assert!(matches!(
            chain.mine_block(vec![tx]),
            Err(LedgerError::InvalidTransaction(_))
        ));
        assert!(matches!(chain.mine_block(vec![]), Err(LedgerError::EmptyBlock)));
    }

    /// Signed transaction moving output 0 of `funding` to `to`
    fn spend(chain: &Blockchain, key: &SigningKey, funding: &Transaction, to: PubKeyHash) -> Transaction {
        let mut tx = Transaction::new(
            vec![TxInput::new(funding.id, 0, Vec::new())],
            vec![TxOutput::new(funding.vout[0].value, to)],
        );
        chain.sign_transaction(&mut tx, key).unwrap();
        tx
    }

    #[test]
    fn test_mine_rejects_double_spend_in_one_block() {
        let (key, alice) = key_pair();
        let chain = new_chain(&alice);
        let tip = chain.tip().unwrap();
        let funding = chain.get_block(&tip).unwrap().transactions[0].clone();

        let first = spend(&chain, &key, &funding, [2; 20]);
        let second = spend(&chain, &key, &funding, [3; 20]);
        assert!(chain.verify_transaction(&first).unwrap());
        assert!(chain.verify_transaction(&second).unwrap());

        assert!(matches!(
            chain.mine_block(vec![first.clone(), second.clone()]),
            Err(LedgerError::InvalidTransaction(id)) if id == second.id
        ));
        assert_eq!(chain.tip().unwrap(), tip);

        // the same output listed twice by one transaction
        let mut doubled = Transaction::new(
            vec![
                TxInput::new(funding.id, 0, Vec::new()),
                TxInput::new(funding.id, 0, Vec::new()),
            ],
            vec![TxOutput::new(20, [2; 20])],
        );
        chain.sign_transaction(&mut doubled, &key).unwrap();
        assert!(matches!(
            chain.mine_block(vec![doubled]),
            Err(LedgerError::InvalidTransaction(_))
        ));
        assert_eq!(chain.tip().unwrap(), tip);
    }

    #[test]
    fn test_mine_rejects_output_spent_in_earlier_block() {
        let (key, alice) = key_pair();
        let chain = new_chain(&alice);
        let funding = chain.get_block(&chain.tip().unwrap()).unwrap().transactions[0].clone();

        let first = spend(&chain, &key, &funding, [2; 20]);
        let block = chain.mine_block(vec![first]).unwrap();

        let again = spend(&chain, &key, &funding, [3; 20]);
        assert!(chain.verify_transaction(&again).unwrap());
        assert!(matches!(
            chain.mine_block(vec![again]),
            Err(LedgerError::InvalidTransaction(_))
        ));
        assert_eq!(chain.tip().unwrap(), block.hash);

        let utxo = chain.find_utxo().unwrap();
        let total: u64 = utxo.values().flatten().map(|(_, out)| out.value).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_mine_cancelled_leaves_chain_unchanged() {
        let chain = new_chain(&[1; 20]);
        let tip = chain.tip().unwrap();
        let stored = chain.blocks.len();

        let cancel = AtomicBool::new(true);
        assert!(matches!(
            chain.mine_block_cancellable(vec![Transaction::coinbase(&[1; 20], b"", 10)], &cancel),
            Err(LedgerError::MiningCancelled)
        ));
        assert_eq!(chain.tip().unwrap(), tip);
        assert_eq!(chain.blocks.len(), stored);
    }

    #[test]
    fn test_replay_queries() {
        let (key, alice) = key_pair();
        let bob = [2u8; 20];
        let chain = new_chain(&alice);
        let funding = chain.get_block(&chain.tip().unwrap()).unwrap().transactions[0].clone();

        let mut tx = Transaction::new(
            vec![TxInput::new(funding.id, 0, Vec::new())],
            vec![TxOutput::new(4, bob), TxOutput::new(6, alice)],
        );
        chain.sign_transaction(&mut tx, &key).unwrap();
        chain.mine_block(vec![tx.clone()]).unwrap();

        let alice_outputs = chain.find_unspent_outputs(&alice).unwrap();
        assert_eq!(alice_outputs, vec![(OutPoint::new(tx.id, 1), TxOutput::new(6, alice))]);
        assert_eq!(chain.find_unspent_transactions(&bob).unwrap(), vec![tx.clone()]);

        let utxo = chain.find_utxo().unwrap();
        assert!(!utxo.contains_key(&funding.id));
        assert_eq!(utxo[&tx.id].len(), 2);

        let (total, selected) = chain.find_spendable_outputs(&alice, 5).unwrap();
        assert_eq!(total, 6);
        assert_eq!(selected, vec![OutPoint::new(tx.id, 1)]);

        let (total, selected) = chain.find_spendable_outputs(&bob, 100).unwrap();
        assert_eq!(total, 4);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_spend_within_one_block() {
        let (key, alice) = key_pair();
        let chain = new_chain(&alice);
        let funding = chain.get_block(&chain.tip().unwrap()).unwrap().transactions[0].clone();

        let mut first = Transaction::new(
            vec![TxInput::new(funding.id, 0, Vec::new())],
            vec![TxOutput::new(10, alice)],
        );
        chain.sign_transaction(&mut first, &key).unwrap();

        let mut second = Transaction::new(
            vec![TxInput::new(first.id, 0, Vec::new())],
            vec![TxOutput::new(10, [2; 20])],
        );
        let prevs = HashMap::from([(first.id, first.clone())]);
        second.sign(&key, &prevs).unwrap();

        // stored directly: the second transaction spends the first in the same block
        let tip = chain.tip().unwrap();
        let mut block = block_at(tip, 1, 9);
        block.transactions = vec![first.clone(), second.clone()];
        chain.add_block(&block).unwrap();

        let utxo = chain.find_utxo().unwrap();
        assert!(!utxo.contains_key(&first.id));
        assert!(utxo.contains_key(&second.id));
    }
}
