// Block data structures

use crate::consensus::ProofOfWork;
use crate::core::serialize::{corrupt, read_array, read_var_bytes, read_varint, write_var_bytes, write_varint};
use crate::core::{merkle_root, Hash256, Serializable, Transaction};
use crate::error::Result;
use std::io::{self, Read, Write};
use std::sync::atomic::AtomicBool;

/// Block - a mined, height-tagged batch of transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Creation time (seconds since the Unix epoch)
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    /// Hash of the predecessor; `None` marks the genesis block
    pub prev_block_hash: Option<Hash256>,
    pub hash: Hash256,
    pub nonce: i64,
    pub height: u64,
}

impl Block {
    /// Mine a block on top of `prev_block_hash`
    pub fn mine(
        transactions: Vec<Transaction>,
        prev_block_hash: Option<Hash256>,
        height: u64,
        pow: &ProofOfWork,
    ) -> Result<Self> {
        Self::mine_cancellable(transactions, prev_block_hash, height, pow, &AtomicBool::new(false))
    }

    /// Mine a block, giving up once `cancel` is set
    pub fn mine_cancellable(
        transactions: Vec<Transaction>,
        prev_block_hash: Option<Hash256>,
        height: u64,
        pow: &ProofOfWork,
        cancel: &AtomicBool,
    ) -> Result<Self> {
        let mut block = Self {
            timestamp: now(),
            transactions,
            prev_block_hash,
            hash: Hash256::zero(),
            nonce: 0,
            height,
        };

        let (nonce, hash) = pow.run_cancellable(&block, cancel)?;
        block.nonce = nonce;
        block.hash = hash;
        Ok(block)
    }

    /// Mine the genesis block around its coinbase transaction
    pub fn genesis(coinbase: Transaction, pow: &ProofOfWork) -> Result<Self> {
        Self::mine(vec![coinbase], None, 0, pow)
    }

    /// Merkle root over the full serialization of each transaction
    pub fn hash_transactions(&self) -> Hash256 {
        let leaves: Vec<Vec<u8>> = self.transactions.iter().map(|tx| tx.serialize()).collect();
        merkle_root(&leaves)
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.prev_block_hash.is_none()
    }
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl Serializable for Block {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.timestamp.to_le_bytes())?;

        write_varint(writer, self.transactions.len() as u64)?;
        for tx in &self.transactions {
            tx.write_to(writer)?;
        }

        let prev: &[u8] = match &self.prev_block_hash {
            Some(hash) => hash.as_bytes(),
            None => &[],
        };
        write_var_bytes(writer, prev)?;
        writer.write_all(self.hash.as_bytes())?;
        writer.write_all(&self.nonce.to_le_bytes())?;
        writer.write_all(&self.height.to_le_bytes())?;
        Ok(())
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let timestamp = i64::from_le_bytes(read_array(reader).map_err(corrupt)?);

        let tx_count = read_varint(reader).map_err(corrupt)? as usize;
        let mut transactions = Vec::with_capacity(tx_count.min(1024));
        for _ in 0..tx_count {
            transactions.push(Transaction::read_from(reader)?);
        }

        let prev_bytes = read_var_bytes(reader).map_err(corrupt)?;
        let prev_block_hash = if prev_bytes.is_empty() {
            None
        } else {
            Some(Hash256::from_slice(&prev_bytes)?)
        };
        let hash = Hash256::new(read_array(reader).map_err(corrupt)?);
        let nonce = i64::from_le_bytes(read_array(reader).map_err(corrupt)?);
        let height = u64::from_le_bytes(read_array(reader).map_err(corrupt)?);

        Ok(Self {
            timestamp,
            transactions,
            prev_block_hash,
            hash,
            nonce,
            height,
        })
    }
}
