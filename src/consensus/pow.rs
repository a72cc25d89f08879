// Proof of Work implementation

use crate::core::{sha256, Block, Hash256};
use crate::error::{LedgerError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Default difficulty: a valid hash has at least this many leading zero bits
pub const DEFAULT_TARGET_BITS: u32 = 16;

/// Nonce attempts between two looks at the cancel flag
const CANCEL_CHECK_INTERVAL: i64 = 1024;

/// Fixed-difficulty proof of work.
///
/// A block is valid when SHA256 of its prepared header, read as a 256-bit
/// big-endian integer, is strictly below `1 << (256 - target_bits)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    target_bits: u32,
    /// Target as 32 big-endian bytes
    target: Hash256,
}

impl ProofOfWork {
    /// Create a proof of work with `target_bits` in `1..=255`
    pub fn new(target_bits: u32) -> Self {
        let target_bits = target_bits.clamp(1, 255);
        let shift = (256 - target_bits) as usize;

        let mut target = [0u8; 32];
        target[31 - shift / 8] = 1 << (shift % 8);

        Self {
            target_bits,
            target: Hash256::new(target),
        }
    }

    pub fn target_bits(&self) -> u32 {
        self.target_bits
    }

    pub fn target(&self) -> &Hash256 {
        &self.target
    }

    /// Header bytes hashed for `nonce`:
    /// prev hash || Merkle root || timestamp || target bits || nonce,
    /// integers as 8-byte big-endian.
    pub fn prepare(&self, block: &Block, nonce: i64) -> Vec<u8> {
        let mut data = self.header_prefix(block);
        data.extend_from_slice(&nonce.to_be_bytes());
        data
    }

    /// Hash of the prepared header for `nonce`
    pub fn hash(&self, block: &Block, nonce: i64) -> Hash256 {
        sha256(&self.prepare(block, nonce))
    }

    /// Search for the first nonce whose hash meets the target
    pub fn run(&self, block: &Block) -> Result<(i64, Hash256)> {
        self.run_cancellable(block, &AtomicBool::new(false))
    }

    /// Like `run`, but gives up with `MiningCancelled` once `cancel` is set.
    /// The flag is checked between nonce attempts.
    pub fn run_cancellable(&self, block: &Block, cancel: &AtomicBool) -> Result<(i64, Hash256)> {
        let start_time = Instant::now();
        let mut data = self.header_prefix(block);
        let prefix_len = data.len();

        log::debug!(
            "Mining block at height {} with {} transactions",
            block.height,
            block.transactions.len()
        );

        for nonce in 0..i64::MAX {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                log::info!("Mining cancelled after {} attempts", nonce);
                return Err(LedgerError::MiningCancelled);
            }

            data.truncate(prefix_len);
            data.extend_from_slice(&nonce.to_be_bytes());
            let hash = sha256(&data);

            if self.meets_target(&hash) {
                let elapsed = start_time.elapsed();
                log::debug!(
                    "Found nonce {} after {:?}: {}",
                    nonce,
                    elapsed,
                    hash
                );
                return Ok((nonce, hash));
            }

            // Progress indicator every 100k attempts
            if nonce > 0 && nonce % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!(
                    "Mining attempts: {} ({:.1} KH/s)",
                    nonce,
                    nonce as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }
        }

        Err(LedgerError::NonceExhausted)
    }

    /// Recompute the hash for the block's own nonce and check the target
    pub fn validate(&self, block: &Block) -> bool {
        self.meets_target(&self.hash(block, block.nonce))
    }

    /// Big-endian comparison: hash < target
    #[inline]
    pub fn meets_target(&self, hash: &Hash256) -> bool {
        hash.as_bytes() < self.target.as_bytes()
    }

    fn header_prefix(&self, block: &Block) -> Vec<u8> {
        let mut data = Vec::with_capacity(32 + 32 + 8 * 3);
        if let Some(prev) = &block.prev_block_hash {
            data.extend_from_slice(prev.as_bytes());
        }
        data.extend_from_slice(block.hash_transactions().as_bytes());
        data.extend_from_slice(&block.timestamp.to_be_bytes());
        data.extend_from_slice(&(self.target_bits as i64).to_be_bytes());
        data
    }
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_BITS)
    }
}
