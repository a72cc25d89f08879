// Storage layer for the blockchain and the UTXO set

mod blockchain_db;
mod utxo_set;

pub use blockchain_db::{AddBlockOutcome, Blockchain, BlockchainIterator};
pub use utxo_set::{OutPoint, UtxoSet};

pub(crate) use blockchain_db::{put_block, put_mined_block};
pub(crate) use utxo_set::apply_block;

use crate::error::Result;
use sled::{Db, Tree};
use std::path::Path;

/// Bucket of serialized blocks keyed by hash, plus the tip pointer
pub const BLOCKS_TREE: &str = "blocks";
/// Bucket of unspent outputs keyed by transaction id
pub const CHAINSTATE_TREE: &str = "chainstate";

/// Handle on the embedded database shared by the ledger components
#[derive(Clone)]
pub struct Storage {
    db: Db,
}

impl Storage {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        log::debug!("Opened database at {}", path.as_ref().display());
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing)
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub(crate) fn blocks(&self) -> Result<Tree> {
        Ok(self.db.open_tree(BLOCKS_TREE)?)
    }

    pub(crate) fn chainstate(&self) -> Result<Tree> {
        Ok(self.db.open_tree(CHAINSTATE_TREE)?)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
