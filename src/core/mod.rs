// Core ledger data structures

mod types;
mod hash;
mod merkle;
mod serialize;
mod transaction;
mod block;

pub use types::*;
pub use hash::*;
pub use merkle::merkle_root;
pub use serialize::{Serializable, read_var_bytes, read_varint, write_var_bytes, write_varint};
pub(crate) use serialize::{corrupt, read_array};
pub use transaction::*;
pub use block::Block;
