// Merkle commitment over a block's transactions

use crate::core::{sha256, Hash256};

/// Compute the Merkle root of serialized leaves, in the given order.
///
/// Leaves are hashed with SHA256, each level pairs neighbours as
/// SHA256(left || right), and an odd level duplicates its last node.
/// An empty leaf set commits to the zero hash.
pub fn merkle_root<T: AsRef<[u8]>>(leaves: &[T]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::zero();
    }

    let mut level: Vec<Hash256> = leaves.iter().map(|leaf| sha256(leaf.as_ref())).collect();

    while level.len() > 1 {
        let mut next_level = Vec::with_capacity(level.len().div_ceil(2));

        for pair in level.chunks(2) {
            let left = pair[0];
            let right = pair.get(1).copied().unwrap_or(left);

            let mut combined = [0u8; 64];
            combined[..32].copy_from_slice(left.as_bytes());
            combined[32..].copy_from_slice(right.as_bytes());
            next_level.push(sha256(&combined));
        }

        level = next_level;
    }

    level[0]
}
