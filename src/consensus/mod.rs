// Consensus: proof of work

pub mod pow;

pub use pow::{ProofOfWork, DEFAULT_TARGET_BITS};
