//! Proof-of-work solution type.

use serde::{Deserialize, Serialize};

use super::{BlockHash, BlockNumber, Hash256};

/// A nonce that satisfies the registration puzzle for one block.
///
/// Invariant (established by the worker that produced it):
/// `proof_hash == Hash(nonce, block_hash, address)` and
/// `proof_hash <= target(difficulty)`.
///
/// A solution is consumed exactly once by the registration orchestrator:
/// either submitted while fresh or dropped once the chain has moved on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowSolution {
    pub nonce: u64,
    /// Height of the block whose hash seeded the search.
    pub block_number: BlockNumber,
    pub block_hash: BlockHash,
    pub difficulty: u64,
    pub proof_hash: Hash256,
}

impl PowSolution {
    /// Returns `true` once the chain has advanced more than `threshold`
    /// blocks past the block this solution was mined against.
    ///
    /// The ledger only accepts proofs over recent blocks, so a stale
    /// solution must never be submitted.
    pub fn is_stale(&self, current_block: BlockNumber, threshold: u64) -> bool {
        current_block > self.block_number.saturating_add(threshold)
    }
}
