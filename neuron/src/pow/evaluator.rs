//! Proof-of-work hash and difficulty target.
//!
//! The registration puzzle is:
//!
//! ```text
//! seed       = BLAKE3(block_hash || hotkey)
//! proof_hash = BLAKE3(nonce_le_bytes || seed)
//! valid      <=> uint256_be(proof_hash) <= target(difficulty)
//! target(d)  = floor((2^256 - 1) / d)
//! ```
//!
//! The comparison against the target is done without 256-bit division:
//! `h <= floor(MAX / d)` holds exactly when `h * d` still fits in 256 bits.

use crate::types::{AccountId, BlockHash, HASH_LEN, Hash256};

/// Outcome of hashing one nonce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub proof_hash: Hash256,
    /// `true` iff `proof_hash <= target(difficulty)`.
    pub success: bool,
}

/// Per-search evaluator with the block/hotkey seed precomputed.
///
/// Cheap to copy; every worker holds its own.
#[derive(Clone, Copy, Debug)]
pub struct HashTargetEvaluator {
    seed: [u8; HASH_LEN],
    difficulty: u64,
}

impl HashTargetEvaluator {
    /// Prepares an evaluator for one `(block_hash, address, difficulty)`.
    ///
    /// A difficulty of zero has no target; it is treated as 1.
    pub fn new(block_hash: &BlockHash, address: &AccountId, difficulty: u64) -> Self {
        Self {
            seed: seal_seed(block_hash, address),
            difficulty: difficulty.max(1),
        }
    }

    pub fn difficulty(&self) -> u64 {
        self.difficulty
    }

    /// Hashes `nonce` and tests it against the target.
    #[inline]
    pub fn evaluate(&self, nonce: u64) -> Evaluation {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&nonce.to_le_bytes());
        hasher.update(&self.seed);
        let proof_hash = Hash256(*hasher.finalize().as_bytes());
        Evaluation {
            proof_hash,
            success: meets_difficulty(&proof_hash, self.difficulty),
        }
    }
}

/// One-shot form of [`HashTargetEvaluator::evaluate`].
pub fn evaluate(
    nonce: u64,
    block_hash: &BlockHash,
    address: &AccountId,
    difficulty: u64,
) -> Evaluation {
    HashTargetEvaluator::new(block_hash, address, difficulty).evaluate(nonce)
}

/// Binds the puzzle to a block and a registrant.
pub fn seal_seed(block_hash: &BlockHash, address: &AccountId) -> [u8; HASH_LEN] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(block_hash.as_bytes());
    hasher.update(address.as_bytes());
    *hasher.finalize().as_bytes()
}

fn limbs_be(bytes: &[u8; HASH_LEN]) -> [u64; 4] {
    let mut limbs = [0u64; 4];
    for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        *limb = u64::from_be_bytes(buf);
    }
    limbs
}

/// Returns `true` iff the big-endian value of `hash` is `<= target(difficulty)`.
pub fn meets_difficulty(hash: &Hash256, difficulty: u64) -> bool {
    let limbs = limbs_be(hash.as_bytes());
    let d = u128::from(difficulty.max(1));
    let mut carry = 0u128;
    for limb in limbs.iter().rev() {
        let product = u128::from(*limb) * d + carry;
        carry = product >> 64;
    }
    carry == 0
}

/// Big-endian `floor((2^256 - 1) / difficulty)`.
///
/// Monotonically decreasing in `difficulty`: each doubling halves the share
/// of valid nonces.
pub fn target(difficulty: u64) -> [u8; HASH_LEN] {
    let d = u128::from(difficulty.max(1));
    let mut out = [0u8; HASH_LEN];
    let mut rem = 0u128;
    for chunk in out.chunks_exact_mut(8) {
        let value = (rem << 64) | u128::from(u64::MAX);
        // rem < d <= u64::MAX, so the quotient fits in a limb.
        let q = (value / d) as u64;
        rem = value % d;
        chunk.copy_from_slice(&q.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn block(byte: u8) -> BlockHash {
        BlockHash(Hash256([byte; HASH_LEN]))
    }

    fn account(byte: u8) -> AccountId {
        AccountId([byte; HASH_LEN])
    }

    #[test]
    fn difficulty_one_accepts_everything() {
        assert!(meets_difficulty(&Hash256([0xFF; HASH_LEN]), 1));
        assert_eq!(target(1), [0xFF; HASH_LEN]);
    }

    #[test]
    fn difficulty_two_splits_at_the_top_bit() {
        let mut below = [0xFF; HASH_LEN];
        below[0] = 0x7F;
        let mut above = [0u8; HASH_LEN];
        above[0] = 0x80;

        assert!(meets_difficulty(&Hash256(below), 2));
        assert!(!meets_difficulty(&Hash256(above), 2));
        assert_eq!(target(2), below);
    }

    #[test]
    fn zero_difficulty_is_treated_as_one() {
        assert!(meets_difficulty(&Hash256([0xFF; HASH_LEN]), 0));
        assert_eq!(target(0), target(1));
    }

    #[test]
    fn target_is_monotonically_decreasing() {
        let mut previous = target(1);
        for d in [2u64, 3, 10, 1_000, 1 << 20, u64::MAX / 3, u64::MAX] {
            let t = target(d);
            assert!(t < previous, "target({d}) should shrink");
            previous = t;
        }
    }

    #[test]
    fn evaluation_is_deterministic_and_seeded() {
        let e1 = evaluate(42, &block(1), &account(2), 1_000);
        let e2 = evaluate(42, &block(1), &account(2), 1_000);
        assert_eq!(e1, e2);

        assert_ne!(evaluate(43, &block(1), &account(2), 1_000).proof_hash, e1.proof_hash);
        assert_ne!(evaluate(42, &block(9), &account(2), 1_000).proof_hash, e1.proof_hash);
        assert_ne!(evaluate(42, &block(1), &account(9), 1_000).proof_hash, e1.proof_hash);
    }

    #[test]
    fn accepted_nonces_are_below_target() {
        let difficulty = 64;
        let evaluator = HashTargetEvaluator::new(&block(3), &account(4), difficulty);
        let t = target(difficulty);
        let accepted: Vec<_> = (0..5_000u64)
            .map(|n| evaluator.evaluate(n))
            .filter(|e| e.success)
            .collect();

        assert!(!accepted.is_empty(), "expected ~78 hits at difficulty 64");
        for e in accepted {
            assert!(e.proof_hash.as_bytes() <= &t);
        }
    }

    proptest! {
        #[test]
        fn meets_difficulty_agrees_with_target(bytes in any::<[u8; 32]>(), d in 1u64..) {
            let hash = Hash256(bytes);
            prop_assert_eq!(meets_difficulty(&hash, d), hash.as_bytes() <= &target(d));
        }

        #[test]
        fn meets_difficulty_agrees_with_target_for_small_d(bytes in any::<[u8; 32]>(), d in 1u64..1024) {
            let hash = Hash256(bytes);
            prop_assert_eq!(meets_difficulty(&hash, d), hash.as_bytes() <= &target(d));
        }
    }
}
