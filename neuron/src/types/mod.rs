//! Core domain types shared by the registration and weight-submission
//! engines.
//!
//! As elsewhere in this crate, public APIs avoid "naked" byte buffers and
//! integers where a domain newtype carries more meaning: hashes, account
//! identifiers and block hashes are all distinct types even though they share
//! the same 32-byte representation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Proof-of-work solutions produced by the nonce search.
pub mod solution;
/// Weight vectors, salts and commitments exchanged during commit-reveal.
pub mod weights;

pub use solution::PowSolution;
pub use weights::{CommitHash, CommitmentRecord, EncodedWeights, Salt};

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Height of a block on the ledger.
pub type BlockNumber = u64;

/// Numeric identifier of a subnet.
pub type NetUid = u16;

/// A participant's slot index within a subnet.
pub type Uid = u16;

/// Strongly-typed 256-bit hash wrapper (BLAKE3-256).
///
/// This is the backing representation for every fixed-size hash handled by
/// the client: block hashes, proof hashes and commitment hashes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// Computes a new [`Hash256`] as the BLAKE3-256 hash of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let h = blake3::hash(data);
        Hash256(*h.as_bytes())
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Returns the lowercase hex encoding of the hash.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Hash of a ledger block, used as the seed of the proof-of-work puzzle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub Hash256);

impl BlockHash {
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        self.0.as_bytes()
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ledger account identifier (32-byte public key of a hotkey or coldkey).
///
/// The client never interprets the key material; it only hashes it into the
/// proof-of-work seed and the weight commitment, and hands it back to the
/// ledger.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub [u8; HASH_LEN]);

impl AccountId {
    /// Derives an [`AccountId`] deterministically from arbitrary seed bytes.
    ///
    /// Real wallets carry their public keys directly; this constructor exists
    /// for devnets and tests that need stable, distinct identities.
    pub fn from_seed(seed: &[u8]) -> Self {
        AccountId(*Hash256::compute(seed).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough for logs; full keys are noisy.
        let hex = hex::encode(self.0);
        write!(f, "{}…{}", &hex[..8], &hex[hex.len() - 8..])
    }
}

/// Identity handle for the participant submitting extrinsics.
///
/// Key custody and signing belong to the ledger implementation; the engines
/// only need to know which hotkey/coldkey pair they are acting for.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Wallet {
    /// Human-readable wallet name, used in logs only.
    pub name: String,
    /// Operational key: the identity that registers and sets weights.
    pub hotkey: AccountId,
    /// Custodial key that owns the hotkey.
    pub coldkey: AccountId,
}

impl Wallet {
    pub fn new(name: impl Into<String>, hotkey: AccountId, coldkey: AccountId) -> Self {
        Self {
            name: name.into(),
            hotkey,
            coldkey,
        }
    }
}

/// Registration state of a hotkey on one subnet, as last observed.
///
/// Never cached across orchestration cycles: other clients may register or
/// deregister the same hotkey at any time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeuronIdentity {
    pub hotkey: AccountId,
    pub coldkey: AccountId,
    pub netuid: NetUid,
    /// Slot index, when the ledger reports one.
    pub uid: Option<Uid>,
    pub is_registered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_compute_is_deterministic() {
        let a = Hash256::compute(b"block");
        let b = Hash256::compute(b"block");
        assert_eq!(a, b);
        assert_ne!(a, Hash256::compute(b"other"));
        assert_eq!(a.to_hex().len(), HASH_LEN * 2);
    }

    #[test]
    fn account_display_is_abbreviated() {
        let acc = AccountId([0xAB; HASH_LEN]);
        assert_eq!(acc.to_string(), "abababab…abababab");
    }

    #[test]
    fn from_seed_gives_distinct_accounts() {
        assert_ne!(AccountId::from_seed(b"hot"), AccountId::from_seed(b"cold"));
    }
}
