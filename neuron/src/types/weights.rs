//! Weight vectors and commitment records exchanged with the ledger.

use std::fmt;

use rand::Rng;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use super::{BlockNumber, Hash256, NetUid};

/// Default number of salt entries drawn by [`Salt::random`].
pub const DEFAULT_SALT_LEN: usize = 8;

/// Fixed-point weight vector in its on-chain form.
///
/// `uids` and `values` are index-aligned and always have the same length.
/// Values are quantized into `0..=u16::MAX`; zero entries are never present.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodedWeights {
    uids: Vec<u16>,
    values: Vec<u16>,
}

impl EncodedWeights {
    /// Builds an encoded vector from already-aligned sequences.
    ///
    /// Returns `None` if the lengths differ.
    pub fn from_parts(uids: Vec<u16>, values: Vec<u16>) -> Option<Self> {
        (uids.len() == values.len()).then_some(Self { uids, values })
    }

    pub fn uids(&self) -> &[u16] {
        &self.uids
    }

    pub fn values(&self) -> &[u16] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }
}

/// Secret salt mixed into a weight commitment.
///
/// The same salt must be supplied at reveal time, byte for byte.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Salt(pub Vec<u16>);

impl Salt {
    /// Draws a fresh salt of `len` entries from the OS RNG.
    pub fn random(len: usize) -> Self {
        let mut rng = OsRng;
        Salt((0..len).map(|_| rng.gen_range(0..=u16::MAX)).collect())
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }
}

impl From<Vec<u16>> for Salt {
    fn from(v: Vec<u16>) -> Self {
        Salt(v)
    }
}

/// Hash binding a weight vector, salt and version key to a hotkey.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CommitHash(pub Hash256);

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Everything needed to reveal a commitment later.
///
/// Produced by a successful commit; the reveal must replay `weights`, `salt`
/// and `version_key` unchanged or the ledger's own hash check rejects it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentRecord {
    pub netuid: NetUid,
    pub weights: EncodedWeights,
    pub salt: Salt,
    pub version_key: u64,
    pub commit_hash: CommitHash,
    /// Block in which the commit extrinsic was included.
    pub commit_block: BlockNumber,
}
