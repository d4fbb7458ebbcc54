//! Weight commitment hash.
//!
//! ```text
//! commit_hash = BLAKE3(bincode_standard(CommitPayload {
//!     scheme: 1, address, netuid, uids, values, salt, version_key,
//! }))
//! ```
//!
//! The payload layout is fixed by the struct's field order. The ledger
//! recomputes the same hash from the revealed data, so any change here is a
//! protocol change and must bump [`COMMIT_SCHEME`].

use serde::Serialize;

use crate::types::{AccountId, CommitHash, EncodedWeights, HASH_LEN, Hash256, NetUid, Salt};

/// Version tag of the commitment payload layout.
pub const COMMIT_SCHEME: u8 = 1;

#[derive(Serialize)]
struct CommitPayload<'a> {
    scheme: u8,
    address: &'a [u8; HASH_LEN],
    netuid: NetUid,
    uids: &'a [u16],
    values: &'a [u16],
    salt: &'a [u16],
    version_key: u64,
}

/// Computes commitment hashes.
pub struct CommitmentHasher;

impl CommitmentHasher {
    /// Hash binding `weights`, `salt` and `version_key` to `address` on `netuid`.
    ///
    /// # Panics
    ///
    /// Panics if bincode fails to encode the payload into a `Vec`, which
    /// cannot happen for these field types.
    pub fn hash(
        address: &AccountId,
        netuid: NetUid,
        weights: &EncodedWeights,
        salt: &Salt,
        version_key: u64,
    ) -> CommitHash {
        let payload = CommitPayload {
            scheme: COMMIT_SCHEME,
            address: address.as_bytes(),
            netuid,
            uids: weights.uids(),
            values: weights.values(),
            salt: salt.as_slice(),
            version_key,
        };
        let bytes = bincode::serde::encode_to_vec(&payload, bincode::config::standard())
            .expect("commit payload serialization should not fail");
        CommitHash(Hash256::compute(&bytes))
    }
}
