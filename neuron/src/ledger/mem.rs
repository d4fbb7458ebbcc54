//! In-memory devnet ledger.
//!
//! This implementation is useful for unit tests, demos and local
//! experiments. It simulates the parts of the chain the client talks to:
//!
//! - a block clock (manual [`InMemoryLedger::advance`], or a fixed number of
//!   blocks per `current_block` query),
//! - per-subnet difficulty, registrations and UID assignment,
//! - proof-of-work verification using the same evaluator as the miners,
//! - weight commitments with hash verification and reveal windows.
//!
//! It is not a consensus implementation: there is one writer, no forks and
//! no fees.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pow::evaluator::HashTargetEvaluator;
use crate::types::{
    AccountId, BlockHash, BlockNumber, CommitHash, EncodedWeights, Hash256, NetUid, PowSolution,
    Salt, Uid, Wallet,
};
use crate::weights::commitment::CommitmentHasher;

use super::{ALREADY_REGISTERED, ExtrinsicOutcome, Ledger, LedgerError, RevealWindow};

const SUBNET_MISSING: &str = "SubNetworkDoesNotExist";
const INVALID_WORK_BLOCK: &str = "InvalidWorkBlock";
const INVALID_DIFFICULTY: &str = "InvalidDifficulty";
const INVALID_SEAL: &str = "InvalidSeal";
const NOT_REGISTERED: &str = "HotKeyNotRegisteredInSubNet";
const NO_COMMIT: &str = "NoWeightsCommitFound";
const REVEAL_TOO_EARLY: &str = "RevealTooEarly";
const COMMIT_EXPIRED: &str = "ExpiredWeightCommit";
const HASH_MISMATCH: &str = "InvalidRevealCommitHashNotMatch";

/// Parameters of one simulated subnet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub netuid: NetUid,
    pub difficulty: u64,
    /// Length in blocks of a commit-reveal interval.
    pub reveal_interval: u64,
}

/// Configuration for [`InMemoryLedger`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    /// Height the simulated chain starts at.
    pub genesis_block: BlockNumber,
    /// Blocks the chain advances on every `current_block` query.
    ///
    /// `0` freezes the clock; tests then drive it with `advance`.
    pub blocks_per_query: u64,
    /// Oldest work block (relative to the head) accepted for registration.
    pub max_work_age: u64,
    pub subnets: Vec<SubnetSpec>,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            genesis_block: 1,
            blocks_per_query: 0,
            max_work_age: 3,
            subnets: vec![
                SubnetSpec {
                    netuid: 1,
                    difficulty: 10_000,
                    reveal_interval: 10,
                },
                SubnetSpec {
                    netuid: 3,
                    difficulty: 10_000,
                    reveal_interval: 10,
                },
            ],
        }
    }
}

struct PendingCommit {
    hash: CommitHash,
    commit_block: BlockNumber,
}

struct SubnetState {
    difficulty: u64,
    reveal_interval: u64,
    /// Registered hotkeys; the index is the UID.
    neurons: Vec<AccountId>,
    commits: HashMap<AccountId, PendingCommit>,
    weights: HashMap<AccountId, EncodedWeights>,
}

impl SubnetState {
    fn from_spec(spec: &SubnetSpec) -> Self {
        Self {
            difficulty: spec.difficulty,
            reveal_interval: spec.reveal_interval,
            neurons: Vec::new(),
            commits: HashMap::new(),
            weights: HashMap::new(),
        }
    }

    fn uid_of(&self, hotkey: &AccountId) -> Option<Uid> {
        self.neurons
            .iter()
            .position(|k| k == hotkey)
            .and_then(|i| Uid::try_from(i).ok())
    }

    fn register(&mut self, hotkey: AccountId) -> Option<Uid> {
        if let Some(uid) = self.uid_of(&hotkey) {
            return Some(uid);
        }
        let uid = Uid::try_from(self.neurons.len()).ok()?;
        self.neurons.push(hotkey);
        Some(uid)
    }

    fn window(&self, commit_block: BlockNumber) -> RevealWindow {
        // Reveals belong to the interval after the one the commit landed in.
        let interval = self.reveal_interval.max(1);
        let open_block = (commit_block / interval + 1) * interval;
        RevealWindow {
            open_block,
            close_block: open_block + interval - 1,
        }
    }
}

struct DevnetState {
    block: BlockNumber,
    subnets: HashMap<NetUid, SubnetState>,
}

/// In-memory implementation of [`Ledger`].
pub struct InMemoryLedger {
    blocks_per_query: u64,
    max_work_age: u64,
    state: Mutex<DevnetState>,
}

impl InMemoryLedger {
    pub fn new(cfg: DevnetConfig) -> Self {
        let subnets = cfg
            .subnets
            .iter()
            .map(|spec| (spec.netuid, SubnetState::from_spec(spec)))
            .collect();
        Self {
            blocks_per_query: cfg.blocks_per_query,
            max_work_age: cfg.max_work_age,
            state: Mutex::new(DevnetState {
                block: cfg.genesis_block,
                subnets,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DevnetState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Canonical hash of block `n` on the devnet.
    pub fn hash_of(n: BlockNumber) -> BlockHash {
        let mut seed = b"devnet-block".to_vec();
        seed.extend_from_slice(&n.to_le_bytes());
        BlockHash(Hash256::compute(&seed))
    }

    /// Advances the chain head by `blocks`, returning the new height.
    pub fn advance(&self, blocks: u64) -> BlockNumber {
        let mut state = self.lock();
        state.block += blocks;
        state.block
    }

    /// Height of the head without ticking the clock.
    pub fn head(&self) -> BlockNumber {
        self.lock().block
    }

    pub fn add_subnet(&self, spec: SubnetSpec) {
        self.lock()
            .subnets
            .insert(spec.netuid, SubnetState::from_spec(&spec));
    }

    pub fn set_difficulty(&self, netuid: NetUid, difficulty: u64) {
        if let Some(subnet) = self.lock().subnets.get_mut(&netuid) {
            subnet.difficulty = difficulty;
        }
    }

    /// Registers `hotkey` without proof of work, as a sudo call would.
    pub fn force_register(&self, hotkey: AccountId, netuid: NetUid) -> Option<Uid> {
        self.lock().subnets.get_mut(&netuid)?.register(hotkey)
    }

    /// Weights last revealed by `hotkey` on the subnet.
    pub fn weights_of(&self, netuid: NetUid, hotkey: &AccountId) -> Option<EncodedWeights> {
        self.lock().subnets.get(&netuid)?.weights.get(hotkey).cloned()
    }

    /// Outstanding commitment of `hotkey`, as `(hash, commit_block)`.
    pub fn pending_commit(
        &self,
        netuid: NetUid,
        hotkey: &AccountId,
    ) -> Option<(CommitHash, BlockNumber)> {
        self.lock()
            .subnets
            .get(&netuid)?
            .commits
            .get(hotkey)
            .map(|c| (c.hash, c.commit_block))
    }

    fn check_work(
        &self,
        block: BlockNumber,
        subnet: &SubnetState,
        solution: &PowSolution,
        wallet: &Wallet,
    ) -> Result<(), &'static str> {
        if solution.block_number > block
            || solution.block_number.saturating_add(self.max_work_age) < block
            || solution.block_hash != Self::hash_of(solution.block_number)
        {
            return Err(INVALID_WORK_BLOCK);
        }
        if solution.difficulty != subnet.difficulty {
            return Err(INVALID_DIFFICULTY);
        }
        let evaluation =
            HashTargetEvaluator::new(&solution.block_hash, &wallet.hotkey, subnet.difficulty)
                .evaluate(solution.nonce);
        if !evaluation.success || evaluation.proof_hash != solution.proof_hash {
            return Err(INVALID_SEAL);
        }
        Ok(())
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(DevnetConfig::default())
    }
}

fn rejected<T>(reason: &str) -> Result<ExtrinsicOutcome<T>, LedgerError> {
    Ok(ExtrinsicOutcome::Rejected(reason.to_string()))
}

impl Ledger for InMemoryLedger {
    fn current_block(&self) -> Result<BlockNumber, LedgerError> {
        let mut state = self.lock();
        state.block += self.blocks_per_query;
        Ok(state.block)
    }

    fn block_hash(&self, block: BlockNumber) -> Result<BlockHash, LedgerError> {
        if block > self.lock().block {
            return Err(LedgerError::UnknownBlock(block));
        }
        Ok(Self::hash_of(block))
    }

    fn difficulty(&self, netuid: NetUid) -> Result<u64, LedgerError> {
        self.lock()
            .subnets
            .get(&netuid)
            .map(|s| s.difficulty)
            .ok_or_else(|| LedgerError::Protocol(format!("subnet {netuid} has no difficulty")))
    }

    fn subnet_exists(&self, netuid: NetUid) -> Result<bool, LedgerError> {
        Ok(self.lock().subnets.contains_key(&netuid))
    }

    fn is_hotkey_registered(
        &self,
        hotkey: &AccountId,
        netuid: NetUid,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .lock()
            .subnets
            .get(&netuid)
            .is_some_and(|s| s.uid_of(hotkey).is_some()))
    }

    fn uid_for_hotkey(
        &self,
        hotkey: &AccountId,
        netuid: NetUid,
    ) -> Result<Option<Uid>, LedgerError> {
        Ok(self.lock().subnets.get(&netuid).and_then(|s| s.uid_of(hotkey)))
    }

    fn submit_pow_register(
        &self,
        netuid: NetUid,
        solution: &PowSolution,
        wallet: &Wallet,
    ) -> Result<ExtrinsicOutcome, LedgerError> {
        let mut state = self.lock();
        let block = state.block;
        let Some(subnet) = state.subnets.get_mut(&netuid) else {
            return rejected(SUBNET_MISSING);
        };
        if subnet.uid_of(&wallet.hotkey).is_some() {
            return rejected(ALREADY_REGISTERED);
        }
        if let Err(reason) = self.check_work(block, subnet, solution, wallet) {
            debug!(netuid, block, reason, "devnet rejected registration");
            return rejected(reason);
        }
        match subnet.register(wallet.hotkey) {
            Some(uid) => {
                debug!(netuid, uid, hotkey = %wallet.hotkey, "devnet registered hotkey");
                Ok(ExtrinsicOutcome::Included(()))
            }
            None => rejected("SubnetFull"),
        }
    }

    fn reveal_window(
        &self,
        netuid: NetUid,
        commit_block: BlockNumber,
    ) -> Result<RevealWindow, LedgerError> {
        self.lock()
            .subnets
            .get(&netuid)
            .map(|s| s.window(commit_block))
            .ok_or_else(|| LedgerError::Protocol(format!("subnet {netuid} does not exist")))
    }

    fn submit_commit_weights(
        &self,
        netuid: NetUid,
        commit_hash: &CommitHash,
        wallet: &Wallet,
    ) -> Result<ExtrinsicOutcome<BlockNumber>, LedgerError> {
        let mut state = self.lock();
        let block = state.block;
        let Some(subnet) = state.subnets.get_mut(&netuid) else {
            return rejected(SUBNET_MISSING);
        };
        if subnet.uid_of(&wallet.hotkey).is_none() {
            return rejected(NOT_REGISTERED);
        }
        subnet.commits.insert(
            wallet.hotkey,
            PendingCommit {
                hash: *commit_hash,
                commit_block: block,
            },
        );
        Ok(ExtrinsicOutcome::Included(block))
    }

    fn submit_reveal_weights(
        &self,
        netuid: NetUid,
        weights: &EncodedWeights,
        salt: &Salt,
        version_key: u64,
        wallet: &Wallet,
    ) -> Result<ExtrinsicOutcome, LedgerError> {
        let mut state = self.lock();
        let block = state.block;
        let Some(subnet) = state.subnets.get_mut(&netuid) else {
            return rejected(SUBNET_MISSING);
        };
        let Some(pending) = subnet.commits.get(&wallet.hotkey) else {
            return rejected(NO_COMMIT);
        };

        let window = subnet.window(pending.commit_block);
        if block < window.open_block {
            return rejected(REVEAL_TOO_EARLY);
        }
        if window.has_closed(block) {
            subnet.commits.remove(&wallet.hotkey);
            return rejected(COMMIT_EXPIRED);
        }

        let expected = CommitmentHasher::hash(&wallet.hotkey, netuid, weights, salt, version_key);
        if expected != pending.hash {
            return rejected(HASH_MISMATCH);
        }

        subnet.commits.remove(&wallet.hotkey);
        subnet.weights.insert(wallet.hotkey, weights.clone());
        Ok(ExtrinsicOutcome::Included(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(seed: &str) -> Wallet {
        Wallet::new(
            seed,
            AccountId::from_seed(format!("{seed}-hot").as_bytes()),
            AccountId::from_seed(format!("{seed}-cold").as_bytes()),
        )
    }

    /// Mines a solution by brute force on the calling thread.
    fn mine(ledger: &InMemoryLedger, netuid: NetUid, wallet: &Wallet) -> PowSolution {
        let block_number = ledger.head();
        let block_hash = InMemoryLedger::hash_of(block_number);
        let difficulty = ledger.difficulty(netuid).expect("difficulty");
        let evaluator = HashTargetEvaluator::new(&block_hash, &wallet.hotkey, difficulty);
        (0u64..)
            .find_map(|nonce| {
                let e = evaluator.evaluate(nonce);
                e.success.then(|| PowSolution {
                    nonce,
                    block_number,
                    block_hash,
                    difficulty,
                    proof_hash: e.proof_hash,
                })
            })
            .expect("some nonce satisfies a small difficulty")
    }

    fn small_devnet() -> InMemoryLedger {
        InMemoryLedger::new(DevnetConfig {
            subnets: vec![SubnetSpec {
                netuid: 3,
                difficulty: 16,
                reveal_interval: 5,
            }],
            ..DevnetConfig::default()
        })
    }

    #[test]
    fn frozen_clock_only_moves_on_advance() {
        let ledger = small_devnet();
        assert_eq!(ledger.current_block().unwrap(), 1);
        assert_eq!(ledger.current_block().unwrap(), 1);
        assert_eq!(ledger.advance(4), 5);
        assert_eq!(ledger.current_block().unwrap(), 5);
    }

    #[test]
    fn auto_advancing_clock_ticks_per_query() {
        let ledger = InMemoryLedger::new(DevnetConfig {
            blocks_per_query: 2,
            ..DevnetConfig::default()
        });
        assert_eq!(ledger.current_block().unwrap(), 3);
        assert_eq!(ledger.current_block().unwrap(), 5);
    }

    #[test]
    fn valid_work_registers_and_assigns_uid() {
        let ledger = small_devnet();
        let w = wallet("alice");
        ledger.force_register(AccountId::from_seed(b"someone"), 3);

        let solution = mine(&ledger, 3, &w);
        let outcome = ledger.submit_pow_register(3, &solution, &w).unwrap();
        assert_eq!(outcome, ExtrinsicOutcome::Included(()));
        assert_eq!(ledger.uid_for_hotkey(&w.hotkey, 3).unwrap(), Some(1));

        // Second submission is reported as already registered.
        let again = ledger.submit_pow_register(3, &solution, &w).unwrap();
        assert!(again.is_already_registered());
    }

    #[test]
    fn old_work_is_rejected() {
        let ledger = small_devnet();
        let w = wallet("bob");
        let solution = mine(&ledger, 3, &w);
        ledger.advance(4);

        let outcome = ledger.submit_pow_register(3, &solution, &w).unwrap();
        assert_eq!(outcome, ExtrinsicOutcome::Rejected(INVALID_WORK_BLOCK.into()));
        assert!(!ledger.is_hotkey_registered(&w.hotkey, 3).unwrap());
    }

    #[test]
    fn work_for_another_hotkey_is_rejected() {
        let ledger = small_devnet();
        let miner = wallet("carol");
        let thief = wallet("mallory");
        let solution = mine(&ledger, 3, &miner);

        let outcome = ledger.submit_pow_register(3, &solution, &thief).unwrap();
        assert!(!outcome.is_included());
    }

    #[test]
    fn reveal_window_is_the_following_interval() {
        let ledger = small_devnet();
        let w = ledger.reveal_window(3, 7).unwrap();
        assert_eq!(w.open_block, 10);
        assert_eq!(w.close_block, 14);
    }

    #[test]
    fn reveal_is_checked_against_commitment() {
        let ledger = small_devnet();
        let w = wallet("dave");
        ledger.force_register(w.hotkey, 3);

        let weights = EncodedWeights::from_parts(vec![0], vec![u16::MAX]).unwrap();
        let salt = Salt(vec![1, 2, 3]);
        let hash = CommitmentHasher::hash(&w.hotkey, 3, &weights, &salt, 0);

        let commit_block = match ledger.submit_commit_weights(3, &hash, &w).unwrap() {
            ExtrinsicOutcome::Included(b) => b,
            other => panic!("commit rejected: {other:?}"),
        };
        assert_eq!(ledger.pending_commit(3, &w.hotkey), Some((hash, commit_block)));

        let early = ledger.submit_reveal_weights(3, &weights, &salt, 0, &w).unwrap();
        assert_eq!(early, ExtrinsicOutcome::Rejected(REVEAL_TOO_EARLY.into()));

        ledger.advance(5);
        let wrong = ledger
            .submit_reveal_weights(3, &weights, &Salt(vec![9]), 0, &w)
            .unwrap();
        assert_eq!(wrong, ExtrinsicOutcome::Rejected(HASH_MISMATCH.into()));

        let ok = ledger.submit_reveal_weights(3, &weights, &salt, 0, &w).unwrap();
        assert!(ok.is_included());
        assert_eq!(ledger.weights_of(3, &w.hotkey), Some(weights));
        assert!(ledger.pending_commit(3, &w.hotkey).is_none());
    }

    #[test]
    fn commit_requires_registration() {
        let ledger = small_devnet();
        let w = wallet("erin");
        let hash = CommitHash(Hash256([0u8; 32]));
        let outcome = ledger.submit_commit_weights(3, &hash, &w).unwrap();
        assert_eq!(outcome, ExtrinsicOutcome::Rejected(NOT_REGISTERED.into()));
    }
}
