//! Progress reporting for long-running engine calls.
//!
//! Registration can spend minutes hashing and a reveal may wait for dozens
//! of blocks. Both engines report state transitions and solver progress to
//! a [`ProgressSink`] supplied at construction. The default sink logs
//! through `tracing`; callers with their own UI implement the trait.

use std::fmt;

use tracing::{debug, info};

use crate::types::{BlockNumber, NetUid};

/// States of one registration call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    CheckRegistered,
    Solving,
    Verifying,
    Submitting,
    /// The last submission was rejected; a new solve follows.
    RetrySolving,
    Success,
    Failure,
}

impl RegistrationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RegistrationState::Success | RegistrationState::Failure)
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationState::Idle => "idle",
            RegistrationState::CheckRegistered => "check-registered",
            RegistrationState::Solving => "solving",
            RegistrationState::Verifying => "verifying",
            RegistrationState::Submitting => "submitting",
            RegistrationState::RetrySolving => "retry-solving",
            RegistrationState::Success => "success",
            RegistrationState::Failure => "failure",
        };
        f.write_str(name)
    }
}

/// States of one commit-reveal cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitRevealState {
    Committed,
    WaitingWindow,
    RevealEligible,
    Revealed,
    Expired,
}

impl fmt::Display for CommitRevealState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitRevealState::Committed => "committed",
            CommitRevealState::WaitingWindow => "waiting-window",
            CommitRevealState::RevealEligible => "reveal-eligible",
            CommitRevealState::Revealed => "revealed",
            CommitRevealState::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Snapshot of the nonce search, emitted once per update interval.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveProgress {
    pub netuid: NetUid,
    /// Block the current search is seeded from.
    pub block_number: BlockNumber,
    pub difficulty: u64,
    /// Nonces hashed by the current pool.
    pub hashes: u64,
    /// Hashes per second of the current pool.
    pub hash_rate: f64,
    /// 1-based index of the solve cycle that just ended.
    pub solve_cycle: u32,
}

/// Receiver of engine progress.
///
/// All methods default to doing nothing.
pub trait ProgressSink: Send + Sync {
    fn registration_state(&self, _netuid: NetUid, _state: RegistrationState) {}

    fn solve_progress(&self, _progress: &SolveProgress) {}

    fn commit_reveal_state(&self, _netuid: NetUid, _state: CommitRevealState) {}
}

/// Sink that discards everything.
pub struct NoopSink;

impl ProgressSink for NoopSink {}

/// Sink that logs through `tracing`.
#[derive(Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn registration_state(&self, netuid: NetUid, state: RegistrationState) {
        if state.is_terminal() {
            info!(netuid, %state, "registration finished");
        } else {
            debug!(netuid, %state, "registration state");
        }
    }

    fn solve_progress(&self, p: &SolveProgress) {
        info!(
            netuid = p.netuid,
            block = p.block_number,
            difficulty = p.difficulty,
            hashes = p.hashes,
            hashes_per_sec = p.hash_rate.round() as u64,
            cycle = p.solve_cycle,
            "solving"
        );
    }

    fn commit_reveal_state(&self, netuid: NetUid, state: CommitRevealState) {
        info!(netuid, %state, "commit-reveal");
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_success_and_failure_are_terminal() {
        assert!(RegistrationState::Success.is_terminal());
        assert!(RegistrationState::Failure.is_terminal());
        assert!(!RegistrationState::RetrySolving.is_terminal());
        assert_eq!(RegistrationState::CheckRegistered.to_string(), "check-registered");
    }

    #[test]
    fn default_methods_are_noops() {
        let sink = NoopSink;
        sink.registration_state(1, RegistrationState::Idle);
        sink.commit_reveal_state(1, CommitRevealState::Expired);
    }
}
