//! The ledger collaborator.
//!
//! Everything the engines need from the chain goes through the [`Ledger`]
//! trait: block height and hash, subnet parameters, registration status and
//! the three extrinsics (PoW registration, weight commit, weight reveal).
//! Transport, extrinsic encoding and signing live behind this seam and are
//! not part of this crate.
//!
//! Implementations provided here:
//!
//! - [`mem::InMemoryLedger`]: a devnet simulator for tests and demos,
//! - [`traced::TracedLedger`]: a decorator that records every call.

pub mod error;
pub mod mem;
pub mod traced;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::types::{
    AccountId, BlockHash, BlockNumber, CommitHash, EncodedWeights, NetUid, PowSolution, Salt,
    Uid, Wallet,
};

pub use error::LedgerError;
pub use mem::{DevnetConfig, InMemoryLedger, SubnetSpec};
pub use traced::{CallLog, CallRecord, TracedLedger};

/// Rejection reason reported when the hotkey already holds a slot.
pub const ALREADY_REGISTERED: &str = "HotKeyAlreadyRegisteredInSubNet";

/// Result of submitting an extrinsic that the ledger did process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtrinsicOutcome<T = ()> {
    /// The extrinsic was included and succeeded.
    Included(T),
    /// The ledger explicitly refused it, with its reason.
    Rejected(String),
}

impl<T> ExtrinsicOutcome<T> {
    /// Returns `true` if the extrinsic was included.
    pub fn is_included(&self) -> bool {
        matches!(self, ExtrinsicOutcome::Included(_))
    }

    /// Returns `true` if the rejection says the hotkey is already registered.
    ///
    /// Registering twice is a no-op success, so callers treat this rejection
    /// as a win.
    pub fn is_already_registered(&self) -> bool {
        match self {
            ExtrinsicOutcome::Rejected(reason) => reason.contains(ALREADY_REGISTERED),
            ExtrinsicOutcome::Included(_) => false,
        }
    }
}

/// Block range in which a weight commitment may be revealed (inclusive).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RevealWindow {
    pub open_block: BlockNumber,
    pub close_block: BlockNumber,
}

impl RevealWindow {
    /// Whether a reveal at `block` falls inside the window.
    pub fn is_open(&self, block: BlockNumber) -> bool {
        (self.open_block..=self.close_block).contains(&block)
    }

    /// Whether `block` is past the last block of the window.
    pub fn has_closed(&self, block: BlockNumber) -> bool {
        block > self.close_block
    }
}

/// Narrow interface to the remote ledger.
///
/// Calls are synchronous and may block on I/O. Implementations must be
/// shareable across threads, but the engines in this crate only ever call
/// them from a single driver thread, one call at a time.
pub trait Ledger: Send + Sync {
    /// Height of the current best block.
    fn current_block(&self) -> Result<BlockNumber, LedgerError>;

    /// Hash of the block at `block`.
    fn block_hash(&self, block: BlockNumber) -> Result<BlockHash, LedgerError>;

    /// Current registration difficulty of a subnet.
    fn difficulty(&self, netuid: NetUid) -> Result<u64, LedgerError>;

    /// Whether the subnet exists (and so accepts registrations).
    fn subnet_exists(&self, netuid: NetUid) -> Result<bool, LedgerError>;

    /// Whether `hotkey` currently holds a slot on the subnet.
    fn is_hotkey_registered(&self, hotkey: &AccountId, netuid: NetUid)
    -> Result<bool, LedgerError>;

    /// Slot index held by `hotkey` on the subnet, if any.
    fn uid_for_hotkey(&self, hotkey: &AccountId, netuid: NetUid)
    -> Result<Option<Uid>, LedgerError>;

    /// Submits a registration extrinsic carrying `solution`.
    ///
    /// Not idempotent: callers must not resend on a transport error.
    fn submit_pow_register(
        &self,
        netuid: NetUid,
        solution: &PowSolution,
        wallet: &Wallet,
    ) -> Result<ExtrinsicOutcome, LedgerError>;

    /// Reveal window for a commitment included at `commit_block`.
    fn reveal_window(
        &self,
        netuid: NetUid,
        commit_block: BlockNumber,
    ) -> Result<RevealWindow, LedgerError>;

    /// Submits a weight commitment; on inclusion returns the block it landed in.
    fn submit_commit_weights(
        &self,
        netuid: NetUid,
        commit_hash: &CommitHash,
        wallet: &Wallet,
    ) -> Result<ExtrinsicOutcome<BlockNumber>, LedgerError>;

    /// Reveals the weights and salt behind the caller's pending commitment.
    fn submit_reveal_weights(
        &self,
        netuid: NetUid,
        weights: &EncodedWeights,
        salt: &Salt,
        version_key: u64,
        wallet: &Wallet,
    ) -> Result<ExtrinsicOutcome, LedgerError>;
}

impl<L: Ledger + ?Sized> Ledger for Arc<L> {
    fn current_block(&self) -> Result<BlockNumber, LedgerError> {
        (**self).current_block()
    }

    fn block_hash(&self, block: BlockNumber) -> Result<BlockHash, LedgerError> {
        (**self).block_hash(block)
    }

    fn difficulty(&self, netuid: NetUid) -> Result<u64, LedgerError> {
        (**self).difficulty(netuid)
    }

    fn subnet_exists(&self, netuid: NetUid) -> Result<bool, LedgerError> {
        (**self).subnet_exists(netuid)
    }

    fn is_hotkey_registered(
        &self,
        hotkey: &AccountId,
        netuid: NetUid,
    ) -> Result<bool, LedgerError> {
        (**self).is_hotkey_registered(hotkey, netuid)
    }

    fn uid_for_hotkey(
        &self,
        hotkey: &AccountId,
        netuid: NetUid,
    ) -> Result<Option<Uid>, LedgerError> {
        (**self).uid_for_hotkey(hotkey, netuid)
    }

    fn submit_pow_register(
        &self,
        netuid: NetUid,
        solution: &PowSolution,
        wallet: &Wallet,
    ) -> Result<ExtrinsicOutcome, LedgerError> {
        (**self).submit_pow_register(netuid, solution, wallet)
    }

    fn reveal_window(
        &self,
        netuid: NetUid,
        commit_block: BlockNumber,
    ) -> Result<RevealWindow, LedgerError> {
        (**self).reveal_window(netuid, commit_block)
    }

    fn submit_commit_weights(
        &self,
        netuid: NetUid,
        commit_hash: &CommitHash,
        wallet: &Wallet,
    ) -> Result<ExtrinsicOutcome<BlockNumber>, LedgerError> {
        (**self).submit_commit_weights(netuid, commit_hash, wallet)
    }

    fn submit_reveal_weights(
        &self,
        netuid: NetUid,
        weights: &EncodedWeights,
        salt: &Salt,
        version_key: u64,
        wallet: &Wallet,
    ) -> Result<ExtrinsicOutcome, LedgerError> {
        (**self).submit_reveal_weights(netuid, weights, salt, version_key, wallet)
    }
}

/// Local retry policy for transient ledger failures.
///
/// Only errors for which [`LedgerError::is_transient`] holds are retried;
/// everything else is returned on first sight. Meant for read-only queries;
/// extrinsic submissions are never wrapped in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed call.
    pub max_retries: u32,
    /// Base delay; the n-th retry waits `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Runs `call`, retrying transient failures up to `max_retries` times.
    pub fn run<T>(
        &self,
        op: &'static str,
        mut call: impl FnMut() -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut retries = 0u32;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retries < self.max_retries => {
                    retries += 1;
                    warn!(op, retries, error = %e, "transient ledger failure, retrying");
                    if !self.backoff.is_zero() {
                        thread::sleep(self.backoff * retries);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn no_backoff(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn retry_recovers_from_transient_failures() {
        let calls = Cell::new(0);
        let result = no_backoff(3).run("current_block", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(LedgerError::Network("connection reset".into()))
            } else {
                Ok(7u64)
            }
        });
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn retry_surfaces_error_once_budget_is_spent() {
        let calls = Cell::new(0);
        let result: Result<u64, _> = no_backoff(2).run("current_block", || {
            calls.set(calls.get() + 1);
            Err(LedgerError::Timeout("deadline".into()))
        });
        assert_eq!(result, Err(LedgerError::Timeout("deadline".into())));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn retry_never_repeats_non_transient_errors() {
        let calls = Cell::new(0);
        let result: Result<u64, _> = no_backoff(5).run("block_hash", || {
            calls.set(calls.get() + 1);
            Err(LedgerError::UnknownBlock(4))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn already_registered_rejection_is_recognised() {
        let outcome: ExtrinsicOutcome =
            ExtrinsicOutcome::Rejected(format!("Module error: {ALREADY_REGISTERED}"));
        assert!(outcome.is_already_registered());
        let other: ExtrinsicOutcome = ExtrinsicOutcome::Rejected("InvalidSeal".into());
        assert!(!other.is_already_registered());
        assert!(!ExtrinsicOutcome::Included(()).is_already_registered());
    }

    #[test]
    fn reveal_window_bounds_are_inclusive() {
        let w = RevealWindow {
            open_block: 10,
            close_block: 19,
        };
        assert!(!w.is_open(9));
        assert!(w.is_open(10));
        assert!(w.is_open(19));
        assert!(!w.has_closed(19));
        assert!(w.has_closed(20));
    }
}
