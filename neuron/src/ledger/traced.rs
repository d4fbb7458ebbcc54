//! Call-recording decorator for any [`Ledger`].
//!
//! `TracedLedger` wraps another ledger, forwards every call unchanged and
//! records the method name, latency and outcome. Records go to `tracing` at
//! debug level and into a shared [`CallLog`] that tests and tooling can
//! inspect afterwards (e.g. "exactly one registration was submitted").

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::types::{
    AccountId, BlockHash, BlockNumber, CommitHash, EncodedWeights, NetUid, PowSolution, Salt,
    Uid, Wallet,
};

use super::{ExtrinsicOutcome, Ledger, LedgerError, RevealWindow};

/// How a recorded call ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallStatus {
    Ok,
    /// The ledger processed an extrinsic and refused it.
    Rejected(String),
    /// The call itself failed.
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct CallRecord {
    pub method: &'static str,
    pub elapsed: Duration,
    pub status: CallStatus,
}

/// Shared, append-only log of ledger calls.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    records: Arc<Mutex<Vec<CallRecord>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CallRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, record: CallRecord) {
        self.lock().push(record);
    }

    /// Snapshot of all records so far, in call order.
    pub fn records(&self) -> Vec<CallRecord> {
        self.lock().clone()
    }

    /// Number of recorded calls to `method`.
    pub fn count(&self, method: &str) -> usize {
        self.lock().iter().filter(|r| r.method == method).count()
    }

    /// Method names in call order.
    pub fn methods(&self) -> Vec<&'static str> {
        self.lock().iter().map(|r| r.method).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Maps a successful return value onto a [`CallStatus`].
trait Outcome {
    fn status(&self) -> CallStatus {
        CallStatus::Ok
    }
}

impl Outcome for bool {}
impl Outcome for u64 {}
impl Outcome for BlockHash {}
impl Outcome for Option<Uid> {}
impl Outcome for RevealWindow {}

impl<T> Outcome for ExtrinsicOutcome<T> {
    fn status(&self) -> CallStatus {
        match self {
            ExtrinsicOutcome::Included(_) => CallStatus::Ok,
            ExtrinsicOutcome::Rejected(reason) => CallStatus::Rejected(reason.clone()),
        }
    }
}

/// Decorator that records every call made through it.
pub struct TracedLedger<L> {
    inner: L,
    log: CallLog,
}

impl<L: Ledger> TracedLedger<L> {
    pub fn new(inner: L) -> Self {
        Self::with_log(inner, CallLog::new())
    }

    /// Wraps `inner`, appending to an existing log.
    pub fn with_log(inner: L, log: CallLog) -> Self {
        Self { inner, log }
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    fn observe<T: Outcome>(
        &self,
        method: &'static str,
        call: impl FnOnce(&L) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let start = Instant::now();
        let result = call(&self.inner);
        let elapsed = start.elapsed();

        let status = match &result {
            Ok(value) => value.status(),
            Err(e) => CallStatus::Failed(e.to_string()),
        };
        debug!(
            method,
            elapsed_us = elapsed.as_micros() as u64,
            status = ?status,
            "ledger call"
        );
        self.log.push(CallRecord {
            method,
            elapsed,
            status,
        });
        result
    }
}

impl<L: Ledger> Ledger for TracedLedger<L> {
    fn current_block(&self) -> Result<BlockNumber, LedgerError> {
        self.observe("current_block", |l| l.current_block())
    }

    fn block_hash(&self, block: BlockNumber) -> Result<BlockHash, LedgerError> {
        self.observe("block_hash", |l| l.block_hash(block))
    }

    fn difficulty(&self, netuid: NetUid) -> Result<u64, LedgerError> {
        self.observe("difficulty", |l| l.difficulty(netuid))
    }

    fn subnet_exists(&self, netuid: NetUid) -> Result<bool, LedgerError> {
        self.observe("subnet_exists", |l| l.subnet_exists(netuid))
    }

    fn is_hotkey_registered(
        &self,
        hotkey: &AccountId,
        netuid: NetUid,
    ) -> Result<bool, LedgerError> {
        self.observe("is_hotkey_registered", |l| {
            l.is_hotkey_registered(hotkey, netuid)
        })
    }

    fn uid_for_hotkey(
        &self,
        hotkey: &AccountId,
        netuid: NetUid,
    ) -> Result<Option<Uid>, LedgerError> {
        self.observe("uid_for_hotkey", |l| l.uid_for_hotkey(hotkey, netuid))
    }

    fn submit_pow_register(
        &self,
        netuid: NetUid,
        solution: &PowSolution,
        wallet: &Wallet,
    ) -> Result<ExtrinsicOutcome, LedgerError> {
        self.observe("submit_pow_register", |l| {
            l.submit_pow_register(netuid, solution, wallet)
        })
    }

    fn reveal_window(
        &self,
        netuid: NetUid,
        commit_block: BlockNumber,
    ) -> Result<RevealWindow, LedgerError> {
        self.observe("reveal_window", |l| l.reveal_window(netuid, commit_block))
    }

    fn submit_commit_weights(
        &self,
        netuid: NetUid,
        commit_hash: &CommitHash,
        wallet: &Wallet,
    ) -> Result<ExtrinsicOutcome<BlockNumber>, LedgerError> {
        self.observe("submit_commit_weights", |l| {
            l.submit_commit_weights(netuid, commit_hash, wallet)
        })
    }

    fn submit_reveal_weights(
        &self,
        netuid: NetUid,
        weights: &EncodedWeights,
        salt: &Salt,
        version_key: u64,
        wallet: &Wallet,
    ) -> Result<ExtrinsicOutcome, LedgerError> {
        self.observe("submit_reveal_weights", |l| {
            l.submit_reveal_weights(netuid, weights, salt, version_key, wallet)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mem::{DevnetConfig, InMemoryLedger};

    #[test]
    fn forwards_calls_and_records_them_in_order() {
        let traced = TracedLedger::new(InMemoryLedger::new(DevnetConfig::default()));

        let block = traced.current_block().expect("current block");
        traced.block_hash(block).expect("block hash");
        let err = traced.block_hash(block + 1_000).unwrap_err();
        assert_eq!(err, LedgerError::UnknownBlock(block + 1_000));

        assert_eq!(
            traced.log().methods(),
            vec!["current_block", "block_hash", "block_hash"]
        );
        let records = traced.log().records();
        assert_eq!(records[0].status, CallStatus::Ok);
        assert!(matches!(records[2].status, CallStatus::Failed(_)));
    }

    #[test]
    fn shared_log_sees_calls_from_all_wrappers() {
        let log = CallLog::new();
        let a = TracedLedger::with_log(InMemoryLedger::new(DevnetConfig::default()), log.clone());
        let b = TracedLedger::with_log(InMemoryLedger::new(DevnetConfig::default()), log.clone());

        a.difficulty(1).expect("difficulty");
        b.difficulty(1).expect("difficulty");

        assert_eq!(log.count("difficulty"), 2);
        log.clear();
        assert!(log.records().is_empty());
    }
}
