//! Two-phase weight submission.
//!
//! A validator first commits to `hash(weights, salt, ...)` and later, inside
//! the reveal window the ledger assigns to that commitment, reveals the
//! weights and salt themselves. The ledger recomputes the hash and accepts
//! the reveal only if it matches.
//!
//! ```text
//! commit ──▶ Committed ──▶ WaitingWindow ──▶ RevealEligible ──▶ Revealed
//!                               │
//!                               └── window closed ──▶ Expired
//! ```

use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::ledger::{ExtrinsicOutcome, Ledger, RetryPolicy};
use crate::metrics::WeightMetrics;
use crate::progress::{CommitRevealState, ProgressSink, TracingSink};
use crate::types::{CommitmentRecord, NetUid, Salt, Wallet};

use super::codec::WeightCodec;
use super::commitment::CommitmentHasher;
use super::config::WeightsConfig;
use super::error::{Phase, WeightsError};

pub const COMMIT_OK: &str = "Successfully committed weights.";
pub const REVEAL_OK: &str = "Successfully revealed weights.";

/// Caller-facing result of a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitResult {
    pub success: bool,
    pub message: String,
    /// Present on success; needed for the reveal.
    pub record: Option<CommitmentRecord>,
}

/// Caller-facing result of a reveal (or of a full commit-reveal cycle).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealResult {
    pub success: bool,
    pub message: String,
}

impl RevealResult {
    fn from_outcome(outcome: Result<(), WeightsError>) -> Self {
        match outcome {
            Ok(()) => Self {
                success: true,
                message: REVEAL_OK.to_string(),
            },
            Err(e) => Self {
                success: false,
                message: e.to_string(),
            },
        }
    }
}

/// Drives commit-reveal against a [`Ledger`].
pub struct CommitRevealScheduler<L> {
    ledger: L,
    cfg: WeightsConfig,
    retry: RetryPolicy,
    sink: Arc<dyn ProgressSink>,
    metrics: Option<WeightMetrics>,
}

impl<L: Ledger> CommitRevealScheduler<L> {
    /// Creates a scheduler that logs progress through `tracing`.
    pub fn new(ledger: L, cfg: WeightsConfig) -> Self {
        let retry = cfg.retry_policy();
        Self {
            ledger,
            cfg,
            retry,
            sink: Arc::new(TracingSink),
            metrics: None,
        }
    }

    /// Reports commit-reveal states to `sink` instead of `tracing`.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Records commit and reveal outcomes into `metrics`.
    pub fn with_metrics(mut self, metrics: WeightMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns a reference to the underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Returns a reference to the scheduler configuration.
    pub fn config(&self) -> &WeightsConfig {
        &self.cfg
    }

    fn count_commit(&self, outcome: &str) {
        if let Some(m) = &self.metrics {
            m.commits_total.with_label_values(&[outcome]).inc();
        }
    }

    fn count_reveal(&self, outcome: &str) {
        if let Some(m) = &self.metrics {
            m.reveals_total.with_label_values(&[outcome]).inc();
        }
    }

    /// Encodes `weights`, hashes them with `salt` and submits the commitment.
    ///
    /// A fresh salt of `salt_len` entries is drawn when `salt` is `None`.
    /// Encoding errors are returned before the ledger is contacted.
    pub fn commit(
        &self,
        wallet: &Wallet,
        netuid: NetUid,
        uids: &[u64],
        weights: &[f32],
        salt: Option<Salt>,
    ) -> Result<CommitmentRecord, WeightsError> {
        let encoded = WeightCodec::encode(uids, weights)?;
        let salt = salt.unwrap_or_else(|| Salt::random(self.cfg.salt_len));
        let version_key = self.cfg.version_key;
        let commit_hash =
            CommitmentHasher::hash(&wallet.hotkey, netuid, &encoded, &salt, version_key);
        debug!(netuid, entries = encoded.len(), %commit_hash, "committing weights");

        // Extrinsics are sent once; only read-only queries go through `retry`.
        let outcome = match self.ledger.submit_commit_weights(netuid, &commit_hash, wallet) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.count_commit("error");
                warn!(netuid, error = %e, "weight commit failed");
                return Err(e.into());
            }
        };

        match outcome {
            ExtrinsicOutcome::Included(commit_block) => {
                self.count_commit("included");
                info!(netuid, commit_block, %commit_hash, "weights committed");
                self.sink
                    .commit_reveal_state(netuid, CommitRevealState::Committed);
                Ok(CommitmentRecord {
                    netuid,
                    weights: encoded,
                    salt,
                    version_key,
                    commit_hash,
                    commit_block,
                })
            }
            ExtrinsicOutcome::Rejected(reason) => {
                self.count_commit("rejected");
                warn!(netuid, %reason, "weight commit rejected");
                Err(WeightsError::Rejected {
                    phase: Phase::Commit,
                    reason,
                })
            }
        }
    }

    /// Waits for the reveal window of `record` and submits the reveal.
    ///
    /// Blocks the calling thread, polling the block height every
    /// `poll_interval`. The reveal itself is submitted once and never resent:
    /// a resend of an included reveal would be refused. Returns [`WeightsError::Expired`] as soon as the
    /// window is seen closed; that is final for this commitment.
    pub fn reveal(&self, wallet: &Wallet, record: &CommitmentRecord) -> Result<(), WeightsError> {
        let netuid = record.netuid;
        let window = self.retry.run("reveal_window", || {
            self.ledger.reveal_window(netuid, record.commit_block)
        })?;
        debug!(
            netuid,
            open = window.open_block,
            close = window.close_block,
            "reveal window"
        );

        let mut waiting = false;
        loop {
            let current_block = self
                .retry
                .run("current_block", || self.ledger.current_block())?;
            if window.has_closed(current_block) {
                self.count_reveal("expired");
                warn!(
                    netuid,
                    current_block,
                    close = window.close_block,
                    "reveal window closed"
                );
                self.sink
                    .commit_reveal_state(netuid, CommitRevealState::Expired);
                return Err(WeightsError::Expired {
                    close_block: window.close_block,
                    current_block,
                });
            }
            if window.is_open(current_block) {
                break;
            }
            if !waiting {
                waiting = true;
                self.sink
                    .commit_reveal_state(netuid, CommitRevealState::WaitingWindow);
            }
            debug!(netuid, current_block, open = window.open_block, "waiting for reveal window");
            thread::sleep(self.cfg.poll_interval());
        }

        self.sink
            .commit_reveal_state(netuid, CommitRevealState::RevealEligible);

        let outcome = match self.ledger.submit_reveal_weights(
            netuid,
            &record.weights,
            &record.salt,
            record.version_key,
            wallet,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.count_reveal("error");
                warn!(netuid, error = %e, "weight reveal failed");
                return Err(e.into());
            }
        };

        match outcome {
            ExtrinsicOutcome::Included(()) => {
                self.count_reveal("revealed");
                info!(netuid, commit_hash = %record.commit_hash, "weights revealed");
                self.sink
                    .commit_reveal_state(netuid, CommitRevealState::Revealed);
                Ok(())
            }
            ExtrinsicOutcome::Rejected(reason) => {
                self.count_reveal("rejected");
                warn!(netuid, %reason, "weight reveal rejected");
                Err(WeightsError::Rejected {
                    phase: Phase::Reveal,
                    reason,
                })
            }
        }
    }

    /// [`Self::commit`] with the result flattened for callers.
    pub fn commit_weights(
        &self,
        wallet: &Wallet,
        netuid: NetUid,
        uids: &[u64],
        weights: &[f32],
        salt: Option<Salt>,
    ) -> CommitResult {
        match self.commit(wallet, netuid, uids, weights, salt) {
            Ok(record) => CommitResult {
                success: true,
                message: COMMIT_OK.to_string(),
                record: Some(record),
            },
            Err(e) => CommitResult {
                success: false,
                message: e.to_string(),
                record: None,
            },
        }
    }

    /// [`Self::reveal`] with the result flattened for callers.
    pub fn reveal_weights(&self, wallet: &Wallet, record: &CommitmentRecord) -> RevealResult {
        RevealResult::from_outcome(self.reveal(wallet, record))
    }

    /// Commits and then reveals, end to end.
    pub fn commit_and_reveal(
        &self,
        wallet: &Wallet,
        netuid: NetUid,
        uids: &[u64],
        weights: &[f32],
        salt: Option<Salt>,
    ) -> RevealResult {
        let outcome = self
            .commit(wallet, netuid, uids, weights, salt)
            .and_then(|record| self.reveal(wallet, &record));
        RevealResult::from_outcome(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::ledger::{
        DevnetConfig, InMemoryLedger, LedgerError, RevealWindow, SubnetSpec, TracedLedger,
    };
    use crate::metrics::MetricsRegistry;
    use crate::progress::testing::RecordingSink;
    use crate::types::{
        AccountId, BlockHash, BlockNumber, CommitHash, EncodedWeights, PowSolution, Uid,
    };

    const NETUID: NetUid = 3;

    fn wallet() -> Wallet {
        Wallet::new(
            "validator",
            AccountId::from_seed(b"validator-hot"),
            AccountId::from_seed(b"validator-cold"),
        )
    }

    fn devnet(blocks_per_query: u64) -> InMemoryLedger {
        InMemoryLedger::new(DevnetConfig {
            blocks_per_query,
            subnets: vec![SubnetSpec {
                netuid: NETUID,
                difficulty: 1,
                reveal_interval: 10,
            }],
            ..DevnetConfig::default()
        })
    }

    fn cfg() -> WeightsConfig {
        WeightsConfig {
            poll_interval_ms: 0,
            retry_backoff_ms: 0,
            ..WeightsConfig::default()
        }
    }

    fn salt() -> Salt {
        Salt((1..=8).collect())
    }

    const UIDS: [u64; 4] = [1, 2, 3, 4];
    const WEIGHTS: [f32; 4] = [0.1, 0.2, 0.3, 0.4];

    #[test]
    fn commit_then_reveal_succeeds() {
        let w = wallet();
        let ledger = devnet(1);
        ledger.force_register(w.hotkey, NETUID);
        let sink = Arc::new(RecordingSink::default());
        let scheduler = CommitRevealScheduler::new(ledger, cfg()).with_sink(sink.clone());

        let result = scheduler.commit_and_reveal(&w, NETUID, &UIDS, &WEIGHTS, Some(salt()));
        assert_eq!(
            result,
            RevealResult {
                success: true,
                message: REVEAL_OK.to_string()
            }
        );

        let stored = scheduler
            .ledger()
            .weights_of(NETUID, &w.hotkey)
            .expect("weights stored on reveal");
        assert_eq!(stored, WeightCodec::encode(&UIDS, &WEIGHTS).unwrap());
        assert_eq!(
            sink.commit_reveal_states(),
            vec![
                CommitRevealState::Committed,
                CommitRevealState::WaitingWindow,
                CommitRevealState::RevealEligible,
                CommitRevealState::Revealed,
            ]
        );
    }

    #[test]
    fn reveal_with_different_salt_is_rejected() {
        let w = wallet();
        let ledger = devnet(1);
        ledger.force_register(w.hotkey, NETUID);
        let scheduler = CommitRevealScheduler::new(ledger, cfg());

        let committed = scheduler.commit_weights(&w, NETUID, &UIDS, &WEIGHTS, Some(salt()));
        assert!(committed.success);
        assert_eq!(committed.message, COMMIT_OK);
        let mut record = committed.record.expect("record on success");
        assert_eq!(record.commit_block, 1);
        record.salt = Salt((2..=9).collect());

        let result = scheduler.reveal_weights(&w, &record);
        assert!(!result.success);
        assert!(
            result.message.contains("InvalidRevealCommitHashNotMatch"),
            "unexpected message: {}",
            result.message
        );
        assert!(scheduler.ledger().weights_of(NETUID, &w.hotkey).is_none());
    }

    #[test]
    fn reveal_after_window_closes_expires_without_submitting() {
        let w = wallet();
        let ledger = TracedLedger::new(devnet(0));
        ledger.inner().force_register(w.hotkey, NETUID);
        let sink = Arc::new(RecordingSink::default());
        let scheduler = CommitRevealScheduler::new(ledger, cfg()).with_sink(sink.clone());

        let record = scheduler
            .commit(&w, NETUID, &UIDS, &WEIGHTS, None)
            .expect("commit");
        assert_eq!(record.salt.as_slice().len(), scheduler.config().salt_len);
        scheduler.ledger().inner().advance(30);

        let err = scheduler.reveal(&w, &record).unwrap_err();
        assert_eq!(
            err,
            WeightsError::Expired {
                close_block: 19,
                current_block: 31
            }
        );
        assert_eq!(scheduler.ledger().log().count("submit_reveal_weights"), 0);
        assert_eq!(
            sink.commit_reveal_states().last(),
            Some(&CommitRevealState::Expired)
        );
    }

    #[test]
    fn invalid_weights_never_reach_the_ledger() {
        let ledger = TracedLedger::new(devnet(1));
        let scheduler = CommitRevealScheduler::new(ledger, cfg());

        let err = scheduler
            .commit(&wallet(), NETUID, &[1, 2], &[0.5, f32::NAN], None)
            .unwrap_err();
        assert!(matches!(err, WeightsError::Encoding(_)));
        assert!(scheduler.ledger().log().records().is_empty());
    }

    #[test]
    fn commit_rejection_is_reported_and_counted() {
        let registry = MetricsRegistry::new().expect("metrics");
        let scheduler = CommitRevealScheduler::new(devnet(1), cfg())
            .with_metrics(registry.weights.clone());

        let result = scheduler.commit_weights(&wallet(), NETUID, &UIDS, &WEIGHTS, None);
        assert!(!result.success);
        assert!(result.record.is_none());
        assert!(result.message.contains("HotKeyNotRegisteredInSubNet"));
        assert_eq!(
            registry
                .weights
                .commits_total
                .with_label_values(&["rejected"])
                .get(),
            1
        );
    }

    /// Devnet ledger with injected transport failures.
    struct FlakyLedger {
        inner: InMemoryLedger,
        block_failures: Mutex<VecDeque<LedgerError>>,
        commit_failure: Option<LedgerError>,
        reveal_failure: Option<LedgerError>,
        commits: AtomicUsize,
        reveals: AtomicUsize,
    }

    impl FlakyLedger {
        fn new(inner: InMemoryLedger) -> Self {
            Self {
                inner,
                block_failures: Mutex::new(VecDeque::new()),
                commit_failure: None,
                reveal_failure: None,
                commits: AtomicUsize::new(0),
                reveals: AtomicUsize::new(0),
            }
        }

        fn fail_blocks(&self, errors: impl IntoIterator<Item = LedgerError>) {
            self.block_failures.lock().unwrap().extend(errors);
        }
    }

    impl Ledger for FlakyLedger {
        fn current_block(&self) -> Result<BlockNumber, LedgerError> {
            if let Some(e) = self.block_failures.lock().unwrap().pop_front() {
                return Err(e);
            }
            self.inner.current_block()
        }

        fn block_hash(&self, block: BlockNumber) -> Result<BlockHash, LedgerError> {
            self.inner.block_hash(block)
        }

        fn difficulty(&self, netuid: NetUid) -> Result<u64, LedgerError> {
            self.inner.difficulty(netuid)
        }

        fn subnet_exists(&self, netuid: NetUid) -> Result<bool, LedgerError> {
            self.inner.subnet_exists(netuid)
        }

        fn is_hotkey_registered(
            &self,
            hotkey: &AccountId,
            netuid: NetUid,
        ) -> Result<bool, LedgerError> {
            self.inner.is_hotkey_registered(hotkey, netuid)
        }

        fn uid_for_hotkey(
            &self,
            hotkey: &AccountId,
            netuid: NetUid,
        ) -> Result<Option<Uid>, LedgerError> {
            self.inner.uid_for_hotkey(hotkey, netuid)
        }

        fn submit_pow_register(
            &self,
            netuid: NetUid,
            solution: &PowSolution,
            wallet: &Wallet,
        ) -> Result<ExtrinsicOutcome, LedgerError> {
            self.inner.submit_pow_register(netuid, solution, wallet)
        }

        fn reveal_window(
            &self,
            netuid: NetUid,
            commit_block: BlockNumber,
        ) -> Result<RevealWindow, LedgerError> {
            self.inner.reveal_window(netuid, commit_block)
        }

        fn submit_commit_weights(
            &self,
            netuid: NetUid,
            commit_hash: &CommitHash,
            wallet: &Wallet,
        ) -> Result<ExtrinsicOutcome<BlockNumber>, LedgerError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            match &self.commit_failure {
                Some(e) => Err(e.clone()),
                None => self.inner.submit_commit_weights(netuid, commit_hash, wallet),
            }
        }

        fn submit_reveal_weights(
            &self,
            netuid: NetUid,
            weights: &EncodedWeights,
            salt: &Salt,
            version_key: u64,
            wallet: &Wallet,
        ) -> Result<ExtrinsicOutcome, LedgerError> {
            self.reveals.fetch_add(1, Ordering::SeqCst);
            match &self.reveal_failure {
                Some(e) => Err(e.clone()),
                None => self
                    .inner
                    .submit_reveal_weights(netuid, weights, salt, version_key, wallet),
            }
        }
    }

    fn registered_flaky(w: &Wallet) -> FlakyLedger {
        let inner = devnet(1);
        inner.force_register(w.hotkey, NETUID);
        FlakyLedger::new(inner)
    }

    #[test]
    fn reveal_timeout_is_reported_without_resending() {
        let w = wallet();
        let mut ledger = registered_flaky(&w);
        ledger.reveal_failure = Some(LedgerError::Timeout("reveal deadline".into()));
        let registry = MetricsRegistry::new().expect("metrics");
        let scheduler =
            CommitRevealScheduler::new(ledger, cfg()).with_metrics(registry.weights.clone());

        let result = scheduler.commit_and_reveal(&w, NETUID, &UIDS, &WEIGHTS, Some(salt()));
        assert!(!result.success);
        assert!(result.message.contains("timed out"), "{}", result.message);
        assert_eq!(scheduler.ledger().reveals.load(Ordering::SeqCst), 1);
        assert_eq!(
            registry
                .weights
                .reveals_total
                .with_label_values(&["error"])
                .get(),
            1
        );
    }

    #[test]
    fn commit_network_error_is_not_resent() {
        let w = wallet();
        let mut ledger = registered_flaky(&w);
        ledger.commit_failure = Some(LedgerError::Network("connection reset".into()));
        let scheduler = CommitRevealScheduler::new(ledger, cfg());

        let err = scheduler
            .commit(&w, NETUID, &UIDS, &WEIGHTS, None)
            .unwrap_err();
        assert_eq!(
            err,
            WeightsError::Ledger(LedgerError::Network("connection reset".into()))
        );
        assert_eq!(scheduler.ledger().commits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_block_queries_are_retried_while_polling() {
        let w = wallet();
        let ledger = registered_flaky(&w);
        let scheduler = CommitRevealScheduler::new(ledger, cfg());
        let record = scheduler
            .commit(&w, NETUID, &UIDS, &WEIGHTS, Some(salt()))
            .expect("commit");

        scheduler.ledger().fail_blocks([
            LedgerError::Network("reset".into()),
            LedgerError::Timeout("slow".into()),
        ]);
        let result = scheduler.reveal_weights(&w, &record);
        assert!(result.success, "{}", result.message);
        assert_eq!(scheduler.ledger().reveals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn persistent_block_query_failure_fails_the_reveal() {
        let w = wallet();
        let ledger = registered_flaky(&w);
        let scheduler = CommitRevealScheduler::new(
            ledger,
            WeightsConfig {
                max_ledger_retries: 1,
                ..cfg()
            },
        );
        let record = scheduler
            .commit(&w, NETUID, &UIDS, &WEIGHTS, Some(salt()))
            .expect("commit");

        scheduler
            .ledger()
            .fail_blocks((0..2).map(|_| LedgerError::Timeout("rpc deadline".into())));
        let result = scheduler.reveal_weights(&w, &record);
        assert!(!result.success);
        assert!(result.message.contains("rpc deadline"), "{}", result.message);
        assert_eq!(scheduler.ledger().reveals.load(Ordering::SeqCst), 0);
    }
}
