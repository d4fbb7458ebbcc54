//! Proof-of-work registration driver.
//!
//! One call to [`RegistrationOrchestrator::run`] walks the state machine
//!
//! ```text
//! Idle ─▶ CheckRegistered ─▶ Solving ─▶ Verifying ─▶ Submitting ─▶ Success
//!              ▲    │           │  ▲         │            │
//!              │    └─▶ Success │  └─ stale ─┘            ├─▶ RetrySolving ─▶ Solving
//!              ├──── timeout ───┘                         ├─▶ Failure
//!              └────────────── transport error ───────────┘
//! ```
//!
//! until the hotkey holds a slot on the subnet or a definitive failure is
//! reached. Nothing survives between calls: every call re-reads the ledger.
//!
//! Accounting:
//!
//! - `attempts_made` counts registration extrinsics actually submitted and
//!   is bounded by `max_attempts`. A submission is never resent; one that
//!   fails in transport still consumes its attempt, and registration is
//!   re-polled in case it landed anyway;
//! - read-only queries are retried locally on transient ledger errors;
//! - a solve cycle is one bounded wait on the worker pool; cycles that time
//!   out or whose solution goes stale do not consume attempts;
//! - the optional `max_solve_cycles` bounds total search time.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::ledger::{ExtrinsicOutcome, Ledger, RetryPolicy};
use crate::metrics::RegistrationMetrics;
use crate::pow::{Collected, Freshness, SearchParams, SolutionCollector, WorkerPool};
use crate::progress::{ProgressSink, RegistrationState, SolveProgress, TracingSink};
use crate::types::{NetUid, NeuronIdentity, PowSolution, Uid, Wallet};

use super::config::RegistrationConfig;
use super::error::RegistrationError;

/// Detailed outcome of a successful registration call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationReport {
    pub identity: NeuronIdentity,
    /// Registration extrinsics submitted during this call.
    pub attempts_made: u32,
    pub solve_cycles: u32,
    pub stale_solutions: u32,
}

/// Caller-facing result of a registration call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationResult {
    pub success: bool,
    pub error: Option<String>,
    /// Slot assigned to the hotkey, when the ledger reported one.
    pub uid: Option<Uid>,
}

impl From<Result<RegistrationReport, RegistrationError>> for RegistrationResult {
    fn from(result: Result<RegistrationReport, RegistrationError>) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                error: None,
                uid: report.identity.uid,
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
                uid: None,
            },
        }
    }
}

/// Registers hotkeys on subnets by proof of work.
pub struct RegistrationOrchestrator<L> {
    ledger: L,
    cfg: RegistrationConfig,
    retry: RetryPolicy,
    sink: Arc<dyn ProgressSink>,
    metrics: Option<RegistrationMetrics>,
}

impl<L: Ledger> RegistrationOrchestrator<L> {
    /// Creates an orchestrator that logs progress through `tracing`.
    pub fn new(ledger: L, cfg: RegistrationConfig) -> Self {
        let retry = cfg.retry_policy();
        Self {
            ledger,
            cfg,
            retry,
            sink: Arc::new(TracingSink),
            metrics: None,
        }
    }

    /// Reports states and solver progress to `sink` instead of `tracing`.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Records hashes, cycles and submissions into `metrics`.
    pub fn with_metrics(mut self, metrics: RegistrationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns a reference to the underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Returns a reference to the engine configuration.
    pub fn config(&self) -> &RegistrationConfig {
        &self.cfg
    }

    /// Registers `wallet`'s hotkey on `netuid`, blocking until done.
    ///
    /// Returns immediately with success if the hotkey is already registered.
    pub fn run(
        &self,
        wallet: &Wallet,
        netuid: NetUid,
    ) -> Result<RegistrationReport, RegistrationError> {
        let mut cycle = Cycle::new(self, wallet, netuid);
        let mut state = RegistrationState::Idle;
        loop {
            self.sink.registration_state(netuid, state);
            if state == RegistrationState::Success {
                return Ok(cycle.finish());
            }
            state = match cycle.step(state) {
                Ok(next) => next,
                Err(e) => {
                    cycle.search = None;
                    warn!(netuid, error = %e, "registration failed");
                    self.sink
                        .registration_state(netuid, RegistrationState::Failure);
                    return Err(e);
                }
            };
        }
    }

    /// [`Self::run`] with the result flattened for callers.
    pub fn register(&self, wallet: &Wallet, netuid: NetUid) -> RegistrationResult {
        self.run(wallet, netuid).into()
    }

    fn count_submission(&self, outcome: &str) {
        if let Some(m) = &self.metrics {
            m.submissions_total.with_label_values(&[outcome]).inc();
        }
    }
}

/// A running search. The collector is declared first so it is dropped
/// before the pool joins its workers.
struct ActiveSearch {
    collector: SolutionCollector,
    pool: WorkerPool,
    started: Instant,
    /// Hashes already forwarded to the metrics counter.
    reported: u64,
}

/// Mutable state of one `run` call.
struct Cycle<'a, L> {
    orch: &'a RegistrationOrchestrator<L>,
    wallet: &'a Wallet,
    netuid: NetUid,
    attempts_made: u32,
    solve_cycles: u32,
    stale_solutions: u32,
    last_reason: Option<String>,
    search: Option<ActiveSearch>,
    pending: Option<PowSolution>,
}

impl<'a, L: Ledger> Cycle<'a, L> {
    fn new(orch: &'a RegistrationOrchestrator<L>, wallet: &'a Wallet, netuid: NetUid) -> Self {
        Self {
            orch,
            wallet,
            netuid,
            attempts_made: 0,
            solve_cycles: 0,
            stale_solutions: 0,
            last_reason: None,
            search: None,
            pending: None,
        }
    }

    fn step(&mut self, state: RegistrationState) -> Result<RegistrationState, RegistrationError> {
        match state {
            RegistrationState::Idle => Ok(RegistrationState::CheckRegistered),
            RegistrationState::CheckRegistered => self.check_registered(),
            RegistrationState::Solving => self.solve(),
            RegistrationState::Verifying => self.verify(),
            RegistrationState::Submitting => self.submit(),
            RegistrationState::RetrySolving => Ok(RegistrationState::Solving),
            RegistrationState::Success | RegistrationState::Failure => Ok(state),
        }
    }

    fn check_registered(&mut self) -> Result<RegistrationState, RegistrationError> {
        let ledger = &self.orch.ledger;
        let netuid = self.netuid;
        let hotkey = &self.wallet.hotkey;

        if !self
            .orch
            .retry
            .run("subnet_exists", || ledger.subnet_exists(netuid))?
        {
            return Err(RegistrationError::SubnetMissing(netuid));
        }
        if self
            .orch
            .retry
            .run("is_hotkey_registered", || ledger.is_hotkey_registered(hotkey, netuid))?
        {
            if self.search.take().is_some() {
                debug!(netuid, "hotkey registered while solving, search cancelled");
            }
            return Ok(RegistrationState::Success);
        }
        if self.attempts_made >= self.orch.cfg.max_attempts {
            return Err(self.exhausted());
        }
        Ok(RegistrationState::Solving)
    }

    fn exhausted(&mut self) -> RegistrationError {
        match self.last_reason.take() {
            Some(reason) => RegistrationError::Rejected {
                attempts: self.attempts_made,
                reason,
            },
            None => RegistrationError::AttemptsExhausted(self.orch.cfg.max_attempts),
        }
    }

    fn search_params(&self) -> Result<SearchParams, RegistrationError> {
        let ledger = &self.orch.ledger;
        let retry = &self.orch.retry;
        let netuid = self.netuid;

        let block_number = retry.run("current_block", || ledger.current_block())?;
        let block_hash = retry.run("block_hash", || ledger.block_hash(block_number))?;
        let difficulty = retry.run("difficulty", || ledger.difficulty(netuid))?;
        Ok(SearchParams {
            block_number,
            block_hash,
            difficulty,
            hotkey: self.wallet.hotkey,
        })
    }

    fn solve(&mut self) -> Result<RegistrationState, RegistrationError> {
        let cfg = &self.orch.cfg;
        if let Some(max) = cfg.max_solve_cycles {
            if self.solve_cycles >= max {
                return Err(RegistrationError::SolveCyclesExhausted(max));
            }
        }
        self.solve_cycles += 1;
        if let Some(m) = &self.orch.metrics {
            m.solve_cycles_total.inc();
        }

        let params = self.search_params()?;
        let restart = self
            .search
            .as_ref()
            .is_none_or(|s| s.pool.params() != &params);
        if restart {
            // Stop the old workers before the new ones compete for cores.
            self.search = None;
            debug!(
                netuid = self.netuid,
                block = params.block_number,
                difficulty = params.difficulty,
                "starting proof-of-work search"
            );
            let (pool, collector) = WorkerPool::start(params, cfg.pool_config())?;
            self.search = Some(ActiveSearch {
                collector,
                pool,
                started: Instant::now(),
                reported: 0,
            });
        }

        let Some(search) = self.search.as_mut() else {
            return Ok(RegistrationState::Solving);
        };
        let collected = search.collector.wait(cfg.update_interval());

        let hashes = search.collector.hashes();
        if let Some(m) = &self.orch.metrics {
            m.hashes_total.inc_by(hashes - search.reported);
        }
        search.reported = hashes;

        match collected {
            Collected::Solution(solution) => {
                let elapsed = search.started.elapsed();
                if let Some(m) = &self.orch.metrics {
                    m.solve_seconds.observe(elapsed.as_secs_f64());
                }
                info!(
                    netuid = self.netuid,
                    block = solution.block_number,
                    nonce = solution.nonce,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "solution found"
                );
                self.pending = Some(solution);
                Ok(RegistrationState::Verifying)
            }
            Collected::Timeout => {
                let params = search.pool.params();
                self.orch.sink.solve_progress(&SolveProgress {
                    netuid: self.netuid,
                    block_number: params.block_number,
                    difficulty: params.difficulty,
                    hashes,
                    hash_rate: search.collector.hash_rate(),
                    solve_cycle: self.solve_cycles,
                });
                Ok(RegistrationState::CheckRegistered)
            }
            Collected::Disconnected => {
                self.search = None;
                Err(RegistrationError::WorkersExited)
            }
        }
    }

    fn verify(&mut self) -> Result<RegistrationState, RegistrationError> {
        let Some(solution) = self.pending.take() else {
            return Ok(RegistrationState::Solving);
        };
        let ledger = &self.orch.ledger;
        let current_block = self
            .orch
            .retry
            .run("current_block", || ledger.current_block())?;

        // The search produced its one solution; a new one needs a new pool.
        self.search = None;

        match SolutionCollector::classify(
            &solution,
            current_block,
            self.orch.cfg.staleness_threshold,
        ) {
            Freshness::Stale => {
                self.stale_solutions += 1;
                if let Some(m) = &self.orch.metrics {
                    m.stale_solutions_total.inc();
                }
                info!(
                    netuid = self.netuid,
                    block = solution.block_number,
                    current_block,
                    "solution is stale, solving again"
                );
                Ok(RegistrationState::Solving)
            }
            Freshness::Fresh => {
                self.pending = Some(solution);
                Ok(RegistrationState::Submitting)
            }
        }
    }

    fn submit(&mut self) -> Result<RegistrationState, RegistrationError> {
        let Some(solution) = self.pending.take() else {
            return Ok(RegistrationState::Solving);
        };
        let ledger = &self.orch.ledger;
        let netuid = self.netuid;
        let wallet = self.wallet;

        self.attempts_made += 1;
        info!(
            netuid,
            attempt = self.attempts_made,
            max_attempts = self.orch.cfg.max_attempts,
            block = solution.block_number,
            nonce = solution.nonce,
            "submitting registration"
        );
        // Sent exactly once: a resend could land a second extrinsic, and an
        // unanswered send may still have been included.
        let outcome = match ledger.submit_pow_register(netuid, &solution, wallet) {
            Ok(outcome) => outcome,
            Err(e) if e.is_transient() => {
                self.orch.count_submission("error");
                warn!(netuid, attempt = self.attempts_made, error = %e, "registration submit failed");
                if self.attempts_made >= self.orch.cfg.max_attempts {
                    return Err(e.into());
                }
                self.last_reason = Some(e.to_string());
                return Ok(RegistrationState::CheckRegistered);
            }
            Err(e) => return Err(e.into()),
        };

        if outcome.is_already_registered() {
            self.orch.count_submission("already_registered");
            info!(netuid, "hotkey already registered");
            return Ok(RegistrationState::Success);
        }
        match outcome {
            ExtrinsicOutcome::Included(()) => {
                self.orch.count_submission("included");
                info!(netuid, attempt = self.attempts_made, "registration included");
                Ok(RegistrationState::Success)
            }
            ExtrinsicOutcome::Rejected(reason) => {
                self.orch.count_submission("rejected");
                warn!(netuid, attempt = self.attempts_made, %reason, "registration rejected");
                self.last_reason = Some(reason);
                if self.attempts_made >= self.orch.cfg.max_attempts {
                    return Err(self.exhausted());
                }
                Ok(RegistrationState::RetrySolving)
            }
        }
    }

    /// Builds the report, looking up the assigned UID once.
    fn finish(mut self) -> RegistrationReport {
        self.search = None;
        let ledger = &self.orch.ledger;
        let hotkey = &self.wallet.hotkey;
        let netuid = self.netuid;
        let uid = match self
            .orch
            .retry
            .run("uid_for_hotkey", || ledger.uid_for_hotkey(hotkey, netuid))
        {
            Ok(uid) => uid,
            Err(e) => {
                warn!(netuid, error = %e, "registered, but uid lookup failed");
                None
            }
        };
        RegistrationReport {
            identity: NeuronIdentity {
                hotkey: self.wallet.hotkey,
                coldkey: self.wallet.coldkey,
                netuid,
                uid,
                is_registered: true,
            },
            attempts_made: self.attempts_made,
            solve_cycles: self.solve_cycles,
            stale_solutions: self.stale_solutions,
        }
    }
}
