//! Neuron client library crate.
//!
//! This crate provides the client-side building blocks for joining a
//! subnet of a decentralized peer-ranking network and contributing scores
//! to it:
//!
//! - strongly-typed domain types (`types`),
//! - the ledger interface, a devnet simulator and a tracing decorator
//!   (`ledger`),
//! - the multi-threaded proof-of-work search (`pow`),
//! - the registration state machine (`registration`),
//! - weight encoding and the commit-reveal scheduler (`weights`),
//! - progress reporting hooks (`progress`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level configuration (`config`).
//!
//! The engines are synchronous and block the calling thread; async callers
//! run them under `tokio::task::spawn_blocking`.

pub mod config;
pub mod ledger;
pub mod metrics;
pub mod pow;
pub mod progress;
pub mod registration;
pub mod types;
pub mod weights;

// Re-export top-level configuration types.
pub use config::{ConfigError, MetricsConfig, NeuronConfig};

// Re-export the ledger seam and its implementations.
pub use ledger::{
    CallLog, DevnetConfig, ExtrinsicOutcome, InMemoryLedger, Ledger, LedgerError, RetryPolicy,
    RevealWindow, SubnetSpec, TracedLedger,
};

// Re-export the proof-of-work search.
pub use pow::{Collected, Freshness, HashTargetEvaluator, SearchParams, SolutionCollector, WorkerPool};

// Re-export the two engines and their results.
pub use registration::{
    RegistrationConfig, RegistrationError, RegistrationOrchestrator, RegistrationReport,
    RegistrationResult,
};
pub use weights::{
    CommitResult, CommitRevealScheduler, CommitmentHasher, EncodingError, RevealResult,
    WeightCodec, WeightsConfig, WeightsError,
};

pub use progress::{CommitRevealState, ProgressSink, RegistrationState, SolveProgress, TracingSink};

// Re-export metrics registry.
pub use metrics::{MetricsRegistry, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Registration orchestrator over a shared, call-recording ledger.
pub type TracedOrchestrator<L> = RegistrationOrchestrator<std::sync::Arc<TracedLedger<L>>>;

/// Commit-reveal scheduler over a shared, call-recording ledger.
pub type TracedScheduler<L> = CommitRevealScheduler<std::sync::Arc<TracedLedger<L>>>;
