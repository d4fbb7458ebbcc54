use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ledger::RetryPolicy;
use crate::pow::PoolConfig;
use crate::pow::pool::default_workers;

/// Registration tuning.
///
/// Defaults follow the public client: a solution mined on block `b` is
/// dropped once the chain reaches `b + 4`, and at most three registration
/// extrinsics are sent per call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Search threads; defaults to one less than the available cores.
    pub num_workers: usize,
    /// How long one solve cycle waits for a solution before re-checking
    /// the ledger.
    pub update_interval_ms: u64,
    /// Maximum registration extrinsics submitted per call.
    pub max_attempts: u32,
    /// Blocks a solution may lag behind the head and still be submitted.
    pub staleness_threshold: u64,
    /// Optional cap on solve cycles; `None` searches until success or
    /// submission attempts run out.
    pub max_solve_cycles: Option<u32>,
    /// Nonces per worker between stop checks and hash-count reports.
    pub nonce_batch: u64,
    pub max_ledger_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            num_workers: default_workers(),
            update_interval_ms: 5_000,
            max_attempts: 3,
            staleness_threshold: 3,
            max_solve_cycles: None,
            nonce_batch: 10_000,
            max_ledger_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl RegistrationConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_ledger_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            num_workers: self.num_workers,
            nonce_batch: self.nonce_batch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: RegistrationConfig =
            serde_json::from_str(r#"{ "max_attempts": 5, "max_solve_cycles": 10 }"#)
                .expect("parse");
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.max_solve_cycles, Some(10));
        assert_eq!(cfg.staleness_threshold, 3);
        assert_eq!(cfg.update_interval(), Duration::from_secs(5));
        assert!(cfg.num_workers >= 1);
    }
}
