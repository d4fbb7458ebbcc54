use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ledger::RetryPolicy;
use crate::types::weights::DEFAULT_SALT_LEN;

/// Commit-reveal parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    /// Version key committed alongside the weights; the ledger rejects
    /// reveals whose version it does not accept.
    pub version_key: u64,
    /// Number of `u16` entries in a generated salt.
    pub salt_len: usize,
    /// Delay between block-height polls while waiting for the reveal window.
    pub poll_interval_ms: u64,
    pub max_ledger_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            version_key: 0,
            salt_len: DEFAULT_SALT_LEN,
            poll_interval_ms: 6_000,
            max_ledger_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl WeightsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_ledger_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}
