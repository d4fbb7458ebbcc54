//! Receiving side of a [`super::WorkerPool`].

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::types::{BlockNumber, PowSolution};

use super::pool::WorkerMessage;

/// Result of one bounded wait on the workers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Collected {
    Solution(PowSolution),
    /// No solution arrived within the wait.
    Timeout,
    /// Every worker has exited without delivering a solution.
    Disconnected,
}

/// Whether a solution may still be submitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Drains worker messages and keeps the running hash count.
pub struct SolutionCollector {
    rx: Receiver<WorkerMessage>,
    hashes: u64,
    started: Instant,
}

impl SolutionCollector {
    pub(crate) fn new(rx: Receiver<WorkerMessage>) -> Self {
        Self {
            rx,
            hashes: 0,
            started: Instant::now(),
        }
    }

    /// Blocks until a solution arrives or `timeout` elapses.
    ///
    /// Hash-count reports received meanwhile are accumulated and do not end
    /// the wait.
    pub fn wait(&mut self, timeout: Duration) -> Collected {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(WorkerMessage::Found(solution)) => return Collected::Solution(solution),
                Ok(WorkerMessage::Hashes(n)) => {
                    self.hashes = self.hashes.saturating_add(n);
                    if Instant::now() >= deadline {
                        return Collected::Timeout;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Collected::Timeout,
                Err(RecvTimeoutError::Disconnected) => return Collected::Disconnected,
            }
        }
    }

    /// Nonces hashed so far, as reported by the workers.
    pub fn hashes(&self) -> u64 {
        self.hashes
    }

    /// Reported hashes per second since the pool started.
    pub fn hash_rate(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.hashes as f64 / secs
        } else {
            0.0
        }
    }

    /// Checks `solution` against the chain head.
    ///
    /// Stale once the chain has advanced more than `threshold` blocks past
    /// the block the solution was mined on.
    pub fn classify(
        solution: &PowSolution,
        current_block: BlockNumber,
        threshold: u64,
    ) -> Freshness {
        if solution.is_stale(current_block, threshold) {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}
