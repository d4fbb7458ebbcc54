//! Multi-threaded nonce search.
//!
//! A [`WorkerPool`] runs `N` named OS threads over one immutable
//! [`SearchParams`]. Worker `i` scans the arithmetic progression
//! `base + i + k*N` (wrapping), so the workers never hash the same nonce and
//! together cover the whole `u64` space. `base` is drawn from the OS RNG on
//! every start: a pool restarted on the same block does not repeat the
//! previous pool's prefix.
//!
//! Workers never touch the ledger. Their only outputs are
//! [`WorkerMessage`]s on a bounded channel drained by the
//! [`SolutionCollector`] returned alongside the pool.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, trace};

use crate::types::{AccountId, BlockHash, BlockNumber, PowSolution};

use super::collector::SolutionCollector;
use super::evaluator::HashTargetEvaluator;

/// Slots per worker in the result channel.
const CHANNEL_SLOTS_PER_WORKER: usize = 4;

/// Back-off between attempts to publish a solution into a full channel.
const PUBLISH_RETRY: Duration = Duration::from_millis(1);

/// Immutable inputs of one search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchParams {
    pub block_number: BlockNumber,
    pub block_hash: BlockHash,
    pub difficulty: u64,
    /// Registrant the proof is bound to.
    pub hotkey: AccountId,
}

impl SearchParams {
    /// Evaluator bound to this search's block, hotkey and difficulty.
    pub fn evaluator(&self) -> HashTargetEvaluator {
        HashTargetEvaluator::new(&self.block_hash, &self.hotkey, self.difficulty)
    }
}

/// Sizing of a [`WorkerPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pub num_workers: usize,
    /// Nonces hashed between stop-flag checks and hash-count reports.
    pub nonce_batch: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: default_workers(),
            nonce_batch: 10_000,
        }
    }
}

/// One less than the available cores, leaving a core for the driver thread.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Message from a worker to the collector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerMessage {
    /// A nonce that meets the target. Each worker sends at most one.
    Found(PowSolution),
    /// Number of nonces hashed since the previous report.
    ///
    /// Reports are best effort and dropped when the channel is full.
    Hashes(u64),
}

/// `k`-th nonce scanned by worker `index` of `stride` workers.
pub fn nonce_at(base: u64, index: u64, stride: u64, k: u64) -> u64 {
    base.wrapping_add(index).wrapping_add(k.wrapping_mul(stride))
}

/// Handle to a running set of search threads.
///
/// Dropping the pool raises the stop flag and joins every worker.
pub struct WorkerPool {
    params: Arc<SearchParams>,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    base: u64,
}

impl WorkerPool {
    /// Spawns the workers for `params` and returns the pool together with
    /// the collector that receives their results.
    ///
    /// Fails only if the OS refuses to spawn a thread; any workers already
    /// running are stopped before the error is returned.
    pub fn start(
        params: SearchParams,
        cfg: PoolConfig,
    ) -> io::Result<(WorkerPool, SolutionCollector)> {
        let workers = cfg.num_workers.max(1);
        let batch = cfg.nonce_batch.max(1);
        let (tx, rx) = mpsc::sync_channel(workers * CHANNEL_SLOTS_PER_WORKER);

        let mut pool = WorkerPool {
            params: Arc::new(params),
            stop: Arc::new(AtomicBool::new(false)),
            handles: Vec::with_capacity(workers),
            base: OsRng.next_u64(),
        };

        for index in 0..workers {
            let worker = Worker {
                index: index as u64,
                stride: workers as u64,
                base: pool.base,
                batch,
                params: Arc::clone(&pool.params),
                stop: Arc::clone(&pool.stop),
                tx: tx.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("pow-worker-{index}"))
                .spawn(move || worker.run())?;
            pool.handles.push(handle);
        }

        debug!(
            workers,
            block = pool.params.block_number,
            difficulty = pool.params.difficulty,
            base = pool.base,
            "worker pool started"
        );
        Ok((pool, SolutionCollector::new(rx)))
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn num_workers(&self) -> usize {
        self.handles.len()
    }

    /// Starting offset of the nonce space for this pool.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Signals every worker to stop and waits for them to exit.
    ///
    /// Idempotent; also run on drop.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let mut joined = 0usize;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                debug!("pow worker panicked");
            }
            joined += 1;
        }
        if joined > 0 {
            debug!(joined, block = self.params.block_number, "worker pool stopped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    index: u64,
    stride: u64,
    base: u64,
    batch: u64,
    params: Arc<SearchParams>,
    stop: Arc<AtomicBool>,
    tx: SyncSender<WorkerMessage>,
}

impl Worker {
    fn run(self) {
        let evaluator = self.params.evaluator();
        let mut k = 0u64;

        while !self.stop.load(Ordering::Relaxed) {
            for hashed in 1..=self.batch {
                let nonce = nonce_at(self.base, self.index, self.stride, k);
                k = k.wrapping_add(1);
                let evaluation = evaluator.evaluate(nonce);
                if evaluation.success {
                    let _ = self.tx.try_send(WorkerMessage::Hashes(hashed));
                    trace!(worker = self.index, nonce, "solution found");
                    self.publish(WorkerMessage::Found(PowSolution {
                        nonce,
                        block_number: self.params.block_number,
                        block_hash: self.params.block_hash,
                        difficulty: self.params.difficulty,
                        proof_hash: evaluation.proof_hash,
                    }));
                    return;
                }
            }
            let _ = self.tx.try_send(WorkerMessage::Hashes(self.batch));
        }
    }

    /// Delivers `msg` unless the pool is stopping or the collector is gone.
    fn publish(&self, mut msg: WorkerMessage) {
        loop {
            match self.tx.try_send(msg) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(back)) => {
                    if self.stop.load(Ordering::Relaxed) {
                        return;
                    }
                    msg = back;
                    thread::sleep(PUBLISH_RETRY);
                }
            }
        }
    }
}
