//! Proof-of-work search for subnet registration.
//!
//! - [`evaluator`]: the puzzle itself (hash and difficulty target),
//! - [`pool`]: the multi-threaded nonce search,
//! - [`collector`]: the driver-side end of the result channel.

pub mod collector;
pub mod evaluator;
pub mod pool;

pub use collector::{Collected, Freshness, SolutionCollector};
pub use evaluator::{Evaluation, HashTargetEvaluator, meets_difficulty, target};
pub use pool::{PoolConfig, SearchParams, WorkerMessage, WorkerPool};
