//! Weight submission via commit-reveal.
//!
//! - [`codec`]: float weights to the ledger's fixed-point form,
//! - [`commitment`]: the commitment hash,
//! - [`scheduler`]: the commit / wait / reveal driver.

pub mod codec;
pub mod commitment;
pub mod config;
pub mod error;
pub mod scheduler;

pub use codec::WeightCodec;
pub use commitment::{COMMIT_SCHEME, CommitmentHasher};
pub use config::WeightsConfig;
pub use error::{EncodingError, Phase, WeightsError};
pub use scheduler::{CommitResult, CommitRevealScheduler, RevealResult};
