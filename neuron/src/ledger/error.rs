use thiserror::Error;

use crate::types::BlockNumber;

/// Failure to complete a call against the ledger.
///
/// Explicit rejections of a submitted extrinsic are *not* errors; they come
/// back as [`super::ExtrinsicOutcome::Rejected`]. This type covers the cases
/// where the ledger could not give an answer at all.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Transport-level failure (connection dropped, node unreachable).
    #[error("ledger network error: {0}")]
    Network(String),
    /// The call did not complete within the transport's deadline.
    #[error("ledger call timed out: {0}")]
    Timeout(String),
    /// The ledger answered with something the client cannot interpret.
    #[error("unexpected ledger response: {0}")]
    Protocol(String),
    /// A block was requested that the ledger does not know about.
    #[error("block {0} is not known to the ledger")]
    UnknownBlock(BlockNumber),
}

impl LedgerError {
    /// Returns `true` for failures that may succeed when retried unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Network(_) | LedgerError::Timeout(_))
    }
}
