use std::fmt;

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::types::BlockNumber;

/// Invalid input to [`super::WeightCodec::encode`].
///
/// Always raised before anything is sent to the ledger.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EncodingError {
    #[error("{uids} uids but {weights} weights")]
    LengthMismatch { uids: usize, weights: usize },
    #[error("weight at index {index} is not finite")]
    NonFinite { index: usize },
    #[error("weight at index {index} is negative ({value})")]
    Negative { index: usize, value: f32 },
    #[error("uid {0} does not fit in u16")]
    UidOutOfRange(u64),
    #[error("uid {0} appears more than once")]
    DuplicateUid(u16),
}

/// Which half of commit-reveal a rejection belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Commit,
    Reveal,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Commit => f.write_str("commit"),
            Phase::Reveal => f.write_str("reveal"),
        }
    }
}

/// Errors returned by [`super::CommitRevealScheduler`].
#[derive(Debug, Error, PartialEq)]
pub enum WeightsError {
    #[error("invalid weights: {0}")]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The ledger refused the extrinsic. Not retried with the same data.
    #[error("{phase} rejected by ledger: {reason}")]
    Rejected { phase: Phase, reason: String },
    /// The reveal window closed before the reveal could be submitted.
    #[error("reveal window closed at block {close_block} (now at {current_block})")]
    Expired {
        close_block: BlockNumber,
        current_block: BlockNumber,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_message_names_phase() {
        let err = WeightsError::Rejected {
            phase: Phase::Reveal,
            reason: "InvalidRevealCommitHashNotMatch".into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("reveal rejected"));
        assert!(msg.contains("HashNotMatch"));
    }

    #[test]
    fn encoding_errors_convert() {
        let err: WeightsError = EncodingError::DuplicateUid(4).into();
        match err {
            WeightsError::Encoding(EncodingError::DuplicateUid(4)) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
