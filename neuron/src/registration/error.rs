use std::io;

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::types::NetUid;

/// Definitive registration failures.
///
/// Stale solutions and "already registered" rejections never show up here:
/// the former are retried internally, the latter count as success.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("subnet {0} does not exist")]
    SubnetMissing(NetUid),
    /// Every allowed submission was rejected.
    #[error("registration rejected after {attempts} attempt(s): {reason}")]
    Rejected { attempts: u32, reason: String },
    /// Submission attempts ran out before any solution was submitted.
    #[error("no registration attempts left ({0} allowed)")]
    AttemptsExhausted(u32),
    #[error("no solution found within {0} solve cycle(s)")]
    SolveCyclesExhausted(u32),
    #[error("failed to start proof-of-work workers: {0}")]
    Worker(#[from] io::Error),
    #[error("all proof-of-work workers exited without a solution")]
    WorkersExited,
}
