//! Engine-level errors.

use thiserror::Error;

use crate::failure::FailureReason;
use crate::resilience::CircuitOpenError;

/// Why a `run` call produced no result.
#[derive(Debug, Error)]
pub enum RunError {
    /// The breaker rejected the call; the operation was never invoked and nothing was queued.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error("run cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// Attempts ran out or the failure was permanent; archived under `dlq_id`.
    #[error("{reason} after {attempts} attempt(s): {message} (dead letter {dlq_id})")]
    Failed {
        reason: FailureReason,
        message: String,
        attempts: u32,
        dlq_id: String,
    },
}

impl RunError {
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            RunError::Failed { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    pub fn dlq_id(&self) -> Option<&str> {
        match self {
            RunError::Failed { dlq_id, .. } => Some(dlq_id),
            _ => None,
        }
    }
}

/// Why replaying a dead-lettered request did not resolve it.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("no active failed request with id {0}")]
    NotFound(String),

    #[error("failed request {id} is not retryable ({reason}, {retry_count} re-attempt(s) used)")]
    NotRetryable {
        id: String,
        reason: FailureReason,
        retry_count: u32,
    },

    #[error("no replay handler registered")]
    NoHandler,

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error("replay of {id} failed ({reason}): {message}")]
    Failed {
        id: String,
        reason: FailureReason,
        message: String,
        retry_count: u32,
    },
}
