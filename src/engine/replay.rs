//! Replay of dead-lettered requests.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde_json::Value;

use crate::dlq::FailedRequest;
use crate::failure::OperationError;

pub type ReplayFuture = Pin<Box<dyn Future<Output = Result<Value, OperationError>> + Send>>;

/// Host-provided re-execution of an archived request, usually from its payload.
pub trait ReplayHandler: Send + Sync {
    fn replay(&self, request: FailedRequest) -> ReplayFuture;
}

impl<F> ReplayHandler for F
where
    F: Fn(FailedRequest) -> ReplayFuture + Send + Sync,
{
    fn replay(&self, request: FailedRequest) -> ReplayFuture {
        self(request)
    }
}

/// Outcome of one `replay_due` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub attempted: usize,
    pub resolved: usize,
    pub failed: usize,
    /// Skipped because the breaker was open.
    pub rejected: usize,
}
