//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap a single attempt or a whole guarded call with a deadline
//! - Cancel the operation cleanly on timeout (the future is dropped)
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; enforcement is cooperative
//! - An elapsed deadline is an ordinary `Timeout` failure, not a special case

use std::future::Future;
use std::time::Duration;

use crate::failure::OperationError;

/// Run `fut` under an optional deadline. An elapsed deadline yields `Err(limit)`.
pub async fn with_deadline<F, T>(deadline: Option<Duration>, fut: F) -> Result<T, Duration>
where
    F: Future<Output = T>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| limit),
        None => Ok(fut.await),
    }
}

/// Run one operation attempt under an optional deadline, mapping expiry to a `Timeout` failure.
pub async fn attempt_with_timeout<F, T>(
    deadline: Option<Duration>,
    fut: F,
) -> Result<T, OperationError>
where
    F: Future<Output = Result<T, OperationError>>,
{
    match with_deadline(deadline, fut).await {
        Ok(result) => result,
        Err(limit) => Err(OperationError::timeout(format!(
            "attempt exceeded {} ms",
            limit.as_millis()
        ))),
    }
}
