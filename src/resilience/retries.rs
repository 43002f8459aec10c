//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed attempt is retryable (failure class + remaining budget)
//! - Execute an operation with jittered backoff between attempts
//! - Report exhaustion and cancellation as distinct, typed outcomes
//!
//! # Design Decisions
//! - Permanent failures end the loop after one attempt
//! - Jittered backoff prevents synchronized retry storms
//! - Cancellation is checked before every attempt and raced against every sleep

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::failure::OperationError;
use crate::observability::metrics;
use crate::resilience::backoff::{apply_jitter, calculate_backoff};
use crate::resilience::circuit_breaker::FailureSignal;
use crate::resilience::timeouts::attempt_with_timeout;

/// Observer invoked before each backoff sleep: `(attempt, error, delay)`.
pub type OnRetry = Arc<dyn Fn(u32, &OperationError, Duration) + Send + Sync>;

/// Terminal failure of a retry loop.
#[derive(Debug, Error)]
pub enum RetryError {
    /// Attempts ran out, or the last failure was not retryable.
    #[error("gave up after {attempts} attempt(s): {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: OperationError,
    },

    /// The caller cancelled the loop.
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts } => *attempts,
        }
    }
}

impl FailureSignal for RetryError {
    fn is_breaker_failure(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Retry policy for a single invocation loop. Immutable once built.
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    on_retry: Option<OnRetry>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            on_retry: None,
        }
    }

    /// Attach an observer called before every backoff sleep.
    pub fn with_on_retry(mut self, on_retry: OnRetry) -> Self {
        self.on_retry = Some(on_retry);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Un-jittered delay before the retry that follows `attempt`.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        calculate_backoff(
            self.config.strategy,
            attempt,
            self.config.base_delay(),
            self.config.max_delay(),
            self.config.backoff_multiplier,
        )
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.compute_delay(attempt);
        if self.config.jitter {
            apply_jitter(delay, self.config.jitter_range)
        } else {
            delay
        }
    }

    /// Whether another attempt should follow a failed `attempt` (1-based).
    pub fn should_retry(&self, err: &OperationError, attempt: u32) -> bool {
        attempt < self.config.max_attempts && self.config.is_retryable_reason(err.reason)
    }

    /// Run `op` until it succeeds, fails permanently, runs out of attempts, or is cancelled.
    pub async fn execute<T, F, Fut>(
        &self,
        mut op: F,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                tracing::debug!(attempts = attempt, "Retry loop cancelled before attempt");
                return Err(RetryError::Cancelled { attempts: attempt });
            }

            attempt += 1;
            metrics::record_attempt();

            let err = match attempt_with_timeout(self.config.attempt_timeout(), op()).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempts = attempt, "Operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !self.should_retry(&err, attempt) {
                if attempt < max_attempts {
                    tracing::debug!(attempt, reason = %err.reason, "Failure not retryable");
                } else {
                    tracing::warn!(attempts = attempt, error = %err, "Retry budget exhausted");
                }
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }

            let delay = self.jittered_delay(attempt);
            tracing::info!(attempt, delay = ?delay, error = %err, "Retrying operation");
            if let Some(on_retry) = &self.on_retry {
                on_retry(attempt, &err, delay);
            }
            metrics::record_retry(err.reason);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    tracing::debug!(attempts = attempt, "Retry loop cancelled during backoff");
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
            }
        }
    }
}
