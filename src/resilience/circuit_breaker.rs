//! Circuit breaker for operation-class protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: operation assumed broken, calls fail fast
//! - Half-Open: testing if the operation recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first call after recovery_timeout since the last failure
//! Half-Open → Closed: success_threshold consecutive successes
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - One breaker per operation class, not per resource key
//! - Fail fast in Open state (the operation is never invoked)
//! - Bookkeeping happens under one mutex; the operation runs outside it

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::failure::OperationError;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;

/// Current state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tells the breaker whether an error counts against the circuit.
///
/// Cancellations, for example, are not evidence that the operation is unhealthy.
pub trait FailureSignal {
    fn is_breaker_failure(&self) -> bool {
        true
    }
}

impl FailureSignal for OperationError {}

/// Returned without invoking the operation while the circuit is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{name}' is open, retry in {}s", retry_after.as_secs())]
pub struct CircuitOpenError {
    pub name: String,
    /// Time left until the breaker will let a probe through.
    pub retry_after: Duration,
}

/// Outcome of a guarded call that did not succeed.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error(transparent)]
    Open(CircuitOpenError),

    #[error("call exceeded {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Inner(E),
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    pub times_opened: u64,
    pub secs_since_last_failure: Option<f64>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    rejected_calls: u64,
    times_opened: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            rejected_calls: 0,
            times_opened: 0,
        }
    }
}

/// Failure-isolation guard for one logical operation class.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, without applying the lazy Open → Half-Open transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `op` through the breaker.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureSignal,
    {
        self.acquire().map_err(BreakerError::Open)?;

        match with_deadline(self.config.call_timeout(), op()).await {
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                if err.is_breaker_failure() {
                    self.on_failure();
                }
                Err(BreakerError::Inner(err))
            }
            Err(limit) => {
                tracing::warn!(breaker = %self.name, timeout = ?limit, "Guarded call timed out");
                self.on_failure();
                Err(BreakerError::TimedOut(limit))
            }
        }
    }

    /// Admit or reject a call, applying the lazy Open → Half-Open transition.
    fn acquire(&self) -> Result<(), CircuitOpenError> {
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let recovery = self.config.recovery_timeout();
            let elapsed = inner.last_failure.map(|t| t.elapsed()).unwrap_or(recovery);
            if elapsed < recovery {
                inner.rejected_calls += 1;
                metrics::record_breaker_rejection(&self.name);
                return Err(CircuitOpenError {
                    name: self.name.clone(),
                    retry_after: recovery - elapsed,
                });
            }
            inner.success_count = 0;
            self.transition(&mut inner, CircuitState::HalfOpen);
        }

        inner.total_calls += 1;
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.successful_calls += 1;

        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            // A call admitted before the circuit opened finished late.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        inner.failed_calls += 1;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                inner.success_count = 0;
                self.open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut BreakerState) {
        inner.times_opened += 1;
        self.transition(inner, CircuitState::Open);
        tracing::warn!(
            breaker = %self.name,
            failures = inner.failure_count,
            recovery_timeout_secs = self.config.recovery_timeout_secs,
            "Circuit opened"
        );
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit state change");
        metrics::record_breaker_transition(&self.name, to);
    }

    /// Force the breaker closed and clear its counters. Cumulative totals are kept.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure = None;
        self.transition(&mut inner, CircuitState::Closed);
    }

    pub fn metrics(&self) -> BreakerMetrics {
        let inner = self.lock();
        BreakerMetrics {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_calls: inner.total_calls,
            successful_calls: inner.successful_calls,
            failed_calls: inner.failed_calls,
            rejected_calls: inner.rejected_calls,
            times_opened: inner.times_opened,
            secs_since_last_failure: inner.last_failure.map(|t| t.elapsed().as_secs_f64()),
        }
    }
}

/// Breakers keyed by operation class, created on first use from one shared config.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = %name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(name, self.config.clone()))
            })
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|r| r.value().clone())
    }

    pub fn metrics(&self, name: &str) -> Option<BreakerMetrics> {
        self.get(name).map(|b| b.metrics())
    }

    /// Metrics for every breaker, sorted by name.
    pub fn all_metrics(&self) -> Vec<BreakerMetrics> {
        let mut all: Vec<_> = self.breakers.iter().map(|r| r.value().metrics()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(failure_threshold: u32, success_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout_secs: 30,
            success_threshold,
            call_timeout_secs: None,
        }
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), BreakerError<OperationError>> {
        cb.call(|| async { Err(OperationError::network("boom")) }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), BreakerError<OperationError>> {
        cb.call(|| async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_on_kth_consecutive_failure() {
        let cb = CircuitBreaker::new("fetch_page", config(3, 1));

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.metrics().times_opened, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("fetch_page", config(3, 1));

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.metrics().failure_count, 0);

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_invoking() {
        let cb = CircuitBreaker::new("fetch_page", config(1, 1));
        let _ = fail(&cb).await;

        let calls = AtomicU32::new(0);
        for _ in 0..5 {
            let out = cb
                .call(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, OperationError>(()) }
                })
                .await;
            assert!(matches!(out, Err(BreakerError::Open(_))));
            tokio::time::advance(Duration::from_secs(5)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.metrics().rejected_calls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_recovery_timeout() {
        let cb = CircuitBreaker::new("fetch_page", config(1, 2));
        let _ = fail(&cb).await;

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open(_))));

        tokio::time::advance(Duration::from_secs(1)).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("fetch_page", config(1, 3));
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.metrics().times_opened, 2);
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_counts_as_failure() {
        let cb = CircuitBreaker::new(
            "fetch_page",
            CircuitBreakerConfig {
                call_timeout_secs: Some(1),
                ..config(1, 1)
            },
        );

        let out = cb
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, OperationError>(())
            })
            .await;

        assert!(matches!(out, Err(BreakerError::TimedOut(_))));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_failure_signal_ignored() {
        struct Cancelled;
        impl FailureSignal for Cancelled {
            fn is_breaker_failure(&self) -> bool {
                false
            }
        }

        let cb = CircuitBreaker::new("fetch_page", config(1, 1));
        let out = cb.call(|| async { Err::<(), _>(Cancelled) }).await;
        assert!(matches!(out, Err(BreakerError::Inner(Cancelled))));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().failed_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_closes() {
        let cb = CircuitBreaker::new("fetch_page", config(1, 1));
        let _ = fail(&cb).await;
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.metrics().total_calls, 2);
    }

    #[test]
    fn test_registry_shares_instances() {
        let registry = CircuitBreakerRegistry::new(config(3, 1));
        let a = registry.get_or_create("fetch_page");
        let b = registry.get_or_create("fetch_page");
        registry.get_or_create("search");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.metrics("missing").is_none());
        let names: Vec<_> = registry.all_metrics().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["fetch_page", "search"]);
    }
}
