//! Resilience engine.
//!
//! # Responsibilities
//! - Compose breaker, retry policy, dead letter queue and degradation manager
//! - Run caller operations through them and report one typed outcome
//! - Own the background tasks and stop them deterministically
//! - Replay archived requests through a host-provided handler
//!
//! # Design Decisions
//! - Built once at process start and passed around; no global accessors
//! - Construction spawns nothing; `start` does
//! - One breaker per operation class, shared by every resource key

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::degradation::{
    DegradationLevel, DegradationManager, DegradationStatus, DegradationStrategy, RecoveryMonitor,
    ResetHandle, StrategyContext,
};
use crate::dlq::{DeadLetterQueue, FailedRequest, Filter, RetentionSweeper, Statistics};
use crate::engine::error::{ReplayError, RunError};
use crate::engine::replay::{ReplayHandler, ReplaySummary};
use crate::failure::{FailureReason, OperationError};
use crate::lifecycle::shutdown::Shutdown;
use crate::resilience::{
    BreakerError, BreakerMetrics, CircuitBreakerRegistry, OnRetry, RetryError, RetryPolicy,
};

/// Operation class used when a run does not name one.
pub const DEFAULT_OPERATION: &str = "default";

/// Per-call settings for [`ResilienceEngine::run`].
#[derive(Clone)]
pub struct RunConfig {
    /// Operation class; selects the breaker and keys degradation strategies.
    pub operation: String,
    /// Stored with the dead letter entry for replay.
    pub payload: Option<Value>,
    pub context: BTreeMap<String, String>,
    pub partial_data: Option<Value>,
    pub reset: Option<Arc<dyn ResetHandle>>,
    pub cancel: CancellationToken,
    /// Re-attempt budget for the dead letter entry. Defaults to the queue's.
    pub max_retries: Option<u32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OPERATION)
    }
}

impl RunConfig {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            payload: None,
            context: BTreeMap::new(),
            partial_data: None,
            reset: None,
            cancel: CancellationToken::new(),
            max_retries: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_partial_data(mut self, data: Value) -> Self {
        self.partial_data = Some(data);
        self
    }

    pub fn with_reset(mut self, reset: Arc<dyn ResetHandle>) -> Self {
        self.reset = Some(reset);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Where a successful result came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    Primary,
    Degraded {
        strategy: String,
        level: DegradationLevel,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub value: Value,
    pub provenance: Provenance,
}

impl RunOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self.provenance, Provenance::Degraded { .. })
    }
}

pub struct ResilienceEngine {
    config: EngineConfig,
    breakers: CircuitBreakerRegistry,
    retry: RetryPolicy,
    dead_letters: Arc<DeadLetterQueue>,
    degradation: Arc<DegradationManager>,
    replay_handler: RwLock<Option<Arc<dyn ReplayHandler>>>,
    shutdown: Shutdown,
    stopped: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ResilienceEngine {
    /// Build every component from `config`. Spawns nothing.
    pub fn new(config: EngineConfig) -> Self {
        let breakers = CircuitBreakerRegistry::new(config.circuit_breaker.clone());
        let retry = RetryPolicy::new(config.retry.clone());
        let dead_letters = Arc::new(DeadLetterQueue::open(config.dead_letter.clone()));
        let degradation = Arc::new(DegradationManager::with_builtin_strategies(
            config.degradation.clone(),
        ));

        tracing::info!(
            failure_threshold = config.circuit_breaker.failure_threshold,
            max_attempts = config.retry.max_attempts,
            dlq_path = ?config.dead_letter.path,
            dlq_active = dead_letters.len(),
            "Resilience engine initialized"
        );

        Self {
            config,
            breakers,
            retry,
            dead_letters,
            degradation,
            replay_handler: RwLock::new(None),
            shutdown: Shutdown::new(),
            stopped: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Observe every retry sleep, e.g. to log per-URL progress.
    pub fn with_on_retry(mut self, on_retry: OnRetry) -> Self {
        self.retry = self.retry.with_on_retry(on_retry);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterQueue> {
        &self.dead_letters
    }

    pub fn degradation(&self) -> &Arc<DegradationManager> {
        &self.degradation
    }

    /// Spawn the retention sweep and the recovery monitor. Must run inside a tokio runtime.
    ///
    /// An engine that has been shut down stays down.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if self.stopped.load(Ordering::Acquire) {
            tracing::warn!("Resilience engine already shut down, not restarting background tasks");
            return;
        }
        if !tasks.is_empty() {
            tracing::warn!("Resilience engine already started");
            return;
        }

        let sweeper = RetentionSweeper::new(self.dead_letters.clone());
        tasks.push(tokio::spawn(sweeper.run(self.shutdown.subscribe())));

        let monitor = RecoveryMonitor::new(self.degradation.clone());
        tasks.push(tokio::spawn(monitor.run(self.shutdown.subscribe())));

        tracing::info!(tasks = tasks.len(), "Background tasks started");
    }

    /// Stop background tasks and flush the dead letter queue.
    ///
    /// Returns `false` if some task had to be aborted at the deadline.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let handles: Vec<_> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            self.stopped.store(true, Ordering::Release);
            tasks.drain(..).collect()
        };

        tracing::info!(tasks = handles.len(), "Shutting down resilience engine");
        self.shutdown.trigger();

        let deadline = tokio::time::Instant::now() + timeout;
        let mut clean = true;
        for handle in handles {
            let abort = handle.abort_handle();
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Background task ended abnormally");
                    clean = false;
                }
                Err(_) => {
                    tracing::warn!("Background task missed shutdown deadline, aborting");
                    abort.abort();
                    clean = false;
                }
            }
        }

        if let Err(e) = self.dead_letters.flush().await {
            tracing::error!(error = %e, "Final dead letter flush failed");
            clean = false;
        }
        clean
    }

    pub fn register_strategy(&self, strategy: Arc<dyn DegradationStrategy>) {
        self.degradation.register(strategy);
    }

    pub fn set_replay_handler(&self, handler: Arc<dyn ReplayHandler>) {
        *self
            .replay_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Run `op` for `key` through degradation, breaker and retry policy.
    pub async fn run<F, Fut>(&self, key: &str, mut op: F, run: RunConfig) -> Result<RunOutcome, RunError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value, OperationError>>,
    {
        let ctx = StrategyContext {
            operation_key: run.operation.clone(),
            resource_key: key.to_string(),
            partial_data: run.partial_data.clone(),
            reset: run.reset.clone(),
        };

        if self.degradation.level().is_degraded() {
            if let Some(degraded) = self.degradation.execute_with_degradation(&ctx) {
                return Ok(RunOutcome {
                    value: degraded.value,
                    provenance: Provenance::Degraded {
                        strategy: degraded.strategy,
                        level: degraded.level,
                    },
                });
            }
        }

        let breaker = self.breakers.get_or_create(&run.operation);
        let mut invocations = 0u32;
        let counted = || {
            invocations += 1;
            op()
        };
        let result = breaker
            .call(|| self.retry.execute(counted, &run.cancel))
            .await;

        match result {
            Ok(value) => {
                self.degradation.record_success(&ctx, &value);
                Ok(RunOutcome {
                    value,
                    provenance: Provenance::Primary,
                })
            }
            Err(BreakerError::Open(open)) => {
                tracing::debug!(key, breaker = %open.name, "Fast-failed on open circuit");
                Err(RunError::CircuitOpen(open))
            }
            Err(BreakerError::Inner(RetryError::Cancelled { attempts })) => {
                tracing::debug!(key, attempts, "Run cancelled");
                Err(RunError::Cancelled { attempts })
            }
            Err(BreakerError::Inner(RetryError::Exhausted { attempts, last_error })) => {
                Err(self.archive(key, &run, last_error.reason, last_error.message, attempts))
            }
            Err(BreakerError::TimedOut(limit)) => Err(self.archive(
                key,
                &run,
                FailureReason::Timeout,
                format!("call exceeded {limit:?}"),
                invocations,
            )),
        }
    }

    fn archive(
        &self,
        key: &str,
        run: &RunConfig,
        reason: FailureReason,
        message: String,
        attempts: u32,
    ) -> RunError {
        let max_retries = run.max_retries.unwrap_or(self.dead_letters.config().max_retries);
        let mut request = FailedRequest::new(key, reason, message.clone(), max_retries)
            .with_context("operation", run.operation.clone())
            .with_context("attempts", attempts.to_string());
        request.context.extend(run.context.clone());
        if let Some(payload) = &run.payload {
            request = request.with_payload(payload.clone());
        }

        let dlq_id = self.dead_letters.add(request);
        if let Some(level) = self.degradation.record_failure(reason.as_str()) {
            tracing::warn!(key, level = %level, "Failures escalated service level");
        }

        RunError::Failed {
            reason,
            message,
            attempts,
            dlq_id,
        }
    }

    /// Replay one archived request now, ignoring its backoff window.
    ///
    /// Success resolves the entry; failure consumes one re-attempt and restarts its backoff.
    pub async fn retry_failed_request(&self, id: &str) -> Result<Value, ReplayError> {
        let request = self
            .dead_letters
            .get(id)
            .filter(|r| r.resolved_at.is_none())
            .ok_or_else(|| ReplayError::NotFound(id.to_string()))?;

        if request.is_exhausted() || !request.failure_reason.is_retryable() {
            return Err(ReplayError::NotRetryable {
                id: id.to_string(),
                reason: request.failure_reason,
                retry_count: request.retry_count,
            });
        }

        let handler = self
            .replay_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ReplayError::NoHandler)?;

        let operation = request
            .context
            .get("operation")
            .cloned()
            .unwrap_or_else(|| DEFAULT_OPERATION.to_string());
        let breaker = self.breakers.get_or_create(&operation);

        let failure = match breaker.call(|| handler.replay(request.clone())).await {
            Ok(value) => {
                self.mark_resolved(id);
                tracing::info!(id, resource_key = %request.resource_key, "Replay succeeded");
                return Ok(value);
            }
            Err(BreakerError::Open(open)) => return Err(ReplayError::CircuitOpen(open)),
            Err(BreakerError::Inner(err)) => err,
            Err(BreakerError::TimedOut(limit)) => {
                OperationError::timeout(format!("replay exceeded {limit:?}"))
            }
        };

        let _ = self
            .dead_letters
            .update_failure(id, failure.reason, &failure.message);
        let retry_count = match self.dead_letters.increment_retry(id) {
            Ok(updated) => updated.retry_count,
            Err(e) => {
                tracing::warn!(id, error = %e, "Could not record failed replay");
                request.retry_count
            }
        };
        tracing::warn!(id, retry_count, error = %failure, "Replay failed");

        Err(ReplayError::Failed {
            id: id.to_string(),
            reason: failure.reason,
            message: failure.message,
            retry_count,
        })
    }

    fn mark_resolved(&self, id: &str) {
        if let Err(e) = self.dead_letters.mark_resolved(id) {
            tracing::warn!(id, error = %e, "Replayed request vanished before it could be resolved");
        }
    }

    /// Replay every entry whose backoff window has passed, oldest first.
    pub async fn replay_due(&self) -> Result<ReplaySummary, ReplayError> {
        if self
            .replay_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
        {
            return Err(ReplayError::NoHandler);
        }

        let mut summary = ReplaySummary::default();
        for request in self.dead_letters.get_retryable() {
            summary.attempted += 1;
            match self.retry_failed_request(&request.id).await {
                Ok(_) => summary.resolved += 1,
                Err(ReplayError::CircuitOpen(_)) => summary.rejected += 1,
                Err(_) => summary.failed += 1,
            }
        }

        tracing::info!(
            attempted = summary.attempted,
            resolved = summary.resolved,
            failed = summary.failed,
            rejected = summary.rejected,
            "Replay pass finished"
        );
        Ok(summary)
    }

    pub fn breaker_metrics(&self, name: &str) -> Option<BreakerMetrics> {
        self.breakers.metrics(name)
    }

    pub fn all_breaker_metrics(&self) -> Vec<BreakerMetrics> {
        self.breakers.all_metrics()
    }

    pub fn degradation_status(&self) -> DegradationStatus {
        self.degradation.status()
    }

    pub fn list_failed_requests(&self, filter: &Filter) -> Vec<FailedRequest> {
        self.dead_letters.list(filter)
    }

    pub fn dead_letter_stats(&self) -> Statistics {
        self.dead_letters.stats()
    }
}
