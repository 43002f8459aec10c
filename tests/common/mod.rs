//! Shared utilities for integration and load testing.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::Value;

use resilience_engine::config::{
    CircuitBreakerConfig, DeadLetterConfig, DegradationConfig, EngineConfig, RetryConfig,
};
use resilience_engine::OperationError;

/// A programmable stand-in for the unreliable collaborator.
///
/// Fails the first `failures` calls with `failure`, then returns `response`.
#[derive(Clone)]
pub struct ScriptedBackend {
    calls: Arc<AtomicU32>,
    failures: u32,
    failure: OperationError,
    response: Value,
}

#[allow(dead_code)]
impl ScriptedBackend {
    pub fn flaky(failures: u32, failure: OperationError, response: Value) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            failures,
            failure,
            response,
        }
    }

    pub fn healthy(response: Value) -> Self {
        Self::flaky(0, OperationError::network("unused"), response)
    }

    pub fn failing(failure: OperationError) -> Self {
        Self::flaky(u32::MAX, failure, Value::Null)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call(&self) -> impl Future<Output = Result<Value, OperationError>> + Send + 'static {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let result = if n < self.failures {
            Err(self.failure.clone())
        } else {
            Ok(self.response.clone())
        };
        async move { result }
    }
}

/// Fast, deterministic settings with the DLQ file under `dir`.
///
/// Escalation is effectively off so breaker and retry behaviour can be observed alone.
#[allow(dead_code)]
pub fn test_config(dir: &Path) -> EngineConfig {
    EngineConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout_secs: 30,
            success_threshold: 1,
            ..CircuitBreakerConfig::default()
        },
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 100,
            jitter: false,
            ..RetryConfig::default()
        },
        dead_letter: DeadLetterConfig {
            path: Some(dir.join("dlq.json")),
            ..DeadLetterConfig::default()
        },
        degradation: DegradationConfig {
            escalation_failure_threshold: 1000,
            ..DegradationConfig::default()
        },
        ..EngineConfig::default()
    }
}
