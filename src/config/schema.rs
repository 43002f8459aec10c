//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::failure::FailureReason;
use crate::resilience::backoff::BackoffStrategy;

/// Root configuration for the resilience engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Circuit breaker settings, shared by every operation class.
    pub circuit_breaker: CircuitBreakerConfig,

    /// In-call retry settings.
    pub retry: RetryConfig,

    /// Dead letter queue settings.
    pub dead_letter: DeadLetterConfig,

    /// Degradation levels and fallback strategies.
    pub degradation: DegradationConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (while closed) before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds an open circuit rejects calls before probing again.
    pub recovery_timeout_secs: u64,

    /// Consecutive half-open successes required to close the circuit.
    pub success_threshold: u32,

    /// Optional deadline for a single guarded call, in seconds.
    pub call_timeout_secs: Option<u64>,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            success_threshold: 3,
            call_timeout_secs: None,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Cap on any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor for exponential backoff.
    pub backoff_multiplier: f64,

    /// How the delay grows with the attempt number.
    pub strategy: BackoffStrategy,

    /// Randomize delays to spread out concurrent retries.
    pub jitter: bool,

    /// Jitter as a fraction of the delay (0.1 = +/-10%).
    pub jitter_range: f64,

    /// Optional deadline for each attempt in milliseconds.
    pub attempt_timeout_ms: Option<u64>,

    /// Failure reasons eligible for an in-call retry.
    pub retryable_reasons: Vec<FailureReason>,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    /// A permanent reason is never retryable, even if listed.
    pub fn is_retryable_reason(&self, reason: FailureReason) -> bool {
        reason.is_retryable() && self.retryable_reasons.contains(&reason)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
            jitter: true,
            jitter_range: 0.1,
            attempt_timeout_ms: None,
            retryable_reasons: vec![
                FailureReason::Timeout,
                FailureReason::NetworkError,
                FailureReason::RateLimited,
                FailureReason::Unknown,
            ],
        }
    }
}

/// Dead letter queue configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeadLetterConfig {
    /// Backing file. `None` keeps the queue in memory only.
    pub path: Option<PathBuf>,

    /// Maximum number of active entries.
    pub max_queue_size: usize,

    /// Re-attempt budget given to each new entry.
    pub max_retries: u32,

    /// Days a resolved entry is kept before the sweep purges it.
    pub retention_days: u64,

    /// Base wait before the first re-attempt, in seconds.
    pub base_backoff_secs: u64,

    /// Growth factor of the re-attempt wait per retry.
    pub backoff_multiplier: f64,

    /// Exhausted entries younger than this are not purged to make room.
    pub eviction_grace_secs: u64,

    /// How often the retention sweep runs, in seconds.
    pub sweep_interval_secs: u64,
}

impl DeadLetterConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(24 * 60 * 60))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_queue_size: 10_000,
            max_retries: 5,
            retention_days: 7,
            base_backoff_secs: 60,
            backoff_multiplier: 2.0,
            eviction_grace_secs: 3600,
            sweep_interval_secs: 3600,
        }
    }
}

/// Degradation manager configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Failures within the window that trigger a one-level escalation.
    pub escalation_failure_threshold: u32,

    /// Sliding window for counting failures, in seconds.
    pub failure_window_secs: u64,

    /// Minimum spacing between auto-recovery evaluations, in seconds.
    pub recovery_check_interval_secs: u64,

    /// Failure-free time required before stepping down one level, in seconds.
    pub stability_window_secs: u64,

    /// Fields kept by the partial-data strategy.
    pub essential_fields: Vec<String>,

    /// Register the cached-data strategy.
    pub cache_enabled: bool,

    /// Cached results older than this are not served, in seconds.
    pub cache_max_age_secs: u64,

    /// Maximum cached results kept by the cached-data strategy.
    pub cache_max_entries: usize,

    /// Hardcoded last-resort results keyed by operation key.
    pub minimal_data: BTreeMap<String, serde_json::Value>,

    /// Level changes kept for status reporting.
    pub history_limit: usize,

    /// Retry hint placed in emergency responses, in seconds.
    pub emergency_retry_after_secs: u64,
}

impl DegradationConfig {
    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }

    pub fn recovery_check_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_check_interval_secs)
    }

    pub fn stability_window(&self) -> Duration {
        Duration::from_secs(self.stability_window_secs)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            escalation_failure_threshold: 1,
            failure_window_secs: 300,
            recovery_check_interval_secs: 60,
            stability_window_secs: 300,
            essential_fields: vec!["id".to_string(), "name".to_string(), "url".to_string()],
            cache_enabled: true,
            cache_max_age_secs: 3600,
            cache_max_entries: 1000,
            minimal_data: BTreeMap::new(),
            history_limit: 50,
            emergency_retry_after_secs: 300,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.circuit_breaker, CircuitBreakerConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.dead_letter.base_backoff_secs, 60);
    }

    #[test]
    fn test_partial_sections() {
        let config: EngineConfig = toml::from_str(
            r#"
            [circuit_breaker]
            failure_threshold = 2

            [retry]
            strategy = "linear"
            retryable_reasons = ["timeout", "rate_limited"]

            [degradation]
            essential_fields = ["name", "address"]

            [degradation.minimal_data.fetch_page]
            status = "unavailable"
            "#,
        )
        .unwrap();

        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.circuit_breaker.recovery_timeout_secs, 60);
        assert_eq!(config.retry.strategy, BackoffStrategy::Linear);
        assert!(config.retry.is_retryable_reason(FailureReason::Timeout));
        assert!(!config.retry.is_retryable_reason(FailureReason::NetworkError));
        assert_eq!(config.degradation.essential_fields, vec!["name", "address"]);
        assert_eq!(
            config.degradation.minimal_data["fetch_page"]["status"],
            serde_json::json!("unavailable")
        );
    }

    #[test]
    fn test_permanent_reason_never_retryable_even_if_listed() {
        let config = RetryConfig {
            retryable_reasons: vec![FailureReason::PermanentFailure],
            ..RetryConfig::default()
        };
        assert!(!config.is_retryable_reason(FailureReason::PermanentFailure));
    }
}
