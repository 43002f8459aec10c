//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, multipliers >= 1, fractions within [0, 1])
//! - Check cross-field consistency (max delay not below base delay)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::EngineConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if cb.success_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.success_threshold", "must be at least 1"));
    }
    if cb.call_timeout_secs == Some(0) {
        errors.push(ValidationError::new("circuit_breaker.call_timeout_secs", "must be positive when set"));
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be at least 1"));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::new(
            "retry.max_delay_ms",
            format!("{} is below base_delay_ms {}", retry.max_delay_ms, retry.base_delay_ms),
        ));
    }
    if !(retry.backoff_multiplier >= 1.0) {
        errors.push(ValidationError::new("retry.backoff_multiplier", "must be >= 1.0"));
    }
    if !(0.0..=1.0).contains(&retry.jitter_range) {
        errors.push(ValidationError::new("retry.jitter_range", "must be within [0, 1]"));
    }
    if retry.attempt_timeout_ms == Some(0) {
        errors.push(ValidationError::new("retry.attempt_timeout_ms", "must be positive when set"));
    }

    let dlq = &config.dead_letter;
    if dlq.max_queue_size == 0 {
        errors.push(ValidationError::new("dead_letter.max_queue_size", "must be at least 1"));
    }
    if dlq.retention_days == 0 {
        errors.push(ValidationError::new("dead_letter.retention_days", "must be at least 1"));
    }
    if !(dlq.backoff_multiplier >= 1.0) {
        errors.push(ValidationError::new("dead_letter.backoff_multiplier", "must be >= 1.0"));
    }
    if dlq.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("dead_letter.sweep_interval_secs", "must be at least 1"));
    }

    let deg = &config.degradation;
    if deg.escalation_failure_threshold == 0 {
        errors.push(ValidationError::new(
            "degradation.escalation_failure_threshold",
            "must be at least 1",
        ));
    }
    if deg.recovery_check_interval_secs == 0 {
        errors.push(ValidationError::new(
            "degradation.recovery_check_interval_secs",
            "must be at least 1",
        ));
    }
    if deg.cache_enabled && deg.cache_max_entries == 0 {
        errors.push(ValidationError::new(
            "degradation.cache_max_entries",
            "must be at least 1 when the cache is enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
