//! Metrics collection.
//!
//! # Responsibilities
//! - Define engine metrics (breaker transitions, retries, DLQ size, degradation level)
//! - Record them through the `metrics` facade
//!
//! # Metrics
//! - `resilience_attempts_total` (counter): operation attempts
//! - `resilience_retries_total` (counter): retries by failure reason
//! - `resilience_breaker_transitions_total` (counter): state changes by breaker, state
//! - `resilience_breaker_rejections_total` (counter): fast-failed calls by breaker
//! - `resilience_dlq_active` / `resilience_dlq_resolved` (gauge): queue sizes
//! - `resilience_dlq_evictions_total` (counter): entries dropped to honor the size bound
//! - `resilience_degradation_level` (gauge): 0 = full service .. 5 = unavailable
//! - `resilience_degraded_responses_total` (counter): fallback results by strategy
//!
//! # Design Decisions
//! - The library never installs an exporter; the host process chooses one
//! - Without a recorder every call is a no-op

use crate::failure::FailureReason;
use crate::resilience::circuit_breaker::CircuitState;

pub fn record_attempt() {
    metrics::counter!("resilience_attempts_total").increment(1);
}

pub fn record_retry(reason: FailureReason) {
    metrics::counter!("resilience_retries_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_breaker_transition(breaker: &str, to: CircuitState) {
    metrics::counter!(
        "resilience_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "state" => to.as_str()
    )
    .increment(1);
}

pub fn record_breaker_rejection(breaker: &str) {
    metrics::counter!("resilience_breaker_rejections_total", "breaker" => breaker.to_string())
        .increment(1);
}

pub fn record_dlq_size(active: usize, resolved: usize) {
    metrics::gauge!("resilience_dlq_active").set(active as f64);
    metrics::gauge!("resilience_dlq_resolved").set(resolved as f64);
}

pub fn record_dlq_eviction(count: usize) {
    metrics::counter!("resilience_dlq_evictions_total").increment(count as u64);
}

pub fn record_degradation_level(level: u8) {
    metrics::gauge!("resilience_degradation_level").set(f64::from(level));
}

pub fn record_degraded_response(strategy: &str) {
    metrics::counter!("resilience_degraded_responses_total", "strategy" => strategy.to_string())
        .increment(1);
}
