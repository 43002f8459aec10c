//! Dead letter queue types.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::failure::FailureReason;

/// Current wall-clock time as seconds since the epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// An invocation that exhausted its retries or failed permanently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRequest {
    pub id: String,
    /// Opaque caller key, e.g. the URL being extracted.
    pub resource_key: String,
    pub failure_reason: FailureReason,
    pub error_message: String,
    /// Seconds since the epoch; refreshed whenever a re-attempt fails.
    pub created_at: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Set when the request moved to the resolved set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
}

impl FailedRequest {
    pub fn new(
        resource_key: impl Into<String>,
        failure_reason: FailureReason,
        error_message: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            resource_key: resource_key.into(),
            failure_reason,
            error_message: error_message.into(),
            created_at: now_secs(),
            retry_count: 0,
            max_retries,
            payload: None,
            context: BTreeMap::new(),
            resolved_at: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// The re-attempt budget is used up.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Seconds to wait after `created_at` before the next re-attempt:
    /// `base * multiplier^retry_count`.
    pub fn backoff_secs(&self, base_secs: u64, multiplier: f64) -> f64 {
        let exponent = i32::try_from(self.retry_count).unwrap_or(i32::MAX);
        base_secs as f64 * multiplier.powi(exponent)
    }

    /// Eligible for a scheduled re-attempt at `now`.
    pub fn is_retryable_at(&self, now: u64, base_secs: u64, multiplier: f64) -> bool {
        if self.is_exhausted() || !self.failure_reason.is_retryable() {
            return false;
        }
        let waited = now.saturating_sub(self.created_at) as f64;
        waited >= self.backoff_secs(base_secs, multiplier)
    }
}

/// Selection criteria for listing failed requests. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub reason: Option<FailureReason>,
    /// Only entries eligible for a re-attempt right now.
    pub retryable_only: bool,
    pub resource_key_contains: Option<String>,
    pub limit: Option<usize>,
}

/// Queue-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub active: usize,
    pub resolved: usize,
    /// Active entries eligible for a re-attempt now.
    pub retryable: usize,
    /// Active entries whose re-attempt budget is used up.
    pub exhausted: usize,
    /// Active entries with a permanent failure reason.
    pub permanent: usize,
    pub by_reason: BTreeMap<FailureReason, usize>,
    pub oldest_created_at: Option<u64>,
    pub max_queue_size: usize,
}
