//! Failure taxonomy.
//!
//! # Responsibilities
//! - Classify why an operation failed
//! - Decide whether a failure class is worth retrying
//! - Carry the classification alongside the message through retry, breaker and DLQ
//!
//! # Design Decisions
//! - Classification is data, not control flow: every operation returns an `OperationError`
//! - Permanent classes are never retryable, regardless of elapsed time
//! - Unclassifiable failures are `Unknown` and retried conservatively

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categorical reason an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    NetworkError,
    RateLimited,
    AuthenticationError,
    PermanentFailure,
    InvalidResponse,
    Unknown,
}

impl FailureReason {
    /// Every reason, in declaration order.
    pub const ALL: [FailureReason; 7] = [
        FailureReason::Timeout,
        FailureReason::NetworkError,
        FailureReason::RateLimited,
        FailureReason::AuthenticationError,
        FailureReason::PermanentFailure,
        FailureReason::InvalidResponse,
        FailureReason::Unknown,
    ];

    /// False for the permanent class; true for transient and unknown failures.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            FailureReason::AuthenticationError
                | FailureReason::PermanentFailure
                | FailureReason::InvalidResponse
        )
    }

    /// Wire name, as persisted and accepted on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::NetworkError => "network_error",
            FailureReason::RateLimited => "rate_limited",
            FailureReason::AuthenticationError => "authentication_error",
            FailureReason::PermanentFailure => "permanent_failure",
            FailureReason::InvalidResponse => "invalid_response",
            FailureReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unrecognized failure reason name.
#[derive(Debug, Error)]
#[error("unknown failure reason: {0}")]
pub struct ParseFailureReasonError(String);

impl FromStr for FailureReason {
    type Err = ParseFailureReasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        FailureReason::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| ParseFailureReasonError(s.to_string()))
    }
}

/// The error every guarded operation returns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {message}")]
pub struct OperationError {
    pub reason: FailureReason,
    pub message: String,
}

impl OperationError {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureReason::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureReason::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureReason::RateLimited, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(FailureReason::AuthenticationError, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FailureReason::PermanentFailure, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(FailureReason::InvalidResponse, message)
    }

    /// Build an error from a free-text failure message, inferring the reason.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let reason = classify_message(&message);
        Self { reason, message }
    }
}

/// Infer a failure reason from an error message.
///
/// Phrases are matched case-insensitively as substrings. Status codes only
/// match as whole tokens, so ids and path segments such as `/place/4015`
/// never count. Anything unrecognized is `Unknown`.
pub fn classify_message(message: &str) -> FailureReason {
    let lower = message.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has = |codes: &[&str], phrases: &[&str]| -> bool {
        codes.iter().any(|c| tokens.contains(c)) || phrases.iter().any(|p| lower.contains(p))
    };

    if has(
        &["401", "403"],
        &["unauthorized", "forbidden", "captcha", "login required", "authentication"],
    ) {
        FailureReason::AuthenticationError
    } else if has(&["429"], &["rate limit", "too many requests", "throttl"]) {
        FailureReason::RateLimited
    } else if has(&["408", "504"], &["timeout", "timed out", "deadline"]) {
        FailureReason::Timeout
    } else if has(
        &["502", "503"],
        &["connection", "network", "dns", "reset by peer", "unreachable"],
    ) {
        FailureReason::NetworkError
    } else if has(&["404", "410"], &["not found", "gone", "no longer available"]) {
        FailureReason::PermanentFailure
    } else if has(&[], &["invalid", "malformed", "parse error", "unexpected response", "schema"]) {
        FailureReason::InvalidResponse
    } else {
        FailureReason::Unknown
    }
}
