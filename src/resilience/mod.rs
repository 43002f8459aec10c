//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Guarded call:
//!     → circuit_breaker.rs (reject fast while open, track failures per operation class)
//!     → retries.rs (retry retryable failures with backoff.rs delays)
//!     → timeouts.rs (enforce per-attempt and per-call deadlines)
//! ```
//!
//! # Design Decisions
//! - Timeouts are ordinary failures for breaker and retry bookkeeping
//! - Retries only for transient or unknown failure classes
//! - Circuit breaker prevents cascading failures
//! - Cancellation is never a breaker failure

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::BackoffStrategy;
pub use circuit_breaker::{
    BreakerError, BreakerMetrics, CircuitBreaker, CircuitBreakerRegistry, CircuitOpenError,
    CircuitState, FailureSignal,
};
pub use retries::{OnRetry, RetryError, RetryPolicy};
