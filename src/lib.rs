//! Resilience engine.
//!
//! Fault-tolerant execution of unreliable, long-running operations: circuit
//! breaking, retry with backoff, a file-backed dead letter queue for work that
//! exhausted its retries, and graceful degradation when a backend is unhealthy.
//!
//! # Architecture Overview
//!
//! ```text
//!     caller ──▶ engine::run(key, op, RunConfig)
//!                    │
//!                    ├─ degraded? ──▶ degradation (strategies by level/priority)
//!                    │
//!                    ▼
//!               resilience::CircuitBreaker (per operation class)
//!                    │
//!                    ▼
//!               resilience::RetryPolicy (backoff, jitter, attempt timeout)
//!                    │
//!                    ▼
//!               caller's operation
//!
//!     exhausted ──▶ dlq::DeadLetterQueue (atomic file) ──▶ replay / dlq-cli
//!               └─▶ degradation::DegradationManager (escalate one level)
//!
//!     background: dlq::RetentionSweeper, degradation::RecoveryMonitor
//!                 (started and stopped by the engine via lifecycle::Shutdown)
//! ```

// Core subsystems
pub mod config;
pub mod failure;
pub mod resilience;

// Failure handling
pub mod degradation;
pub mod dlq;

// Composition root
pub mod engine;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::EngineConfig;
pub use degradation::{DegradationLevel, StrategyContext};
pub use dlq::{DeadLetterQueue, FailedRequest, Filter};
pub use engine::{Provenance, ResilienceEngine, RunConfig, RunError, RunOutcome};
pub use failure::{FailureReason, OperationError};
pub use lifecycle::Shutdown;
