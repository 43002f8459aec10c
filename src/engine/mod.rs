//! Resilience engine facade.
//!
//! # Data Flow
//! ```text
//! run(key, op, RunConfig)
//!     → degraded? → degradation manager → RunOutcome (Degraded)
//!     → breaker gate (per operation class)
//!         → open          → RunError::CircuitOpen
//!         → retry loop    → success → RunOutcome (Primary)
//!                         → cancelled → RunError::Cancelled
//!                         → exhausted → DLQ add + failure signal → RunError::Failed
//!
//! retry_failed_request(id) / replay_due()
//!     → ReplayHandler behind the breaker → resolve or increment_retry
//! ```

pub mod error;
pub mod facade;
pub mod replay;

pub use error::{ReplayError, RunError};
pub use facade::{Provenance, ResilienceEngine, RunConfig, RunOutcome, DEFAULT_OPERATION};
pub use replay::{ReplayFuture, ReplayHandler, ReplaySummary};
