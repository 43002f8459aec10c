//! Graceful degradation subsystem.
//!
//! # Data Flow
//! ```text
//! Engine run fails:
//!     → manager.rs record_failure (sliding window)
//!     → threshold reached → escalate one level
//!
//! Engine run while degraded:
//!     → manager.rs execute_with_degradation
//!     → strategy.rs candidates, current level upward, by priority
//!     → first non-empty result, or escalate + emergency response
//!
//! monitor.rs:
//!     Periodic timer → check_recovery → step down one level when stable
//! ```
//!
//! # Design Decisions
//! - Level is process-wide and changes one step at a time except on a forced set
//! - Strategies receive a typed context, never a free-form map

pub mod context;
pub mod level;
pub mod manager;
pub mod monitor;
pub mod strategy;

pub use context::{ResetHandle, StrategyContext};
pub use level::DegradationLevel;
pub use manager::{DegradationManager, DegradationStatus, DegradedResult, LevelChange};
pub use monitor::RecoveryMonitor;
pub use strategy::{
    emergency_response, CachedDataStrategy, DegradationStrategy, EmergencyModeStrategy, FallbackFn,
    FallbackFunctionStrategy, MinimalDataStrategy, PartialDataStrategy,
};
