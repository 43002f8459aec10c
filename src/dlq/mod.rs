//! Dead letter queue subsystem.
//!
//! # Data Flow
//! ```text
//! Engine run exhausts retries:
//!     → queue.rs add (dedup by resource key, evict if full)
//!     → persistence.rs write (temp file + rename)
//!
//! Replay:
//!     get_retryable (backoff from created_at)
//!     → handler succeeds → mark_resolved
//!     → handler fails    → increment_retry
//!
//! sweeper.rs:
//!     Periodic timer → purge resolved entries past retention
//! ```
//!
//! # Design Decisions
//! - Timestamps are wall-clock epoch seconds so they survive restarts
//! - Permanent failure reasons are archived but never offered for replay

pub mod persistence;
pub mod queue;
pub mod sweeper;
pub mod types;

pub use persistence::{DeadLetterError, Snapshot};
pub use queue::DeadLetterQueue;
pub use sweeper::RetentionSweeper;
pub use types::{now_secs, FailedRequest, Filter, Statistics};
