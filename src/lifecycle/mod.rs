//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build engine → Start background tasks
//!
//! Shutdown (shutdown.rs):
//!     engine.shutdown → broadcast → tasks exit loops → join with deadline → flush DLQ
//! ```
//!
//! # Design Decisions
//! - The host owns signal handling and decides when to call shutdown
//! - Shutdown has timeout: tasks still running at the deadline are aborted

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::bootstrap;
