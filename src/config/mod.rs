//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → handed to ResilienceEngine::new, the single composition root
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::CircuitBreakerConfig;
pub use schema::DeadLetterConfig;
pub use schema::DegradationConfig;
pub use schema::EngineConfig;
pub use schema::ObservabilityConfig;
pub use schema::RetryConfig;
