//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Install logging for the host process
//! - Build the engine and start its background tasks
//!
//! # Design Decisions
//! - Fail fast: an invalid config is returned as an error, nothing is spawned
//! - An already-installed subscriber is left alone

use std::path::Path;
use std::sync::Arc;

use crate::config::loader::{load_config, ConfigError};
use crate::engine::ResilienceEngine;
use crate::observability::logging::init_logging;

/// Load `path`, build the engine and start it. Must run inside a tokio runtime.
pub fn bootstrap(path: &Path) -> Result<Arc<ResilienceEngine>, ConfigError> {
    let config = load_config(path)?;

    if let Err(e) = init_logging(&config.observability) {
        tracing::debug!(error = %e, "Logging already initialized by host");
    }

    tracing::info!(
        config = %path.display(),
        failure_threshold = config.circuit_breaker.failure_threshold,
        max_attempts = config.retry.max_attempts,
        dlq_max_queue_size = config.dead_letter.max_queue_size,
        "Configuration loaded"
    );

    let engine = Arc::new(ResilienceEngine::new(config));
    engine.start();
    Ok(engine)
}
