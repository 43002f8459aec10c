//! Inputs a degradation strategy may use.

use std::fmt;
use std::sync::Arc;

/// Cleanup capability handed to emergency strategies, e.g. recycling a browser session.
pub trait ResetHandle: Send + Sync {
    fn reset(&self);
}

impl<F> ResetHandle for F
where
    F: Fn() + Send + Sync,
{
    fn reset(&self) {
        self()
    }
}

/// Immutable per-call context passed to strategies.
#[derive(Clone, Default)]
pub struct StrategyContext {
    /// Operation class, e.g. `fetch_page`.
    pub operation_key: String,
    /// Resource the caller is working on, e.g. a URL.
    pub resource_key: String,
    /// Whatever the caller managed to produce before failing.
    pub partial_data: Option<serde_json::Value>,
    pub reset: Option<Arc<dyn ResetHandle>>,
}

impl StrategyContext {
    pub fn new(operation_key: impl Into<String>, resource_key: impl Into<String>) -> Self {
        Self {
            operation_key: operation_key.into(),
            resource_key: resource_key.into(),
            ..Self::default()
        }
    }

    pub fn with_partial_data(mut self, data: serde_json::Value) -> Self {
        self.partial_data = Some(data);
        self
    }

    pub fn with_reset(mut self, reset: Arc<dyn ResetHandle>) -> Self {
        self.reset = Some(reset);
        self
    }
}

impl fmt::Debug for StrategyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyContext")
            .field("operation_key", &self.operation_key)
            .field("resource_key", &self.resource_key)
            .field("partial_data", &self.partial_data)
            .field("reset", &self.reset.is_some())
            .finish()
    }
}
