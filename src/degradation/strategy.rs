//! Fallback strategies.
//!
//! # Responsibilities
//! - Define the strategy seam the manager searches
//! - Provide the built-in fallbacks: caller function, partial data,
//!   cached results, hardcoded minimal data, emergency response
//!
//! # Design Decisions
//! - Strategies are synchronous; they serve from memory, never from the failing backend
//! - `observe_success` lets cache-like strategies learn from the primary path

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Map, Value};
use tokio::time::{Duration, Instant};

use crate::degradation::context::StrategyContext;
use crate::degradation::level::DegradationLevel;

/// A named, prioritised unit of fallback behaviour bound to one or more levels.
pub trait DegradationStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs first among strategies bound to the same level.
    fn priority(&self) -> i32;

    fn levels(&self) -> &[DegradationLevel];

    /// `current` is the manager's level at the time of the call.
    fn is_applicable(&self, current: DegradationLevel, ctx: &StrategyContext) -> bool;

    /// `None` means "nothing to offer", and the search moves on.
    fn execute(&self, ctx: &StrategyContext) -> Option<Value>;

    fn observe_success(&self, _ctx: &StrategyContext, _value: &Value) {}
}

fn cache_key(ctx: &StrategyContext) -> String {
    format!("{}\u{1f}{}", ctx.operation_key, ctx.resource_key)
}

/// The structured body served when nothing better is available.
pub fn emergency_response(level: DegradationLevel, ctx: &StrategyContext, retry_after_secs: u64) -> Value {
    json!({
        "status": "unavailable",
        "degraded": true,
        "level": level.as_str(),
        "operation": ctx.operation_key,
        "resource": ctx.resource_key,
        "message": "Service is temporarily degraded; please retry later",
        "retry_after_secs": retry_after_secs,
    })
}

pub type FallbackFn = Arc<dyn Fn(&StrategyContext) -> Option<Value> + Send + Sync>;

/// Caller-supplied fallback, optionally limited to some operations.
pub struct FallbackFunctionStrategy {
    name: String,
    operations: Vec<String>,
    fallback: FallbackFn,
}

impl FallbackFunctionStrategy {
    const LEVELS: [DegradationLevel; 2] = [DegradationLevel::ReducedFeatures, DegradationLevel::EssentialOnly];

    pub fn new(name: impl Into<String>, fallback: FallbackFn) -> Self {
        Self {
            name: name.into(),
            operations: Vec::new(),
            fallback,
        }
    }

    /// Restrict to the given operation keys. Empty means every operation.
    pub fn for_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operations = operations.into_iter().map(Into::into).collect();
        self
    }
}

impl DegradationStrategy for FallbackFunctionStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        100
    }

    fn levels(&self) -> &[DegradationLevel] {
        &Self::LEVELS
    }

    fn is_applicable(&self, _current: DegradationLevel, ctx: &StrategyContext) -> bool {
        self.operations.is_empty() || self.operations.iter().any(|op| *op == ctx.operation_key)
    }

    fn execute(&self, ctx: &StrategyContext) -> Option<Value> {
        (self.fallback)(ctx)
    }
}

/// Serves only the essential fields of whatever data is at hand.
pub struct PartialDataStrategy {
    essential_fields: Vec<String>,
    last_success: DashMap<String, Value>,
    max_entries: usize,
}

impl PartialDataStrategy {
    const LEVELS: [DegradationLevel; 2] = [DegradationLevel::ReducedFeatures, DegradationLevel::EssentialOnly];

    pub fn new(essential_fields: Vec<String>, max_entries: usize) -> Self {
        Self {
            essential_fields,
            last_success: DashMap::new(),
            max_entries,
        }
    }

    fn reduce(&self, value: &Value) -> Option<Value> {
        match value {
            Value::Object(map) => {
                let kept: Map<String, Value> = self
                    .essential_fields
                    .iter()
                    .filter_map(|field| map.get(field).map(|v| (field.clone(), v.clone())))
                    .collect();
                (!kept.is_empty()).then_some(Value::Object(kept))
            }
            Value::Array(items) => {
                let kept: Vec<Value> = items.iter().filter_map(|item| self.reduce(item)).collect();
                (!kept.is_empty()).then_some(Value::Array(kept))
            }
            _ => None,
        }
    }
}

impl DegradationStrategy for PartialDataStrategy {
    fn name(&self) -> &str {
        "partial_data"
    }

    fn priority(&self) -> i32 {
        80
    }

    fn levels(&self) -> &[DegradationLevel] {
        &Self::LEVELS
    }

    fn is_applicable(&self, _current: DegradationLevel, ctx: &StrategyContext) -> bool {
        !self.essential_fields.is_empty()
            && (ctx.partial_data.is_some() || self.last_success.contains_key(&cache_key(ctx)))
    }

    fn execute(&self, ctx: &StrategyContext) -> Option<Value> {
        if let Some(reduced) = ctx.partial_data.as_ref().and_then(|data| self.reduce(data)) {
            return Some(reduced);
        }
        let snapshot = self.last_success.get(&cache_key(ctx))?;
        self.reduce(snapshot.value())
    }

    fn observe_success(&self, ctx: &StrategyContext, value: &Value) {
        let key = cache_key(ctx);
        if self.last_success.len() >= self.max_entries && !self.last_success.contains_key(&key) {
            return;
        }
        self.last_success.insert(key, value.clone());
    }
}

/// Serves previously successful results that are still fresh enough.
pub struct CachedDataStrategy {
    max_age: Duration,
    max_entries: usize,
    entries: DashMap<String, (Instant, Value)>,
}

impl CachedDataStrategy {
    const LEVELS: [DegradationLevel; 2] = [DegradationLevel::EssentialOnly, DegradationLevel::CachedOnly];

    pub fn new(max_age: Duration, max_entries: usize) -> Self {
        Self {
            max_age,
            max_entries: max_entries.max(1),
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().0)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl DegradationStrategy for CachedDataStrategy {
    fn name(&self) -> &str {
        "cached_data"
    }

    fn priority(&self) -> i32 {
        60
    }

    fn levels(&self) -> &[DegradationLevel] {
        &Self::LEVELS
    }

    fn is_applicable(&self, _current: DegradationLevel, ctx: &StrategyContext) -> bool {
        self.entries.contains_key(&cache_key(ctx))
    }

    fn execute(&self, ctx: &StrategyContext) -> Option<Value> {
        let key = cache_key(ctx);
        let (stored_at, value) = self.entries.get(&key).map(|e| e.value().clone())?;
        if stored_at.elapsed() > self.max_age {
            self.entries.remove(&key);
            tracing::debug!(operation = %ctx.operation_key, resource = %ctx.resource_key, "Cached result expired");
            return None;
        }
        Some(value)
    }

    fn observe_success(&self, ctx: &StrategyContext, value: &Value) {
        let key = cache_key(ctx);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(key, (Instant::now(), value.clone()));
    }
}

/// Hardcoded last-resort results keyed by operation.
pub struct MinimalDataStrategy {
    data: std::collections::BTreeMap<String, Value>,
}

impl MinimalDataStrategy {
    const LEVELS: [DegradationLevel; 1] = [DegradationLevel::EmergencyMode];

    pub fn new(data: std::collections::BTreeMap<String, Value>) -> Self {
        Self { data }
    }
}

impl DegradationStrategy for MinimalDataStrategy {
    fn name(&self) -> &str {
        "minimal_data"
    }

    fn priority(&self) -> i32 {
        40
    }

    fn levels(&self) -> &[DegradationLevel] {
        &Self::LEVELS
    }

    fn is_applicable(&self, _current: DegradationLevel, ctx: &StrategyContext) -> bool {
        self.data.contains_key(&ctx.operation_key)
    }

    fn execute(&self, ctx: &StrategyContext) -> Option<Value> {
        self.data.get(&ctx.operation_key).cloned()
    }
}

/// Runs the caller's reset capability and answers with a structured unavailability body.
///
/// Only engages once the manager itself is at `EmergencyMode` or worse.
pub struct EmergencyModeStrategy {
    retry_after_secs: u64,
}

impl EmergencyModeStrategy {
    const LEVELS: [DegradationLevel; 2] = [DegradationLevel::EmergencyMode, DegradationLevel::ServiceUnavailable];

    pub fn new(retry_after_secs: u64) -> Self {
        Self { retry_after_secs }
    }
}

impl DegradationStrategy for EmergencyModeStrategy {
    fn name(&self) -> &str {
        "emergency_mode"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn levels(&self) -> &[DegradationLevel] {
        &Self::LEVELS
    }

    fn is_applicable(&self, current: DegradationLevel, _ctx: &StrategyContext) -> bool {
        current >= DegradationLevel::EmergencyMode
    }

    fn execute(&self, ctx: &StrategyContext) -> Option<Value> {
        if let Some(reset) = &ctx.reset {
            tracing::warn!(operation = %ctx.operation_key, "Emergency mode: invoking reset handle");
            reset.reset();
        }
        Some(emergency_response(
            DegradationLevel::EmergencyMode,
            ctx,
            self.retry_after_secs,
        ))
    }
}
