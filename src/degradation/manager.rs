//! Degradation manager.
//!
//! # Responsibilities
//! - Own the process-wide service level
//! - Turn failure signals into one-step escalations
//! - Pick a fallback strategy for calls made while degraded
//! - Step back toward full service once things are stable
//!
//! # Design Decisions
//! - Every level change goes through `transition`, under one mutex
//! - Escalate and recover move one step; only `set_level` may jump
//! - Strategies run outside the state lock

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::config::DegradationConfig;
use crate::degradation::context::StrategyContext;
use crate::degradation::level::DegradationLevel;
use crate::degradation::strategy::{
    emergency_response, CachedDataStrategy, DegradationStrategy, EmergencyModeStrategy,
    MinimalDataStrategy, PartialDataStrategy,
};
use crate::dlq::now_secs;
use crate::observability::metrics;

/// A result produced by a fallback strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedResult {
    pub value: Value,
    pub strategy: String,
    pub level: DegradationLevel,
}

/// One entry of the level history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelChange {
    pub from: DegradationLevel,
    pub to: DegradationLevel,
    pub reason: String,
    pub forced: bool,
    /// Epoch seconds.
    pub at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradationStatus {
    pub level: DegradationLevel,
    pub reason: String,
    pub secs_at_level: f64,
    pub recent_failures: usize,
    pub strategies: Vec<String>,
    pub history: Vec<LevelChange>,
}

#[derive(Debug)]
struct ManagerState {
    level: DegradationLevel,
    reason: String,
    changed_at: Instant,
    last_check: Option<Instant>,
    failures: VecDeque<Instant>,
    last_failure: Option<Instant>,
    history: VecDeque<LevelChange>,
}

pub struct DegradationManager {
    config: DegradationConfig,
    state: Mutex<ManagerState>,
    strategies: RwLock<Vec<Arc<dyn DegradationStrategy>>>,
}

impl std::fmt::Debug for DegradationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradationManager")
            .field("level", &self.level())
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl DegradationManager {
    /// A manager with no strategies registered.
    pub fn new(config: DegradationConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ManagerState {
                level: DegradationLevel::FullService,
                reason: "initial".to_string(),
                changed_at: Instant::now(),
                last_check: None,
                failures: VecDeque::new(),
                last_failure: None,
                history: VecDeque::new(),
            }),
            strategies: RwLock::new(Vec::new()),
        }
    }

    /// A manager with the built-in strategies the config asks for.
    pub fn with_builtin_strategies(config: DegradationConfig) -> Self {
        let manager = Self::new(config);
        let config = &manager.config;

        manager.register(Arc::new(PartialDataStrategy::new(
            config.essential_fields.clone(),
            config.cache_max_entries,
        )));
        if config.cache_enabled {
            manager.register(Arc::new(CachedDataStrategy::new(
                config.cache_max_age(),
                config.cache_max_entries,
            )));
        }
        if !config.minimal_data.is_empty() {
            manager.register(Arc::new(MinimalDataStrategy::new(config.minimal_data.clone())));
        }
        manager.register(Arc::new(EmergencyModeStrategy::new(
            config.emergency_retry_after_secs,
        )));
        manager
    }

    pub fn config(&self) -> &DegradationConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn strategies(&self) -> Vec<Arc<dyn DegradationStrategy>> {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn strategy_names(&self) -> Vec<String> {
        self.strategies().iter().map(|s| s.name().to_string()).collect()
    }

    /// Add a strategy. Strategies stay sorted by descending priority.
    pub fn register(&self, strategy: Arc<dyn DegradationStrategy>) {
        tracing::debug!(strategy = strategy.name(), priority = strategy.priority(), "Registered degradation strategy");
        let mut strategies = self.strategies.write().unwrap_or_else(PoisonError::into_inner);
        strategies.push(strategy);
        strategies.sort_by_key(|s| std::cmp::Reverse(s.priority()));
    }

    pub fn level(&self) -> DegradationLevel {
        self.lock().level
    }

    fn transition(&self, state: &mut ManagerState, to: DegradationLevel, reason: &str, forced: bool) {
        let from = state.level;
        if from == to {
            return;
        }

        state.level = to;
        state.reason = reason.to_string();
        state.changed_at = Instant::now();
        state.history.push_back(LevelChange {
            from,
            to,
            reason: reason.to_string(),
            forced,
            at: now_secs(),
        });
        while state.history.len() > self.config.history_limit {
            state.history.pop_front();
        }

        if to > from {
            tracing::warn!(from = %from, to = %to, reason, forced, "Service degraded");
        } else {
            tracing::info!(from = %from, to = %to, reason, forced, "Service level restored");
        }
        metrics::record_degradation_level(to.value());
    }

    /// Force a level, jumping if needed. Clears the failure window.
    pub fn set_level(&self, level: DegradationLevel, reason: &str) {
        let mut state = self.lock();
        state.failures.clear();
        self.transition(&mut state, level, reason, true);
    }

    /// Move one step more degraded. Returns the new level.
    pub fn escalate(&self, reason: &str) -> DegradationLevel {
        let mut state = self.lock();
        let to = state.level.next();
        self.transition(&mut state, to, reason, false);
        state.level
    }

    /// Move one step less degraded. Returns the new level.
    pub fn recover(&self, reason: &str) -> DegradationLevel {
        let mut state = self.lock();
        let to = state.level.prev();
        self.transition(&mut state, to, reason, false);
        state.level
    }

    /// Count a failure; escalate one level once the window holds enough of them.
    ///
    /// Returns the new level when this call escalated.
    pub fn record_failure(&self, reason: &str) -> Option<DegradationLevel> {
        let now = Instant::now();
        let window = self.config.failure_window();
        let mut state = self.lock();

        state.last_failure = Some(now);
        while state
            .failures
            .front()
            .is_some_and(|t| now.duration_since(*t) > window)
        {
            state.failures.pop_front();
        }
        state.failures.push_back(now);

        let threshold = self.config.escalation_failure_threshold.max(1) as usize;
        if state.failures.len() < threshold {
            return None;
        }

        state.failures.clear();
        let to = state.level.next();
        if to == state.level {
            return None;
        }
        self.transition(&mut state, to, &format!("{threshold} failure(s) within window: {reason}"), false);
        Some(to)
    }

    /// Feed a primary-path success to strategies that learn from it.
    pub fn record_success(&self, ctx: &StrategyContext, value: &Value) {
        for strategy in self.strategies() {
            strategy.observe_success(ctx, value);
        }
    }

    /// Step down one level if the system has been stable long enough.
    ///
    /// Evaluated at most once per `recovery_check_interval`. Returns the new level on recovery.
    pub fn check_recovery(&self) -> Option<DegradationLevel> {
        let now = Instant::now();
        let mut state = self.lock();

        if let Some(last) = state.last_check {
            if now.duration_since(last) < self.config.recovery_check_interval() {
                return None;
            }
        }
        state.last_check = Some(now);

        if !state.level.is_degraded() {
            return None;
        }

        let stability = self.config.stability_window();
        let quiet = state
            .last_failure
            .map_or(true, |t| now.duration_since(t) >= stability);
        let settled = now.duration_since(state.changed_at) >= stability;
        if !(quiet && settled) {
            return None;
        }

        let to = state.level.prev();
        self.transition(&mut state, to, "stable, automatic recovery", false);
        Some(to)
    }

    /// Serve `ctx` from a fallback strategy when degraded.
    ///
    /// `None` at full service: the caller takes its normal path. When degraded and no
    /// strategy produces a result, escalates one level and returns an emergency response.
    pub fn execute_with_degradation(&self, ctx: &StrategyContext) -> Option<DegradedResult> {
        let current = self.level();
        if !current.is_degraded() {
            return None;
        }

        let strategies = self.strategies();
        let mut tried = vec![false; strategies.len()];

        for level in current.and_above() {
            for (i, strategy) in strategies.iter().enumerate() {
                if tried[i] || !strategy.levels().contains(&level) {
                    continue;
                }
                tried[i] = true;
                if !strategy.is_applicable(current, ctx) {
                    continue;
                }
                if let Some(value) = strategy.execute(ctx) {
                    tracing::info!(
                        operation = %ctx.operation_key,
                        resource = %ctx.resource_key,
                        strategy = strategy.name(),
                        level = %current,
                        "Served degraded result"
                    );
                    metrics::record_degraded_response(strategy.name());
                    return Some(DegradedResult {
                        value,
                        strategy: strategy.name().to_string(),
                        level: current,
                    });
                }
            }
        }

        let level = self.escalate(&format!("no fallback for operation '{}'", ctx.operation_key));
        metrics::record_degraded_response("emergency_response");
        Some(DegradedResult {
            value: emergency_response(level, ctx, self.config.emergency_retry_after_secs),
            strategy: "emergency_response".to_string(),
            level,
        })
    }

    pub fn status(&self) -> DegradationStatus {
        let strategies = self.strategy_names();
        let now = Instant::now();
        let window = self.config.failure_window();
        let state = self.lock();

        DegradationStatus {
            level: state.level,
            reason: state.reason.clone(),
            secs_at_level: now.duration_since(state.changed_at).as_secs_f64(),
            recent_failures: state
                .failures
                .iter()
                .filter(|t| now.duration_since(**t) <= window)
                .count(),
            strategies,
            history: state.history.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::degradation::strategy::FallbackFunctionStrategy;
    use serde_json::json;
    use std::time::Duration;

    fn config() -> DegradationConfig {
        DegradationConfig {
            escalation_failure_threshold: 1,
            recovery_check_interval_secs: 10,
            stability_window_secs: 60,
            ..DegradationConfig::default()
        }
    }

    #[test]
    fn test_escalate_and_recover_one_step() {
        let manager = DegradationManager::new(config());
        let mut expected = DegradationLevel::FullService;
        for _ in 0..7 {
            let before = manager.level();
            let after = manager.escalate("test");
            assert!(after.value() - before.value() <= 1);
            expected = expected.next();
            assert_eq!(after, expected);
        }
        assert_eq!(manager.level(), DegradationLevel::ServiceUnavailable);

        assert_eq!(manager.recover("test"), DegradationLevel::EmergencyMode);
    }

    #[test]
    fn test_set_level_jumps_and_is_recorded() {
        let manager = DegradationManager::new(config());
        manager.set_level(DegradationLevel::CachedOnly, "operator");

        let status = manager.status();
        assert_eq!(status.level, DegradationLevel::CachedOnly);
        assert_eq!(status.history.len(), 1);
        assert!(status.history[0].forced);
        assert_eq!(status.history[0].from, DegradationLevel::FullService);
    }

    #[test]
    fn test_history_bounded() {
        let manager = DegradationManager::new(DegradationConfig {
            history_limit: 3,
            ..config()
        });
        for _ in 0..5 {
            manager.escalate("up");
        }
        assert_eq!(manager.status().history.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_threshold_escalates() {
        let manager = DegradationManager::new(DegradationConfig {
            escalation_failure_threshold: 3,
            failure_window_secs: 60,
            ..config()
        });

        assert_eq!(manager.record_failure("a"), None);
        assert_eq!(manager.record_failure("b"), None);
        assert_eq!(manager.record_failure("c"), Some(DegradationLevel::ReducedFeatures));
        assert_eq!(manager.status().recent_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_expire() {
        let manager = DegradationManager::new(DegradationConfig {
            escalation_failure_threshold: 2,
            failure_window_secs: 60,
            ..config()
        });

        manager.record_failure("a");
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(manager.record_failure("b"), None);
        assert_eq!(manager.level(), DegradationLevel::FullService);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_service_defers_to_caller() {
        let manager = DegradationManager::with_builtin_strategies(config());
        let ctx = StrategyContext::new("fetch_page", "x").with_partial_data(json!({"id": 1}));
        assert!(manager.execute_with_degradation(&ctx).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_data_served_after_failure() {
        let manager = DegradationManager::with_builtin_strategies(config());
        manager.record_failure("network");
        assert_eq!(manager.level(), DegradationLevel::ReducedFeatures);

        let ctx = StrategyContext::new("fetch_page", "x")
            .with_partial_data(json!({"id": 1, "name": "n", "url": "u", "rating": 5}));
        let result = manager.execute_with_degradation(&ctx).unwrap();

        assert_eq!(result.strategy, "partial_data");
        assert_eq!(result.value, json!({"id": 1, "name": "n", "url": "u"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_order_within_level() {
        let manager = DegradationManager::with_builtin_strategies(config());
        manager.register(Arc::new(FallbackFunctionStrategy::new(
            "caller_fallback",
            Arc::new(|_: &StrategyContext| Some(json!("from caller"))),
        )));
        manager.escalate("test");

        let ctx = StrategyContext::new("fetch_page", "x").with_partial_data(json!({"id": 1}));
        let result = manager.execute_with_degradation(&ctx).unwrap();
        assert_eq!(result.strategy, "caller_fallback");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_result_served_from_higher_level() {
        let manager = DegradationManager::with_builtin_strategies(config());
        let ctx = StrategyContext::new("fetch_page", "x");
        manager.record_success(&ctx, &json!({"rating": 4}));
        manager.set_level(DegradationLevel::EssentialOnly, "test");

        let result = manager.execute_with_degradation(&ctx).unwrap();
        assert_eq!(result.strategy, "cached_data");
        assert_eq!(result.value, json!({"rating": 4}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_strategy_escalates_with_emergency_response() {
        let manager = DegradationManager::with_builtin_strategies(config());
        manager.escalate("test");

        let ctx = StrategyContext::new("fetch_page", "never-seen");
        let result = manager.execute_with_degradation(&ctx).unwrap();

        assert_eq!(result.strategy, "emergency_response");
        assert_eq!(result.level, DegradationLevel::EssentialOnly);
        assert_eq!(result.value["degraded"], true);
        assert_eq!(manager.level(), DegradationLevel::EssentialOnly);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_is_gradual_and_rate_limited() {
        let manager = DegradationManager::new(config());
        manager.set_level(DegradationLevel::CachedOnly, "test");

        assert_eq!(manager.check_recovery(), None);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(manager.check_recovery(), Some(DegradationLevel::EssentialOnly));

        // Rate limited, and the new level has not been held long enough.
        assert_eq!(manager.check_recovery(), None);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(manager.check_recovery(), None);

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(manager.check_recovery(), Some(DegradationLevel::ReducedFeatures));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_failure_blocks_recovery() {
        let manager = DegradationManager::new(DegradationConfig {
            escalation_failure_threshold: 100,
            ..config()
        });
        manager.set_level(DegradationLevel::ReducedFeatures, "test");

        tokio::time::advance(Duration::from_secs(55)).await;
        manager.record_failure("flaky");
        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(manager.check_recovery(), None);
        assert_eq!(manager.level(), DegradationLevel::ReducedFeatures);
    }
}
