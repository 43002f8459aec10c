//! Backoff delay calculation with jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the delay grows with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base * multiplier^(attempt - 1)`
    #[default]
    Exponential,
    /// `base * attempt`
    Linear,
    /// `base`
    Fixed,
}

/// Deterministic backoff delay for an attempt, capped at `max`.
///
/// Attempts are 1-based; attempt 0 has no delay.
pub fn calculate_backoff(
    strategy: BackoffStrategy,
    attempt: u32,
    base: Duration,
    max: Duration,
    multiplier: f64,
) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_secs = base.as_secs_f64();
    let raw = match strategy {
        BackoffStrategy::Exponential => {
            let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
            base_secs * multiplier.powi(exponent)
        }
        BackoffStrategy::Linear => base_secs * f64::from(attempt),
        BackoffStrategy::Fixed => base_secs,
    };

    // powi overflows to inf long before Duration would; clamp in f64 space first.
    let capped = raw.min(max.as_secs_f64());
    if capped.is_finite() && capped > 0.0 {
        Duration::from_secs_f64(capped)
    } else if capped > 0.0 {
        max
    } else {
        Duration::ZERO
    }
}

/// Perturb `delay` by a uniform value in `[-range * delay, +range * delay]`, clamped at zero.
pub fn apply_jitter(delay: Duration, range: f64) -> Duration {
    let spread = delay.as_secs_f64() * range.clamp(0.0, 1.0);
    if spread <= 0.0 {
        return delay;
    }

    let offset = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
}
