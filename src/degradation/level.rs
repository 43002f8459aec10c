//! Service levels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered tiers of reduced functionality. Higher is more degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    #[default]
    FullService,
    ReducedFeatures,
    EssentialOnly,
    CachedOnly,
    EmergencyMode,
    ServiceUnavailable,
}

impl DegradationLevel {
    pub const ALL: [DegradationLevel; 6] = [
        DegradationLevel::FullService,
        DegradationLevel::ReducedFeatures,
        DegradationLevel::EssentialOnly,
        DegradationLevel::CachedOnly,
        DegradationLevel::EmergencyMode,
        DegradationLevel::ServiceUnavailable,
    ];

    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// One step more degraded, saturating at `ServiceUnavailable`.
    pub fn next(self) -> Self {
        Self::from_value(self.value() + 1).unwrap_or(self)
    }

    /// One step less degraded, saturating at `FullService`.
    pub fn prev(self) -> Self {
        self.value()
            .checked_sub(1)
            .and_then(Self::from_value)
            .unwrap_or(self)
    }

    pub fn is_degraded(self) -> bool {
        self != DegradationLevel::FullService
    }

    /// This level and every more degraded one, in order.
    pub fn and_above(self) -> impl Iterator<Item = DegradationLevel> {
        Self::ALL.into_iter().filter(move |l| *l >= self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DegradationLevel::FullService => "full_service",
            DegradationLevel::ReducedFeatures => "reduced_features",
            DegradationLevel::EssentialOnly => "essential_only",
            DegradationLevel::CachedOnly => "cached_only",
            DegradationLevel::EmergencyMode => "emergency_mode",
            DegradationLevel::ServiceUnavailable => "service_unavailable",
        }
    }
}

impl fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
