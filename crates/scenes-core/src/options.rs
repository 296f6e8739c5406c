//! Configuration options recognized by the engine

use std::time::Duration;

use serde::Deserialize;

use crate::PatternList;

/// Default optimistic/suppression window after a trigger (seconds)
pub const DEFAULT_SETTLE_TIME: f64 = 1.5;

/// Default numeric attribute tolerance
pub const DEFAULT_NUMBER_TOLERANCE: f64 = 4.0;

/// Default exclusion pattern list (circadian lighting control helpers)
pub const DEFAULT_EXCLUDE_PATTERNS: &str = "switch.circadian_lighting*";

/// Comparison options for the attribute matcher.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Numeric attributes match when |target - live| <= tolerance
    pub number_tolerance: f64,

    /// Treat unavailable/unknown entities as ignored rather than mismatched
    pub ignore_unavailable: bool,

    /// Skip attribute comparison entirely once the state matches.
    /// Advanced knob; usually too blunt to enable.
    pub ignore_attributes: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            number_tolerance: DEFAULT_NUMBER_TOLERANCE,
            ignore_unavailable: true,
            ignore_attributes: false,
        }
    }
}

/// The full options bundle consumed by the engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Grace period (seconds) after a trigger before raw-active is trusted
    pub settle_time: f64,

    #[serde(flatten)]
    pub matching: MatchOptions,

    /// Whether the exclusion pattern list applies
    pub exclude_enabled: bool,

    /// Comma-separated glob patterns for excluded entities
    pub exclude_patterns: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            settle_time: DEFAULT_SETTLE_TIME,
            matching: MatchOptions::default(),
            exclude_enabled: true,
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS.to_string(),
        }
    }
}

impl EngineOptions {
    /// The settle window as a duration, clamped to non-negative
    pub fn settle_duration(&self) -> Duration {
        Duration::from_secs_f64(self.settle_time.max(0.0))
    }

    /// The effective exclusion list (empty when exclusion is disabled)
    pub fn exclusions(&self) -> PatternList {
        if self.exclude_enabled {
            PatternList::parse(&self.exclude_patterns)
        } else {
            PatternList::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = EngineOptions::default();
        assert_eq!(opts.settle_time, DEFAULT_SETTLE_TIME);
        assert_eq!(opts.matching.number_tolerance, DEFAULT_NUMBER_TOLERANCE);
        assert!(opts.matching.ignore_unavailable);
        assert!(!opts.matching.ignore_attributes);
        assert!(opts.exclusions().matches("switch.circadian_lighting_hall"));
    }

    #[test]
    fn deserializes_flat_bundle() {
        let opts: EngineOptions = serde_json::from_str(
            r#"{
                "settle_time": 3.0,
                "number_tolerance": 1.0,
                "ignore_unavailable": false,
                "exclude_enabled": false,
                "exclude_patterns": "light.debug_*"
            }"#,
        )
        .unwrap();

        assert_eq!(opts.settle_time, 3.0);
        assert_eq!(opts.matching.number_tolerance, 1.0);
        assert!(!opts.matching.ignore_unavailable);
        // Disabled exclusion yields an empty list regardless of patterns.
        assert!(opts.exclusions().is_empty());
    }

    #[test]
    fn negative_settle_time_clamps_to_zero() {
        let opts = EngineOptions {
            settle_time: -2.0,
            ..EngineOptions::default()
        };
        assert_eq!(opts.settle_duration(), Duration::ZERO);
    }
}
