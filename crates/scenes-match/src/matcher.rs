//! Matching logic: does one entity currently satisfy its scene target?
//!
//! Only the keys declared by the scene are compared; attributes the entity
//! reports beyond those are ignored.

use scenes_core::{EntityId, EntitySnapshot, MatchOptions, PatternList, SceneEntityTarget, STATE_OFF};
use serde_json::Value;

/// Per-entity outcome of evaluating a scene target against live state.
/// Ephemeral; recomputed on every relevant event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// Live state and every declared attribute satisfy the target
    Matched,
    /// The state or at least one declared attribute disagrees
    Mismatched,
    /// Entity is unavailable and unavailable entities are ignored
    Ignored,
    /// Entity id matches the exclusion pattern list
    Excluded,
}

impl MatchResult {
    /// Everything except an outright mismatch counts as satisfied.
    pub fn is_satisfying(self) -> bool {
        !matches!(self, MatchResult::Mismatched)
    }
}

/// Evaluate one scene entity target against the latest snapshot.
///
/// `live` is `None` when the host has never reported the entity; that case
/// follows the unavailable rules. Pure function of its inputs.
pub fn evaluate(
    entity_id: &EntityId,
    target: &SceneEntityTarget,
    live: Option<&EntitySnapshot>,
    options: &MatchOptions,
    exclusions: &PatternList,
) -> MatchResult {
    let unavailable = live.map_or(true, EntitySnapshot::is_unavailable);
    if unavailable && options.ignore_unavailable {
        return MatchResult::Ignored;
    }

    if exclusions.matches(&entity_id.to_string()) {
        return MatchResult::Excluded;
    }

    let Some(live) = live else {
        return MatchResult::Mismatched;
    };

    if let Some(expected_state) = &target.state {
        if *expected_state != live.state {
            return MatchResult::Mismatched;
        }

        // Off-shortcut: an "off" entity may report stale attribute values,
        // so a matching "off" state satisfies the target outright.
        if expected_state == STATE_OFF {
            return MatchResult::Matched;
        }
    }

    if options.ignore_attributes {
        return MatchResult::Matched;
    }

    for (key, expected) in &target.attributes {
        match live.attributes.get(key) {
            Some(actual) if value_matches(expected, actual, options.number_tolerance) => {}
            _ => return MatchResult::Mismatched,
        }
    }

    MatchResult::Matched
}

/// Compare a declared value against a live one with numeric tolerance.
/// Sequences compare element-wise; maps compare only the declared keys.
fn value_matches(expected: &Value, actual: &Value, tolerance: f64) -> bool {
    if let (Some(e), Some(a)) = (as_number(expected), as_number(actual)) {
        return (e - a).abs() <= tolerance;
    }

    match (expected, actual) {
        (Value::Array(e), Value::Array(a)) => {
            e.len() == a.len()
                && e.iter()
                    .zip(a)
                    .all(|(ev, av)| value_matches(ev, av, tolerance))
        }
        (Value::Object(e), Value::Object(a)) => e.iter().all(|(k, ev)| {
            a.get(k)
                .is_some_and(|av| value_matches(ev, av, tolerance))
        }),
        _ => expected == actual,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}
