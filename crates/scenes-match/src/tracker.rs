//! Per-scene activity tracking with incremental counters
//!
//! Each tracker holds the last match result per member entity and a set of
//! counters adjusted by delta, so raw-active is recomputed in O(1) per event.
//! The only full rescan happens when the tracker is built on scene (re)load.

use std::collections::HashMap;

use scenes_core::{EntityId, EntitySnapshot, MatchOptions, PatternList, SceneDefinition};
use tracing::trace;

use crate::matcher::{evaluate, MatchResult};

/// Counters over a scene's member entities.
///
/// The four result buckets always partition `total`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActivityCounts {
    pub total: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub ignored: usize,
    pub excluded: usize,
}

impl ActivityCounts {
    fn add(&mut self, result: MatchResult) {
        match result {
            MatchResult::Matched => self.matched += 1,
            MatchResult::Mismatched => self.mismatched += 1,
            MatchResult::Ignored => self.ignored += 1,
            MatchResult::Excluded => self.excluded += 1,
        }
    }

    fn remove(&mut self, result: MatchResult) {
        let bucket = match result {
            MatchResult::Matched => &mut self.matched,
            MatchResult::Mismatched => &mut self.mismatched,
            MatchResult::Ignored => &mut self.ignored,
            MatchResult::Excluded => &mut self.excluded,
        };
        *bucket = bucket.saturating_sub(1);
    }

    /// Raw-active: nothing mismatched and at least one entity actually
    /// matched. Requiring a real match keeps a scene whose members are all
    /// excluded or all unavailable from counting as vacuously active.
    pub fn raw_active(&self) -> bool {
        self.mismatched == 0 && self.matched > 0
    }
}

/// Tracks one scene's member match results and the derived raw-active flag.
#[derive(Debug)]
pub struct SceneActivityTracker {
    definition: SceneDefinition,
    results: HashMap<EntityId, MatchResult>,
    counts: ActivityCounts,
    raw_active: bool,
    /// Attribute keys per entity that can affect its match result
    watched_attrs: HashMap<EntityId, Vec<String>>,
}

impl SceneActivityTracker {
    /// Build a tracker for a definition and run the initial full scan
    /// against the known snapshots.
    pub fn new(
        definition: SceneDefinition,
        snapshots: &HashMap<EntityId, EntitySnapshot>,
        options: &MatchOptions,
        exclusions: &PatternList,
    ) -> Self {
        let mut results = HashMap::with_capacity(definition.len());
        let mut counts = ActivityCounts {
            total: definition.len(),
            ..ActivityCounts::default()
        };
        let mut watched_attrs = HashMap::with_capacity(definition.len());

        for (entity_id, target) in &definition.entities {
            let result = evaluate(
                entity_id,
                target,
                snapshots.get(entity_id),
                options,
                exclusions,
            );
            counts.add(result);
            results.insert(entity_id.clone(), result);
            watched_attrs.insert(
                entity_id.clone(),
                target.watched_attributes().map(str::to_string).collect(),
            );
        }

        let raw_active = counts.raw_active();
        Self {
            definition,
            results,
            counts,
            raw_active,
            watched_attrs,
        }
    }

    pub fn definition(&self) -> &SceneDefinition {
        &self.definition
    }

    pub fn counts(&self) -> ActivityCounts {
        self.counts
    }

    /// The unfiltered boolean derived purely from current entity states
    pub fn raw_active(&self) -> bool {
        self.raw_active
    }

    /// Re-evaluate one member after an update, adjusting counters by delta.
    /// Returns true when the scene's raw-active flag flipped.
    pub fn apply_event(
        &mut self,
        entity_id: &EntityId,
        live: Option<&EntitySnapshot>,
        options: &MatchOptions,
        exclusions: &PatternList,
    ) -> bool {
        let Some(target) = self.definition.entities.get(entity_id) else {
            return false;
        };

        let previous = self.results.get(entity_id).copied();
        let result = evaluate(entity_id, target, live, options, exclusions);
        if previous == Some(result) {
            return false;
        }

        if let Some(previous) = previous {
            self.counts.remove(previous);
        }
        self.counts.add(result);
        self.results.insert(entity_id.clone(), result);

        trace!(
            scene_id = %self.definition.id,
            entity_id = %entity_id,
            ?previous,
            ?result,
            "Member match result changed"
        );

        let was_active = self.raw_active;
        self.raw_active = self.counts.raw_active();
        self.raw_active != was_active
    }

    /// Cheap pre-filter: can this update change the member's match result?
    pub fn is_interesting_update(
        &self,
        entity_id: &EntityId,
        old: Option<&EntitySnapshot>,
        new: &EntitySnapshot,
        options: &MatchOptions,
    ) -> bool {
        let Some(target) = self.definition.entities.get(entity_id) else {
            return false;
        };
        let Some(old) = old else {
            return true;
        };

        if old.is_unavailable() != new.is_unavailable() {
            return true;
        }
        if target.state.is_some() && old.state != new.state {
            return true;
        }
        if options.ignore_attributes {
            return false;
        }

        match self.watched_attrs.get(entity_id) {
            Some(keys) => keys
                .iter()
                .any(|k| old.attributes.get(k) != new.attributes.get(k)),
            None => false,
        }
    }

    /// Member entities the turn-off command should address
    pub fn turn_off_targets(&self, exclusions: &PatternList) -> Vec<EntityId> {
        self.definition
            .entities
            .keys()
            .filter(|id| !exclusions.matches(&id.to_string()))
            .cloned()
            .collect()
    }
}
