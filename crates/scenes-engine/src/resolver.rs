//! Resolving scene definitions to host scene entities
//!
//! YAML scenes only require a name, so the backing host entity cannot be
//! assumed from a declared id. Resolution tries, in order: the declared id
//! against the host registry's `id` attributes, direct entity id guesses
//! from the id/name slug, then the friendly name.

use std::collections::{HashMap, HashSet};

use scenes_core::{slugify, EntityId, EntitySnapshot, SceneDefinition, SCENE_DOMAIN};

/// Fast lookup from scene definitions to host `scene.*` entities.
///
/// Maps are precomputed once per (re)load from a snapshot of the host scene
/// registry, so repeated resolution stays O(1).
#[derive(Debug, Default)]
pub struct SceneEntityResolver {
    entity_ids: HashSet<EntityId>,
    by_declared_id: HashMap<String, EntityId>,
    by_friendly_name: HashMap<String, EntityId>,
}

impl SceneEntityResolver {
    /// Build from the host's current scene entities. Snapshots outside the
    /// scene domain are skipped.
    pub fn from_registry(scene_states: &[EntitySnapshot]) -> Self {
        let mut resolver = Self::default();

        for snap in scene_states {
            if !snap.entity_id.in_domain(SCENE_DOMAIN) {
                continue;
            }
            resolver.entity_ids.insert(snap.entity_id.clone());
            if let Some(id) = snap.declared_id() {
                resolver
                    .by_declared_id
                    .insert(id.to_string(), snap.entity_id.clone());
            }
            if let Some(name) = snap.friendly_name() {
                resolver
                    .by_friendly_name
                    .insert(normalize_name(name), snap.entity_id.clone());
            }
        }

        resolver
    }

    /// Resolve a definition to its backing host entity, if any.
    pub fn resolve(&self, definition: &SceneDefinition) -> Option<EntityId> {
        if let Some(entity_id) = self.by_declared_id.get(&definition.id) {
            return Some(entity_id.clone());
        }

        for candidate in guess_candidates(definition) {
            if self.entity_ids.contains(&candidate) {
                return Some(candidate);
            }
        }

        self.by_friendly_name
            .get(&normalize_name(&definition.name))
            .cloned()
    }

    /// Number of host scene entities known to the resolver
    pub fn len(&self) -> usize {
        self.entity_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_ids.is_empty()
    }
}

/// Likely host entity ids for a definition, in guess order. Invalid
/// candidates (e.g., an id that does not slug into an object id) are
/// dropped rather than reported.
pub fn guess_candidates(definition: &SceneDefinition) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for object_id in [
        definition.id.clone(),
        slugify(&definition.id),
        definition.slug(),
    ] {
        if object_id.is_empty() || !seen.insert(object_id.clone()) {
            continue;
        }
        if let Ok(entity_id) = EntityId::new(SCENE_DOMAIN, object_id) {
            candidates.push(entity_id);
        }
    }

    candidates
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
