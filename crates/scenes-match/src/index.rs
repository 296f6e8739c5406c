//! Entity-to-scene dependency index

use std::collections::{HashMap, HashSet};

use scenes_core::{EntityId, SceneDefinition};

/// Maps each watched entity id to the set of scenes referencing it.
///
/// Built from the full scene list on (re)load and read-only between
/// rebuilds; callers swap a freshly built index in one assignment so no
/// lookup ever observes a half-built one.
#[derive(Debug, Default)]
pub struct DependencyIndex {
    by_entity: HashMap<EntityId, HashSet<String>>,
}

impl DependencyIndex {
    /// Build the index for an ordered scene list.
    pub fn rebuild(scenes: &[SceneDefinition]) -> Self {
        let mut by_entity: HashMap<EntityId, HashSet<String>> = HashMap::new();
        for scene in scenes {
            for entity_id in scene.entities.keys() {
                by_entity
                    .entry(entity_id.clone())
                    .or_default()
                    .insert(scene.id.clone());
            }
        }
        Self { by_entity }
    }

    /// Every scene with at least one target for this entity, and only those.
    pub fn scenes_for<'a>(&'a self, entity_id: &EntityId) -> impl Iterator<Item = &'a str> {
        self.by_entity
            .get(entity_id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Whether any scene watches this entity
    pub fn contains(&self, entity_id: &EntityId) -> bool {
        self.by_entity.contains_key(entity_id)
    }

    /// All watched entity ids
    pub fn watched_entities(&self) -> impl Iterator<Item = &EntityId> + '_ {
        self.by_entity.keys()
    }

    /// Number of watched entities
    pub fn len(&self) -> usize {
        self.by_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use scenes_core::SceneEntityTarget;

    fn eid(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    fn scene(name: &str, entity_ids: &[&str]) -> SceneDefinition {
        let mut entities = IndexMap::new();
        for id in entity_ids {
            entities.insert(eid(id), SceneEntityTarget::with_state("on"));
        }
        SceneDefinition::new(None, name, None, entities)
    }

    #[test]
    fn maps_entities_to_referencing_scenes() {
        let scenes = vec![
            scene("Movie Night", &["light.tv", "light.couch"]),
            scene("Reading", &["light.couch", "light.corner"]),
        ];
        let index = DependencyIndex::rebuild(&scenes);

        let mut couch: Vec<&str> = index.scenes_for(&eid("light.couch")).collect();
        couch.sort();
        assert_eq!(couch, vec!["movie_night", "reading"]);

        let tv: Vec<&str> = index.scenes_for(&eid("light.tv")).collect();
        assert_eq!(tv, vec!["movie_night"]);

        assert_eq!(index.len(), 3);
        assert!(index.contains(&eid("light.corner")));
    }

    #[test]
    fn untracked_entities_yield_nothing() {
        let index = DependencyIndex::rebuild(&[scene("Solo", &["light.only"])]);
        assert_eq!(index.scenes_for(&eid("light.other")).count(), 0);
        assert!(!index.contains(&eid("light.other")));
    }

    #[test]
    fn rebuild_replaces_wholesale() {
        let mut index = DependencyIndex::rebuild(&[scene("Old", &["light.old"])]);
        index = DependencyIndex::rebuild(&[scene("New", &["light.new"])]);

        assert!(!index.contains(&eid("light.old")));
        assert!(index.contains(&eid("light.new")));
    }

    #[test]
    fn empty_scene_list() {
        let index = DependencyIndex::rebuild(&[]);
        assert!(index.is_empty());
        assert_eq!(index.watched_entities().count(), 0);
    }
}
