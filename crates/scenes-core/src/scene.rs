//! Scene definition types

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{slugify, EntityId};

/// The desired condition for one entity within a scene.
///
/// Only the declared keys are compared against live state; attributes the
/// entity reports beyond these are ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneEntityTarget {
    /// Desired state value, when the scene declares one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Desired attribute values, in declaration order
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, serde_json::Value>,
}

impl SceneEntityTarget {
    /// A target that only cares about the state value
    pub fn with_state(state: impl Into<String>) -> Self {
        Self {
            state: Some(state.into()),
            attributes: IndexMap::new(),
        }
    }

    /// Attribute keys this target compares
    pub fn watched_attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }
}

/// A named target configuration of multiple entities.
///
/// Immutable once loaded; a reload replaces definitions wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDefinition {
    /// Declared scene id, or one derived from the name when none was declared
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Optional icon (e.g., "mdi:movie")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Member entities and their targets, in declaration order
    pub entities: IndexMap<EntityId, SceneEntityTarget>,
}

impl SceneDefinition {
    /// Build a definition, deriving the id from the slugified name when no
    /// explicit id was declared.
    pub fn new(
        declared_id: Option<String>,
        name: impl Into<String>,
        icon: Option<String>,
        entities: IndexMap<EntityId, SceneEntityTarget>,
    ) -> Self {
        let name = name.into();
        let id = declared_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| slugify(&name));

        Self {
            id,
            name,
            icon,
            entities,
        }
    }

    /// The slugified name, used for host entity id guesses
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Number of member entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eid(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[test]
    fn derives_id_from_name() {
        let def = SceneDefinition::new(None, "Movie Night", None, IndexMap::new());
        assert_eq!(def.id, "movie_night");
        assert_eq!(def.slug(), "movie_night");
        assert!(def.is_empty());
    }

    #[test]
    fn keeps_declared_id() {
        let def = SceneDefinition::new(
            Some("abc123".to_string()),
            "Movie Night",
            Some("mdi:movie".to_string()),
            IndexMap::new(),
        );
        assert_eq!(def.id, "abc123");
        assert_eq!(def.slug(), "movie_night");
    }

    #[test]
    fn blank_declared_id_falls_back() {
        let def = SceneDefinition::new(Some("   ".to_string()), "All Off", None, IndexMap::new());
        assert_eq!(def.id, "all_off");
    }

    #[test]
    fn preserves_entity_order() {
        let mut entities = IndexMap::new();
        entities.insert(eid("light.b"), SceneEntityTarget::with_state("on"));
        entities.insert(eid("light.a"), SceneEntityTarget::with_state("off"));
        let def = SceneDefinition::new(None, "Ordered", None, entities);

        let ids: Vec<String> = def.entities.keys().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["light.b", "light.a"]);
        assert_eq!(def.len(), 2);
    }

    #[test]
    fn target_watched_attributes() {
        let mut target = SceneEntityTarget::with_state("on");
        target.attributes.insert("brightness".to_string(), json!(90));
        target
            .attributes
            .insert("rgb_color".to_string(), json!([255, 0, 0]));

        let keys: Vec<&str> = target.watched_attributes().collect();
        assert_eq!(keys, vec!["brightness", "rgb_color"]);
    }
}
