//! Live entity snapshots supplied by the host state stream

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntityId, STATE_UNAVAILABLE, STATE_UNKNOWN};

/// A point-in-time view of one host entity.
///
/// Snapshots are read-only inputs to the engine. The engine caches the most
/// recent snapshot per entity so that a scene reload can rescan current
/// state without polling the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// The entity this snapshot belongs to
    pub entity_id: EntityId,

    /// The state value (e.g., "on", "off", "23.5", "unavailable")
    pub state: String,

    /// Attributes reported alongside the state
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the host reported this snapshot
    pub last_updated: DateTime<Utc>,
}

impl EntitySnapshot {
    /// Create a snapshot stamped with the current time
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_updated: Utc::now(),
        }
    }

    /// Whether the state value means the entity cannot currently be matched
    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE || self.state == STATE_UNKNOWN
    }

    /// Get an attribute value by key
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    /// The `friendly_name` attribute, when present
    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(|v| v.as_str())
    }

    /// The `id` attribute host scene entities carry for declared scene ids
    pub fn declared_id(&self) -> Option<&str> {
        self.attributes.get("id").and_then(|v| v.as_str())
    }
}

impl PartialEq for EntitySnapshot {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps are not compared; two snapshots are equal when they
        // describe the same entity, state value and attributes.
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(state: &str) -> EntitySnapshot {
        EntitySnapshot::new(
            EntityId::new("light", "desk").unwrap(),
            state,
            HashMap::new(),
        )
    }

    #[test]
    fn unavailable_states() {
        assert!(snapshot("unavailable").is_unavailable());
        assert!(snapshot("unknown").is_unavailable());
        assert!(!snapshot("off").is_unavailable());
        assert!(!snapshot("on").is_unavailable());
    }

    #[test]
    fn equality_ignores_timestamp() {
        let mut a = snapshot("on");
        let b = snapshot("on");
        a.last_updated = a.last_updated - chrono::Duration::seconds(30);
        assert_eq!(a, b);
    }

    #[test]
    fn named_attributes() {
        let mut attrs = HashMap::new();
        attrs.insert("friendly_name".to_string(), json!("Desk Lamp"));
        attrs.insert("id".to_string(), json!("abc123"));
        let snap = EntitySnapshot::new(EntityId::new("scene", "desk").unwrap(), "scening", attrs);
        assert_eq!(snap.friendly_name(), Some("Desk Lamp"));
        assert_eq!(snap.declared_id(), Some("abc123"));
        assert_eq!(snap.attribute("missing"), None);
    }
}
