//! Entity ID type for host entities referenced by scene definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid entity ids
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity id must be of the form domain.object_id")]
    InvalidFormat,

    #[error("domain part is empty or contains invalid characters")]
    InvalidDomain,

    #[error("object_id part is empty or contains invalid characters")]
    InvalidObjectId,
}

/// A host entity id such as `light.living_room`.
///
/// Both parts are lowercase alphanumeric with inner underscores. Scene
/// definitions reference member entities by these ids, and the engine keys
/// its dependency index and snapshot cache on them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    /// Create a new EntityId from its domain and object_id parts
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();

        if !is_valid_part(&domain) {
            return Err(EntityIdError::InvalidDomain);
        }
        if !is_valid_part(&object_id) {
            return Err(EntityIdError::InvalidObjectId);
        }

        Ok(Self { domain, object_id })
    }

    /// Get the domain part
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Get the object_id part
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Whether this entity lives in the given domain
    pub fn in_domain(&self, domain: &str) -> bool {
        self.domain == domain
    }
}

/// Lowercase alphanumeric plus underscores, no leading/trailing underscore.
fn is_valid_part(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, object_id) = s.split_once('.').ok_or(EntityIdError::InvalidFormat)?;
        if object_id.contains('.') {
            return Err(EntityIdError::InvalidFormat);
        }
        Self::new(domain, object_id)
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}
