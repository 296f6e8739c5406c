//! Core types for Stateful Scenes
//!
//! This crate provides the fundamental types shared by the scene matching and
//! engine crates: EntityId, EntitySnapshot, SceneDefinition and the
//! configuration options bundle.

mod entity_id;
mod options;
mod pattern;
mod scene;
mod slugify;
mod snapshot;

pub use entity_id::{EntityId, EntityIdError};
pub use options::{
    EngineOptions, MatchOptions, DEFAULT_EXCLUDE_PATTERNS, DEFAULT_NUMBER_TOLERANCE,
    DEFAULT_SETTLE_TIME,
};
pub use pattern::PatternList;
pub use scene::{SceneDefinition, SceneEntityTarget};
pub use slugify::slugify;
pub use snapshot::EntitySnapshot;

/// State value reported while an entity is unavailable
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// State value reported before an entity's state is known
pub const STATE_UNKNOWN: &str = "unknown";

/// State value subject to the off-shortcut matching rule
pub const STATE_OFF: &str = "off";

/// Domain of host scene entities
pub const SCENE_DOMAIN: &str = "scene";
