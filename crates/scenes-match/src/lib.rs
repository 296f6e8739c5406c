//! Scene activity matching for Stateful Scenes
//!
//! Pure, synchronous building blocks: the per-entity attribute matcher, the
//! entity-to-scene dependency index, and the per-scene activity tracker with
//! incremental counters. Everything here is driven by the engine crate; no
//! I/O or timers live at this layer.

mod index;
mod matcher;
mod tracker;

pub use index::DependencyIndex;
pub use matcher::{evaluate, MatchResult};
pub use tracker::{ActivityCounts, SceneActivityTracker};
