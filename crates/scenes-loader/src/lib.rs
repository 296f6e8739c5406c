//! Scene definition loading for Stateful Scenes
//!
//! Adapter layer around the core engine: parses YAML scene definitions from
//! a standalone file, a directory of files, or the `scene:` section of a
//! configuration document. Platform-provided scenes without an `entities:`
//! mapping are skipped; they do not expose enough detail to infer a target
//! state.

mod error;
mod loader;

pub use error::{LoadResult, SceneLoadError};
pub use loader::{load_scenes, SceneSource};
