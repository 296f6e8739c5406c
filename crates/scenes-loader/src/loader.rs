//! YAML scene definition loader
//!
//! Accepts the shapes Home-style scene YAML comes in: a list of scenes, a
//! single scene mapping, or a configuration document with a `scene:`
//! section. Per-entity expectations may be a full mapping (state plus
//! attributes) or a scalar shorthand for the desired state.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use scenes_core::{EntityId, SceneDefinition, SceneEntityTarget};
use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::error::{LoadResult, SceneLoadError};

/// Where scene definitions come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneSource {
    /// The `scene:` section of a configuration document
    ConfigurationYaml(PathBuf),
    /// A standalone YAML file containing a scene list or a single scene
    SceneFile(PathBuf),
    /// A directory of YAML files, loaded in sorted order
    SceneDir(PathBuf),
}

/// Load scene definitions from the configured source.
///
/// Individual malformed scenes are skipped with a log line; only an
/// unreadable or structurally invalid source fails the load as a whole.
pub fn load_scenes(source: &SceneSource) -> LoadResult<Vec<SceneDefinition>> {
    let items = match source {
        SceneSource::ConfigurationYaml(path) => {
            let value = load_yaml_file(path)?;
            let Value::Mapping(map) = value else {
                return Err(SceneLoadError::InvalidShape { path: path.clone() });
            };
            let scene_section = map
                .into_iter()
                .find(|(key, _)| key.as_str() == Some("scene"))
                .map(|(_, value)| value);
            match scene_section {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Sequence(items)) => items,
                Some(scene @ Value::Mapping(_)) => vec![scene],
                Some(_) => return Err(SceneLoadError::InvalidShape { path: path.clone() }),
            }
        }
        SceneSource::SceneFile(path) => document_items(load_yaml_file(path)?, path)?,
        SceneSource::SceneDir(path) => {
            if !path.is_dir() {
                return Err(SceneLoadError::SourceNotFound { path: path.clone() });
            }
            let mut files: Vec<PathBuf> = fs::read_dir(path)
                .map_err(|e| SceneLoadError::ReadFile {
                    path: path.clone(),
                    source: e,
                })?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("yaml") | Some("yml")
                    )
                })
                .collect();
            files.sort();

            let mut items = Vec::new();
            for file in &files {
                match load_yaml_file(file)? {
                    Value::Null => {}
                    Value::Sequence(mut more) => items.append(&mut more),
                    scene @ Value::Mapping(_) => items.push(scene),
                    _ => warn!(path = %file.display(), "Skipping file (not a scene list or mapping)"),
                }
            }
            items
        }
    };

    let scenes = parse_scene_items(items);
    info!(scenes = scenes.len(), source = ?source, "Loaded scene definitions");
    Ok(scenes)
}

fn field<'a>(map: &'a serde_yaml::Mapping, key: &str) -> Option<&'a Value> {
    map.get(&Value::String(key.to_string()))
}

fn load_yaml_file(path: &Path) -> LoadResult<Value> {
    if !path.exists() {
        return Err(SceneLoadError::SourceNotFound { path: path.to_path_buf() });
    }
    let content = fs::read_to_string(path).map_err(|e| SceneLoadError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(&content).map_err(|e| SceneLoadError::ParseYaml {
        path: path.to_path_buf(),
        source: e,
    })
}

fn document_items(value: Value, path: &Path) -> LoadResult<Vec<Value>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => Ok(items),
        scene @ Value::Mapping(_) => Ok(vec![scene]),
        _ => Err(SceneLoadError::InvalidShape {
            path: path.to_path_buf(),
        }),
    }
}

fn parse_scene_items(items: Vec<Value>) -> Vec<SceneDefinition> {
    let mut scenes = Vec::new();

    for item in items {
        let Value::Mapping(item) = item else { continue };

        // Platform-provided scenes carry no entities mapping; skip them.
        let Some(Value::Mapping(raw_entities)) = field(&item, "entities") else {
            debug!("Skipping scene item without an entities mapping");
            continue;
        };

        let name = match field(&item, "name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => "Unnamed Scene".to_string(),
        };
        let declared_id = field(&item, "id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let icon = field(&item, "icon").and_then(Value::as_str).map(str::to_string);

        let mut entities = IndexMap::new();
        for (key, value) in raw_entities {
            let Some(raw_id) = key.as_str() else {
                warn!(?key, "Skipping non-string entity key");
                continue;
            };
            let entity_id: EntityId = match raw_id.parse() {
                Ok(id) => id,
                Err(err) => {
                    warn!(entity_id = raw_id, %err, "Skipping invalid entity id");
                    continue;
                }
            };
            entities.insert(entity_id, normalize_expectation(value));
        }

        let mut definition = SceneDefinition::new(declared_id, name, icon, entities);
        if definition.id.is_empty() {
            // Name slugged to nothing; fall back to a positional id.
            definition.id = format!("scene_{}", scenes.len() + 1);
        }
        scenes.push(definition);
    }

    scenes
}

/// Normalize a per-entity scene value into a target. Scalars are shorthand
/// for the desired state.
fn normalize_expectation(value: &Value) -> SceneEntityTarget {
    match value {
        Value::Null => SceneEntityTarget::default(),
        Value::Mapping(map) => {
            let mut target = SceneEntityTarget::default();
            for (key, value) in map {
                let Some(key) = key.as_str() else { continue };
                if key == "state" {
                    if !value.is_null() {
                        target.state = Some(scalar_to_state(value));
                    }
                } else {
                    target
                        .attributes
                        .insert(key.to_string(), yaml_to_json(value));
                }
            }
            target
        }
        scalar => SceneEntityTarget::with_state(scalar_to_state(scalar)),
    }
}

/// YAML scalars like `true`, `0` or `idle` all mean a desired state string.
fn scalar_to_state(value: &Value) -> String {
    match value {
        Value::Bool(true) => "on".to_string(),
        Value::Bool(false) => "off".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Tagged(tagged) => scalar_to_state(&tagged.value),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn yaml_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(items) => {
            serde_json::Value::Array(items.iter().map(yaml_to_json).collect())
        }
        Value::Mapping(map) => {
            let mut object = serde_json::Map::new();
            for (key, value) in map {
                let key = match key.as_str() {
                    Some(s) => s.to_string(),
                    None => continue,
                };
                object.insert(key, yaml_to_json(value));
            }
            serde_json::Value::Object(object)
        }
        Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}
