//! Error types for scene loading

use std::path::PathBuf;

use thiserror::Error;

/// Result type for scene loading operations
pub type LoadResult<T> = Result<T, SceneLoadError>;

/// Errors that can occur while loading scene definitions
#[derive(Debug, Error)]
pub enum SceneLoadError {
    /// The configured source path does not exist
    #[error("scene source not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Failed to read a file
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML
    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document is neither a scene list nor a scene mapping
    #[error("scene source {path} did not parse to a scene list or mapping")]
    InvalidShape { path: PathBuf },
}
