//! Error types for scene graph operations.

use animbatch_model::CodedError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for scene graph operations.
pub type SceneResult<T> = Result<T, SceneError>;

/// Errors returned by [`SceneGraph`](crate::SceneGraph) calls.
///
/// Callers treat most of these as "this inquiry returned nothing"; only the
/// pipelines decide which ones are fatal.
#[derive(Debug, Error)]
pub enum SceneError {
    /// The node does not exist or has been deleted.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// The attribute or node is locked.
    #[error("Locked: {0}")]
    Locked(String),

    /// The node belongs to an external reference and is read-only.
    #[error("Node is referenced and read-only: {0}")]
    Referenced(String),

    /// A requested node name is not valid.
    #[error("Invalid node name: '{0}'")]
    InvalidName(String),

    /// A scene command failed.
    #[error("Command failed: {0}")]
    Command(String),

    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A scene description could not be parsed.
    #[error("Failed to parse scene description: {0}")]
    Parse(String),
}

impl SceneError {
    /// Builds a [`SceneError::Command`].
    pub fn command(msg: impl Into<String>) -> Self {
        SceneError::Command(msg.into())
    }
}

impl From<serde_json::Error> for SceneError {
    fn from(err: serde_json::Error) -> Self {
        SceneError::Parse(err.to_string())
    }
}

impl CodedError for SceneError {
    fn code(&self) -> &'static str {
        match self {
            SceneError::NodeNotFound(_) => "SCENE_001",
            SceneError::Locked(_) => "SCENE_002",
            SceneError::Referenced(_) => "SCENE_003",
            SceneError::InvalidName(_) => "SCENE_004",
            SceneError::Command(_) => "SCENE_005",
            SceneError::Io { .. } => "SCENE_006",
            SceneError::Parse(_) => "SCENE_007",
        }
    }

    fn category(&self) -> &'static str {
        "scene"
    }
}
