//! Error types shared across the animbatch crates.

use thiserror::Error;

/// Result type for model-level operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while loading or interpreting model data.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Options JSON could not be parsed.
    #[error("Invalid export options: {0}")]
    InvalidOptions(#[from] serde_json::Error),

    /// An option carried a value outside its enumerated set.
    #[error("Unsupported value '{value}' for option '{option}'")]
    UnsupportedOptionValue {
        /// The option name.
        option: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A file could not be read or written.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The file path.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An item kind string did not match any known kind.
    #[error("Unknown export item kind: {0}")]
    UnknownItemKind(String),
}

/// Trait for errors that carry a stable code and category.
///
/// Implemented by the scene and engine error enums so the batch layer and
/// the CLI can report any failure uniformly.
///
/// # Example
///
/// ```ignore
/// use animbatch_model::error::CodedError;
///
/// fn report<E: CodedError>(err: E) {
///     eprintln!("[{}] {}", err.code(), err.message());
/// }
/// ```
pub trait CodedError: std::error::Error {
    /// Stable error code, like "EXPORT_001" or "SCENE_003".
    fn code(&self) -> &'static str;

    /// Human-readable message. Defaults to `Display`.
    fn message(&self) -> String {
        self.to_string()
    }

    /// Error category for grouping, like "precondition" or "scene".
    fn category(&self) -> &'static str;
}

impl CodedError for ModelError {
    fn code(&self) -> &'static str {
        match self {
            ModelError::InvalidOptions(_) => "MODEL_001",
            ModelError::UnsupportedOptionValue { .. } => "MODEL_002",
            ModelError::UnknownItemKind(_) => "MODEL_003",
            ModelError::Io { .. } => "MODEL_004",
        }
    }

    fn category(&self) -> &'static str {
        "model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::UnsupportedOptionValue {
            option: "up_axis",
            value: "x".to_string(),
        };
        assert!(err.to_string().contains("up_axis"));
        assert!(err.to_string().contains("'x'"));
        assert_eq!(err.code(), "MODEL_002");
        assert_eq!(err.category(), "model");
    }

    #[test]
    fn test_unknown_kind_message() {
        let err = ModelError::UnknownItemKind("light".to_string());
        assert_eq!(err.message(), "Unknown export item kind: light");
    }
}
