//! Error types for export pipelines.

use animbatch_model::CodedError;
use thiserror::Error;

/// Result type used inside pipeline bodies.
pub type PipelineResult<T> = Result<T, ExportError>;

/// Why a single item export failed.
///
/// The message is the user-facing reason and becomes the first error of the
/// item's [`ExportResult`](animbatch_model::ExportResult). Pipelines never
/// propagate these past their entry point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    /// Target node missing, wrong node category, or no deformer found.
    /// Raised before any scene mutation.
    #[error("{0}")]
    Precondition(String),

    /// A required scene edit or the export call failed, or produced a
    /// degenerate result. Partial mutations are rolled back.
    #[error("{0}")]
    Mutation(String),

    /// The exporter reported success but the output failed content checks.
    #[error("{0}")]
    Validation(String),

    /// An unexpected fault caught at the pipeline boundary.
    #[error("{0}")]
    Unknown(String),
}

impl ExportError {
    /// Creates a new precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// Creates a new mutation error.
    pub fn mutation(message: impl Into<String>) -> Self {
        Self::Mutation(message.into())
    }

    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a new unknown error.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown(message.into())
    }

    /// Whether an output file may exist for this failure.
    pub fn may_have_output(&self) -> bool {
        matches!(self, ExportError::Mutation(_) | ExportError::Validation(_))
    }
}

impl CodedError for ExportError {
    fn code(&self) -> &'static str {
        match self {
            ExportError::Precondition(_) => "EXPORT_001",
            ExportError::Mutation(_) => "EXPORT_002",
            ExportError::Validation(_) => "EXPORT_003",
            ExportError::Unknown(_) => "EXPORT_004",
        }
    }

    fn category(&self) -> &'static str {
        match self {
            ExportError::Precondition(_) => "precondition",
            ExportError::Mutation(_) => "mutation",
            ExportError::Validation(_) => "validation",
            ExportError::Unknown(_) => "unknown",
        }
    }
}
