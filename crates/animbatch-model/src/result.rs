//! Structured per-item export results.
//!
//! Every pipeline entry point returns an [`ExportResult`]. Results are built
//! through [`ExportResultBuilder`], which derives `success` from the error
//! list so a failed result always names its reason and a successful one never
//! carries errors.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Outcome of exporting one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    /// Whether the export produced a usable file.
    pub success: bool,
    /// Requested output path.
    pub file_path: PathBuf,
    /// Size of the written file in bytes, 0 when nothing was written.
    pub file_size: u64,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
    /// Non-fatal anomalies, in the order they were observed.
    pub warnings: Vec<String>,
    /// Fatal errors. The first one is the user-facing reason.
    pub errors: Vec<String>,
}

impl ExportResult {
    /// Creates a builder for a result targeting `file_path`.
    pub fn builder(file_path: impl Into<PathBuf>) -> ExportResultBuilder {
        ExportResultBuilder::new(file_path)
    }

    /// Shorthand for a failed result with warnings collected so far.
    pub fn failure(
        file_path: impl Into<PathBuf>,
        warnings: Vec<String>,
        error: impl Into<String>,
    ) -> Self {
        ExportResultBuilder::new(file_path)
            .warnings(warnings)
            .error(error)
            .build()
    }

    /// The user-facing failure reason, if any.
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }

    /// Short status line for a finished item.
    ///
    /// Successful items read `OK (12KB) 2 warning(s)`; the size part is
    /// omitted for empty files and the warning part when there are none.
    /// Failed items show their first error.
    pub fn status_message(&self) -> String {
        if !self.success {
            return self
                .first_error()
                .unwrap_or("Export failed (unknown error)")
                .to_string();
        }
        let mut msg = String::from("OK");
        if self.file_size > 0 {
            msg.push_str(&format!(" ({}KB)", self.file_size / 1024));
        }
        if !self.warnings.is_empty() {
            msg.push_str(&format!(" {} warning(s)", self.warnings.len()));
        }
        msg
    }

    /// Returns the output path.
    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Builder for [`ExportResult`].
#[derive(Debug, Clone)]
pub struct ExportResultBuilder {
    file_path: PathBuf,
    file_size: u64,
    duration_secs: f64,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ExportResultBuilder {
    /// Creates a builder with no warnings or errors.
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            file_size: 0,
            duration_secs: 0.0,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Sets the written file size.
    pub fn file_size(mut self, size: u64) -> Self {
        self.file_size = size;
        self
    }

    /// Sets the duration.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration_secs = duration.as_secs_f64();
        self
    }

    /// Appends one warning.
    pub fn warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Appends several warnings.
    pub fn warnings(mut self, warnings: impl IntoIterator<Item = String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// Appends one error, which marks the result failed.
    pub fn error(mut self, error: impl Into<String>) -> Self {
        let error = error.into();
        self.errors.push(if error.is_empty() {
            "Export failed (unknown error)".to_string()
        } else {
            error
        });
        self
    }

    /// Builds the result. `success` is true exactly when no error was added.
    pub fn build(self) -> ExportResult {
        ExportResult {
            success: self.errors.is_empty(),
            file_path: self.file_path,
            file_size: self.file_size,
            duration_secs: self.duration_secs,
            warnings: self.warnings,
            errors: self.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_success_has_no_errors() {
        let result = ExportResult::builder("out/a.fbx")
            .file_size(4096)
            .warning("partial")
            .build();
        assert!(result.success);
        assert!(result.errors.is_empty());
        assert_eq!(result.status_message(), "OK (4KB) 1 warning(s)");
    }

    #[test]
    fn test_failure_keeps_warnings_and_first_error() {
        let result = ExportResult::failure(
            "out/a.fbx",
            vec!["w1".to_string()],
            "Skeleton export produced empty file",
        );
        assert!(!result.success);
        assert_eq!(result.warnings, vec!["w1".to_string()]);
        assert_eq!(
            result.first_error(),
            Some("Skeleton export produced empty file")
        );
        assert_eq!(result.status_message(), "Skeleton export produced empty file");
    }

    #[test]
    fn test_empty_error_still_fails() {
        let result = ExportResult::builder("x.fbx").error("").build();
        assert!(!result.success);
        assert_eq!(result.errors, vec!["Export failed (unknown error)".to_string()]);
    }

    #[test]
    fn test_status_message_without_size() {
        let result = ExportResult::builder("x.fbx").build();
        assert_eq!(result.status_message(), "OK");
    }
}
