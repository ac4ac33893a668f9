//! Per-session export report.
//!
//! A [`SessionReport`] accumulates one [`LogEntry`] per exported item plus
//! session-wide warnings and errors, then renders a fixed-width text report
//! named `<start>-<end>.log` into the shot directory.

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::range::FrameRange;
use crate::result::ExportResult;

#[cfg(test)]
mod tests;

const SEPARATOR_WIDTH: usize = 70;

/// One exported file in the report.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Output file path.
    pub file_path: String,
    /// Item kind label, like `skeleton`.
    pub file_type: String,
    /// Character or display name.
    pub character_name: String,
    /// Written size in bytes.
    pub file_size: u64,
    /// Export duration in seconds.
    pub duration_secs: f64,
    /// Item warnings.
    pub warnings: Vec<String>,
    /// Item errors.
    pub errors: Vec<String>,
}

impl LogEntry {
    /// Creates an entry from a pipeline result.
    pub fn from_result(
        file_type: impl Into<String>,
        character_name: impl Into<String>,
        result: &ExportResult,
    ) -> Self {
        Self {
            file_path: result.file_path.display().to_string(),
            file_type: file_type.into(),
            character_name: character_name.into(),
            file_size: result.file_size,
            duration_secs: result.duration_secs,
            warnings: result.warnings.clone(),
            errors: result.errors.clone(),
        }
    }

    /// An entry is successful when it carries no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Aggregate counts over a session.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSummary {
    /// Number of entries.
    pub total_files: usize,
    /// Entries without errors.
    pub success_files: usize,
    /// Entries with errors.
    pub failed_files: usize,
    /// Session-wide warnings.
    pub global_warnings: usize,
    /// Session-wide errors.
    pub global_errors: usize,
    /// Seconds since the report was created.
    pub duration_secs: f64,
    /// `SUCCESS` or `FAILED`.
    pub status: &'static str,
}

/// Text report for one export session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    shot_dir: PathBuf,
    range: FrameRange,
    entries: Vec<LogEntry>,
    warnings: Vec<String>,
    errors: Vec<String>,
    started: Instant,
}

impl SessionReport {
    /// Creates an empty report for `shot_dir` and the requested range.
    pub fn new(shot_dir: impl Into<PathBuf>, range: FrameRange) -> Self {
        Self {
            shot_dir: shot_dir.into(),
            range,
            entries: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Appends one entry.
    pub fn add_entry(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Adds a session-wide warning. Empty messages are ignored.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        if !msg.is_empty() {
            self.warnings.push(msg);
        }
    }

    /// Adds a session-wide error. Empty messages are ignored.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        if !msg.is_empty() {
            self.errors.push(msg);
        }
    }

    /// Returns the entries recorded so far.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Report filename, `<start>-<end>.log`.
    pub fn log_filename(&self) -> String {
        format!("{}-{}.log", self.range.start, self.range.end)
    }

    /// Computes the summary counts.
    pub fn summary(&self) -> LogSummary {
        let success_files = self.entries.iter().filter(|e| e.is_ok()).count();
        let failed_files = self.entries.len() - success_files;
        let status = if !self.errors.is_empty() || failed_files > 0 {
            "FAILED"
        } else {
            "SUCCESS"
        };
        LogSummary {
            total_files: self.entries.len(),
            success_files,
            failed_files,
            global_warnings: self.warnings.len(),
            global_errors: self.errors.len(),
            duration_secs: self.started.elapsed().as_secs_f64(),
            status,
        }
    }

    /// Renders the report text.
    pub fn render(&self) -> String {
        let s = self.summary();
        let sep = "=".repeat(SEPARATOR_WIDTH);
        let sep_detail = "-".repeat(SEPARATOR_WIDTH);
        let mut lines: Vec<String> = Vec::new();

        lines.push(sep.clone());
        lines.push("Batch Animation Export Log".to_string());
        lines.push(sep.clone());
        lines.push(format!(
            "Time       : {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        lines.push(format!("Shot Dir   : {}", self.shot_dir.display()));
        lines.push(format!(
            "Frame Range: {}-{}",
            self.range.start, self.range.end
        ));
        lines.push(format!("Total Frames: {}f", self.range.span()));
        lines.push(format!("Total Time : {:.1}s", s.duration_secs));
        lines.push(format!("Status     : {}", s.status));
        lines.push(format!(
            "Files      : {} (ok: {}, fail: {})",
            s.total_files, s.success_files, s.failed_files
        ));
        lines.push(sep.clone());

        if !self.warnings.is_empty() {
            lines.push(String::new());
            lines.push("[WARNINGS]".to_string());
            lines.extend(self.warnings.iter().map(|w| format!("  - {w}")));
        }
        if !self.errors.is_empty() {
            lines.push(String::new());
            lines.push("[ERRORS]".to_string());
            lines.extend(self.errors.iter().map(|e| format!("  - {e}")));
        }

        lines.push(String::new());
        lines.push(sep_detail.clone());
        lines.push("Export Details".to_string());
        lines.push(sep_detail);

        for (i, entry) in self.entries.iter().enumerate() {
            lines.push(String::new());
            lines.push(format!("  [{}] {}", i + 1, entry.file_type.to_uppercase()));
            if !entry.character_name.is_empty() {
                lines.push(format!("      Character : {}", entry.character_name));
            }
            lines.push(format!("      File      : {}", entry.file_path));
            lines.push(format!("      Size      : {}", format_size(entry.file_size)));
            lines.push(format!("      Duration  : {:.1}s", entry.duration_secs));
            lines.extend(entry.warnings.iter().map(|w| format!("      [WARN] {w}")));
            lines.extend(entry.errors.iter().map(|e| format!("      [ERROR] {e}")));
            lines.push(format!(
                "      Status    : {}",
                if entry.is_ok() { "OK" } else { "FAIL" }
            ));
        }

        lines.push(String::new());
        lines.push(sep.clone());
        lines.push("END OF LOG".to_string());
        lines.push(sep);

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    /// Writes the report into the shot directory and returns its path.
    ///
    /// When the shot directory cannot be written the report goes to the
    /// working directory instead, with a trailing note naming the primary
    /// location.
    pub fn write(&self) -> std::io::Result<PathBuf> {
        let primary = self.shot_dir.join(self.log_filename());
        let content = self.render();

        match write_primary(&self.shot_dir, &primary, &content) {
            Ok(()) => Ok(primary),
            Err(err) => {
                tracing::warn!(path = %primary.display(), error = %err, "primary log write failed");
                let fallback = PathBuf::from(self.log_filename());
                let content = format!(
                    "{content}\n\n[LOGGER WARNING] Failed to write primary log to: {}",
                    primary.display()
                );
                fs::write(&fallback, content)?;
                Ok(fallback)
            }
        }
    }
}

fn write_primary(dir: &Path, path: &Path, content: &str) -> std::io::Result<()> {
    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, content)
}

/// Formats a byte count for the report: `-`, `N B`, `x.x KB`, `x.x MB` or
/// `x.xx GB`.
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match size {
        0 => "-".to_string(),
        s if s < KB => format!("{s} B"),
        s if s < MB => format!("{:.1} KB", s as f64 / KB as f64),
        s if s < GB => format!("{:.1} MB", s as f64 / MB as f64),
        s => format!("{:.2} GB", s as f64 / GB as f64),
    }
}
