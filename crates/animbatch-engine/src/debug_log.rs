//! Optional export debug log file.
//!
//! Lines look like `[2026-03-01 14:02:11][Warn][AnimExporter] message`. The
//! file is appended to across sessions; a UTF-8 BOM is written when it is
//! new or empty so text editors pick the right encoding.

use chrono::{Local, NaiveDateTime};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const COMPONENT: &str = "AnimExporter";

/// Severity of a debug log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "Info",
            LogLevel::Warn => "Warn",
            LogLevel::Error => "Error",
        }
    }
}

/// Append-only debug log sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugLog {
    path: PathBuf,
}

impl DebugLog {
    /// Logs to an explicit file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Logs to `BatchExportDebug_<yyyyMMdd_HHmmss>.log` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        Self::new(dir.join(format!("BatchExportDebug_{}.log", stamp)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line stamped with the local time.
    pub fn write(&self, level: LogLevel, message: &str) -> io::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let needs_bom = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if needs_bom {
            file.write_all(UTF8_BOM)?;
        }
        let line = format_line(&Local::now().naive_local(), level, message);
        writeln!(file, "{}", line)
    }
}

/// Formats one log line without the trailing newline.
pub fn format_line(at: &NaiveDateTime, level: LogLevel, message: &str) -> String {
    format!(
        "[{}][{}][{}] {}",
        at.format("%Y-%m-%d %H:%M:%S"),
        level.as_str(),
        COMPONENT,
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn test_format_line() {
        let at = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(14, 2, 11)
            .unwrap();
        assert_eq!(
            format_line(&at, LogLevel::Warn, "constraint failed"),
            "[2026-03-01 14:02:11][Warn][AnimExporter] constraint failed"
        );
    }

    #[test]
    fn test_bom_written_once() {
        let tmp = TempDir::new().unwrap();
        let log = DebugLog::new(tmp.path().join("logs").join("debug.log"));
        log.write(LogLevel::Info, "first").unwrap();
        log.write(LogLevel::Error, "second").unwrap();

        let bytes = fs::read(log.path()).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        assert!(!bytes[3..].windows(3).any(|w| w == UTF8_BOM));

        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[Info][AnimExporter] first"));
        assert!(lines[1].ends_with("[Error][AnimExporter] second"));
    }

    #[test]
    fn test_default_filename() {
        let log = DebugLog::in_dir(Path::new("out"));
        let name = log.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("BatchExportDebug_"));
        assert!(name.ends_with(".log"));
        // BatchExportDebug_ + yyyyMMdd_HHmmss + .log
        assert_eq!(name.len(), "BatchExportDebug_".len() + 15 + 4);
    }
}
