//! Tests for the session report.

use super::*;
use pretty_assertions::assert_eq;

fn entry(file: &str, errors: Vec<&str>) -> LogEntry {
    LogEntry {
        file_path: file.to_string(),
        file_type: "skeleton".to_string(),
        character_name: "hero".to_string(),
        file_size: 2048,
        duration_secs: 1.5,
        warnings: vec!["partial constraints".to_string()],
        errors: errors.into_iter().map(String::from).collect(),
    }
}

#[test]
fn test_format_size() {
    assert_eq!(format_size(0), "-");
    assert_eq!(format_size(512), "512 B");
    assert_eq!(format_size(1536), "1.5 KB");
    assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    assert_eq!(format_size(2 * 1024 * 1024 * 1024), "2.00 GB");
}

#[test]
fn test_log_filename() {
    let report = SessionReport::new("/shots/a", FrameRange::new(101, 250));
    assert_eq!(report.log_filename(), "101-250.log");
}

#[test]
fn test_summary_status() {
    let mut report = SessionReport::new("/shots/a", FrameRange::new(1, 10));
    report.add_entry(entry("a.fbx", vec![]));
    assert_eq!(report.summary().status, "SUCCESS");

    report.add_entry(entry("b.fbx", vec!["Skeleton export produced empty file"]));
    let summary = report.summary();
    assert_eq!(summary.status, "FAILED");
    assert_eq!(summary.success_files, 1);
    assert_eq!(summary.failed_files, 1);
}

#[test]
fn test_global_error_fails_session() {
    let mut report = SessionReport::new("/shots/a", FrameRange::new(1, 10));
    report.add_error("bake failed");
    report.add_error("");
    assert_eq!(report.summary().global_errors, 1);
    assert_eq!(report.summary().status, "FAILED");
}

#[test]
fn test_render_layout() {
    let mut report = SessionReport::new("/shots/a", FrameRange::new(1, 10));
    report.add_warning("fps override");
    report.add_entry(entry("a.fbx", vec![]));
    report.add_entry(entry("b.fbx", vec!["boom"]));
    let text = report.render();

    assert!(text.starts_with(&"=".repeat(70)));
    assert!(text.contains("Frame Range: 1-10\n"));
    assert!(text.contains("Total Frames: 9f\n"));
    assert!(text.contains("Files      : 2 (ok: 1, fail: 1)\n"));
    assert!(text.contains("[WARNINGS]\n  - fps override\n"));
    assert!(text.contains("  [1] SKELETON\n      Character : hero\n      File      : a.fbx\n"));
    assert!(text.contains("      Size      : 2.0 KB\n      Duration  : 1.5s\n"));
    assert!(text.contains("      [ERROR] boom\n      Status    : FAIL\n"));
    assert!(text.trim_end().ends_with(&"=".repeat(70)));
    assert!(text.contains("END OF LOG"));
}

#[test]
fn test_write_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let shot = dir.path().join("shot010");
    let mut report = SessionReport::new(&shot, FrameRange::new(5, 6));
    report.add_entry(entry("a.fbx", vec![]));

    let path = report.write().unwrap();
    assert_eq!(path, shot.join("5-6.log"));
    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.contains("Status     : SUCCESS"));
}
