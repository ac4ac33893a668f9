//! Per-session export context.
//!
//! Everything deep pipeline code needs besides the scene, the item and the
//! options travels in an [`ExportContext`]: the frame range, the output
//! directory, the optional debug log and the cancellation token.

use animbatch_model::FrameRange;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::debug_log::{DebugLog, LogLevel};

/// Shared cancellation flag.
///
/// Clones observe the same flag, so a UI or signal handler can hold one
/// while the batch runner checks another between items.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Items already running finish normally.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session settings passed explicitly into every pipeline call.
#[derive(Debug, Clone)]
pub struct ExportContext {
    /// Requested export range.
    pub range: FrameRange,
    /// Directory receiving the exported files and logs.
    pub output_dir: PathBuf,
    /// Debug log sink, when enabled.
    pub debug_log: Option<DebugLog>,
    /// Cancellation flag checked between items.
    pub cancel: CancelToken,
    /// Scene frame rate to use during the session.
    pub fps_override: Option<f64>,
    /// Take the export range from the first camera item's keys.
    pub timeline_camera_range: bool,
    /// Clamp the playback range to the export range during the session.
    pub clamp_playback: bool,
    /// Write the frame-range log after the batch.
    pub frame_range_log: bool,
}

impl ExportContext {
    pub fn new(output_dir: impl Into<PathBuf>, range: FrameRange) -> Self {
        Self {
            range,
            output_dir: output_dir.into(),
            debug_log: None,
            cancel: CancelToken::new(),
            fps_override: None,
            timeline_camera_range: false,
            clamp_playback: false,
            frame_range_log: true,
        }
    }

    pub fn with_debug_log(mut self, log: DebugLog) -> Self {
        self.debug_log = Some(log);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_fps_override(mut self, fps: Option<f64>) -> Self {
        self.fps_override = fps.filter(|f| *f > 0.0);
        self
    }

    pub fn with_timeline_camera_range(mut self, enabled: bool) -> Self {
        self.timeline_camera_range = enabled;
        self
    }

    pub fn with_playback_clamp(mut self, enabled: bool) -> Self {
        self.clamp_playback = enabled;
        self
    }

    pub fn with_frame_range_log(mut self, enabled: bool) -> Self {
        self.frame_range_log = enabled;
        self
    }

    /// Same context with a different range.
    pub fn with_range(&self, range: FrameRange) -> Self {
        let mut ctx = self.clone();
        ctx.range = range;
        ctx
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Diagnostic line: tracing at debug level, debug log at Info.
    pub fn note(&self, message: &str) {
        debug!(target: "animbatch::export", "{}", message);
        self.write_debug(LogLevel::Info, message);
    }

    pub fn info(&self, message: &str) {
        info!(target: "animbatch::export", "{}", message);
        self.write_debug(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        warn!(target: "animbatch::export", "{}", message);
        self.write_debug(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!(target: "animbatch::export", "{}", message);
        self.write_debug(LogLevel::Error, message);
    }

    fn write_debug(&self, level: LogLevel, message: &str) {
        if let Some(log) = &self.debug_log {
            if let Err(e) = log.write(level, message) {
                debug!(path = %log.path().display(), error = %e, "debug log write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_non_positive_fps_override_is_ignored() {
        let ctx = ExportContext::new("out", FrameRange::new(1, 10)).with_fps_override(Some(0.0));
        assert_eq!(ctx.fps_override, None);
        let ctx = ctx.with_fps_override(Some(25.0));
        assert_eq!(ctx.fps_override, Some(25.0));
    }

    #[test]
    fn test_messages_reach_debug_log() {
        let tmp = TempDir::new().unwrap();
        let log = DebugLog::new(tmp.path().join("debug.log"));
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(1, 10)).with_debug_log(log.clone());
        ctx.note("scan started");
        ctx.warn("constraint failed");

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert!(text.contains("[Info][AnimExporter] scan started"));
        assert!(text.contains("[Warn][AnimExporter] constraint failed"));
    }

    #[test]
    fn test_with_range_keeps_the_rest() {
        let token = CancelToken::new();
        let ctx = ExportContext::new("out", FrameRange::new(1, 10)).with_cancel_token(token.clone());
        let narrowed = ctx.with_range(FrameRange::new(5, 8));
        assert_eq!(narrowed.range, FrameRange::new(5, 8));
        token.cancel();
        assert!(narrowed.cancel.is_cancelled());
    }
}
