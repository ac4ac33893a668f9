//! Batch export of a scanned item list.
//!
//! A run goes through three phases:
//!
//! 1. **Bake**: blendshape weights of the whole batch are baked in one call.
//!    Items whose source is missing are failed here.
//! 2. **Export**: items run one after another. Cancellation is checked
//!    before each item; an item that already started always finishes.
//! 3. **Log**: the frame-range log and the session report are written.
//!
//! Timeline changes made for the session (frame rate, playback range) are
//! held by a [`TimelineGuard`] and undone when the run ends, however it ends.

use animbatch_model::{
    ExportItem, ExportResult, FbxExportOptions, FrameRange, ItemKind, ItemStatus, LogEntry,
    SessionReport,
};
use animbatch_scene::SceneGraph;
use serde::Serialize;
use std::path::PathBuf;

use crate::audit::{query_frame_range, start_frame_range_log, write_frame_range_log, FrameRangeInfo};
use crate::bake::{execute_bake, plan_bake};
use crate::context::ExportContext;
use crate::error::{ExportError, PipelineResult};
use crate::mutation::TimelineGuard;
use crate::pipeline::{export_item, output_path_for};
use crate::timeunit::scene_fps;

/// Phase a batch run is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchPhase {
    Bake,
    Export,
    Log,
}

/// Progress callbacks of a batch run.
///
/// Every method has an empty default. [`BatchObserver::pump`] is called
/// between heavy steps so a host UI can process its events and set the
/// cancellation token.
pub trait BatchObserver {
    fn on_phase(&mut self, _phase: BatchPhase) {}

    /// An item is about to export. `position` counts from 1.
    fn on_item_started(&mut self, _position: usize, _total: usize, _item: &ExportItem) {}

    /// An item reached a final status. `result` is `None` for items failed
    /// during baking.
    fn on_item_finished(&mut self, _item: &ExportItem, _result: Option<&ExportResult>) {}

    fn pump(&mut self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Range the batch exported, after any camera override.
    pub range: FrameRange,
    pub fps: f64,
    /// Results of the items that ran, paired with their item index.
    pub results: Vec<(usize, ExportResult)>,
    /// Key extents of the exported items.
    pub frame_ranges: Vec<FrameRangeInfo>,
    pub report_path: Option<PathBuf>,
    pub frame_range_log: Option<PathBuf>,
}

impl BatchSummary {
    /// `Export complete: X succeeded, Y failed[, Z cancelled] out of N selected.`
    pub fn line(&self) -> String {
        let mut line = format!(
            "Export complete: {} succeeded, {} failed",
            self.succeeded, self.failed
        );
        if self.cancelled > 0 {
            line.push_str(&format!(", {} cancelled", self.cancelled));
        }
        line.push_str(&format!(" out of {} selected.", self.selected));
        line
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Message shown on an item that failed during baking.
fn bake_failure_message(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Camera => "Camera node missing",
        ItemKind::Skeleton | ItemKind::SkeletonBlendShape => "Skeleton root missing",
        ItemKind::BlendShape => "Node missing or no blendShape found",
    }
}

/// Runs export batches with one context and option set.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    ctx: ExportContext,
    opts: FbxExportOptions,
}

impl BatchRunner {
    pub fn new(ctx: ExportContext, opts: FbxExportOptions) -> Self {
        Self { ctx, opts }
    }

    pub fn context(&self) -> &ExportContext {
        &self.ctx
    }

    pub fn options(&self) -> &FbxExportOptions {
        &self.opts
    }

    /// Exports every selected item and updates its status and message.
    ///
    /// Errors are returned only when nothing could start: a reversed range,
    /// an empty selection or a missing exporter. Item failures are reported
    /// through the items and the summary.
    pub fn run(
        &self,
        scene: &mut dyn SceneGraph,
        items: &mut [ExportItem],
        observer: &mut dyn BatchObserver,
    ) -> PipelineResult<BatchSummary> {
        let ctx = &self.ctx;
        let mut range = ctx.range;
        if range.is_reversed() {
            return Err(ExportError::precondition(
                "Invalid frame range: end frame is before start frame.",
            ));
        }

        let selected: Vec<usize> = (0..items.len()).filter(|i| items[*i].selected).collect();
        ctx.info(&format!(
            "export start: selectedItems={}, requestedRange={}",
            selected.len(),
            range
        ));

        if ctx.timeline_camera_range {
            if let Some(&cam) = selected.iter().find(|i| items[**i].kind == ItemKind::Camera) {
                let info = query_frame_range(&*scene, &items[cam], None);
                if info.valid {
                    range = FrameRange::new(info.first_key as i32, info.last_key as i32);
                    ctx.info(&format!(
                        "export range taken from camera '{}': {}",
                        items[cam].node, range
                    ));
                }
            }
        }

        if selected.is_empty() {
            return Err(ExportError::precondition("No items selected for export."));
        }
        if !scene.ensure_exporter() {
            return Err(ExportError::precondition(
                "Failed to load the FBX plugin (fbxmaya). Export aborted.",
            ));
        }
        for (n, idx) in selected.iter().enumerate() {
            let item = &items[*idx];
            ctx.note(&format!(
                "export item[{}]: type={}, node='{}', filename='{}'",
                n + 1,
                item.kind,
                item.node,
                item.filename
            ));
        }

        let session = ctx.with_range(range);
        let mut report = SessionReport::new(ctx.output_dir(), range);
        let mut timeline = TimelineGuard::new(&mut *scene);

        let mut fps = scene_fps(&*timeline);
        if let Some(target) = ctx.fps_override {
            match timeline.set_fps(target) {
                Ok(previous) => {
                    ctx.info(&format!(
                        "FPS override: scene={} ({}) -> export={}",
                        fps, previous, target
                    ));
                    fps = target;
                }
                Err(e) => {
                    let msg = format!("FPS override to {} failed: {}", target, e);
                    ctx.warn(&msg);
                    report.add_warning(msg);
                }
            }
        }
        if ctx.clamp_playback {
            timeline.clamp_playback(range);
            ctx.note(&format!("playback range clamped to {}", range));
        }
        ctx.note(&format!("fbx options: {:?}", self.opts));

        let mut range_log = None;
        if ctx.frame_range_log {
            match start_frame_range_log(ctx.output_dir(), range) {
                Ok(path) => {
                    ctx.info(&format!("Export log created: {}", path.display()));
                    range_log = Some(path);
                }
                Err(e) => ctx.warn(&format!("Export log could not be created: {}", e)),
            }
        }

        for idx in &selected {
            items[*idx].reset();
        }

        // Phase 1
        observer.on_phase(BatchPhase::Bake);
        observer.pump();
        let mut batch: Vec<ExportItem> = selected.iter().map(|i| items[*i].clone()).collect();
        if !self.opts.skel_blend_shape {
            for item in &mut batch {
                item.bs_weight_attrs.clear();
            }
        }
        let plan = plan_bake(&*timeline, &batch);
        if let Err(e) = execute_bake(&mut *timeline, &plan, range) {
            let msg = format!("Blendshape weight bake failed: {}", e);
            ctx.warn(&msg);
            report.add_warning(msg);
        }
        for (pos, reason) in &plan.failed {
            let item = &mut items[selected[*pos]];
            ctx.warn(reason);
            item.set_status(ItemStatus::Error, bake_failure_message(item.kind));
        }

        // Phase 2
        observer.on_phase(BatchPhase::Export);
        observer.pump();
        let total = selected.len();
        let mut summary = BatchSummary {
            selected: total,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            range,
            fps,
            results: Vec::new(),
            frame_ranges: Vec::new(),
            report_path: None,
            frame_range_log: None,
        };

        for (pos, &idx) in selected.iter().enumerate() {
            if session.cancel.is_cancelled() {
                for &rest in &selected[pos..] {
                    let item = &mut items[rest];
                    if matches!(item.status, ItemStatus::Pending | ItemStatus::Exporting) {
                        item.set_status(ItemStatus::Cancelled, "Cancelled by user");
                        summary.cancelled += 1;
                    }
                }
                ctx.info("export cancelled by user");
                break;
            }

            if plan.failure_for(pos).is_some() {
                summary.failed += 1;
                let item = &items[idx];
                report.add_entry(LogEntry {
                    file_path: output_path_for(&session, item).display().to_string(),
                    file_type: item.kind.as_str().to_string(),
                    character_name: item.name.clone(),
                    file_size: 0,
                    duration_secs: 0.0,
                    warnings: Vec::new(),
                    errors: vec![item.message.clone()],
                });
                observer.on_item_finished(item, None);
                observer.pump();
                continue;
            }

            items[idx].set_status(ItemStatus::Exporting, "");
            observer.on_item_started(pos + 1, total, &items[idx]);
            observer.pump();

            let output = output_path_for(&session, &items[idx]);
            let result = export_item(&mut *timeline, &batch[pos], &output, &self.opts, &session);

            let item = &mut items[idx];
            if result.success {
                item.set_status(ItemStatus::Done, result.status_message());
                summary.succeeded += 1;
                let info = query_frame_range(&*timeline, item, Some(range));
                if info.valid {
                    session.note(&format!(
                        "frame range audit: {} keys {}-{}",
                        item.name, info.first_key, info.last_key
                    ));
                } else {
                    session.note(&format!("frame range audit: {} has no keyed range", item.name));
                }
                summary.frame_ranges.push(info);
            } else {
                item.set_status(ItemStatus::Error, result.status_message());
                summary.failed += 1;
            }
            report.add_entry(LogEntry::from_result(item.kind.as_str(), &item.name, &result));
            observer.on_item_finished(item, Some(&result));
            observer.pump();
            summary.results.push((idx, result));
        }

        // Phase 3
        observer.on_phase(BatchPhase::Log);
        observer.pump();
        if range_log.is_some() && summary.succeeded > 0 {
            match write_frame_range_log(ctx.output_dir(), &summary.frame_ranges, range, fps) {
                Ok(path) => {
                    ctx.info(&format!("FrameRangeLog written to: {}", path.display()));
                    summary.frame_range_log = Some(path);
                }
                Err(e) => ctx.warn(&format!("FrameRangeLog write failed: {}", e)),
            }
        }

        for w in timeline.restore() {
            ctx.warn(&w);
            report.add_warning(w);
        }
        drop(timeline);

        match report.write() {
            Ok(path) => summary.report_path = Some(path),
            Err(e) => ctx.warn(&format!("Session report write failed: {}", e)),
        }
        ctx.info(&summary.line());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelToken;
    use animbatch_scene::{MemoryScene, NodeType};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn scene() -> MemoryScene {
        let mut scene = MemoryScene::new("Proj_SceneA01_Shot010.ma");
        let cam = scene.add_camera("shotCam", None);
        scene.set_keys(cam, "translateX", &[(5.0, 0.0), (15.0, 10.0)]);
        let root = scene.add_node("Root", NodeType::Joint, None);
        scene.set_keys(root, "rotateY", &[(1.0, 0.0), (20.0, 90.0)]);
        let body = scene.add_mesh("body", None);
        scene.add_skin_cluster("skinCluster1", &[body], &[root]);
        let head = scene.add_mesh("head", None);
        scene.add_blend_shape("faceBS", &[head], &[Some("Smile")]);
        scene
    }

    fn items() -> Vec<ExportItem> {
        vec![
            ExportItem::new(ItemKind::Camera, "|shotCam", "shotCam").with_filename("Cam_A.fbx"),
            ExportItem::new(ItemKind::Skeleton, "|Root", "Root").with_filename("A_Root.fbx"),
            ExportItem::new(ItemKind::BlendShape, "|head", "head").with_filename("A_Face.fbx"),
        ]
    }

    #[derive(Default)]
    struct Recorder {
        phases: Vec<BatchPhase>,
        started: Vec<String>,
        pumps: usize,
        cancel_after_first: Option<CancelToken>,
    }

    impl BatchObserver for Recorder {
        fn on_phase(&mut self, phase: BatchPhase) {
            self.phases.push(phase);
        }

        fn on_item_started(&mut self, _position: usize, _total: usize, item: &ExportItem) {
            self.started.push(item.name.clone());
        }

        fn on_item_finished(&mut self, _item: &ExportItem, _result: Option<&ExportResult>) {
            if let Some(token) = &self.cancel_after_first {
                token.cancel();
            }
        }

        fn pump(&mut self) {
            self.pumps += 1;
        }
    }

    #[test]
    fn test_full_batch_exports_and_logs() {
        let tmp = TempDir::new().unwrap();
        let mut scene = scene();
        let mut items = items();
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(1, 20)).with_frame_range_log(true);
        let runner = BatchRunner::new(ctx, FbxExportOptions::default());
        let mut recorder = Recorder::default();

        let summary = runner.run(&mut scene, &mut items, &mut recorder).unwrap();
        assert_eq!(
            summary.line(),
            "Export complete: 3 succeeded, 0 failed out of 3 selected."
        );
        assert!(items.iter().all(|i| i.status == ItemStatus::Done));
        assert!(items.iter().all(|i| i.message.starts_with("OK")));
        assert_eq!(recorder.phases, vec![BatchPhase::Bake, BatchPhase::Export, BatchPhase::Log]);
        assert_eq!(recorder.started, vec!["shotCam", "Root", "head"]);
        assert!(recorder.pumps >= 6);
        assert!(tmp.path().join("A_Root.fbx").exists());
        assert_eq!(summary.report_path, Some(tmp.path().join("1-20.log")));
        assert_eq!(
            summary.frame_range_log,
            Some(tmp.path().join("Export range 1 - 20.txt"))
        );
        assert_eq!(summary.frame_ranges.len(), 3);
    }

    #[test]
    fn test_cancel_between_items() {
        let tmp = TempDir::new().unwrap();
        let mut scene = scene();
        let mut items = items();
        let token = CancelToken::new();
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(1, 20)).with_cancel_token(token.clone());
        let runner = BatchRunner::new(ctx, FbxExportOptions::default());
        let mut recorder = Recorder {
            cancel_after_first: Some(token),
            ..Default::default()
        };

        let summary = runner.run(&mut scene, &mut items, &mut recorder).unwrap();
        assert_eq!(
            summary.line(),
            "Export complete: 1 succeeded, 0 failed, 2 cancelled out of 3 selected."
        );
        assert_eq!(items[1].status, ItemStatus::Cancelled);
        assert_eq!(items[2].message, "Cancelled by user");
        assert_eq!(recorder.started, vec!["shotCam"]);
    }

    #[test]
    fn test_bake_failures_skip_export() {
        let tmp = TempDir::new().unwrap();
        let mut scene = scene();
        let mut items = vec![
            ExportItem::new(ItemKind::BlendShape, "|body", "body").with_filename("A_Body.fbx"),
            ExportItem::new(ItemKind::Camera, "|gone", "gone").with_filename("Cam_B.fbx"),
        ];
        let runner = BatchRunner::new(
            ExportContext::new(tmp.path(), FrameRange::new(1, 20)),
            FbxExportOptions::default(),
        );

        let summary = runner.run(&mut scene, &mut items, &mut NoopObserver).unwrap();
        assert_eq!(summary.failed, 2);
        assert!(summary.results.is_empty());
        assert_eq!(items[0].message, "Node missing or no blendShape found");
        assert_eq!(items[1].message, "Camera node missing");
        assert!(scene.exports().is_empty());
        assert_eq!(summary.frame_range_log, None);
    }

    #[test]
    fn test_timeline_restored_after_fps_override_and_clamp() {
        let tmp = TempDir::new().unwrap();
        let mut scene = scene();
        let unit = scene.time_unit();
        let playback = scene.playback_range();
        let mut items = items();
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(1, 20))
            .with_fps_override(Some(30.0))
            .with_playback_clamp(true);
        let runner = BatchRunner::new(ctx, FbxExportOptions::default());

        let summary = runner.run(&mut scene, &mut items, &mut NoopObserver).unwrap();
        assert_eq!(summary.fps, 30.0);
        assert_eq!(scene.time_unit(), unit);
        assert_eq!(scene.playback_range(), playback);
    }

    #[test]
    fn test_camera_range_override() {
        let tmp = TempDir::new().unwrap();
        let mut scene = scene();
        let mut items = items();
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(1, 100)).with_timeline_camera_range(true);
        let runner = BatchRunner::new(ctx, FbxExportOptions::default());

        let summary = runner.run(&mut scene, &mut items, &mut NoopObserver).unwrap();
        assert_eq!(summary.range, FrameRange::new(5, 15));
        let settings = &scene.last_export().unwrap().settings;
        assert_eq!((settings.bake_start, settings.bake_end), (5, 15));
    }

    #[test]
    fn test_precondition_errors() {
        let tmp = TempDir::new().unwrap();
        let mut scene = scene();
        let mut items = items();

        let reversed = BatchRunner::new(
            ExportContext::new(tmp.path(), FrameRange::new(20, 1)),
            FbxExportOptions::default(),
        );
        let err = reversed.run(&mut scene, &mut items, &mut NoopObserver).unwrap_err();
        assert_eq!(err.to_string(), "Invalid frame range: end frame is before start frame.");

        for item in &mut items {
            item.selected = false;
        }
        let runner = BatchRunner::new(
            ExportContext::new(tmp.path(), FrameRange::new(1, 20)),
            FbxExportOptions::default(),
        );
        let err = runner.run(&mut scene, &mut items, &mut NoopObserver).unwrap_err();
        assert_eq!(err.to_string(), "No items selected for export.");
    }
}
