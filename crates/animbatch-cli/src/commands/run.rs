//! Run command implementation
//!
//! Scans a scene, names the items and batch-exports them into a directory.

use animbatch_engine::{
    scan_scene, BatchObserver, BatchPhase, BatchRunner, DebugLog, ExportContext, ExportItem,
    ExportResult,
};
use animbatch_model::{FbxExportOptions, FrameRange, ItemKind, ItemStatus};
use animbatch_scene::SceneGraph;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::load_scene;

/// Arguments of the run command.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub scene: String,
    pub out: String,
    pub start: Option<i32>,
    pub end: Option<i32>,
    pub options: Option<String>,
    pub debug_log: bool,
    pub fps: Option<f64>,
    pub only: Option<ItemKind>,
    pub camera_range: bool,
    pub clamp_playback: bool,
    pub no_frame_range_log: bool,
}

/// Prints item progress as the batch runs.
struct ConsoleObserver;

impl BatchObserver for ConsoleObserver {
    fn on_phase(&mut self, phase: BatchPhase) {
        let label = match phase {
            BatchPhase::Bake => "Baking blendshape weights",
            BatchPhase::Export => "Exporting",
            BatchPhase::Log => "Writing logs",
        };
        println!("{}", label.dimmed());
    }

    fn on_item_started(&mut self, position: usize, total: usize, item: &ExportItem) {
        println!(
            "[{}/{}] {} {} -> {}",
            position,
            total,
            item.kind.label().bold(),
            item.name,
            item.filename
        );
    }

    fn on_item_finished(&mut self, item: &ExportItem, result: Option<&ExportResult>) {
        let status = match item.status {
            ItemStatus::Done => "OK".green().bold(),
            ItemStatus::Cancelled => "CANCELLED".yellow().bold(),
            _ => "FAILED".red().bold(),
        };
        println!("      {} {}", status, item.message);
        if let Some(result) = result {
            for w in &result.warnings {
                println!("      {} {}", "warning:".yellow(), w);
            }
        }
    }
}

/// Run the batch export
///
/// # Returns
/// Exit code: 0 if every selected item exported, 1 if any failed
pub fn run(args: &RunArgs) -> Result<ExitCode> {
    let mut scene = load_scene(&args.scene)?;

    let opts = match &args.options {
        Some(path) => FbxExportOptions::from_file(Path::new(path))
            .with_context(|| format!("Failed to load options file: {}", path))?,
        None => FbxExportOptions::default(),
    };
    opts.validate()?;

    let range = resolve_range(&scene, args.start, args.end);
    if range.is_reversed() {
        bail!("Invalid frame range: end frame is before start frame.");
    }

    let out_dir = PathBuf::from(&args.out);
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let mut report = scan_scene(&scene);
    println!("{}", report.summary());
    if let Some(kind) = args.only {
        for item in &mut report.items {
            item.selected = item.kind == kind;
        }
    }

    let mut ctx = ExportContext::new(&out_dir, range)
        .with_fps_override(args.fps)
        .with_timeline_camera_range(args.camera_range)
        .with_playback_clamp(args.clamp_playback)
        .with_frame_range_log(!args.no_frame_range_log);
    if args.debug_log {
        let log = DebugLog::in_dir(&out_dir);
        println!("{} {}", "Debug log:".dimmed(), log.path().display());
        ctx = ctx.with_debug_log(log);
    }

    println!(
        "{} {} into {}",
        "Exporting range".cyan().bold(),
        range,
        out_dir.display()
    );
    let runner = BatchRunner::new(ctx, opts);
    let summary = runner.run(&mut scene, &mut report.items, &mut ConsoleObserver)?;

    if let Some(path) = &summary.report_path {
        println!("{} {}", "Report:".dimmed(), path.display());
    }
    if let Some(path) = &summary.frame_range_log {
        println!("{} {}", "Frame range log:".dimmed(), path.display());
    }
    let line = summary.line();
    if summary.has_failures() {
        println!("{}", line.red().bold());
        Ok(ExitCode::from(1))
    } else {
        println!("{}", line.green().bold());
        Ok(ExitCode::SUCCESS)
    }
}

/// Explicit start and end win; missing ends come from the playback range.
fn resolve_range(scene: &dyn SceneGraph, start: Option<i32>, end: Option<i32>) -> FrameRange {
    let (play_start, play_end) = scene.playback_range();
    FrameRange::new(
        start.unwrap_or(play_start.round() as i32),
        end.unwrap_or(play_end.round() as i32),
    )
}
