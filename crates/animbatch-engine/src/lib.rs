//! Animbatch Export Engine
//!
//! This crate turns a list of [`ExportItem`]s into FBX files. It owns the
//! orchestration only: every scene query and mutation goes through the
//! [`SceneGraph`] trait, and every pipeline returns a structured
//! [`ExportResult`] instead of raising.
//!
//! # Overview
//!
//! A batch runs in three phases:
//!
//! | Phase | What happens |
//! |-------|--------------|
//! | Bake | blendshape weights of all selected items are baked in one call |
//! | Export | each item goes through the pipeline matching its kind |
//! | Log | the frame-range log and the session report are written |
//!
//! Pipelines mutate the scene to get clean bone names and baked cameras.
//! Each mutation is held by a guard from [`mutation`] that puts the scene
//! back when it goes out of scope, on success, error or panic alike.
//!
//! # Example
//!
//! ```
//! use animbatch_engine::{scan_scene, BatchRunner, ExportContext, NoopObserver};
//! use animbatch_model::{FbxExportOptions, FrameRange};
//! use animbatch_scene::{MemoryScene, NodeType};
//!
//! let mut scene = MemoryScene::new("Proj_SceneA01_Shot010.ma");
//! let root = scene.add_node("hero:root", NodeType::Joint, None);
//! scene.add_node("hero:spine", NodeType::Joint, Some(root));
//! scene.set_keys(root, "translateY", &[(1.0, 0.0), (10.0, 5.0)]);
//!
//! let mut report = scan_scene(&scene);
//! assert_eq!(report.skeletons, 1);
//!
//! let out = tempfile::tempdir().unwrap();
//! let ctx = ExportContext::new(out.path(), FrameRange::new(1, 10));
//! let runner = BatchRunner::new(ctx, FbxExportOptions::default());
//! let summary = runner
//!     .run(&mut scene, &mut report.items, &mut NoopObserver)
//!     .unwrap();
//! assert_eq!(summary.succeeded, 1);
//! ```
//!
//! # Crate Structure
//!
//! - [`scan_scene()`] - Finds exportable cameras, characters and blendshape groups
//! - [`BatchRunner`] - Runs the bake, export and log phases over a selection
//! - [`export_item()`] - Exports one item with the pipeline matching its kind
//! - [`bake`] - Bake planning and execution for blendshape weights
//! - [`mutation`] - Scoped rename, duplicate, namespace and timeline guards
//! - [`resolve`] - Re-finding nodes after renames
//! - [`validate`] - Content scanning of written FBX files
//! - [`audit`] - Key extents and the frame-range log
//! - [`timeunit`] - Frame rate to time unit mapping
//! - [`debug_log`] - Optional plain-text debug log

pub mod audit;
pub mod bake;
pub mod batch;
pub mod context;
pub mod debug_log;
pub mod error;
pub mod mutation;
pub mod pipeline;
pub mod resolve;
pub mod scan;
pub mod timeunit;
pub mod validate;

// Re-export commonly used types at the crate root
pub use animbatch_model::{ExportItem, ExportResult};
pub use animbatch_scene::SceneGraph;
pub use audit::{query_frame_range, FrameRangeInfo};
pub use bake::{execute_bake, plan_bake, BakePlan};
pub use batch::{BatchObserver, BatchPhase, BatchRunner, BatchSummary, NoopObserver};
pub use context::{CancelToken, ExportContext};
pub use debug_log::{DebugLog, LogLevel};
pub use error::{ExportError, PipelineResult};
pub use pipeline::{export_item, output_path_for};
pub use scan::{scan_scene, ScanReport};
pub use validate::FbxContentStats;
