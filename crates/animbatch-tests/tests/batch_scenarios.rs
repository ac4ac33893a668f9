//! Scan plus batch runs over whole shots.

use animbatch_engine::{
    scan_scene, BatchObserver, BatchRunner, CancelToken, ExportItem, ExportResult, NoopObserver,
};
use animbatch_model::{FbxExportOptions, ItemKind, ItemStatus};
use animbatch_scene::{MemoryScene, SceneGraph};
use animbatch_tests::fixtures::{shot_scene, Workspace, HERO_SCENE_JSON};
use pretty_assertions::assert_eq;
use std::fs;

const CAMERA_FILE: &str = "Cam_Proj_SceneA01_Shot010.fbx";
const HERO_FILE: &str = "A_Proj_hero_SceneA01_Shot010.fbx";
const FACE_FILE: &str = "A_Proj_hero_SceneA01_Shot010_Face.fbx";

#[test]
fn test_shot_batch_end_to_end() {
    let mut scene = shot_scene();
    let names = scene.node_names();
    let mut report = scan_scene(&scene);
    let ws = Workspace::new();
    let runner = BatchRunner::new(ws.ctx(1, 24), FbxExportOptions::default());

    let summary = runner
        .run(&mut scene, &mut report.items, &mut NoopObserver)
        .unwrap();

    assert_eq!(
        summary.line(),
        "Export complete: 3 succeeded, 1 failed out of 4 selected."
    );
    for file in [CAMERA_FILE, HERO_FILE, FACE_FILE] {
        assert!(ws.file(file).exists(), "{}", file);
    }
    let prop = report
        .items
        .iter()
        .find(|i| i.node == "|prop_grp|Root")
        .unwrap();
    assert_eq!(prop.status, ItemStatus::Error);
    assert_eq!(
        prop.message,
        "AnimationOnly=false but exported FBX contains no skin/deformer data"
    );
    assert!(report
        .items
        .iter()
        .filter(|i| i.node != "|prop_grp|Root")
        .all(|i| i.status == ItemStatus::Done && i.message.starts_with("OK (")));
    assert_eq!(scene.node_names(), names);

    let log = fs::read_to_string(ws.file("1-24.log")).unwrap();
    assert!(log.contains("Files      : 4 (ok: 3, fail: 1)"));
    assert!(log.contains("Status     : FAILED"));
    assert!(log.trim_end().ends_with(&"=".repeat(70)));
    assert!(log.contains("END OF LOG"));

    let ranges = fs::read_to_string(ws.file("Export range 1 - 24.txt")).unwrap();
    assert!(ranges.starts_with('\u{feff}'));
    assert!(ranges.contains("Total: 3 item(s)"));
    assert!(ranges.contains(&format!("| shotCam | File: {}", CAMERA_FILE)));
}

#[test]
fn test_animation_only_batch_exports_every_item() {
    let mut scene = shot_scene();
    let mut report = scan_scene(&scene);
    let ws = Workspace::new();
    let opts = FbxExportOptions::default().animation_only(true);
    let runner = BatchRunner::new(ws.ctx(1, 24), opts);

    let summary = runner
        .run(&mut scene, &mut report.items, &mut NoopObserver)
        .unwrap();

    assert_eq!(summary.succeeded, 4, "{:?}", report.items);
    assert!(!summary.has_failures());
    let combo = summary
        .results
        .iter()
        .find(|(i, _)| report.items[*i].kind == ItemKind::SkeletonBlendShape)
        .map(|(_, r)| r)
        .unwrap();
    assert!(combo.warnings.iter().any(|w| w.starts_with("Skeleton AnimationOnly(UI)=true is ignored")));
}

struct CancelAfterFirst {
    token: CancelToken,
    finished: Vec<String>,
}

impl BatchObserver for CancelAfterFirst {
    fn on_item_finished(&mut self, item: &ExportItem, _result: Option<&ExportResult>) {
        self.finished.push(item.name.clone());
        self.token.cancel();
    }
}

#[test]
fn test_cancellation_stops_at_the_item_boundary() {
    let mut scene = shot_scene();
    let names = scene.node_names();
    let mut report = scan_scene(&scene);
    let ws = Workspace::new();
    let token = CancelToken::new();
    let ctx = ws.ctx(1, 24).with_cancel_token(token.clone());
    let runner = BatchRunner::new(ctx, FbxExportOptions::default());
    let mut observer = CancelAfterFirst {
        token,
        finished: Vec::new(),
    };

    let summary = runner.run(&mut scene, &mut report.items, &mut observer).unwrap();

    assert_eq!(
        summary.line(),
        "Export complete: 1 succeeded, 0 failed, 3 cancelled out of 4 selected."
    );
    assert_eq!(observer.finished, vec!["shotCam"]);
    assert!(ws.file(CAMERA_FILE).exists());
    assert!(!ws.file(HERO_FILE).exists());
    assert_eq!(
        report
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Cancelled && i.message == "Cancelled by user")
            .count(),
        3
    );
    assert_eq!(scene.node_names(), names);
}

#[test]
fn test_cancel_before_start_exports_nothing() {
    let mut scene = shot_scene();
    let mut report = scan_scene(&scene);
    let ws = Workspace::new();
    let token = CancelToken::new();
    token.cancel();
    let runner = BatchRunner::new(
        ws.ctx(1, 24).with_cancel_token(token),
        FbxExportOptions::default(),
    );

    let summary = runner
        .run(&mut scene, &mut report.items, &mut NoopObserver)
        .unwrap();

    assert_eq!(summary.cancelled, 4);
    assert!(scene.exports().is_empty());
    assert_eq!(summary.frame_range_log, None);
}

#[test]
fn test_fps_override_is_undone() {
    let mut scene = shot_scene();
    let mut report = scan_scene(&scene);
    for item in &mut report.items {
        item.selected = item.kind == ItemKind::Camera;
    }
    let ws = Workspace::new();
    let runner = BatchRunner::new(
        ws.ctx(1, 24).with_fps_override(Some(30.0)),
        FbxExportOptions::default(),
    );

    let summary = runner
        .run(&mut scene, &mut report.items, &mut NoopObserver)
        .unwrap();

    assert_eq!(summary.selected, 1);
    assert_eq!(summary.fps, 30.0);
    assert_eq!(scene.time_unit(), "film");
    assert!(report
        .items
        .iter()
        .filter(|i| i.kind != ItemKind::Camera)
        .all(|i| i.status == ItemStatus::Pending));
    let ranges = fs::read_to_string(ws.file("Export range 1 - 24.txt")).unwrap();
    assert!(ranges.contains("FPS: 30"));
}

#[test]
fn test_referenced_character_from_json_scene() {
    let mut scene = MemoryScene::from_json(HERO_SCENE_JSON).unwrap();
    let names = scene.node_names();
    let mut report = scan_scene(&scene);
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].kind, ItemKind::Skeleton);
    assert_eq!(report.items[0].filename, "A_Proj_villain_SceneB02_Shot020.fbx");

    let ws = Workspace::new();
    let (start, end) = scene.playback_range();
    let runner = BatchRunner::new(
        ws.ctx(start as i32, end as i32),
        FbxExportOptions::default(),
    );
    let summary = runner
        .run(&mut scene, &mut report.items, &mut NoopObserver)
        .unwrap();

    assert_eq!(summary.succeeded, 1, "{:?}", report.items[0].message);
    assert!(ws.file("A_Proj_villain_SceneB02_Shot020.fbx").exists());
    assert!(ws.file("1-12.log").exists());
    assert_eq!(scene.node_names(), names);
}
