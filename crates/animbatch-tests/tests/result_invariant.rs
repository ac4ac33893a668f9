//! Every result agrees with itself: failures carry errors, successes
//! carry none.

use animbatch_engine::{export_item, ExportContext};
use animbatch_model::{ExportItem, ExportResult, FbxExportOptions, ItemKind};
use animbatch_scene::MemoryScene;
use animbatch_tests::fixtures::{add_shot_camera, hero_face_rig, Workspace};

fn assert_consistent(result: &ExportResult, label: &str) {
    assert_eq!(
        result.success,
        result.errors.is_empty(),
        "{}: success={} errors={:?}",
        label,
        result.success,
        result.errors
    );
    if !result.success {
        assert!(!result.first_error().unwrap_or_default().is_empty(), "{}", label);
        assert_eq!(result.status_message(), result.errors[0], "{}", label);
    }
}

fn scene() -> MemoryScene {
    let mut rig = hero_face_rig();
    add_shot_camera(&mut rig.scene, "shotCam");
    rig.scene
}

fn items() -> Vec<ExportItem> {
    let mut combo = ExportItem::new(ItemKind::SkeletonBlendShape, "|hero:pelvis", "hero (+BS)");
    combo.bs_meshes = vec!["|hero:body".to_string()];
    combo.bs_weight_attrs = vec!["hero:faceBS.Smile".to_string()];
    vec![
        ExportItem::new(ItemKind::Camera, "|shotCam", "shotCam"),
        ExportItem::new(ItemKind::Skeleton, "|hero:pelvis", "hero"),
        ExportItem::new(ItemKind::BlendShape, "|hero:body", "hero (body)"),
        combo,
        ExportItem::new(ItemKind::Camera, "|ghostCam", "ghost"),
        ExportItem::new(ItemKind::Skeleton, "|ghost:root", "ghost"),
        ExportItem::new(ItemKind::BlendShape, "|shotCam", "not a mesh"),
    ]
}

const FAULTS: [&str; 7] = [
    "none",
    "exporter missing",
    "export fails",
    "export panics",
    "duplicate fails",
    "undo fails",
    "constraints fail",
];

fn arm(scene: &mut MemoryScene, fault: &str) {
    let faults = scene.faults_mut();
    match fault {
        "exporter missing" => faults.exporter_missing = true,
        "export fails" => faults.fail_export = true,
        "export panics" => faults.panic_on_export = true,
        "duplicate fails" => faults.fail_duplicate = true,
        "undo fails" => faults.fail_undo = true,
        "constraints fail" => {
            faults.fail_parent_constraint = true;
            faults.fail_orient_constraint = true;
        }
        _ => {}
    }
}

#[test]
fn test_every_pipeline_under_every_fault() {
    let ws = Workspace::new();
    let ctx: ExportContext = ws.ctx(1, 10);
    let mut seen_success = 0;
    let mut seen_failure = 0;

    for fault in FAULTS {
        for (i, item) in items().iter().enumerate() {
            let mut scene = scene();
            arm(&mut scene, fault);
            let out = ws.file(&format!("item_{}.fbx", i));
            let result = export_item(&mut scene, item, &out, &FbxExportOptions::default(), &ctx);
            assert_consistent(&result, &format!("{} / {} {}", fault, item.kind, item.node));
            if result.success {
                seen_success += 1;
            } else {
                seen_failure += 1;
            }
        }
    }
    assert!(seen_success > 0);
    assert!(seen_failure > 0);
}

#[test]
fn test_missing_exporter_fails_before_touching_the_scene() {
    let ws = Workspace::new();
    for item in items() {
        let mut scene = scene();
        scene.faults_mut().exporter_missing = true;
        let before = scene.node_names();
        let result = export_item(
            &mut scene,
            &item,
            &ws.file("x.fbx"),
            &FbxExportOptions::default(),
            &ws.ctx(1, 10),
        );
        assert!(!result.success);
        assert_eq!(result.first_error(), Some("FBX exporter plugin load failed"));
        assert_eq!(scene.node_names(), before);
    }
}

#[test]
fn test_failure_helper_always_records_the_reason() {
    let result = ExportResult::failure("out.fbx", vec!["careful".to_string()], "boom");
    assert_consistent(&result, "failure helper");
    assert_eq!(result.warnings, vec!["careful"]);
}
