//! Duplicate-and-constrain exports leave no temporary node or constraint
//! behind, and abort when no constraint could be created.

use animbatch_engine::pipeline::{export_blend_shape, export_camera, export_skeleton};
use animbatch_model::FbxExportOptions;
use animbatch_scene::fbx_ascii::model_names;
use animbatch_tests::fixtures::{add_shot_camera, footprint, hero_face_rig, hero_rig, HeroRig, Workspace};
use pretty_assertions::assert_eq;

fn referenced_rig() -> HeroRig {
    let mut rig = hero_rig();
    rig.scene.set_referenced_tree(rig.root);
    rig
}

fn anim_only() -> FbxExportOptions {
    FbxExportOptions::default().animation_only(true)
}

#[test]
fn test_duplicate_strategy_leaves_nothing_on_success() {
    let mut rig = referenced_rig();
    let before = footprint(&rig.scene);
    let names = rig.scene.node_names();
    let ws = Workspace::new();

    let result = export_skeleton(&mut rig.scene, "|hero:pelvis", &ws.file("A.fbx"), &anim_only(), &ws.ctx(1, 10));

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(model_names(&ws.read("A.fbx"), "LimbNode"), vec!["spine", "head", "Root"]);
    assert_eq!(footprint(&rig.scene), before);
    assert_eq!(rig.scene.node_names(), names);
}

#[test]
fn test_duplicate_strategy_leaves_nothing_on_failure_or_panic() {
    let ws = Workspace::new();
    for panic in [false, true] {
        let mut rig = referenced_rig();
        rig.scene.faults_mut().fail_export = !panic;
        rig.scene.faults_mut().panic_on_export = panic;
        let before = footprint(&rig.scene);

        let result = export_skeleton(&mut rig.scene, "|hero:pelvis", &ws.file("A.fbx"), &anim_only(), &ws.ctx(1, 10));

        assert!(!result.success);
        assert!(!result.errors.is_empty());
        assert_eq!(footprint(&rig.scene), before, "panic={}", panic);
    }
}

#[test]
fn test_zero_constraints_aborts_with_static_animation_error() {
    let mut rig = referenced_rig();
    rig.scene.faults_mut().fail_parent_constraint = true;
    rig.scene.faults_mut().fail_orient_constraint = true;
    let before = footprint(&rig.scene);
    let names = rig.scene.node_names();
    let ws = Workspace::new();

    let result = export_skeleton(&mut rig.scene, "|hero:pelvis", &ws.file("A.fbx"), &anim_only(), &ws.ctx(1, 10));

    assert!(!result.success);
    assert!(
        result.first_error().unwrap().contains("static"),
        "{:?}",
        result.errors
    );
    assert!(rig.scene.exports().is_empty());
    assert_eq!(footprint(&rig.scene), before);
    assert_eq!(rig.scene.constraint_count(), 0);
    assert_eq!(rig.scene.node_names(), names);
}

#[test]
fn test_zero_returned_constraints_also_abort() {
    let mut rig = referenced_rig();
    rig.scene.faults_mut().constraint_returns_zero = true;
    let before = footprint(&rig.scene);
    let ws = Workspace::new();

    let result = export_skeleton(&mut rig.scene, "|hero:pelvis", &ws.file("A.fbx"), &anim_only(), &ws.ctx(1, 10));

    assert!(!result.success);
    assert_eq!(footprint(&rig.scene), before);
}

#[test]
fn test_blend_shape_duplicate_is_removed() {
    let mut rig = hero_face_rig();
    let before = footprint(&rig.scene);
    let names = rig.scene.node_names();
    let ws = Workspace::new();

    for fail in [false, true] {
        rig.scene.faults_mut().fail_export = fail;
        let result = export_blend_shape(
            &mut rig.scene,
            "|hero:body",
            &ws.file("A_Face.fbx"),
            &FbxExportOptions::default(),
            &ws.ctx(1, 10),
        );
        assert_eq!(result.success, !fail, "{:?}", result.errors);
        assert_eq!(footprint(&rig.scene), before);
        assert_eq!(rig.scene.node_names(), names);
    }
}

#[test]
fn test_throwaway_camera_is_removed() {
    let mut rig = hero_rig();
    add_shot_camera(&mut rig.scene, "shotCam");
    let before = footprint(&rig.scene);
    let ws = Workspace::new();

    for panic in [false, true] {
        rig.scene.faults_mut().panic_on_export = panic;
        let result = export_camera(
            &mut rig.scene,
            "|shotCam",
            &ws.file("Cam_shot.fbx"),
            &FbxExportOptions::default(),
            &ws.ctx(1, 10),
        );
        assert_eq!(result.success, !panic);
        assert_eq!(footprint(&rig.scene), before);
    }
}
