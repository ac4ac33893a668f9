//! Skeleton and blendshape meshes in one file.
//!
//! Joints and the mesh transforms that carry the morph targets are renamed
//! in place under one [`RenameSession`], exported together, then restored.
//! Unlike the blendshape-only export nothing is duplicated and no namespace
//! is merged. After export the bone names in the file are checked for
//! leftover namespace separators.

use animbatch_model::{ExportResult, FbxExportOptions};
use animbatch_scene::{NodeId, SceneGraph};
use std::path::Path;

use super::blendshape::SHAPES_DISABLED_WARNING;
use super::{
    base_settings, check_exporter, ensure_output_dir, joint_set, mesh_transform_of,
    namespaced_leaf_count, plan_renames, require_node, resolve_joint_root, run_guarded,
    skinned_meshes, ExportRun, SKELETON_DEFS_WARNING,
};
use crate::context::ExportContext;
use crate::error::ExportError;
use crate::mutation::RenameSession;
use crate::validate::{file_size, scan_namespaced_bones, FbxContentStats};

/// Exports the skeleton under `root_path` with its skinned meshes and the
/// blendshape meshes listed in `bs_meshes`.
pub fn export_skeleton_blend_shape(
    scene: &mut dyn SceneGraph,
    root_path: &str,
    bs_meshes: &[String],
    bs_weight_attrs: &[String],
    output: &Path,
    opts: &FbxExportOptions,
    ctx: &ExportContext,
) -> ExportResult {
    run_guarded(
        ctx,
        "skeleton+blendshape",
        output,
        "Skeleton+BlendShape export failed: unknown exception",
        |run| {
            check_exporter(scene)?;
            let input = require_node(scene, root_path, "Skeleton root")?;
            ensure_output_dir(output)?;
            let root = resolve_joint_root(scene, input, run)?;
            let range = ctx.range.normalized();

            let joints = joint_set(scene, root);
            let meshes = collect_meshes(scene, &joints, bs_meshes, run);
            let keyed = keyed_weight_count(scene, bs_weight_attrs);
            if keyed == 0 {
                run.warn("No BS weight attributes have keyframes after bake");
            }

            let joint_sources: Vec<(NodeId, String)> = joints
                .iter()
                .filter_map(|id| scene.path_of(*id).ok().map(|p| (*id, p)))
                .collect();
            let mesh_sources: Vec<(NodeId, String)> = meshes
                .iter()
                .filter_map(|id| scene.path_of(*id).ok().map(|p| (*id, p)))
                .collect();
            let joint_plan = plan_renames(scene, &joint_sources, Some(root));
            let had_namespace = joint_plan.iter().any(|w| w.had_namespace);

            let mut renames = RenameSession::new(&mut *scene);
            let mut joint_failures = 0;
            for work in &joint_plan {
                if let Err(e) = renames.rename(work.id, &work.target()) {
                    run.note(format!("joint rename to {} failed: {}", work.target(), e));
                    joint_failures += 1;
                }
            }
            if joint_failures > 0 {
                run.warn(format!(
                    "Failed to rename {} joint(s); exported bone names may contain namespace prefixes",
                    joint_failures
                ));
            }
            let residue = namespaced_leaf_count(&*renames, &joints);
            if residue > 0 {
                run.warn(format!(
                    "{} joint(s) still have namespace prefixes after rename",
                    residue
                ));
            }

            let mesh_plan = plan_renames(&*renames, &mesh_sources, None);
            for work in &mesh_plan {
                if let Err(e) = renames.rename(work.id, &work.target()) {
                    run.note(format!("mesh rename to {} failed: {}", work.target(), e));
                }
            }

            if had_namespace {
                run.warn("Detected namespaces in skeleton joints; stripped during export");
            }
            if opts.skel_animation_only {
                run.warn("Skeleton AnimationOnly(UI)=true is ignored for Skeleton+BlendShape export (mesh/skin required)");
            }
            if !opts.bs_shapes {
                run.warn(SHAPES_DISABLED_WARNING);
            }
            if !opts.skel_skeleton_defs {
                run.warn(SKELETON_DEFS_WARNING);
            }

            let mut settings = base_settings(opts, range);
            settings.shapes = opts.bs_shapes;
            settings.skins = true;
            settings.animation_only = false;
            settings.bake_complex = opts.skel_bake_complex;
            settings.skeleton_definitions = opts.skel_skeleton_defs;
            settings.constraints = opts.skel_constraints;
            settings.input_connections = opts.skel_input_conns;
            settings.smooth_mesh = opts.bs_smooth_mesh;

            let mut selection = joints.clone();
            selection.extend(meshes.iter().copied());
            renames.select(&selection);

            let exported = renames.export_selection(output, &settings);
            let stats = FbxContentStats::scan_file(output);
            let namespaced_bones = scan_namespaced_bones(output).unwrap_or(0);
            let restore = renames.restore();
            drop(renames);
            run.extend_warnings(restore);
            exported.map_err(|e| {
                run.note(format!("export call failed: {}", e));
                ExportError::mutation("FBXExport command failed for skeleton+blendshape export")
            })?;
            run.note(format!(
                "combined export: joints={}, meshes={}, keyedWeights={}/{}, {}",
                joints.len(),
                meshes.len(),
                keyed,
                bs_weight_attrs.len(),
                stats.summary()
            ));

            if file_size(output) == 0 {
                return Err(ExportError::validation(
                    "Skeleton+BlendShape export produced empty file",
                ));
            }
            if stats.limb_nodes == 0 {
                run.warn("Exported FBX contains no LimbNode bones");
            }
            if stats.blend_shapes == 0 {
                run.warn("Exported FBX contains no BlendShape/Shape data; UE may not import MorphTargets from this file");
            }
            if namespaced_bones > 0 {
                run.warn(format!(
                    "FBX file contains {} LimbNode bone name(s) with ':'; namespace residue detected, UE may see unexpected bone names",
                    namespaced_bones
                ));
            }
            Ok(())
        },
    )
}

/// Skinned meshes of `joints` plus every listed blendshape mesh that
/// exists, in that order.
fn collect_meshes(
    scene: &dyn SceneGraph,
    joints: &[NodeId],
    bs_meshes: &[String],
    run: &mut ExportRun<'_>,
) -> Vec<NodeId> {
    let mut meshes = skinned_meshes(scene, joints).0;
    for path in bs_meshes {
        let transform = scene
            .lookup(path)
            .map(|id| mesh_transform_of(scene, id).unwrap_or(id));
        match transform {
            Some(id) if meshes.contains(&id) => {}
            Some(id) => {
                meshes.push(id);
                run.warn(format!("BS mesh not in skinCluster set, added: {}", path));
            }
            None => run.warn(format!("BS mesh does not exist, skipped: {}", path)),
        }
    }
    meshes
}

fn keyed_weight_count(scene: &dyn SceneGraph, weight_attrs: &[String]) -> usize {
    weight_attrs
        .iter()
        .filter_map(|qualified| scene.resolve_plug(qualified))
        .filter(|plug| !scene.key_times(plug.node, &plug.attr).is_empty())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use animbatch_model::FrameRange;
    use animbatch_scene::fbx_ascii::model_names;
    use animbatch_scene::{MemoryScene, NodeType};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// `|hero:pelvis|hero:spine|hero:head` skinning `|hero:body`, which
    /// carries `hero:faceBS` with a keyed `Smile`. `|hero:teeth` has a mesh
    /// but no skin.
    fn rig() -> (MemoryScene, NodeId) {
        let mut scene = MemoryScene::new("shot.ma");
        let root = scene.add_node("hero:pelvis", NodeType::Joint, None);
        let spine = scene.add_node("hero:spine", NodeType::Joint, Some(root));
        let head = scene.add_node("hero:head", NodeType::Joint, Some(spine));
        scene.set_keys(spine, "rotateZ", &[(1.0, 0.0), (10.0, 30.0)]);
        let body = scene.add_mesh("hero:body", None);
        scene.add_mesh("hero:teeth", None);
        scene.add_skin_cluster("skinCluster1", &[body], &[root, spine, head]);
        let bs = scene.add_blend_shape("hero:faceBS", &[body], &[Some("Smile"), Some("Blink")]);
        scene.set_keys(bs, "Smile", &[(1.0, 0.0), (10.0, 1.0)]);
        (scene, spine)
    }

    fn run_export(
        scene: &mut MemoryScene,
        bs_meshes: &[&str],
        weights: &[&str],
        opts: &FbxExportOptions,
    ) -> (ExportResult, String, TempDir) {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("A_hero.fbx");
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(1, 10));
        let bs_meshes: Vec<String> = bs_meshes.iter().map(|s| s.to_string()).collect();
        let weights: Vec<String> = weights.iter().map(|s| s.to_string()).collect();
        let result =
            export_skeleton_blend_shape(scene, "|hero:pelvis", &bs_meshes, &weights, &out, opts, &ctx);
        let text = std::fs::read_to_string(&out).unwrap_or_default();
        (result, text, tmp)
    }

    #[test]
    fn test_joints_and_meshes_renamed_then_restored() {
        let (mut scene, _) = rig();
        let before = scene.node_names();
        let (result, text, _tmp) = run_export(
            &mut scene,
            &["|hero:body"],
            &["hero:faceBS.Smile"],
            &FbxExportOptions::default(),
        );

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(model_names(&text, "LimbNode"), vec!["spine", "head", "Root"]);
        assert_eq!(model_names(&text, "Mesh"), vec!["body"]);
        assert!(text.contains("\"BlendShape\""));
        assert!(text.contains("\"Skin\""));
        assert_eq!(
            result.warnings,
            vec!["Detected namespaces in skeleton joints; stripped during export"]
        );
        assert_eq!(scene.node_names(), before);
        let settings = &scene.last_export().unwrap().settings;
        assert!(settings.skins);
        assert!(!settings.animation_only);
    }

    #[test]
    fn test_listed_meshes_added_or_skipped() {
        let (mut scene, _) = rig();
        let (result, text, _tmp) = run_export(
            &mut scene,
            &["|hero:teeth", "|hero:ghost"],
            &["hero:faceBS.Smile"],
            &FbxExportOptions::default(),
        );

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(model_names(&text, "Mesh"), vec!["body", "teeth"]);
        assert!(result
            .warnings
            .contains(&"BS mesh not in skinCluster set, added: |hero:teeth".to_string()));
        assert!(result
            .warnings
            .contains(&"BS mesh does not exist, skipped: |hero:ghost".to_string()));
    }

    #[test]
    fn test_unkeyed_weights_warn() {
        let (mut scene, _) = rig();
        let (result, _, _tmp) = run_export(
            &mut scene,
            &[],
            &["hero:faceBS.Blink"],
            &FbxExportOptions::default(),
        );

        assert!(result.success, "{:?}", result.errors);
        assert!(result
            .warnings
            .contains(&"No BS weight attributes have keyframes after bake".to_string()));
    }

    #[test]
    fn test_locked_joint_leaves_namespace_residue() {
        let (mut scene, spine) = rig();
        scene.set_node_locked(spine, true);
        let before = scene.node_names();
        let (result, text, _tmp) = run_export(
            &mut scene,
            &[],
            &["hero:faceBS.Smile"],
            &FbxExportOptions::default(),
        );

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(model_names(&text, "LimbNode"), vec!["hero:spine", "head", "Root"]);
        for expected in [
            "Failed to rename 1 joint(s); exported bone names may contain namespace prefixes",
            "1 joint(s) still have namespace prefixes after rename",
            "FBX file contains 1 LimbNode bone name(s) with ':'; namespace residue detected, UE may see unexpected bone names",
        ] {
            assert!(result.warnings.contains(&expected.to_string()), "missing: {}", expected);
        }
        assert_eq!(scene.node_names(), before);
    }

    #[test]
    fn test_shapes_disabled_and_animation_only_ignored() {
        let (mut scene, _) = rig();
        let mut opts = FbxExportOptions::default().animation_only(true);
        opts.bs_shapes = false;
        let (result, text, _tmp) = run_export(&mut scene, &[], &["hero:faceBS.Smile"], &opts);

        assert!(result.success, "{:?}", result.errors);
        assert!(!text.contains("\"BlendShape\""));
        assert!(!model_names(&text, "Mesh").is_empty());
        for expected in [
            "Skeleton AnimationOnly(UI)=true is ignored for Skeleton+BlendShape export (mesh/skin required)",
            SHAPES_DISABLED_WARNING,
            "Exported FBX contains no BlendShape/Shape data; UE may not import MorphTargets from this file",
        ] {
            assert!(result.warnings.contains(&expected.to_string()), "missing: {}", expected);
        }
    }

    #[test]
    fn test_export_failure_restores_names() {
        let (mut scene, _) = rig();
        scene.faults_mut().fail_export = true;
        let before = scene.node_names();
        let (result, _, _tmp) = run_export(
            &mut scene,
            &["|hero:body"],
            &["hero:faceBS.Smile"],
            &FbxExportOptions::default(),
        );

        assert_eq!(
            result.first_error(),
            Some("FBXExport command failed for skeleton+blendshape export")
        );
        assert_eq!(result.file_size, 0);
        assert_eq!(scene.node_names(), before);
    }

    #[test]
    fn test_missing_root() {
        let (mut scene, _) = rig();
        let tmp = TempDir::new().unwrap();
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(1, 10));
        let result = export_skeleton_blend_shape(
            &mut scene,
            "|nobody",
            &[],
            &[],
            &tmp.path().join("a.fbx"),
            &FbxExportOptions::default(),
            &ctx,
        );
        assert_eq!(result.first_error(), Some("Skeleton root does not exist: |nobody"));
    }
}
