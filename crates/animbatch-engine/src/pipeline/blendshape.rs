//! BlendShape export from a duplicate of the source mesh.
//!
//! The original mesh is never touched. The duplicate carries copies of the
//! upstream deformers; without skeleton its skin clusters are deleted, with
//! skeleton the influence joints are exported next to it after their
//! namespaces are merged away inside one undo chunk.

use animbatch_model::names::{namespace_of, sort_namespaces_deepest_first};
use animbatch_model::{ExportResult, FbxExportOptions};
use animbatch_scene::{DuplicateMode, FbxSettings, NodeId, NodeType, SceneGraph};
use std::path::Path;

use super::{
    base_settings, check_exporter, ensure_output_dir, require_node, run_guarded, ExportRun,
    SKELETON_DEFS_WARNING,
};
use crate::context::ExportContext;
use crate::error::ExportError;
use crate::mutation::{DuplicateSession, NamespaceMergeSession};
use crate::resolve::{resolve_post_rename, NodeIdentity};
use crate::validate::{file_size, FbxContentStats};

pub(crate) const SHAPES_DISABLED_WARNING: &str =
    "BlendShape Shapes(UI)=false: morph target geometry will not be exported";

fn deformers_of(scene: &dyn SceneGraph, mesh: NodeId, ty: NodeType) -> Vec<NodeId> {
    scene
        .history(mesh)
        .into_iter()
        .filter(|d| scene.node_type(*d).ok() == Some(ty))
        .collect()
}

/// Influence joints of the given skin clusters, plus their transform
/// parents, in first-seen order.
fn influence_nodes(scene: &dyn SceneGraph, skins: &[NodeId]) -> Vec<NodeId> {
    let mut nodes = Vec::new();
    for skin in skins {
        for joint in scene.skin_influences(*skin) {
            if !nodes.contains(&joint) {
                nodes.push(joint);
            }
            if let Some(parent) = scene.parent(joint) {
                if scene.node_type(parent).ok() == Some(NodeType::Transform) && !nodes.contains(&parent) {
                    nodes.push(parent);
                }
            }
        }
    }
    nodes
}

/// Exports the blendshape mesh at `mesh_path` over the context's range.
pub fn export_blend_shape(
    scene: &mut dyn SceneGraph,
    mesh_path: &str,
    output: &Path,
    opts: &FbxExportOptions,
    ctx: &ExportContext,
) -> ExportResult {
    run_guarded(
        ctx,
        "blendshape",
        output,
        "BlendShape export failed: unknown exception",
        |run| {
            check_exporter(scene)?;
            let mesh = require_node(scene, mesh_path, "Mesh node")?;
            ensure_output_dir(output)?;
            let range = ctx.range.normalized();

            let blend_shapes = deformers_of(scene, mesh, NodeType::BlendShape);
            let skins = deformers_of(scene, mesh, NodeType::SkinCluster);
            let skeleton = if opts.bs_include_skeleton {
                influence_nodes(scene, &skins)
            } else {
                Vec::new()
            };
            let include_skeleton = !skeleton.is_empty();

            if !opts.bs_shapes {
                run.warn(SHAPES_DISABLED_WARNING);
            }
            if include_skeleton && !opts.skel_skeleton_defs {
                run.warn(SKELETON_DEFS_WARNING);
            }
            if blend_shapes.is_empty() {
                return Err(ExportError::precondition(format!(
                    "No blendShape deformer found in mesh history: {}",
                    mesh_path
                )));
            }

            let mut dup = DuplicateSession::new(&mut *scene);
            let copy = match dup.duplicate(mesh, DuplicateMode::UpstreamNodes) {
                Ok(copy) => copy,
                Err(e) => {
                    run.note(format!("upstream duplicate failed, retrying plain: {}", e));
                    dup.duplicate(mesh, DuplicateMode::Plain).map_err(|_| {
                        ExportError::mutation(format!(
                            "Failed to duplicate mesh for blendShape export: {}",
                            mesh_path
                        ))
                    })?
                }
            };
            if let Err(e) = dup.reparent_to_world(copy) {
                run.log_warn(format!("duplicate mesh stays under its parent: {}", e));
            }

            if !include_skeleton {
                for skin in deformers_of(&*dup, copy, NodeType::SkinCluster) {
                    if let Err(e) = dup.delete(skin) {
                        run.note(format!("skin cluster kept on duplicate: {}", e));
                    }
                }
            }
            if deformers_of(&*dup, copy, NodeType::BlendShape).is_empty() {
                return Err(ExportError::mutation(
                    "Duplicate mesh lost blendShape deformers during duplication",
                ));
            }

            let mut settings = base_settings(opts, range);
            settings.animation_only = false;
            settings.bake_complex = true;
            settings.input_connections = false;
            settings.smooth_mesh = opts.bs_smooth_mesh;
            settings.shapes = opts.bs_shapes;

            let exported = if include_skeleton {
                settings.skins = true;
                settings.skeleton_definitions = opts.skel_skeleton_defs;
                export_with_skeleton(&mut *dup, copy, &skeleton, output, &settings, run)
            } else {
                settings.skins = false;
                dup.select(&[copy]);
                dup.export_selection(output, &settings).map_err(|e| e.to_string())
            };
            let stats = FbxContentStats::scan_file(output);

            for w in dup.cleanup() {
                run.log_warn(w);
            }
            drop(dup);

            exported.map_err(|e| {
                run.note(format!("export call failed: {}", e));
                ExportError::mutation("FBXExport command failed in blendshape export")
            })?;
            run.note(format!(
                "blendshape export: skeleton={}, {}",
                skeleton.len(),
                stats.summary()
            ));

            if file_size(output) == 0 {
                return Err(ExportError::validation("BlendShape export produced empty file"));
            }
            if stats.meshes == 0 && stats.deformers == 0 {
                return Err(ExportError::validation(
                    "BlendShape export expected mesh data but FBX contains no mesh/deformer markers",
                ));
            }
            Ok(())
        },
    )
}

/// Merges the skeleton's namespaces, exports the duplicate with the
/// re-identified skeleton nodes, then undoes the merges.
fn export_with_skeleton(
    scene: &mut dyn SceneGraph,
    copy: NodeId,
    skeleton: &[NodeId],
    output: &Path,
    settings: &FbxSettings,
    run: &mut ExportRun<'_>,
) -> Result<(), String> {
    let identities: Vec<NodeIdentity> = skeleton
        .iter()
        .map(|id| NodeIdentity::of(&*scene, *id))
        .collect();
    let mut namespaces: Vec<String> = identities
        .iter()
        .filter_map(|i| namespace_of(&i.path).map(str::to_string))
        .collect();
    sort_namespaces_deepest_first(&mut namespaces);

    let mut merge = NamespaceMergeSession::new(&mut *scene);
    for ns in &namespaces {
        merge.merge(ns);
    }
    if !merge.failed().is_empty() {
        run.warn(format!(
            "Namespace merge failed for {} namespace(s): [{}]; exported bone names may contain namespace prefixes",
            merge.failed().len(),
            merge.failed().join(", ")
        ));
    }

    let mut resolve_warnings = Vec::new();
    let mut selection = vec![copy];
    for identity in &identities {
        let resolved = resolve_post_rename(&*merge, identity, &mut resolve_warnings);
        selection.extend(resolved.id);
    }
    run.extend_warnings(resolve_warnings);
    merge.select(&selection);

    let exported = merge.export_selection(output, settings).map_err(|e| e.to_string());
    let teardown = merge.finish();
    drop(merge);
    run.extend_warnings(teardown);
    exported
}

#[cfg(test)]
mod tests {
    use super::*;
    use animbatch_model::FrameRange;
    use animbatch_scene::fbx_ascii::model_names;
    use animbatch_scene::MemoryScene;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// `|hero:grp|hero:root|hero:jaw` skinning `|hero:head`, which also
    /// carries `faceBS`.
    fn face_rig() -> MemoryScene {
        let mut scene = MemoryScene::new("shot.ma");
        let grp = scene.add_node("hero:grp", NodeType::Transform, None);
        let root = scene.add_node("hero:root", NodeType::Joint, Some(grp));
        let jaw = scene.add_node("hero:jaw", NodeType::Joint, Some(root));
        let head = scene.add_mesh("hero:head", None);
        scene.add_skin_cluster("skinCluster1", &[head], &[root, jaw]);
        let bs = scene.add_blend_shape("faceBS", &[head], &[Some("Smile"), Some("Blink")]);
        scene.set_keys(bs, "Smile", &[(1.0, 0.0), (10.0, 1.0)]);
        scene
    }

    fn export(scene: &mut MemoryScene, opts: &FbxExportOptions) -> (ExportResult, String, TempDir) {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("A_hero_Face.fbx");
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(1, 10));
        let result = export_blend_shape(scene, "|hero:head", &out, opts, &ctx);
        let text = std::fs::read_to_string(&out).unwrap_or_default();
        (result, text, tmp)
    }

    #[test]
    fn test_mesh_with_skeleton_merges_and_undoes_namespaces() {
        let mut scene = face_rig();
        let before = scene.node_names();
        let (result, text, _tmp) = export(&mut scene, &FbxExportOptions::default());

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(model_names(&text, "LimbNode"), vec!["root", "jaw"]);
        assert!(text.contains("\"Skin\""));
        assert!(text.contains("faceBS1.Smile"));
        assert_eq!(scene.node_names(), before);
        assert!(!scene.is_chunk_open());
    }

    #[test]
    fn test_mesh_only_drops_skin() {
        let mut scene = face_rig();
        let before = scene.node_names();
        let opts = FbxExportOptions::default().include_skeleton(false);
        let (result, text, _tmp) = export(&mut scene, &opts);

        assert!(result.success, "{:?}", result.errors);
        assert!(model_names(&text, "LimbNode").is_empty());
        assert!(!text.contains("\"Skin\""));
        assert!(text.contains("\"BlendShape\""));
        assert_eq!(scene.node_names(), before);
    }

    #[test]
    fn test_failed_merge_is_reported() {
        let mut scene = face_rig();
        scene.faults_mut().fail_namespace_merge.insert("hero".to_string());
        let (result, text, _tmp) = export(&mut scene, &FbxExportOptions::default());

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(
            result.warnings,
            vec!["Namespace merge failed for 1 namespace(s): [hero]; exported bone names may contain namespace prefixes"]
        );
        assert_eq!(model_names(&text, "LimbNode"), vec!["hero:root", "hero:jaw"]);
    }

    #[test]
    fn test_undo_failure_becomes_warning() {
        let mut scene = face_rig();
        scene.faults_mut().fail_undo = true;
        let (result, _, _tmp) = export(&mut scene, &FbxExportOptions::default());

        assert!(result.success, "{:?}", result.errors);
        assert!(result.warnings.iter().any(|w| w.starts_with("Undo failed after namespace merge")));
    }

    #[test]
    fn test_mesh_without_blend_shape() {
        let mut scene = MemoryScene::new("shot.ma");
        scene.add_mesh("hero:head", None);
        let (result, _, _tmp) = export(&mut scene, &FbxExportOptions::default());
        assert_eq!(
            result.first_error(),
            Some("No blendShape deformer found in mesh history: |hero:head")
        );
    }

    #[test]
    fn test_shapes_disabled_warns() {
        let mut scene = face_rig();
        let opts = FbxExportOptions {
            bs_shapes: false,
            ..FbxExportOptions::default()
        };
        let (result, text, _tmp) = export(&mut scene, &opts);

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.warnings, vec![SHAPES_DISABLED_WARNING]);
        assert!(!text.contains("\"BlendShape\""));
    }

    #[test]
    fn test_duplicate_failure() {
        let mut scene = face_rig();
        scene.faults_mut().fail_duplicate = true;
        let before = scene.node_names();
        let (result, _, _tmp) = export(&mut scene, &FbxExportOptions::default());

        assert_eq!(
            result.first_error(),
            Some("Failed to duplicate mesh for blendShape export: |hero:head")
        );
        assert_eq!(scene.node_names(), before);
    }
}
