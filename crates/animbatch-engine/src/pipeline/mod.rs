//! Export pipelines.
//!
//! One public entry point per item kind. Every entry point runs its body
//! through [`run_guarded`], which times it, catches panics and turns the
//! outcome into an [`ExportResult`]. Nothing escapes a pipeline call: the
//! batch always gets a result back.
//!
//! | Kind | Entry point | Scene strategy |
//! |------|-------------|----------------|
//! | Camera | [`export_camera`] | throwaway camera keyed frame by frame |
//! | Skeleton | [`export_skeleton`] | in-place rename, or duplicate and constrain |
//! | BlendShape | [`export_blend_shape`] | duplicate mesh, scoped namespace merge |
//! | Skeleton+BlendShape | [`export_skeleton_blend_shape`] | in-place rename of joints and meshes |

mod blendshape;
mod camera;
mod skeleton;
mod skeleton_blendshape;

pub use blendshape::export_blend_shape;
pub use camera::{export_camera, TEMP_CAMERA_MARKER};
pub use skeleton::export_skeleton;
pub use skeleton_blendshape::export_skeleton_blend_shape;

use animbatch_model::names::{
    bare_name, canonical_root_name, desired_export_name, has_namespace_residue, leaf_name,
    namespace_of, path_depth,
};
use animbatch_model::{ExportItem, ExportResult, FbxExportOptions, FrameRange, ItemKind};
use animbatch_scene::{FbxSettings, NodeId, NodeType, SceneGraph};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::context::ExportContext;
use crate::error::{ExportError, PipelineResult};
use crate::validate::file_size;

const SKELETON_DEFS_WARNING: &str =
    "SkeletonDefs(UI)=false: FBX skeleton hierarchy metadata may be incomplete in some DCC/engines";

// ============================================================================
// Guarded execution
// ============================================================================

/// State of one pipeline call: the warnings collected so far and the
/// message reported if the body panics.
pub(crate) struct ExportRun<'c> {
    ctx: &'c ExportContext,
    tag: &'static str,
    warnings: Vec<String>,
    unknown_msg: &'static str,
}

impl<'c> ExportRun<'c> {
    /// Attaches a warning to the result and logs it.
    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.ctx.warn(&format!("{}: {}", self.tag, message));
        self.warnings.push(message);
    }

    /// Logs a warning that is not attached to the result.
    pub(crate) fn log_warn(&self, message: impl AsRef<str>) {
        self.ctx.warn(&format!("{}: {}", self.tag, message.as_ref()));
    }

    /// Diagnostic line.
    pub(crate) fn note(&self, message: impl AsRef<str>) {
        self.ctx.note(&format!("{}: {}", self.tag, message.as_ref()));
    }

    pub(crate) fn extend_warnings(&mut self, warnings: Vec<String>) {
        for w in warnings {
            self.warn(w);
        }
    }

    /// Switches the tag and panic message, for bodies that hand over to
    /// another strategy midway.
    pub(crate) fn hand_over(&mut self, tag: &'static str, unknown_msg: &'static str) {
        self.tag = tag;
        self.unknown_msg = unknown_msg;
    }

    pub(crate) fn ctx(&self) -> &ExportContext {
        self.ctx
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs a pipeline body and builds its result.
///
/// `Ok` becomes a success carrying the output's size. An error becomes a
/// failure whose first error is the error's message; the size is kept only
/// when the error may have left a file behind. A panic becomes a failure
/// with the run's unknown-exception message. Guards owned by the body are
/// dropped during unwinding, so their teardown still runs.
pub(crate) fn run_guarded<F>(
    ctx: &ExportContext,
    tag: &'static str,
    output: &Path,
    unknown_msg: &'static str,
    body: F,
) -> ExportResult
where
    F: FnOnce(&mut ExportRun<'_>) -> PipelineResult<()>,
{
    let started = Instant::now();
    let mut run = ExportRun {
        ctx,
        tag,
        warnings: Vec::new(),
        unknown_msg,
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut run)));
    let elapsed = started.elapsed();

    let builder = ExportResult::builder(output.to_path_buf())
        .duration(elapsed)
        .warnings(run.warnings.clone());
    let result = match outcome {
        Ok(Ok(())) => builder.file_size(file_size(output)).build(),
        Ok(Err(e)) => {
            let size = if e.may_have_output() { file_size(output) } else { 0 };
            builder.file_size(size).error(e.to_string()).build()
        }
        Err(payload) => {
            ctx.error(&format!(
                "{}: panic caught, scene cleanup ran during unwinding: {}",
                run.tag,
                panic_text(payload.as_ref())
            ));
            builder.error(run.unknown_msg).build()
        }
    };

    if result.success {
        ctx.note(&format!(
            "{}: exported {} ({} bytes, {:.2}s)",
            run.tag,
            output.display(),
            result.file_size,
            result.duration_secs
        ));
    } else {
        ctx.error(&format!(
            "{}: {}",
            run.tag,
            result.first_error().unwrap_or_default()
        ));
    }
    result
}

// ============================================================================
// Shared steps
// ============================================================================

/// Exporter defaults with the item's range and file format applied.
pub(crate) fn base_settings(opts: &FbxExportOptions, range: FrameRange) -> FbxSettings {
    FbxSettings::default()
        .with_bake_range(range.start, range.end)
        .with_format(&opts.file_version, &opts.up_axis)
}

pub(crate) fn check_exporter(scene: &mut dyn SceneGraph) -> PipelineResult<()> {
    if scene.ensure_exporter() {
        Ok(())
    } else {
        Err(ExportError::precondition("FBX exporter plugin load failed"))
    }
}

pub(crate) fn require_node(scene: &dyn SceneGraph, path: &str, what: &str) -> PipelineResult<NodeId> {
    scene
        .lookup(path)
        .ok_or_else(|| ExportError::precondition(format!("{} does not exist: {}", what, path)))
}

pub(crate) fn ensure_output_dir(output: &Path) -> PipelineResult<()> {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir).map_err(|e| {
            ExportError::precondition(format!(
                "Failed to create output directory {}: {}",
                dir.display(),
                e
            ))
        }),
        _ => Ok(()),
    }
}

pub(crate) fn path_or_id(scene: &dyn SceneGraph, id: NodeId) -> String {
    scene.path_of(id).unwrap_or_else(|_| id.to_string())
}

/// Joints under `root` in traversal order, then `root` itself.
pub(crate) fn joint_set(scene: &dyn SceneGraph, root: NodeId) -> Vec<NodeId> {
    let mut joints = scene.descendants(root, Some(NodeType::Joint));
    joints.push(root);
    joints
}

/// The joint to export when the caller passed `input`.
///
/// A non-joint input is replaced by the top-most joint beneath it that has
/// the most joint descendants.
pub(crate) fn resolve_joint_root(
    scene: &dyn SceneGraph,
    input: NodeId,
    run: &mut ExportRun<'_>,
) -> PipelineResult<NodeId> {
    if scene.node_type(input).ok() == Some(NodeType::Joint) {
        return Ok(input);
    }
    let joints = scene.descendants(input, Some(NodeType::Joint));
    let Some(first) = joints.first().copied() else {
        return Err(ExportError::precondition(format!(
            "No joints found under: {}",
            path_or_id(scene, input)
        )));
    };

    let tops: Vec<NodeId> = joints
        .iter()
        .copied()
        .filter(|j| match scene.parent(*j) {
            Some(p) => !joints.contains(&p),
            None => true,
        })
        .collect();

    let mut best: Option<(NodeId, usize)> = None;
    for top in &tops {
        let count = scene.descendants(*top, Some(NodeType::Joint)).len();
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((*top, count));
        }
    }
    match best {
        Some((root, _)) => {
            run.warn(format!(
                "Input node is not a joint; using joint root: {}",
                path_or_id(scene, root)
            ));
            Ok(root)
        }
        None => {
            run.warn(format!(
                "Input node is not a joint; using first joint found: {}",
                path_or_id(scene, first)
            ));
            Ok(first)
        }
    }
}

fn sort_unique_by_path(scene: &dyn SceneGraph, ids: Vec<NodeId>) -> Vec<NodeId> {
    let mut keyed: Vec<(String, NodeId)> = ids
        .into_iter()
        .filter_map(|id| scene.path_of(id).ok().map(|p| (p, id)))
        .collect();
    keyed.sort();
    keyed.dedup_by(|a, b| a.1 == b.1);
    keyed.into_iter().map(|(_, id)| id).collect()
}

fn mesh_transform_of(scene: &dyn SceneGraph, geometry: NodeId) -> Option<NodeId> {
    match scene.node_type(geometry).ok()? {
        NodeType::Mesh => scene.parent(geometry),
        NodeType::Transform => {
            let has_mesh = !scene.children(geometry, Some(NodeType::Mesh)).is_empty();
            has_mesh.then_some(geometry)
        }
        _ => None,
    }
}

/// Mesh transforms bound to any of `joints` through a skin cluster, sorted
/// by path. Also returns the number of skin clusters visited.
pub(crate) fn skinned_meshes(scene: &dyn SceneGraph, joints: &[NodeId]) -> (Vec<NodeId>, usize) {
    let mut clusters: Vec<NodeId> = Vec::new();
    for joint in joints {
        for sc in scene.skin_clusters(*joint) {
            if !clusters.contains(&sc) {
                clusters.push(sc);
            }
        }
    }
    let meshes: Vec<NodeId> = clusters
        .iter()
        .flat_map(|sc| scene.skin_geometry(*sc))
        .filter_map(|g| mesh_transform_of(scene, g))
        .collect();
    (sort_unique_by_path(scene, meshes), clusters.len())
}

/// Mesh transforms anywhere below `node`.
pub(crate) fn meshes_under(scene: &dyn SceneGraph, node: NodeId) -> Vec<NodeId> {
    let meshes = scene
        .descendants(node, Some(NodeType::Mesh))
        .into_iter()
        .filter_map(|shape| scene.parent(shape))
        .collect();
    sort_unique_by_path(scene, meshes)
}

/// Mesh transforms whose mesh shape lives in the namespace of `node`.
pub(crate) fn meshes_by_namespace(scene: &dyn SceneGraph, node: NodeId) -> Vec<NodeId> {
    let Ok(path) = scene.path_of(node) else {
        return Vec::new();
    };
    let Some(ns) = namespace_of(&path) else {
        return Vec::new();
    };
    let prefix = format!("{}:", ns);
    let meshes = scene
        .list_by_type(NodeType::Mesh)
        .into_iter()
        .filter(|shape| {
            scene
                .name_of(*shape)
                .map(|n| n.trim_start_matches(':').starts_with(&prefix))
                .unwrap_or(false)
        })
        .filter_map(|shape| scene.parent(shape))
        .collect();
    sort_unique_by_path(scene, meshes)
}

/// Number of nodes whose leaf name still carries a namespace.
pub(crate) fn namespaced_leaf_count(scene: &dyn SceneGraph, ids: &[NodeId]) -> usize {
    ids.iter()
        .filter_map(|id| scene.path_of(*id).ok())
        .filter(|p| has_namespace_residue(leaf_name(p)))
        .count()
}

/// One pending rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RenameWork {
    pub id: NodeId,
    pub desired: String,
    pub depth: usize,
    pub had_namespace: bool,
    pub root_normalized: bool,
}

impl RenameWork {
    /// Target name in the root namespace.
    pub fn target(&self) -> String {
        format!(":{}", self.desired)
    }
}

/// Renames needed to give `nodes` bare export names, deepest first.
///
/// Each entry pairs the node to rename with the path its name is derived
/// from, which differs from the node's own path when renaming a duplicate
/// after its original. The root additionally gets the canonical root name.
pub(crate) fn plan_renames(
    scene: &dyn SceneGraph,
    nodes: &[(NodeId, String)],
    root: Option<NodeId>,
) -> Vec<RenameWork> {
    let mut work: Vec<RenameWork> = nodes
        .iter()
        .filter_map(|(id, source_path)| {
            let current = scene.path_of(*id).ok()?;
            let current_leaf = leaf_name(&current).trim_start_matches(':');
            let is_root = Some(*id) == root;
            let desired = desired_export_name(source_path, is_root);
            let source_bare = bare_name(source_path);
            let had_namespace = has_namespace_residue(leaf_name(source_path));
            let root_normalized = is_root && canonical_root_name(source_bare) != source_bare;
            let needs = current_leaf != desired;
            needs.then(|| RenameWork {
                id: *id,
                desired,
                depth: path_depth(&current),
                had_namespace,
                root_normalized,
            })
        })
        .collect();
    work.sort_by(|a, b| b.depth.cmp(&a.depth));
    work
}

// ============================================================================
// Dispatch
// ============================================================================

/// Exports one item with the pipeline matching its kind.
///
/// Skeleton+BlendShape items without weight channels, or with the combined
/// export switched off, go through the plain skeleton pipeline.
pub fn export_item(
    scene: &mut dyn SceneGraph,
    item: &ExportItem,
    output: &Path,
    opts: &FbxExportOptions,
    ctx: &ExportContext,
) -> ExportResult {
    match item.kind {
        ItemKind::Camera => export_camera(scene, &item.node, output, opts, ctx),
        ItemKind::Skeleton => export_skeleton(scene, &item.node, output, opts, ctx),
        ItemKind::BlendShape => export_blend_shape(scene, &item.node, output, opts, ctx),
        ItemKind::SkeletonBlendShape => {
            if opts.skel_blend_shape && !item.bs_weight_attrs.is_empty() {
                export_skeleton_blend_shape(
                    scene,
                    &item.node,
                    &item.bs_meshes,
                    &item.bs_weight_attrs,
                    output,
                    opts,
                    ctx,
                )
            } else {
                export_skeleton(scene, &item.node, output, opts, ctx)
            }
        }
    }
}

/// Where an item's file lands inside the context's output directory.
pub fn output_path_for(ctx: &ExportContext, item: &ExportItem) -> PathBuf {
    ctx.output_dir().join(&item.filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use animbatch_scene::MemoryScene;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn ctx(dir: &Path) -> ExportContext {
        ExportContext::new(dir, FrameRange::new(1, 10))
    }

    #[test]
    fn test_run_guarded_success_reports_size() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("a.fbx");
        let ctx = ctx(tmp.path());
        let result = run_guarded(&ctx, "test", &out, "boom", |run| {
            run.warn("careful");
            std::fs::write(&out, b"data").unwrap();
            Ok(())
        });
        assert!(result.success);
        assert_eq!(result.file_size, 4);
        assert_eq!(result.warnings, vec!["careful"]);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_run_guarded_error_keeps_warnings() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("a.fbx");
        let ctx = ctx(tmp.path());
        let result = run_guarded(&ctx, "test", &out, "boom", |run| {
            run.warn("first");
            Err(ExportError::precondition("missing"))
        });
        assert!(!result.success);
        assert_eq!(result.errors, vec!["missing"]);
        assert_eq!(result.warnings, vec!["first"]);
    }

    #[test]
    fn test_run_guarded_panic_uses_current_message() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("a.fbx");
        let ctx = ctx(tmp.path());
        let result = run_guarded(&ctx, "test", &out, "first path failed", |run| {
            run.hand_over("second", "second path failed");
            panic!("host crashed");
        });
        assert!(!result.success);
        assert_eq!(result.first_error(), Some("second path failed"));
    }

    #[test]
    fn test_resolve_joint_root_prefers_largest_hierarchy() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(tmp.path());
        let mut scene = MemoryScene::new("shot.ma");
        let grp = scene.add_node("rig", NodeType::Transform, None);
        let small = scene.add_node("prop_jnt", NodeType::Joint, Some(grp));
        scene.add_node("prop_tip", NodeType::Joint, Some(small));
        let big = scene.add_node("hips", NodeType::Joint, Some(grp));
        let spine = scene.add_node("spine", NodeType::Joint, Some(big));
        scene.add_node("chest", NodeType::Joint, Some(spine));

        let mut picked = None;
        let result = run_guarded(&ctx, "test", &tmp.path().join("x.fbx"), "boom", |run| {
            picked = Some(resolve_joint_root(&scene, grp, run)?);
            Ok(())
        });
        assert_eq!(picked, Some(big));
        assert_eq!(result.warnings, vec!["Input node is not a joint; using joint root: |rig|hips"]);
    }

    #[test]
    fn test_resolve_joint_root_without_joints() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(tmp.path());
        let mut scene = MemoryScene::new("shot.ma");
        let grp = scene.add_node("empty_grp", NodeType::Transform, None);
        let result = run_guarded(&ctx, "test", &tmp.path().join("x.fbx"), "boom", |run| {
            resolve_joint_root(&scene, grp, run).map(|_| ())
        });
        assert_eq!(result.first_error(), Some("No joints found under: |empty_grp"));
    }

    #[test]
    fn test_plan_renames_deepest_first_and_root_canonical() {
        let mut scene = MemoryScene::new("shot.ma");
        let root = scene.add_node("hero:pelvis", NodeType::Joint, None);
        let spine = scene.add_node("hero:spine", NodeType::Joint, Some(root));
        let clean = scene.add_node("chest", NodeType::Joint, Some(spine));
        let nodes: Vec<(NodeId, String)> = [root, spine, clean]
            .iter()
            .map(|id| (*id, scene.path_of(*id).unwrap()))
            .collect();

        let work = plan_renames(&scene, &nodes, Some(root));
        let targets: Vec<String> = work.iter().map(RenameWork::target).collect();
        assert_eq!(targets, vec![":spine", ":Root"]);
        assert!(work[1].root_normalized);
        assert!(work.iter().all(|w| w.had_namespace));
    }

    #[test]
    fn test_skinned_meshes_and_namespace_fallback() {
        let mut scene = MemoryScene::new("shot.ma");
        let root = scene.add_node("hero:root", NodeType::Joint, None);
        let body = scene.add_mesh("hero:body", None);
        let cape = scene.add_mesh("hero:cape", None);
        scene.add_mesh("other:rock", None);
        scene.add_skin_cluster("skinCluster1", &[body], &[root]);

        let (meshes, clusters) = skinned_meshes(&scene, &[root]);
        assert_eq!(meshes, vec![body]);
        assert_eq!(clusters, 1);
        assert_eq!(meshes_by_namespace(&scene, root), vec![body, cape]);
    }
}
