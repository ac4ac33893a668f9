//! Skeleton export.
//!
//! Which strategy runs depends on whether the resolved root can be renamed:
//!
//! | Root | Animation only | Strategy |
//! |------|----------------|----------|
//! | writable | any | in-place rename, duplicate fallback on namespace residue |
//! | referenced | no | in-place selection of joints and skinned meshes, names kept |
//! | referenced | yes | duplicate, constrain to the original, rename the copy |

use animbatch_model::{ExportResult, FbxExportOptions, FrameRange};
use animbatch_scene::{ConstraintKind, DuplicateMode, FbxSettings, NodeId, NodeType, SceneGraph};
use std::path::Path;

use super::{
    base_settings, check_exporter, ensure_output_dir, joint_set, meshes_by_namespace, meshes_under,
    namespaced_leaf_count, path_or_id, plan_renames, require_node, resolve_joint_root, run_guarded,
    skinned_meshes, ExportRun, SKELETON_DEFS_WARNING,
};
use crate::context::ExportContext;
use crate::error::{ExportError, PipelineResult};
use crate::mutation::{DuplicateSession, RenameSession};
use crate::validate::{file_size, FbxContentStats};

const ANIMATION_ONLY_FORCED: &str =
    "AnimationOnly(UI)=true: force FBXExportAnimationOnly=false to keep skeleton hierarchy";

/// Exports the skeleton under `root_path` over the context's range.
pub fn export_skeleton(
    scene: &mut dyn SceneGraph,
    root_path: &str,
    output: &Path,
    opts: &FbxExportOptions,
    ctx: &ExportContext,
) -> ExportResult {
    run_guarded(
        ctx,
        "skeleton",
        output,
        "Skeleton export failed: unknown exception",
        |run| {
            check_exporter(scene)?;
            let input = require_node(scene, root_path, "Skeleton root")?;
            ensure_output_dir(output)?;
            let root = resolve_joint_root(scene, input, run)?;
            let range = ctx.range.normalized();

            if scene.is_referenced(root) {
                if !opts.skel_animation_only {
                    return export_referenced_in_place(scene, root, output, opts, range, run);
                }
                run.warn("Skeleton root is referenced/read-only; exporting via temporary duplicate skeleton");
                return export_via_duplicate(scene, root, output, opts, range, run);
            }
            export_in_place(scene, root, output, opts, range, run)
        },
    )
}

fn paths_of(scene: &dyn SceneGraph, ids: &[NodeId]) -> Vec<(NodeId, String)> {
    ids.iter()
        .filter_map(|id| scene.path_of(*id).ok().map(|p| (*id, p)))
        .collect()
}

fn skeleton_settings(opts: &FbxExportOptions, range: FrameRange, run: &mut ExportRun<'_>) -> FbxSettings {
    let mut settings = base_settings(opts, range);
    settings.skeleton_definitions = opts.skel_skeleton_defs;
    if !opts.skel_skeleton_defs {
        run.warn(SKELETON_DEFS_WARNING);
    }
    settings.animation_only = false;
    if opts.skel_animation_only {
        run.warn(ANIMATION_ONLY_FORCED);
    }
    settings.constraints = opts.skel_constraints;
    settings
}

// ============================================================================
// Writable root: rename in place
// ============================================================================

fn export_in_place(
    scene: &mut dyn SceneGraph,
    root: NodeId,
    output: &Path,
    opts: &FbxExportOptions,
    range: FrameRange,
    run: &mut ExportRun<'_>,
) -> PipelineResult<()> {
    let anim_only = opts.skel_animation_only;
    let original_parent = scene.parent(root);
    let joints = joint_set(scene, root);
    let plan = plan_renames(scene, &paths_of(scene, &joints), Some(root));
    let had_namespace = plan.iter().any(|w| w.had_namespace);
    let root_normalized = plan.iter().any(|w| w.root_normalized);

    let mut renames = RenameSession::new(&mut *scene);
    for work in &plan {
        if let Err(e) = renames.rename(work.id, &work.target()) {
            run.note(format!("rename to {} failed: {}", work.target(), e));
        }
    }

    let joints = joint_set(&*renames, root);
    let residue = namespaced_leaf_count(&*renames, &joints);
    if residue > 0 {
        run.log_warn(format!(
            "{} joint(s) kept a namespace after in-place rename; switching to duplicate skeleton",
            residue
        ));
        let restore = renames.restore();
        drop(renames);
        run.extend_warnings(restore);
        return export_via_duplicate(scene, root, output, opts, range, run);
    }

    let mut meshes = Vec::new();
    if !anim_only {
        meshes = skinned_meshes(&*renames, &joints).0;
        if meshes.is_empty() {
            meshes = meshes_under(&*renames, original_parent.unwrap_or(root));
            if !meshes.is_empty() {
                run.warn("No skinned meshes found from joint connections; fallback to meshes under rig hierarchy");
            }
        }
        if meshes.is_empty() {
            run.warn("AnimationOnly=false but no mesh transforms were found; FBX will contain skeleton only");
        }
    }
    let mut selection = joints.clone();
    selection.extend(meshes.iter().copied());
    renames.select(&selection);

    if had_namespace {
        run.warn("Detected namespaces in skeleton joints; stripped during export");
    }
    if root_normalized {
        run.warn("Top skeleton bone normalized to Root during export");
    }
    if anim_only {
        run.warn("Skeleton AnimationOnly(UI)=true: exporting joints-only while FBXAnimationOnly is forced false");
    }

    let mut settings = skeleton_settings(opts, range, run);
    settings.bake_complex = opts.skel_bake_complex;
    settings.input_connections = opts.skel_input_conns;
    settings.skins = !anim_only;
    settings.shapes = !anim_only;

    let exported = renames.export_selection(output, &settings);
    let stats = FbxContentStats::scan_file(output);
    let restore = renames.restore();
    drop(renames);
    run.extend_warnings(restore);
    exported.map_err(|e| {
        run.note(format!("export call failed: {}", e));
        ExportError::mutation("FBXExport command failed in skeleton export")
    })?;
    run.note(format!(
        "in-place export: joints={}, meshes={}, {}",
        joints.len(),
        meshes.len(),
        stats.summary()
    ));

    if file_size(output) == 0 {
        return Err(ExportError::validation("Skeleton export produced empty file"));
    }
    if stats.limb_nodes == 0 {
        return Err(ExportError::validation("Skeleton export did not contain LimbNode bones"));
    }
    if !anim_only && !stats.has_skin_data() {
        return Err(ExportError::validation(
            "AnimationOnly=false but exported FBX contains no skin/deformer data",
        ));
    }
    Ok(())
}

// ============================================================================
// Referenced root, full export: select in place, keep names
// ============================================================================

fn export_referenced_in_place(
    scene: &mut dyn SceneGraph,
    root: NodeId,
    output: &Path,
    opts: &FbxExportOptions,
    range: FrameRange,
    run: &mut ExportRun<'_>,
) -> PipelineResult<()> {
    run.warn("Referenced skeleton + AnimationOnly=false: export in-place to preserve skinned meshes");
    run.warn("Referenced export keeps original bone names; namespaces may remain");

    let joints = joint_set(scene, root);
    let mut meshes = skinned_meshes(scene, &joints).0;
    if meshes.is_empty() {
        meshes = meshes_by_namespace(scene, root);
    }
    if meshes.is_empty() {
        meshes = meshes_under(scene, root);
    }
    let mut selection = joints.clone();
    selection.extend(meshes.iter().copied());
    scene.select(&selection);

    let mut settings = skeleton_settings(opts, range, run);
    settings.bake_complex = opts.skel_bake_complex;
    settings.skins = true;
    settings.input_connections = opts.skel_input_conns;

    scene.export_selection(output, &settings).map_err(|e| {
        run.note(format!("export call failed: {}", e));
        ExportError::mutation("FBXExport command failed in referenced in-place skeleton export")
    })?;
    let mut stats = FbxContentStats::scan_file(output);

    if !opts.skel_input_conns && !stats.has_skin_data() {
        run.warn("Referenced in-place export missing skin/deformer data; retry with InputConnections=true");
        settings.input_connections = true;
        scene.export_selection(output, &settings).map_err(|e| {
            run.note(format!("retry export call failed: {}", e));
            ExportError::mutation("FBXExport command failed in referenced in-place retry")
        })?;
        stats = FbxContentStats::scan_file(output);
    }
    run.note(format!(
        "referenced in-place export: joints={}, meshes={}, {}",
        joints.len(),
        meshes.len(),
        stats.summary()
    ));

    if stats.limb_nodes > joints.len() * 2 {
        run.warn(format!(
            "Referenced in-place export pulled extra bones: selectedJoints={}, exportedLimbNodes={} (likely from connected assets/namespaces)",
            joints.len(),
            stats.limb_nodes
        ));
    }
    if file_size(output) == 0 {
        return Err(ExportError::validation(
            "Referenced in-place skeleton export produced empty file",
        ));
    }
    if stats.limb_nodes == 0 {
        return Err(ExportError::validation(
            "Referenced in-place export contains no LimbNode bones",
        ));
    }
    if !stats.has_skin_data() {
        return Err(ExportError::validation(
            "Referenced in-place export contains no skin/deformer data",
        ));
    }
    Ok(())
}

// ============================================================================
// Duplicate and constrain
// ============================================================================

/// Removes mesh data from a duplicated skeleton. Shapes sitting directly
/// under joints go alone; other meshes lose their whole transform.
fn strip_duplicate_meshes(scene: &mut dyn SceneGraph, copy: NodeId, run: &ExportRun<'_>) {
    for shape in scene.descendants(copy, Some(NodeType::Mesh)) {
        if !scene.is_alive(shape) {
            continue;
        }
        let target = match scene.parent(shape) {
            Some(p) if scene.node_type(p).ok() == Some(NodeType::Joint) => shape,
            Some(p) => p,
            None => shape,
        };
        if let Err(e) = scene.delete(target) {
            run.note(format!("mesh not removed from duplicate: {}", e));
        }
    }
}

#[derive(Debug, Default)]
struct ConstraintTally {
    created: usize,
    failed: usize,
    returned_zero: usize,
}

fn export_via_duplicate(
    scene: &mut dyn SceneGraph,
    root: NodeId,
    output: &Path,
    opts: &FbxExportOptions,
    range: FrameRange,
    run: &mut ExportRun<'_>,
) -> PipelineResult<()> {
    run.hand_over(
        "skeleton-duplicate",
        "Skeleton export failed (duplicate path): unknown exception",
    );
    let anim_only = opts.skel_animation_only;
    let root_path = path_or_id(scene, root);

    let mut dup = DuplicateSession::new(&mut *scene);
    let copy = match dup.duplicate(root, DuplicateMode::RootsOnly) {
        Ok(copy) => copy,
        Err(e) => {
            run.note(format!("roots-only duplicate failed, retrying plain: {}", e));
            dup.duplicate(root, DuplicateMode::Plain).map_err(|e| {
                run.note(format!("plain duplicate failed: {}", e));
                ExportError::mutation(format!("Failed to duplicate skeleton root: {}", root_path))
            })?
        }
    };
    if let Err(e) = dup.reparent_to_world(copy) {
        run.log_warn(format!("duplicate stays under its parent: {}", e));
    }
    if anim_only {
        strip_duplicate_meshes(&mut *dup, copy, run);
    }

    let originals = joint_set(&*dup, root);
    let copies = joint_set(&*dup, copy);
    if originals.len() != copies.len() || copies.is_empty() {
        return Err(ExportError::mutation("Duplicate skeleton joint count mismatch"));
    }
    for joint in &copies {
        if let Err(e) = dup.unlock_channels(*joint) {
            run.note(format!("channels stay locked on {}: {}", path_or_id(&*dup, *joint), e));
        }
    }

    let mut tally = ConstraintTally::default();
    for (original, copied) in originals.iter().zip(&copies) {
        let outcome = match dup.constrain(ConstraintKind::Parent, *original, *copied) {
            Ok(created) => Ok(created),
            Err(_) => dup.constrain(ConstraintKind::Orient, *original, *copied),
        };
        match outcome {
            Ok(Some(_)) => tally.created += 1,
            Ok(None) => tally.returned_zero += 1,
            Err(e) => {
                if tally.failed < 5 {
                    run.note(format!(
                        "constraint failed for {}: {}",
                        path_or_id(&*dup, *original),
                        e
                    ));
                }
                tally.failed += 1;
            }
        }
    }
    run.note(format!("constraints: {:?}", tally));
    if tally.created == 0 {
        return Err(ExportError::mutation(
            "Failed to create constraints for duplicate skeleton (animation would be static)",
        ));
    }
    if tally.failed > 0 || tally.returned_zero > 0 {
        run.warn(format!(
            "Duplicate constraint creation partial: created={}, failed={}, returnedZero={}",
            tally.created, tally.failed, tally.returned_zero
        ));
    }

    // Names come from the originals; the copy is ours to rename.
    let sources: Vec<(NodeId, String)> = copies
        .iter()
        .zip(&originals)
        .filter_map(|(c, o)| dup.path_of(*o).ok().map(|p| (*c, p)))
        .collect();
    let plan = plan_renames(&*dup, &sources, Some(copy));
    let had_namespace = plan.iter().any(|w| w.had_namespace);
    for work in &plan {
        if let Err(e) = dup.rename(work.id, &work.target()) {
            run.note(format!("duplicate rename to {} failed: {}", work.target(), e));
        }
    }
    let copies = joint_set(&*dup, copy);
    if namespaced_leaf_count(&*dup, &copies) > 0 {
        return Err(ExportError::mutation(
            "Duplicate skeleton joints still contain namespaces",
        ));
    }
    dup.select(&copies);

    let mut settings = skeleton_settings(opts, range, run);
    if !opts.skel_bake_complex {
        run.warn("Duplicate skeleton export forces BakeComplex=true to sample constraints");
    }
    settings.bake_complex = true;
    settings.input_connections = !anim_only && opts.skel_input_conns;
    settings.skins = !anim_only;
    settings.shapes = !anim_only;

    dup.export_selection(output, &settings).map_err(|e| {
        run.note(format!("export call failed: {}", e));
        ExportError::mutation("FBXExport command failed in duplicate skeleton export")
    })?;
    let stats = FbxContentStats::scan_file(output);
    run.note(format!("duplicate export: joints={}, {}", copies.len(), stats.summary()));

    let expected = copies.len();
    if stats.skeletons == 0 {
        run.warn("Duplicate skeleton export contains no 'Skeleton' node attributes");
    } else if stats.skeletons != expected && stats.skeletons != expected + 1 {
        run.warn(format!(
            "Duplicate skeleton export: exported skeleton-count mismatch, expected={}~{}, actual={}",
            expected,
            expected + 1,
            stats.skeletons
        ));
    }

    for w in dup.cleanup() {
        run.log_warn(w);
    }
    drop(dup);

    if file_size(output) == 0 {
        return Err(ExportError::validation("Skeleton export produced empty file"));
    }
    if stats.limb_nodes == 0 {
        return Err(ExportError::validation("Skeleton export did not contain LimbNode bones"));
    }
    run.warn("Skeleton was referenced/read-only; exported via temporary duplicate skeleton");
    if had_namespace {
        run.warn("Namespaces stripped on duplicate skeleton during export");
    }
    Ok(())
}
