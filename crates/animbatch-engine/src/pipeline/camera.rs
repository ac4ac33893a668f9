//! Camera export through a throwaway camera keyed frame by frame.
//!
//! The exporter's own baking cannot be trusted to clip a driven camera to
//! the requested window. Instead a fresh camera named after the output file
//! samples the source's world transform and focal length at every integer
//! frame of the range, gets keyed there, and is then clipped again. The
//! remaining lens attributes follow the source through connections and are
//! baked in one call.

use animbatch_model::names::{basename_no_ext, sanitize_node_name};
use animbatch_model::{ExportResult, FbxExportOptions, FrameRange};
use animbatch_scene::{NodeId, NodeType, Plug, SceneGraph, CAMERA_SHAPE_ATTRS};
use std::path::Path;

use super::{base_settings, check_exporter, ensure_output_dir, require_node, run_guarded, ExportRun};
use crate::context::ExportContext;
use crate::error::{ExportError, PipelineResult};
use crate::mutation::{DuplicateSession, TimelineGuard};
use crate::validate::file_size;

/// Boolean attribute tagging throwaway cameras, so a leftover from a
/// crashed run can be recognized and removed.
pub const TEMP_CAMERA_MARKER: &str = "animbatchTempExportCam";

const PLACEHOLDER_NAME: &str = "__animbatchExportCamTmp";
const FOCAL_LENGTH: &str = "focalLength";

/// Exports one camera over the context's range.
pub fn export_camera(
    scene: &mut dyn SceneGraph,
    camera: &str,
    output: &Path,
    opts: &FbxExportOptions,
    ctx: &ExportContext,
) -> ExportResult {
    run_guarded(
        ctx,
        "camera",
        output,
        "Camera export failed: unknown exception",
        |run| {
            check_exporter(scene)?;
            let source = require_node(scene, camera, "Camera node")?;
            ensure_output_dir(output)?;
            let range = ctx.range.normalized();

            let desired = sanitize_node_name(basename_no_ext(&output.to_string_lossy()));
            remove_stale_camera(scene, &desired, run);
            let source_shape = scene.children(source, Some(NodeType::Camera)).into_iter().next();

            let mut temp = DuplicateSession::new(&mut *scene);
            match temp.create_camera(PLACEHOLDER_NAME) {
                Ok(cam) => {
                    prepare_temp_camera(&mut *temp, source, source_shape, cam, &desired, range, run)?;
                }
                Err(e) => {
                    run.log_warn(format!("temp camera creation failed: {}", e));
                    run.warn("Failed to create temp camera; exporting original camera (may include out-of-range keys)");
                    temp.select(&[source]);
                }
            }

            let mut settings = base_settings(opts, range);
            settings.cameras = true;
            temp.export_selection(output, &settings).map_err(|e| {
                run.note(format!("export call failed: {}", e));
                ExportError::mutation("FBXExport command failed in camera export")
            })?;

            for w in temp.cleanup() {
                run.log_warn(w);
            }
            drop(temp);

            if file_size(output) == 0 {
                return Err(ExportError::validation("Camera export produced empty file"));
            }
            Ok(())
        },
    )
}

/// Deletes a node named `desired` when it carries the throwaway marker.
fn remove_stale_camera(scene: &mut dyn SceneGraph, desired: &str, run: &ExportRun<'_>) {
    let Some(stale) = scene.lookup(desired) else {
        return;
    };
    if !scene.has_attr(stale, TEMP_CAMERA_MARKER) {
        return;
    }
    if scene.get_attr(stale, TEMP_CAMERA_MARKER).unwrap_or(0.0) == 0.0 {
        return;
    }
    match scene.delete(stale) {
        Ok(()) => run.log_warn(format!("deleted stale temp camera: {}", desired)),
        Err(e) => run.log_warn(format!("stale temp camera {} not deleted: {}", desired, e)),
    }
}

fn prepare_temp_camera(
    scene: &mut dyn SceneGraph,
    source: NodeId,
    source_shape: Option<NodeId>,
    cam: NodeId,
    desired: &str,
    range: FrameRange,
    run: &mut ExportRun<'_>,
) -> PipelineResult<()> {
    let temp_shape = scene.children(cam, Some(NodeType::Camera)).into_iter().next();
    match scene.rename(cam, desired) {
        Ok(got) if got != desired => run.warn(format!(
            "Temp camera rename mismatch: wanted '{}', got '{}'",
            desired, got
        )),
        Ok(_) => {}
        Err(e) => run.log_warn(format!("temp camera rename to '{}' failed: {}", desired, e)),
    }
    if let Some(shape) = temp_shape {
        if let Err(e) = scene.rename(shape, &format!("{}Shape", desired)) {
            run.note(format!("temp camera shape keeps its name: {}", e));
        }
    }

    if let Err(e) = scene.add_attr(cam, TEMP_CAMERA_MARKER, 1.0) {
        run.note(format!("marker attribute not added: {}", e));
    }

    let mut driven: Vec<Plug> = Vec::new();
    if let (Some(src), Some(dst)) = (source_shape, temp_shape) {
        let (mut connected, mut copied, mut failed) = (0, 0, 0);
        for (attr, _) in CAMERA_SHAPE_ATTRS {
            if !scene.has_attr(src, attr) {
                failed += 1;
                continue;
            }
            let to = Plug::new(dst, attr);
            if scene.connect_attr(&Plug::new(src, attr), &to).is_ok() {
                connected += 1;
                driven.push(to);
                continue;
            }
            let value = scene.get_attr(src, attr);
            match value.and_then(|v| scene.set_attr(dst, attr, v)) {
                Ok(()) => {
                    copied += 1;
                    driven.push(to);
                }
                Err(_) => failed += 1,
            }
        }
        run.note(format!(
            "shape attributes: connected={}, copied={}, failed={}",
            connected, copied, failed
        ));

        // Sampled per frame below; a live connection would block keying.
        if scene.input_source(dst, FOCAL_LENGTH).is_some() {
            if let Err(e) = scene.disconnect_attr(&Plug::new(dst, FOCAL_LENGTH)) {
                run.log_warn(format!("focalLength disconnect failed: {}", e));
            }
        }
        driven.retain(|p| p.attr != FOCAL_LENGTH);
    }

    {
        let mut timeline = TimelineGuard::new(&mut *scene);
        for frame in range.frames() {
            let f = f64::from(frame);
            timeline.set_current_time(f);
            let world = timeline.world_transform(source, f).map_err(|_| {
                ExportError::mutation(format!(
                    "Failed to query source camera world matrix at frame {}",
                    frame
                ))
            })?;
            timeline.set_world_transform(cam, &world).map_err(|_| {
                ExportError::mutation(format!(
                    "Failed to set temp camera world matrix at frame {}",
                    frame
                ))
            })?;
            timeline.key_transform(cam).map_err(|_| {
                ExportError::mutation(format!("Failed to key temp camera at frame {}", frame))
            })?;
            if let (Some(src), Some(dst)) = (source_shape, temp_shape) {
                if let Ok(focal) = timeline.get_attr_at(src, FOCAL_LENGTH, f) {
                    let keyed = timeline
                        .set_attr(dst, FOCAL_LENGTH, focal)
                        .and_then(|_| timeline.set_key(dst, FOCAL_LENGTH));
                    if let Err(e) = keyed {
                        run.note(format!("focalLength not keyed at frame {}: {}", frame, e));
                    }
                }
            }
        }
        for w in timeline.restore() {
            run.log_warn(w);
        }
    }

    let (start, end) = (f64::from(range.start), f64::from(range.end));
    if !driven.is_empty() && scene.bake(&driven, start, end).is_err() {
        run.warn("Failed to bake temp camera shape attributes");
    }

    let mut clip_targets = vec![cam];
    clip_targets.extend(temp_shape);
    for id in clip_targets {
        if let Err(e) = scene.cut_keys_outside(id, start, end) {
            run.log_warn(format!("key clipping failed: {}", e));
        }
    }

    scene.select(&[cam]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use animbatch_scene::fbx_ascii::curve_key_times;
    use animbatch_scene::MemoryScene;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn shot_scene() -> (MemoryScene, NodeId) {
        let mut scene = MemoryScene::new("shot.ma");
        let cam = scene.add_camera("shotCam", None);
        scene.set_keys(cam, "translateX", &[(0.0, 0.0), (100.0, 100.0)]);
        let shape = scene.children(cam, Some(NodeType::Camera))[0];
        scene.set_keys(shape, FOCAL_LENGTH, &[(0.0, 35.0), (100.0, 85.0)]);
        (scene, cam)
    }

    #[test]
    fn test_keys_exactly_the_requested_frames() {
        let tmp = TempDir::new().unwrap();
        let (mut scene, _) = shot_scene();
        let before = scene.node_names();
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(10, 20));
        let out = tmp.path().join("Cam_demo.fbx");

        let result = export_camera(&mut scene, "|shotCam", &out, &FbxExportOptions::default(), &ctx);
        assert!(result.success, "{:?}", result.errors);

        let text = std::fs::read_to_string(&out).unwrap();
        let expected: Vec<f64> = (10..=20).map(f64::from).collect();
        assert_eq!(curve_key_times(&text, "Cam_demo.translateX"), Some(expected.clone()));
        assert_eq!(curve_key_times(&text, "Cam_demoShape.focalLength"), Some(expected));
        assert_eq!(scene.node_names(), before);
    }

    #[test]
    fn test_samples_source_motion() {
        let tmp = TempDir::new().unwrap();
        let (mut scene, _) = shot_scene();
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(20, 10));
        let out = tmp.path().join("Cam_demo.fbx");
        export_camera(&mut scene, "|shotCam", &out, &FbxExportOptions::default(), &ctx);

        let record = scene.last_export().unwrap();
        assert_eq!((record.settings.bake_start, record.settings.bake_end), (10, 20));
        assert!(record.settings.cameras);
        assert_eq!(record.nodes, vec!["|Cam_demo"]);
        assert_eq!(scene.current_time(), 1.0);
    }

    #[test]
    fn test_stale_marked_camera_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let (mut scene, _) = shot_scene();
        let stale = scene.add_camera("Cam_demo", None);
        scene.add_attr(stale, TEMP_CAMERA_MARKER, 1.0).unwrap();
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(1, 5));

        let result = export_camera(
            &mut scene,
            "|shotCam",
            &tmp.path().join("Cam_demo.fbx"),
            &FbxExportOptions::default(),
            &ctx,
        );
        assert!(result.success);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert!(!scene.is_alive(stale));
        assert_eq!(scene.lookup("|Cam_demo"), None);
    }

    #[test]
    fn test_unmarked_name_clash_reports_mismatch() {
        let tmp = TempDir::new().unwrap();
        let (mut scene, _) = shot_scene();
        scene.add_node("Cam_demo", NodeType::Transform, None);
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(1, 5));

        let result = export_camera(
            &mut scene,
            "|shotCam",
            &tmp.path().join("Cam_demo.fbx"),
            &FbxExportOptions::default(),
            &ctx,
        );
        assert!(result.success);
        assert_eq!(
            result.warnings,
            vec!["Temp camera rename mismatch: wanted 'Cam_demo', got 'Cam_demo1'"]
        );
    }

    #[test]
    fn test_missing_camera() {
        let tmp = TempDir::new().unwrap();
        let mut scene = MemoryScene::new("shot.ma");
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(1, 5));
        let result = export_camera(
            &mut scene,
            "|ghostCam",
            &tmp.path().join("x.fbx"),
            &FbxExportOptions::default(),
            &ctx,
        );
        assert_eq!(result.first_error(), Some("Camera node does not exist: |ghostCam"));
        assert_eq!(result.file_size, 0);
    }

    #[test]
    fn test_export_panic_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let (mut scene, _) = shot_scene();
        scene.faults_mut().panic_on_export = true;
        let before = scene.node_names();
        let ctx = ExportContext::new(tmp.path(), FrameRange::new(1, 5));

        let result = export_camera(
            &mut scene,
            "|shotCam",
            &tmp.path().join("Cam_demo.fbx"),
            &FbxExportOptions::default(),
            &ctx,
        );
        assert_eq!(result.first_error(), Some("Camera export failed: unknown exception"));
        assert_eq!(scene.node_names(), before);
    }
}
