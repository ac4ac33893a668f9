//! Frame-range audit and the per-session frame-range log.
//!
//! [`query_frame_range`] reports the key extents an item actually carries,
//! independent of the range that was requested. Constraint-driven rigs often
//! have no keys at all; for those the joints are sampled at both ends of the
//! export range and any real motion counts as covering it.

use animbatch_model::{ExportItem, FrameRange, ItemKind};
use animbatch_scene::{NodeId, NodeType, SceneGraph, MOTION_CHANNELS};
use chrono::Local;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::timeunit::DEFAULT_FPS;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Joints sampled at most when looking for unkeyed motion.
const MAX_SAMPLED_JOINTS: usize = 24;

/// Summed channel change below which a rig counts as static.
const MOTION_EPSILON: f64 = 1e-4;

/// Key extents found for one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRangeInfo {
    pub name: String,
    pub kind: ItemKind,
    pub filename: String,
    pub first_key: f64,
    pub last_key: f64,
    /// False when nothing keyed or moving was found.
    pub valid: bool,
}

impl FrameRangeInfo {
    /// An entry without key information.
    pub fn unqueried(item: &ExportItem) -> Self {
        Self {
            name: item.name.clone(),
            kind: item.kind,
            filename: item.filename.clone(),
            first_key: 0.0,
            last_key: 0.0,
            valid: false,
        }
    }
}

#[derive(Default)]
struct Extent(Option<(f64, f64)>);

impl Extent {
    fn add(&mut self, range: Option<(f64, f64)>) {
        let Some((first, last)) = range else {
            return;
        };
        if first > last {
            return;
        }
        self.0 = Some(match self.0 {
            Some((lo, hi)) => (lo.min(first), hi.max(last)),
            None => (first, last),
        });
    }
}

/// Queries the key extents of an item's content.
///
/// `export_range` is the range the batch exports; unkeyed skeletons are
/// sampled over it, or over the playback range when it is `None`.
pub fn query_frame_range<S: SceneGraph + ?Sized>(
    scene: &S,
    item: &ExportItem,
    export_range: Option<FrameRange>,
) -> FrameRangeInfo {
    let mut info = FrameRangeInfo::unqueried(item);
    let Some(node) = scene.lookup(&item.node) else {
        return info;
    };

    let mut extent = Extent::default();
    match item.kind {
        ItemKind::Camera => extent.add(scene.key_range(node)),
        ItemKind::Skeleton | ItemKind::SkeletonBlendShape => {
            let mut joints = scene.descendants(node, Some(NodeType::Joint));
            joints.push(node);
            for joint in &joints {
                extent.add(scene.key_range(*joint));
            }
            for attr in &item.bs_weight_attrs {
                let deformer = attr.split_once('.').map_or(attr.as_str(), |(n, _)| n);
                if let Some(id) = scene.lookup(deformer) {
                    extent.add(scene.key_range(id));
                }
            }
            if extent.0.is_none() {
                let (start, end) = match export_range {
                    Some(r) => {
                        let r = r.normalized();
                        (f64::from(r.start), f64::from(r.end))
                    }
                    None => {
                        let (a, b) = scene.playback_range();
                        (a.min(b).trunc(), a.max(b).trunc())
                    }
                };
                if sampled_motion(scene, &item.node, &joints, start, end) > MOTION_EPSILON {
                    extent.0 = Some((start, end));
                }
            }
        }
        ItemKind::BlendShape => {
            for deformer in scene.history(node) {
                if scene.node_type(deformer).ok() == Some(NodeType::BlendShape) {
                    extent.add(scene.key_range(deformer));
                }
            }
        }
    }

    if let Some((first, last)) = extent.0 {
        info.first_key = first;
        info.last_key = last;
        info.valid = true;
    }
    info
}

/// Largest summed channel change between `start` and `end` over a strided
/// sample of `joints`.
fn sampled_motion<S: SceneGraph + ?Sized>(
    scene: &S,
    root: &str,
    joints: &[NodeId],
    start: f64,
    end: f64,
) -> f64 {
    let stride = (joints.len() / MAX_SAMPLED_JOINTS).max(1);
    let mut best = 0.0;
    let mut best_joint = None;
    for joint in joints.iter().step_by(stride) {
        let mut total = 0.0;
        let mut sampled = 0;
        for attr in MOTION_CHANNELS {
            let (Ok(v0), Ok(v1)) = (
                scene.get_attr_at(*joint, attr, start),
                scene.get_attr_at(*joint, attr, end),
            ) else {
                continue;
            };
            total += (v1 - v0).abs();
            sampled += 1;
        }
        if sampled > 0 && total > best {
            best = total;
            best_joint = Some(*joint);
        }
    }
    debug!(
        root,
        sampled = joints.len().div_ceil(stride),
        start,
        end,
        best_delta = best,
        best_joint = ?best_joint,
        "frame range sampled"
    );
    best
}

/// Filename of the frame-range log for a range.
pub fn frame_range_log_name(range: FrameRange) -> String {
    format!("Export range {} - {}.txt", range.start, range.end)
}

/// Renders one frame-range log block.
pub fn render_frame_range_log(ranges: &[FrameRangeInfo], range: FrameRange, fps: f64, stamp: &str) -> String {
    let r = range.normalized();
    let fps = if fps > 0.0 { fps } else { DEFAULT_FPS };
    let rule = "=".repeat(30);
    let thin = "-".repeat(30);

    let mut out = String::new();
    out.push_str(&format!("{}\nExport Log\n{}\n", rule, rule));
    out.push_str(&format!("Time: {}\n", stamp));
    out.push_str(&format!("Export range: [{} - {}]\n", r.start, r.end));
    out.push_str(&format!("Total frames: {}f\n", r.span()));
    out.push_str(&format!("FPS: {}\n\n", fps as i64));
    for (i, info) in ranges.iter().enumerate() {
        out.push_str(&format!(
            "[{}] {} | {} | File: {} | Export range: [{} - {}]\n",
            i + 1,
            info.kind.label(),
            info.name,
            info.filename,
            r.start,
            r.end
        ));
    }
    out.push_str(&format!("\n{}\nTotal: {} item(s)\n{}\n", thin, ranges.len(), thin));
    out
}

/// Appends a frame-range log block to `Export range <s> - <e>.txt` in
/// `output_dir`, writing a UTF-8 BOM first when the file is new.
pub fn write_frame_range_log(
    output_dir: &Path,
    ranges: &[FrameRangeInfo],
    range: FrameRange,
    fps: f64,
) -> io::Result<PathBuf> {
    let path = output_dir.join(frame_range_log_name(range));
    let exists = path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if !exists {
        file.write_all(UTF8_BOM)?;
    }
    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    file.write_all(render_frame_range_log(ranges, range, fps, &stamp).as_bytes())?;
    Ok(path)
}

/// Creates an empty frame-range log (BOM only) so a session that later
/// appends to it starts from a fresh file.
pub fn start_frame_range_log(output_dir: &Path, range: FrameRange) -> io::Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(frame_range_log_name(range));
    fs::write(&path, UTF8_BOM)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use animbatch_scene::{ConstraintKind, MemoryScene};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn item(kind: ItemKind, node: &str) -> ExportItem {
        ExportItem::new(kind, node, "hero").with_filename("A_hero.fbx")
    }

    #[test]
    fn test_keyed_skeleton_and_weights_extend_range() {
        let mut scene = MemoryScene::new("shot.ma");
        let root = scene.add_node("root", NodeType::Joint, None);
        let spine = scene.add_node("spine", NodeType::Joint, Some(root));
        scene.set_keys(spine, "rotateX", &[(5.0, 0.0), (40.0, 10.0)]);
        let body = scene.add_mesh("body", None);
        let bs = scene.add_blend_shape("faceBS", &[body], &[Some("Smile")]);
        scene.set_keys(bs, "Smile", &[(2.0, 0.0), (30.0, 1.0)]);

        let mut it = item(ItemKind::SkeletonBlendShape, "|root");
        it.bs_weight_attrs = vec!["faceBS.Smile".to_string()];
        let info = query_frame_range(&scene, &it, None);
        assert!(info.valid);
        assert_eq!((info.first_key, info.last_key), (2.0, 40.0));
    }

    #[test]
    fn test_constraint_driven_rig_uses_export_range() {
        let mut scene = MemoryScene::new("shot.ma");
        let driver = scene.add_node("ctrl", NodeType::Transform, None);
        scene.set_keys(driver, "translateY", &[(1.0, 0.0), (50.0, 5.0)]);
        let root = scene.add_node("root", NodeType::Joint, None);
        scene.constrain(ConstraintKind::Parent, driver, root).unwrap();

        let info = query_frame_range(&scene, &item(ItemKind::Skeleton, "|root"), Some(FrameRange::new(20, 10)));
        assert!(info.valid);
        assert_eq!((info.first_key, info.last_key), (10.0, 20.0));
    }

    #[test]
    fn test_static_rig_and_missing_node_are_invalid() {
        let mut scene = MemoryScene::new("shot.ma");
        scene.add_node("root", NodeType::Joint, None);
        let info = query_frame_range(&scene, &item(ItemKind::Skeleton, "|root"), Some(FrameRange::new(1, 10)));
        assert!(!info.valid);
        let info = query_frame_range(&scene, &item(ItemKind::Camera, "|nope"), None);
        assert!(!info.valid);
    }

    #[test]
    fn test_blendshape_range_from_history() {
        let mut scene = MemoryScene::new("shot.ma");
        let head = scene.add_mesh("head", None);
        let bs = scene.add_blend_shape("faceBS", &[head], &[Some("Smile")]);
        scene.set_keys(bs, "Smile", &[(3.0, 0.0), (9.0, 1.0)]);
        let info = query_frame_range(&scene, &item(ItemKind::BlendShape, "|head"), None);
        assert_eq!((info.first_key, info.last_key, info.valid), (3.0, 9.0, true));
    }

    #[test]
    fn test_render_log_block() {
        let cam = FrameRangeInfo {
            name: "shotCam".into(),
            kind: ItemKind::Camera,
            filename: "Cam_P_S_T.fbx".into(),
            first_key: 0.0,
            last_key: 0.0,
            valid: false,
        };
        let text = render_frame_range_log(&[cam], FrameRange::new(1, 100), 0.0, "2026-10-19 09:00:00");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "Export Log");
        assert_eq!(lines[3], "Time: 2026-10-19 09:00:00");
        assert_eq!(lines[4], "Export range: [1 - 100]");
        assert_eq!(lines[5], "Total frames: 99f");
        assert_eq!(lines[6], "FPS: 30");
        assert_eq!(lines[8], "[1] Camera | shotCam | File: Cam_P_S_T.fbx | Export range: [1 - 100]");
        assert!(text.contains("Total: 1 item(s)"));
    }

    #[test]
    fn test_log_appends_with_single_bom() {
        let tmp = TempDir::new().unwrap();
        let range = FrameRange::new(1, 10);
        let path = start_frame_range_log(tmp.path(), range).unwrap();
        assert_eq!(path.file_name().unwrap(), "Export range 1 - 10.txt");
        write_frame_range_log(tmp.path(), &[], range, 24.0).unwrap();
        write_frame_range_log(tmp.path(), &[], range, 24.0).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        assert!(!bytes[3..].windows(3).any(|w| w == UTF8_BOM));
        let text = String::from_utf8_lossy(&bytes[3..]).to_string();
        assert_eq!(text.matches("Export Log").count(), 2);
    }
}
