//! Scene scanning: turns a scene into the list of export items.
//!
//! Four finders run over the scene:
//!
//! | Finder | Produces |
//! |--------|----------|
//! | cameras | one item per non-default, non-startup camera transform |
//! | characters | one skeleton per namespace (or per unnamespaced root joint) |
//! | blendshape groups | one mesh per namespace, the one with the most weights |
//! | combos | skeletons whose meshes carry blendshapes, promoted to Skeleton+BlendShape |
//!
//! Filenames are derived from the scene tokens, which come from the scene
//! file name, then namespaces, then the found items themselves.

use animbatch_model::names::{bare_name, canonical_root_name, leaf_name, namespace_of};
use animbatch_model::naming::{build_filename, deduplicate_filenames};
use animbatch_model::{ExportItem, ItemKind, SceneTokens};
use animbatch_scene::{NodeId, NodeType, SceneGraph};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::bake::blend_shape_weights;
use crate::pipeline::{joint_set, meshes_under, skinned_meshes};

/// Camera names every scene has.
const DEFAULT_CAMERAS: &[&str] = &[
    "persp", "top", "front", "side", "back", "bottom", "left", "right",
];

#[derive(Debug, Clone, PartialEq)]
struct Found {
    node: NodeId,
    path: String,
    display: String,
    ns_or_name: String,
}

/// Blendshape data attached to a skeleton.
#[derive(Debug, Clone, Default, PartialEq)]
struct Combo {
    bs_meshes: Vec<String>,
    bs_nodes: Vec<String>,
    bs_weight_attrs: Vec<String>,
}

/// What a scan found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub items: Vec<ExportItem>,
    #[serde(skip)]
    pub tokens: SceneTokens,
    pub cameras: usize,
    pub skeletons: usize,
    pub skeletons_with_blend_shapes: usize,
    pub blend_shape_groups: usize,
}

impl ScanReport {
    /// One-line scan summary.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Scan complete: {} item(s) found ({} cameras, {} skeletons",
            self.items.len(),
            self.cameras,
            self.skeletons
        );
        if self.skeletons_with_blend_shapes > 0 {
            line.push_str(&format!(" ({} with BlendShape)", self.skeletons_with_blend_shapes));
        }
        line.push_str(&format!(", {} blendshape groups).", self.blend_shape_groups));
        line
    }
}

fn display_name(path: &str) -> String {
    leaf_name(path).trim_start_matches(':').to_string()
}

/// Non-default camera transforms, sorted by path.
fn find_cameras(scene: &dyn SceneGraph) -> Vec<Found> {
    let mut found: Vec<Found> = scene
        .list_by_type(NodeType::Camera)
        .into_iter()
        .filter_map(|shape| {
            let transform = scene.parent(shape)?;
            if scene.is_startup_camera(transform) || scene.is_startup_camera(shape) {
                return None;
            }
            let path = scene.path_of(transform).ok()?;
            if DEFAULT_CAMERAS.contains(&bare_name(&path)) {
                return None;
            }
            let display = display_name(&path);
            Some(Found {
                node: transform,
                path,
                ns_or_name: display.clone(),
                display,
            })
        })
        .collect();
    found.sort_by(|a, b| a.path.cmp(&b.path));
    found.dedup_by(|a, b| a.node == b.node);
    found
}

/// One root joint per character.
///
/// Root joints in the same namespace belong to one character; the one
/// named `root` wins, else the one with the most joints below it.
fn find_characters(scene: &dyn SceneGraph) -> Vec<Found> {
    let mut groups: BTreeMap<String, Vec<(NodeId, String)>> = BTreeMap::new();
    for joint in scene.list_by_type(NodeType::Joint) {
        let is_root = match scene.parent(joint) {
            Some(p) => scene.node_type(p).ok() != Some(NodeType::Joint),
            None => true,
        };
        if !is_root {
            continue;
        }
        let Ok(path) = scene.path_of(joint) else {
            continue;
        };
        let key = match namespace_of(&path) {
            Some(ns) => ns.to_string(),
            None => path.clone(),
        };
        groups.entry(key).or_default().push((joint, path));
    }

    groups
        .into_iter()
        .filter_map(|(key, candidates)| {
            let named_root = candidates
                .iter()
                .find(|(_, p)| bare_name(p).eq_ignore_ascii_case("root"));
            let (node, path) = match named_root {
                Some(c) => c.clone(),
                None => candidates
                    .iter()
                    .max_by_key(|(id, p)| {
                        (scene.descendants(*id, Some(NodeType::Joint)).len(), std::cmp::Reverse(p.clone()))
                    })?
                    .clone(),
            };
            let ns_or_name = match namespace_of(&path) {
                Some(ns) => ns.to_string(),
                None => bare_name(&key).to_string(),
            };
            Some(Found {
                node,
                path,
                display: ns_or_name.clone(),
                ns_or_name,
            })
        })
        .collect()
}

fn mesh_transform(scene: &dyn SceneGraph, geometry: NodeId) -> Option<NodeId> {
    match scene.node_type(geometry).ok()? {
        NodeType::Mesh => scene.parent(geometry),
        NodeType::Transform => Some(geometry),
        _ => None,
    }
}

/// One blendshape mesh per namespace: the one whose blendshapes carry the
/// most weights. Meshes outside namespaces form their own groups.
fn find_blend_shape_groups(scene: &dyn SceneGraph) -> Vec<Found> {
    let mut groups: BTreeMap<String, (NodeId, String, usize)> = BTreeMap::new();
    for bs in scene.list_by_type(NodeType::BlendShape) {
        for geometry in scene.blend_shape_geometry(bs) {
            let Some(mesh) = mesh_transform(scene, geometry) else {
                continue;
            };
            let Ok(path) = scene.path_of(mesh) else {
                continue;
            };
            let weights = blend_shape_weights(scene, mesh).map_or(0, |w| w.len());
            let key = match namespace_of(&path) {
                Some(ns) => ns.to_string(),
                None => path.clone(),
            };
            let better = groups.get(&key).map_or(true, |(_, _, best)| weights > *best);
            if better {
                groups.insert(key, (mesh, path, weights));
            }
        }
    }

    groups
        .into_values()
        .map(|(node, path, _)| {
            let ns_or_name = match namespace_of(&path) {
                Some(ns) => ns.to_string(),
                None => bare_name(&path).to_string(),
            };
            Found {
                node,
                display: format!("{} ({})", ns_or_name, bare_name(&path)),
                path,
                ns_or_name,
            }
        })
        .collect()
}

/// Top-most ancestor of `node`.
fn top_node(scene: &dyn SceneGraph, node: NodeId) -> NodeId {
    let mut top = node;
    while let Some(parent) = scene.parent(top) {
        top = parent;
    }
    top
}

/// Blendshape data on the character's skinned meshes, or on the meshes
/// under its top node when nothing is skinned to it.
fn find_combo(scene: &dyn SceneGraph, root: NodeId) -> Option<Combo> {
    let joints = joint_set(scene, root);
    let mut meshes = skinned_meshes(scene, &joints).0;
    if meshes.is_empty() {
        meshes = meshes_under(scene, top_node(scene, root));
    }

    let mut combo = Combo::default();
    for mesh in meshes {
        let Some(weights) = blend_shape_weights(scene, mesh) else {
            continue;
        };
        if weights.is_empty() {
            continue;
        }
        if let Ok(path) = scene.path_of(mesh) {
            combo.bs_meshes.push(path);
        }
        for deformer in scene.history(mesh) {
            if scene.node_type(deformer).ok() != Some(NodeType::BlendShape) {
                continue;
            }
            if let Ok(path) = scene.path_of(deformer) {
                if !combo.bs_nodes.contains(&path) {
                    combo.bs_nodes.push(path);
                }
            }
        }
        for attr in weights {
            if !combo.bs_weight_attrs.contains(&attr) {
                combo.bs_weight_attrs.push(attr);
            }
        }
    }
    (!combo.bs_weight_attrs.is_empty()).then_some(combo)
}

/// Scans the scene and names every item.
pub fn scan_scene(scene: &dyn SceneGraph) -> ScanReport {
    let cameras = find_cameras(scene);
    let characters = find_characters(scene);
    let bs_groups = find_blend_shape_groups(scene);

    let mut tokens = SceneTokens::from_scene(&scene.scene_name(), &scene.namespaces());
    if !tokens.is_complete() {
        let sources = characters
            .iter()
            .flat_map(|c| [c.ns_or_name.as_str(), c.path.as_str(), c.display.as_str()])
            .chain(cameras.iter().flat_map(|c| [c.path.as_str(), c.display.as_str()]))
            .chain(
                bs_groups
                    .iter()
                    .flat_map(|b| [b.ns_or_name.as_str(), b.path.as_str(), b.display.as_str()]),
            );
        tokens.fill_missing_from_sources(sources);
        if !tokens.is_complete() {
            warn!(
                project = %tokens.project,
                scene = %tokens.scene,
                shot = %tokens.shot,
                "token inference incomplete: filenames may miss project/scene/shot"
            );
        }
    }

    let mut items = Vec::new();
    for cam in &cameras {
        items.push(
            ExportItem::new(ItemKind::Camera, &cam.path, &cam.display)
                .with_ns_or_name(&cam.ns_or_name)
                .with_filename(build_filename(ItemKind::Camera, &cam.path, &tokens, "")),
        );
    }

    let mut with_bs = 0;
    for ch in &characters {
        let mut item = ExportItem::new(ItemKind::Skeleton, &ch.path, &ch.display)
            .with_ns_or_name(&ch.ns_or_name)
            .with_filename(build_filename(ItemKind::Skeleton, &ch.ns_or_name, &tokens, ""));
        let bare = bare_name(&ch.path);
        if canonical_root_name(bare) != bare {
            item.message = format!("Root bone \"{}\" will be renamed to \"Root\" during export", bare);
        }
        if let Some(combo) = find_combo(scene, ch.node) {
            item.kind = ItemKind::SkeletonBlendShape;
            item.name = format!("{} (+BS)", ch.display);
            item.filename =
                build_filename(ItemKind::SkeletonBlendShape, &ch.ns_or_name, &tokens, "");
            debug!(
                character = %ch.ns_or_name,
                meshes = combo.bs_meshes.len(),
                weights = combo.bs_weight_attrs.len(),
                "promoted skeleton to skeleton+blendshape"
            );
            item.bs_meshes = combo.bs_meshes;
            item.bs_nodes = combo.bs_nodes;
            item.bs_weight_attrs = combo.bs_weight_attrs;
            with_bs += 1;
        }
        items.push(item);
    }

    for bs in &bs_groups {
        items.push(
            ExportItem::new(ItemKind::BlendShape, &bs.path, &bs.display)
                .with_ns_or_name(&bs.ns_or_name)
                .with_filename(build_filename(ItemKind::BlendShape, &bs.ns_or_name, &tokens, "")),
        );
    }

    deduplicate_filenames(&mut items, &tokens);
    for (i, item) in items.iter().enumerate() {
        debug!(
            index = i + 1,
            kind = %item.kind,
            ns_or_name = %item.ns_or_name,
            filename = %item.filename,
            "scan item"
        );
    }

    let report = ScanReport {
        items,
        tokens,
        cameras: cameras.len(),
        skeletons: characters.len(),
        skeletons_with_blend_shapes: with_bs,
        blend_shape_groups: bs_groups.len(),
    };
    info!("{}", report.summary());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use animbatch_scene::MemoryScene;
    use pretty_assertions::assert_eq;

    fn shot() -> MemoryScene {
        let mut scene = MemoryScene::new("/shots/Proj_SceneA01_Shot010_v003.ma");
        scene.add_camera("persp", None);
        let startup = scene.add_camera("top", None);
        scene.set_startup(startup, true);
        scene.add_camera("shotCam", None);

        let hero = scene.add_node("hero_Rig:pelvis", NodeType::Joint, None);
        scene.add_node("hero_Rig:spine", NodeType::Joint, Some(hero));
        let body = scene.add_mesh("hero_Rig:body", None);
        scene.add_skin_cluster("skinCluster1", &[body], &[hero]);
        scene.add_blend_shape("hero_Rig:faceBS", &[body], &[Some("Smile"), Some("Blink")]);

        let grp = scene.add_node("prop_grp", NodeType::Transform, None);
        scene.add_node("Root", NodeType::Joint, Some(grp));
        scene
    }

    #[test]
    fn test_scan_finds_every_kind() {
        let scene = shot();
        let report = scan_scene(&scene);
        let kinds: Vec<(ItemKind, &str)> = report
            .items
            .iter()
            .map(|i| (i.kind, i.node.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ItemKind::Camera, "|shotCam"),
                (ItemKind::SkeletonBlendShape, "|hero_Rig:pelvis"),
                (ItemKind::Skeleton, "|prop_grp|Root"),
                (ItemKind::BlendShape, "|hero_Rig:body"),
            ]
        );
        assert_eq!(
            report.summary(),
            "Scan complete: 4 item(s) found (1 cameras, 2 skeletons (1 with BlendShape), 1 blendshape groups)."
        );
    }

    #[test]
    fn test_scan_names_and_notices() {
        let scene = shot();
        let report = scan_scene(&scene);
        let by_node = |node: &str| report.items.iter().find(|i| i.node == node).unwrap();

        assert_eq!(by_node("|shotCam").filename, "Cam_Proj_SceneA01_Shot010.fbx");
        let hero = by_node("|hero_Rig:pelvis");
        assert_eq!(hero.filename, "A_Proj_hero_SceneA01_Shot010.fbx");
        assert_eq!(
            hero.message,
            "Root bone \"pelvis\" will be renamed to \"Root\" during export"
        );
        assert_eq!(hero.bs_weight_attrs, vec!["hero_Rig:faceBS.Smile", "hero_Rig:faceBS.Blink"]);
        assert_eq!(hero.bs_meshes, vec!["|hero_Rig:body"]);
        assert_eq!(by_node("|prop_grp|Root").message, "");
        assert_eq!(by_node("|hero_Rig:body").filename, "A_Proj_hero_SceneA01_Shot010_Face.fbx");
    }

    #[test]
    fn test_character_prefers_root_named_joint() {
        let mut scene = MemoryScene::new("untitled.ma");
        let big = scene.add_node("npc:hips", NodeType::Joint, None);
        scene.add_node("npc:spine", NodeType::Joint, Some(big));
        scene.add_node("npc:root", NodeType::Joint, None);
        let report = scan_scene(&scene);
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].node, "|npc:root");
        assert_eq!(report.items[0].ns_or_name, "npc");
    }

    #[test]
    fn test_blend_shape_group_picks_most_weights() {
        let mut scene = MemoryScene::new("untitled.ma");
        let brows = scene.add_mesh("npc:brows", None);
        let head = scene.add_mesh("npc:head", None);
        scene.add_blend_shape("npc:browBS", &[brows], &[Some("Up")]);
        scene.add_blend_shape("npc:faceBS", &[head], &[Some("Smile"), Some("Jaw")]);
        let report = scan_scene(&scene);
        assert_eq!(report.blend_shape_groups, 1);
        assert_eq!(report.items[0].node, "|npc:head");
        assert_eq!(report.items[0].name, "npc (head)");
    }
}
