//! Shared scenes and helpers for the integration tests.

use animbatch_engine::ExportContext;
use animbatch_model::FrameRange;
use animbatch_scene::{MemoryScene, NodeId, NodeType, SceneGraph};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Node handles of [`hero_rig`].
pub struct HeroRig {
    pub scene: MemoryScene,
    pub root: NodeId,
    pub spine: NodeId,
    pub head: NodeId,
    pub body: NodeId,
}

/// `|hero:pelvis|hero:spine|hero:head` skinning `|hero:body`, with keys
/// on the spine.
pub fn hero_rig() -> HeroRig {
    let mut scene = MemoryScene::new("shot.ma");
    let root = scene.add_node("hero:pelvis", NodeType::Joint, None);
    let spine = scene.add_node("hero:spine", NodeType::Joint, Some(root));
    let head = scene.add_node("hero:head", NodeType::Joint, Some(spine));
    scene.set_keys(spine, "rotateZ", &[(1.0, 0.0), (10.0, 45.0)]);
    let body = scene.add_mesh("hero:body", None);
    scene.add_skin_cluster("hero:skinCluster1", &[body], &[root, spine, head]);
    HeroRig {
        scene,
        root,
        spine,
        head,
        body,
    }
}

/// [`hero_rig`] plus `hero:faceBS` on the body with a keyed `Smile`.
pub fn hero_face_rig() -> HeroRig {
    let mut rig = hero_rig();
    let bs = rig
        .scene
        .add_blend_shape("hero:faceBS", &[rig.body], &[Some("Smile"), Some("Blink")]);
    rig.scene.set_keys(bs, "Smile", &[(1.0, 0.0), (10.0, 1.0)]);
    rig
}

/// Adds a camera moving along X over frames 0..100 with an animated focal
/// length. Returns the transform.
pub fn add_shot_camera(scene: &mut MemoryScene, name: &str) -> NodeId {
    let cam = scene.add_camera(name, None);
    scene.set_keys(cam, "translateX", &[(0.0, 0.0), (100.0, 100.0)]);
    let shape = scene.children(cam, Some(NodeType::Camera))[0];
    scene.set_keys(shape, "focalLength", &[(0.0, 35.0), (100.0, 85.0)]);
    cam
}

/// A shot with one camera, a character with a face blendshape and a prop
/// skeleton without meshes.
pub fn shot_scene() -> MemoryScene {
    let mut scene = MemoryScene::new("/shots/Proj_SceneA01_Shot010_v003.ma");
    scene.add_camera("persp", None);
    let top = scene.add_camera("top", None);
    scene.set_startup(top, true);
    add_shot_camera(&mut scene, "shotCam");

    let pelvis = scene.add_node("hero_Rig:pelvis", NodeType::Joint, None);
    let spine = scene.add_node("hero_Rig:spine", NodeType::Joint, Some(pelvis));
    scene.set_keys(spine, "rotateX", &[(1.0, 0.0), (24.0, 30.0)]);
    let body = scene.add_mesh("hero_Rig:body", None);
    scene.add_skin_cluster("hero_Rig:skinCluster1", &[body], &[pelvis, spine]);
    let bs = scene.add_blend_shape("hero_Rig:faceBS", &[body], &[Some("Smile"), Some("Blink")]);
    scene.set_keys(bs, "Smile", &[(1.0, 0.0), (24.0, 1.0)]);

    let grp = scene.add_node("prop_grp", NodeType::Transform, None);
    let prop = scene.add_node("Root", NodeType::Joint, Some(grp));
    scene.set_keys(prop, "translateY", &[(1.0, 0.0), (24.0, 5.0)]);
    scene
}

/// A fully referenced character, as a JSON scene description.
pub const HERO_SCENE_JSON: &str = r#"{
    "scene_name": "/shots/Proj_SceneB02_Shot020.ma",
    "time_unit": "film",
    "playback": [1, 12],
    "nodes": [
        { "name": "villain:root", "type": "joint", "referenced": true,
          "keys": { "rotateY": [[1, 0], [12, 90]] } },
        { "name": "villain:arm", "type": "joint", "parent": "villain:root", "referenced": true },
        { "name": "villain:body", "type": "mesh", "referenced": true }
    ],
    "skin_clusters": [
        { "name": "villain:skin1", "geometry": ["villain:body"], "influences": ["villain:root", "villain:arm"] }
    ]
}"#;

/// A temporary output directory.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// A context writing into this directory over `start..=end`.
    pub fn ctx(&self, start: i32, end: i32) -> ExportContext {
        ExportContext::new(self.dir.path(), FrameRange::new(start, end))
    }

    /// Reads an exported file as text; missing files read as empty.
    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.file(name)).unwrap_or_default()
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Live node count plus constraint count, for leak checks.
pub fn footprint(scene: &MemoryScene) -> (usize, usize) {
    (scene.node_count(), scene.constraint_count())
}
