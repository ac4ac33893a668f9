//! JSON scene descriptions.
//!
//! ```json
//! {
//!   "scene_name": "D:/shots/Proj_SceneA01_Shot010.ma",
//!   "time_unit": "film",
//!   "playback": [1, 48],
//!   "nodes": [
//!     { "name": "hero:root", "type": "joint", "referenced": true,
//!       "keys": { "rotateY": [[1, 0], [48, 90]] } },
//!     { "name": "hero:body", "type": "mesh" }
//!   ],
//!   "skin_clusters": [
//!     { "name": "hero:skin1", "geometry": ["hero:body"], "influences": ["hero:root"] }
//!   ]
//! }
//! ```
//!
//! Nodes are created in order, so a parent must appear before its children.
//! A `mesh` or `camera` node creates a transform with a shape child.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::{SceneError, SceneResult};
use crate::graph::{ConstraintKind, NodeId, NodeType, SceneGraph};

use super::MemoryScene;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    pub scene_name: String,
    pub time_unit: Option<String>,
    pub playback: Option<[f64; 2]>,
    pub current_time: Option<f64>,
    pub nodes: Vec<NodeDescription>,
    pub skin_clusters: Vec<SkinClusterDescription>,
    pub blend_shapes: Vec<BlendShapeDescription>,
    pub connections: Vec<ConnectionDescription>,
    pub constraints: Vec<ConstraintDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: NodeType,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub referenced: bool,
    #[serde(default)]
    pub startup: bool,
    #[serde(default)]
    pub locked_node: bool,
    #[serde(default)]
    pub attrs: BTreeMap<String, f64>,
    #[serde(default)]
    pub keys: BTreeMap<String, Vec<[f64; 2]>>,
    #[serde(default)]
    pub locked: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkinClusterDescription {
    pub name: String,
    pub geometry: Vec<String>,
    pub influences: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlendShapeDescription {
    pub name: String,
    pub geometry: Vec<String>,
    /// Weight aliases; `null` leaves a weight unaliased.
    pub weights: Vec<Option<String>>,
    #[serde(default)]
    pub keys: BTreeMap<String, Vec<[f64; 2]>>,
    #[serde(default)]
    pub referenced: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionDescription {
    /// Source plug, `node.attr`.
    pub from: String,
    /// Destination plug, `node.attr`.
    pub to: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKindDescription {
    Parent,
    Orient,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConstraintDescription {
    pub kind: ConstraintKindDescription,
    pub driver: String,
    pub driven: String,
}

impl SceneDescription {
    /// Builds the described scene.
    pub fn build(&self) -> SceneResult<MemoryScene> {
        let mut scene = MemoryScene::new(self.scene_name.clone());
        if let Some(unit) = &self.time_unit {
            scene.set_time_unit(unit)?;
        }
        if let Some([start, end]) = self.playback {
            scene.set_playback_range(start, end);
        }

        let mut referenced = Vec::new();
        for desc in &self.nodes {
            let parent = match &desc.parent {
                Some(p) => Some(resolve(&scene, p)?),
                None => None,
            };
            let id = match desc.ty {
                NodeType::Mesh => scene.add_mesh(&desc.name, parent),
                NodeType::Camera => scene.add_camera(&desc.name, parent),
                ty => scene.add_node(&desc.name, ty, parent),
            };
            for (attr, value) in &desc.attrs {
                let target = attr_target(&scene, id, attr);
                scene.set_value(target, attr, *value);
            }
            for (attr, keys) in &desc.keys {
                let target = attr_target(&scene, id, attr);
                let keys: Vec<(f64, f64)> = keys.iter().map(|[t, v]| (*t, *v)).collect();
                scene.set_keys(target, attr, &keys);
            }
            for attr in &desc.locked {
                let target = attr_target(&scene, id, attr);
                scene.set_locked(target, attr, true)?;
            }
            if desc.startup {
                scene.set_startup(id, true);
            }
            if desc.locked_node {
                scene.set_node_locked(id, true);
            }
            if desc.referenced {
                referenced.push(id);
            }
        }
        // Flag after creation so children listed later inherit it.
        for id in referenced {
            scene.set_referenced_tree(id);
        }

        for skin in &self.skin_clusters {
            let geometry = resolve_all(&scene, &skin.geometry)?;
            let influences = resolve_all(&scene, &skin.influences)?;
            scene.add_skin_cluster(&skin.name, &geometry, &influences);
        }

        for bs in &self.blend_shapes {
            let geometry = resolve_all(&scene, &bs.geometry)?;
            let aliases: Vec<Option<&str>> = bs.weights.iter().map(|w| w.as_deref()).collect();
            let id = scene.add_blend_shape(&bs.name, &geometry, &aliases);
            for (attr, keys) in &bs.keys {
                let keys: Vec<(f64, f64)> = keys.iter().map(|[t, v]| (*t, *v)).collect();
                scene.set_keys(id, attr, &keys);
            }
            if bs.referenced {
                scene.set_referenced(id, true);
            }
        }

        for conn in &self.connections {
            let src = scene
                .resolve_plug(&conn.from)
                .ok_or_else(|| SceneError::Parse(format!("unknown plug: {}", conn.from)))?;
            let dst = scene
                .resolve_plug(&conn.to)
                .ok_or_else(|| SceneError::Parse(format!("unknown plug: {}", conn.to)))?;
            scene.connect_attr(&src, &dst)?;
        }

        for c in &self.constraints {
            let driver = resolve(&scene, &c.driver)?;
            let driven = resolve(&scene, &c.driven)?;
            let kind = match c.kind {
                ConstraintKindDescription::Parent => ConstraintKind::Parent,
                ConstraintKindDescription::Orient => ConstraintKind::Orient,
            };
            scene.constrain(kind, driver, driven)?;
        }

        if let Some(t) = self.current_time {
            scene.set_current_time(t);
        } else {
            let (start, _) = scene.playback_range();
            scene.set_current_time(start);
        }
        Ok(scene)
    }
}

fn resolve(scene: &MemoryScene, path: &str) -> SceneResult<NodeId> {
    scene
        .lookup(path)
        .ok_or_else(|| SceneError::Parse(format!("unknown or ambiguous node: {}", path)))
}

fn resolve_all(scene: &MemoryScene, paths: &[String]) -> SceneResult<Vec<NodeId>> {
    paths.iter().map(|p| resolve(scene, p)).collect()
}

/// Lens attributes given on a camera transform belong to its shape.
fn attr_target(scene: &MemoryScene, id: NodeId, attr: &str) -> NodeId {
    if scene.has_attr(id, attr) {
        return id;
    }
    scene
        .children(id, None)
        .into_iter()
        .find(|c| scene.has_attr(*c, attr))
        .unwrap_or(id)
}
