//! The scene graph facade.
//!
//! Every pipeline talks to the host scene through [`SceneGraph`]. Nodes are
//! addressed by [`NodeId`], a stable identity that survives renames and
//! reparenting. Path strings are always derived from the current hierarchy
//! and are never used as keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::SceneResult;
use crate::settings::FbxSettings;

/// Stable identity of a scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node categories the pipelines distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Transform,
    Joint,
    Mesh,
    Camera,
    SkinCluster,
    BlendShape,
    ParentConstraint,
    OrientConstraint,
}

impl NodeType {
    /// Host type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Transform => "transform",
            NodeType::Joint => "joint",
            NodeType::Mesh => "mesh",
            NodeType::Camera => "camera",
            NodeType::SkinCluster => "skinCluster",
            NodeType::BlendShape => "blendShape",
            NodeType::ParentConstraint => "parentConstraint",
            NodeType::OrientConstraint => "orientConstraint",
        }
    }

    /// True for nodes that carry the nine transform channels.
    pub fn is_transform_like(&self) -> bool {
        matches!(self, NodeType::Transform | NodeType::Joint)
    }

    /// True for shape nodes living under a transform.
    pub fn is_shape(&self) -> bool {
        matches!(self, NodeType::Mesh | NodeType::Camera)
    }

    /// True for deformers, which sit outside the DAG.
    pub fn is_deformer(&self) -> bool {
        matches!(self, NodeType::SkinCluster | NodeType::BlendShape)
    }

    /// True for constraint nodes.
    pub fn is_constraint(&self) -> bool {
        matches!(self, NodeType::ParentConstraint | NodeType::OrientConstraint)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attribute on a specific node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Plug {
    pub node: NodeId,
    pub attr: String,
}

impl Plug {
    pub fn new(node: NodeId, attr: impl Into<String>) -> Self {
        Self {
            node,
            attr: attr.into(),
        }
    }
}

/// Local or world transform sample.
///
/// Composition is componentwise: translations and rotations add, scales
/// multiply. That keeps world/local conversion exact and invertible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Xform {
    pub translate: [f64; 3],
    pub rotate: [f64; 3],
    pub scale: [f64; 3],
}

impl Default for Xform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Xform {
    pub const IDENTITY: Xform = Xform {
        translate: [0.0; 3],
        rotate: [0.0; 3],
        scale: [1.0; 3],
    };

    /// Applies a child's local transform under `self`.
    pub fn compose(&self, local: &Xform) -> Xform {
        let mut out = Xform::IDENTITY;
        for i in 0..3 {
            out.translate[i] = self.translate[i] + local.translate[i];
            out.rotate[i] = self.rotate[i] + local.rotate[i];
            out.scale[i] = self.scale[i] * local.scale[i];
        }
        out
    }

    /// Local transform that places a child at `world` under `self`.
    pub fn relative(&self, world: &Xform) -> Xform {
        let mut out = Xform::IDENTITY;
        for i in 0..3 {
            out.translate[i] = world.translate[i] - self.translate[i];
            out.rotate[i] = world.rotate[i] - self.rotate[i];
            out.scale[i] = if self.scale[i].abs() > f64::EPSILON {
                world.scale[i] / self.scale[i]
            } else {
                world.scale[i]
            };
        }
        out
    }

    /// Value of one of the nine channels by name.
    pub fn channel(&self, name: &str) -> Option<f64> {
        let idx = TRANSFORM_CHANNELS.iter().position(|c| *c == name)?;
        Some(match idx / 3 {
            0 => self.translate[idx % 3],
            1 => self.rotate[idx % 3],
            _ => self.scale[idx % 3],
        })
    }

    /// Channel name and value pairs in channel order.
    pub fn channels(&self) -> [(&'static str, f64); 9] {
        let mut out = [("", 0.0); 9];
        for (i, name) in TRANSFORM_CHANNELS.iter().enumerate() {
            let v = match i / 3 {
                0 => self.translate[i % 3],
                1 => self.rotate[i % 3],
                _ => self.scale[i % 3],
            };
            out[i] = (*name, v);
        }
        out
    }
}

/// The nine keyable transform channels.
pub const TRANSFORM_CHANNELS: [&str; 9] = [
    "translateX",
    "translateY",
    "translateZ",
    "rotateX",
    "rotateY",
    "rotateZ",
    "scaleX",
    "scaleY",
    "scaleZ",
];

/// Translation and rotation channels, the ones that carry motion.
pub const MOTION_CHANNELS: [&str; 6] = [
    "translateX",
    "translateY",
    "translateZ",
    "rotateX",
    "rotateY",
    "rotateZ",
];

/// Lens and film attributes of a camera shape, with their creation defaults.
pub const CAMERA_SHAPE_ATTRS: [(&str, f64); 18] = [
    ("focalLength", 35.0),
    ("horizontalFilmAperture", 1.417),
    ("verticalFilmAperture", 0.945),
    ("horizontalFilmOffset", 0.0),
    ("verticalFilmOffset", 0.0),
    ("lensSqueezeRatio", 1.0),
    ("filmFit", 1.0),
    ("filmFitOffset", 0.0),
    ("nearClipPlane", 0.1),
    ("farClipPlane", 10000.0),
    ("fStop", 5.6),
    ("focusDistance", 5.0),
    ("shutterAngle", 144.0),
    ("orthographicWidth", 30.0),
    ("panZoomEnabled", 0.0),
    ("horizontalPan", 0.0),
    ("verticalPan", 0.0),
    ("zoom", 1.0),
];

/// Attribute name of a blendshape weight: its alias, or `weight[i]`.
pub fn weight_attr_name(alias: Option<&str>, index: usize) -> String {
    match alias {
        Some(a) if !a.is_empty() => a.to_string(),
        _ => format!("weight[{}]", index),
    }
}

/// How much of the upstream graph a duplicate takes along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateMode {
    /// Duplicate the hierarchy and return only its root.
    RootsOnly,
    /// Duplicate the hierarchy with its upstream deformers and curves.
    UpstreamNodes,
    /// Plain duplicate, the fallback when the other modes fail.
    Plain,
}

/// Constraint flavours used to drive duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Translation and rotation.
    Parent,
    /// Rotation only.
    Orient,
}

impl ConstraintKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            ConstraintKind::Parent => NodeType::ParentConstraint,
            ConstraintKind::Orient => NodeType::OrientConstraint,
        }
    }
}

/// The host scene as the export engine sees it.
///
/// All calls may fail. Queries that cannot fail return plain values and
/// yield empty results for unknown nodes.
pub trait SceneGraph {
    // ========== Identity ==========

    /// Resolves a full (`|a|b`) or partial (`b`, `a|b`) path to a node.
    /// Ambiguous partial paths resolve to nothing.
    fn lookup(&self, path: &str) -> Option<NodeId>;

    fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    fn is_alive(&self, id: NodeId) -> bool;

    /// Current full path of a node.
    fn path_of(&self, id: NodeId) -> SceneResult<String>;

    /// Current leaf name of a node, namespace included.
    fn name_of(&self, id: NodeId) -> SceneResult<String>;

    fn node_type(&self, id: NodeId) -> SceneResult<NodeType>;

    /// True when the node comes from an external reference.
    fn is_referenced(&self, id: NodeId) -> bool;

    // ========== Hierarchy ==========

    fn parent(&self, id: NodeId) -> Option<NodeId>;

    fn children(&self, id: NodeId, filter: Option<NodeType>) -> Vec<NodeId>;

    /// All DAG descendants in depth-first pre-order, optionally filtered.
    fn descendants(&self, id: NodeId, filter: Option<NodeType>) -> Vec<NodeId>;

    /// Nodes whose leaf name equals `name` exactly (root namespace only
    /// unless `name` carries its own namespace).
    fn find_by_name(&self, name: &str) -> Vec<NodeId>;

    fn list_by_type(&self, ty: NodeType) -> Vec<NodeId>;

    // ========== Deformers ==========

    /// Deformers in the construction history of a mesh transform or shape.
    fn history(&self, id: NodeId) -> Vec<NodeId>;

    /// Skin clusters a joint influences.
    fn skin_clusters(&self, joint: NodeId) -> Vec<NodeId>;

    /// Mesh transforms bound by a skin cluster.
    fn skin_geometry(&self, skin: NodeId) -> Vec<NodeId>;

    fn skin_influences(&self, skin: NodeId) -> Vec<NodeId>;

    /// Mesh transforms deformed by a blendshape.
    fn blend_shape_geometry(&self, blend_shape: NodeId) -> Vec<NodeId>;

    /// Weight aliases of a blendshape, `None` where a weight has no alias.
    fn weight_aliases(&self, blend_shape: NodeId) -> Vec<Option<String>>;

    // ========== Attributes ==========

    fn has_attr(&self, id: NodeId, attr: &str) -> bool;

    /// Value at the current time.
    fn get_attr(&self, id: NodeId, attr: &str) -> SceneResult<f64>;

    /// Value evaluated at `frame`.
    fn get_attr_at(&self, id: NodeId, attr: &str, frame: f64) -> SceneResult<f64>;

    fn set_attr(&mut self, id: NodeId, attr: &str, value: f64) -> SceneResult<()>;

    fn add_attr(&mut self, id: NodeId, attr: &str, value: f64) -> SceneResult<()>;

    fn is_locked(&self, id: NodeId, attr: &str) -> bool;

    fn set_locked(&mut self, id: NodeId, attr: &str, locked: bool) -> SceneResult<()>;

    /// Unlocks the nine transform channels.
    fn unlock_channels(&mut self, id: NodeId) -> SceneResult<()> {
        for channel in TRANSFORM_CHANNELS {
            self.set_locked(id, channel, false)?;
        }
        Ok(())
    }

    /// The plug feeding `attr`, if it has an incoming connection.
    fn input_source(&self, id: NodeId, attr: &str) -> Option<Plug>;

    fn connect_attr(&mut self, src: &Plug, dst: &Plug) -> SceneResult<()>;

    fn disconnect_attr(&mut self, dst: &Plug) -> SceneResult<()>;

    /// Resolves a qualified `node.attr` reference.
    fn resolve_plug(&self, qualified: &str) -> Option<Plug> {
        let (node, attr) = qualified.split_once('.')?;
        let id = self.lookup(node)?;
        if self.has_attr(id, attr) {
            Some(Plug::new(id, attr))
        } else {
            None
        }
    }

    // ========== Transforms ==========

    fn world_transform(&self, id: NodeId, frame: f64) -> SceneResult<Xform>;

    /// Writes local channels so the node sits at `world` at the current time.
    fn set_world_transform(&mut self, id: NodeId, world: &Xform) -> SceneResult<()>;

    // ========== Keys ==========

    /// Keys the current value of `attr` at the current time.
    fn set_key(&mut self, id: NodeId, attr: &str) -> SceneResult<()>;

    /// Keys all nine transform channels at the current time.
    fn key_transform(&mut self, id: NodeId) -> SceneResult<()> {
        for channel in TRANSFORM_CHANNELS {
            self.set_key(id, channel)?;
        }
        Ok(())
    }

    /// First and last key across every attribute of the node.
    fn key_range(&self, id: NodeId) -> Option<(f64, f64)>;

    /// Key times of one attribute.
    fn key_times(&self, id: NodeId, attr: &str) -> Vec<f64>;

    /// Removes keys before `start` and after `end` on every attribute.
    fn cut_keys_outside(&mut self, id: NodeId, start: f64, end: f64) -> SceneResult<()>;

    /// Samples every plug at each integer frame of `[start, end]` and
    /// replaces its animation with those keys. Returns the number of plugs
    /// baked.
    fn bake(&mut self, plugs: &[Plug], start: f64, end: f64) -> SceneResult<usize>;

    // ========== Time ==========

    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, frame: f64);

    fn playback_range(&self) -> (f64, f64);

    fn set_playback_range(&mut self, start: f64, end: f64);

    fn time_unit(&self) -> String;

    fn set_time_unit(&mut self, unit: &str) -> SceneResult<()>;

    /// Frames per second of the current time unit, if known.
    fn fps(&self) -> Option<f64>;

    // ========== Mutation ==========

    /// Creates a camera transform with a camera shape child.
    fn create_camera(&mut self, name: &str) -> SceneResult<NodeId>;

    /// Duplicates a node and its DAG descendants, returning the new root.
    fn duplicate(&mut self, id: NodeId, mode: DuplicateMode) -> SceneResult<NodeId>;

    /// Deletes a node, its descendants and any constraint under them.
    fn delete(&mut self, id: NodeId) -> SceneResult<()>;

    /// Renames a node. A leading `:` targets the root namespace. Returns
    /// the name the node actually received.
    fn rename(&mut self, id: NodeId, new_name: &str) -> SceneResult<String>;

    /// Moves a node to the top level, keeping its world position.
    fn reparent_to_world(&mut self, id: NodeId) -> SceneResult<()>;

    /// Creates a constraint driving `driven` from `driver`. `Ok(None)` means
    /// the host reported success but returned no node.
    fn constrain(
        &mut self,
        kind: ConstraintKind,
        driver: NodeId,
        driven: NodeId,
    ) -> SceneResult<Option<NodeId>>;

    // ========== Selection ==========

    fn select(&mut self, ids: &[NodeId]);

    fn selection(&self) -> Vec<NodeId>;

    // ========== Undo ==========

    fn open_undo_chunk(&mut self) -> SceneResult<()>;

    fn close_undo_chunk(&mut self) -> SceneResult<()>;

    /// Reverts the last closed chunk.
    fn undo(&mut self) -> SceneResult<()>;

    // ========== Namespaces ==========

    /// All namespaces in use, nested ones included (`A`, `A:B`).
    fn namespaces(&self) -> Vec<String>;

    fn namespace_exists(&self, namespace: &str) -> bool {
        self.namespaces().iter().any(|n| n == namespace)
    }

    /// Moves the contents of `namespace` into the root namespace.
    fn merge_namespace_with_root(&mut self, namespace: &str) -> SceneResult<()>;

    // ========== Host ==========

    /// Scene file path, empty for an unsaved scene.
    fn scene_name(&self) -> String;

    fn is_startup_camera(&self, _id: NodeId) -> bool {
        false
    }

    /// Makes sure the exporter is available.
    fn ensure_exporter(&mut self) -> bool;

    /// Exports the current selection and its descendants.
    fn export_selection(&mut self, path: &Path, settings: &FbxSettings) -> SceneResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xform_relative_inverts_compose() {
        let parent = Xform {
            translate: [1.0, 2.0, 3.0],
            rotate: [0.0, 90.0, 0.0],
            scale: [2.0, 2.0, 2.0],
        };
        let local = Xform {
            translate: [0.5, 0.0, -1.0],
            rotate: [10.0, 0.0, 0.0],
            scale: [1.0, 0.5, 1.0],
        };
        let world = parent.compose(&local);
        assert_eq!(parent.relative(&world), local);
    }

    #[test]
    fn test_channel_lookup() {
        let x = Xform {
            translate: [1.0, 2.0, 3.0],
            ..Xform::IDENTITY
        };
        assert_eq!(x.channel("translateY"), Some(2.0));
        assert_eq!(x.channel("scaleZ"), Some(1.0));
        assert_eq!(x.channel("visibility"), None);
    }

    #[test]
    fn test_weight_attr_name_fallback() {
        assert_eq!(weight_attr_name(Some("Smile"), 0), "Smile");
        assert_eq!(weight_attr_name(None, 3), "weight[3]");
        assert_eq!(weight_attr_name(Some(""), 1), "weight[1]");
    }
}
