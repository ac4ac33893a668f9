//! Export items produced by a scene scan and consumed by the batch runner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// The kind of content an export item produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A non-default camera, exported via a throwaway baked camera.
    Camera,
    /// A character skeleton rooted at a joint.
    Skeleton,
    /// A mesh carrying blendshape deformers.
    BlendShape,
    /// A skeleton exported together with its skinned blendshape meshes.
    SkeletonBlendShape,
}

impl ItemKind {
    /// Returns the wire identifier for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Camera => "camera",
            ItemKind::Skeleton => "skeleton",
            ItemKind::BlendShape => "blendshape",
            ItemKind::SkeletonBlendShape => "skeleton+blendshape",
        }
    }

    /// Returns the human-facing label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Camera => "Camera",
            ItemKind::Skeleton => "Skeleton",
            ItemKind::BlendShape => "BlendShape",
            ItemKind::SkeletonBlendShape => "Skeleton+BlendShape",
        }
    }

    /// True for kinds that carry blendshape weight channels.
    pub fn has_blend_shapes(&self) -> bool {
        matches!(self, ItemKind::BlendShape | ItemKind::SkeletonBlendShape)
    }

    /// True for kinds whose root is a joint hierarchy.
    pub fn is_skeletal(&self) -> bool {
        matches!(self, ItemKind::Skeleton | ItemKind::SkeletonBlendShape)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "camera" => Ok(ItemKind::Camera),
            "skeleton" => Ok(ItemKind::Skeleton),
            "blendshape" | "blend_shape" => Ok(ItemKind::BlendShape),
            "skeleton+blendshape" | "skeleton_blend_shape" => Ok(ItemKind::SkeletonBlendShape),
            _ => Err(ModelError::UnknownItemKind(s.to_string())),
        }
    }
}

/// Lifecycle status of an item within one export session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Not yet processed.
    #[default]
    Pending,
    /// Currently being exported.
    Exporting,
    /// Exported successfully.
    Done,
    /// Failed during bake or export.
    Error,
    /// Skipped because the batch was cancelled.
    Cancelled,
}

impl ItemStatus {
    /// Returns the status identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Exporting => "exporting",
            ItemStatus::Done => "done",
            ItemStatus::Error => "error",
            ItemStatus::Cancelled => "cancelled",
        }
    }

    /// True once the item reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Done | ItemStatus::Error | ItemStatus::Cancelled
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exportable unit of a scene.
///
/// `node` is a scene path used as an identity reference; the item never owns
/// the node. Blendshape fields are only populated for kinds that carry
/// blendshapes, and `bs_weight_attrs` entries are always qualified as
/// `<deformer>.<attribute>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportItem {
    /// What this item exports.
    pub kind: ItemKind,
    /// Full scene path of the source node.
    pub node: String,
    /// Display name.
    pub name: String,
    /// Namespace of the source, or its bare name when it has none.
    #[serde(default)]
    pub ns_or_name: String,
    /// Output filename, editable before export.
    #[serde(default)]
    pub filename: String,
    /// Whether the item takes part in the next export.
    #[serde(default = "default_selected")]
    pub selected: bool,
    /// Current status.
    #[serde(default)]
    pub status: ItemStatus,
    /// Status message shown next to the item.
    #[serde(default)]
    pub message: String,
    /// Blendshape mesh transforms.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bs_meshes: Vec<String>,
    /// Blendshape deformer nodes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bs_nodes: Vec<String>,
    /// Qualified blendshape weight plugs to bake.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bs_weight_attrs: Vec<String>,
}

fn default_selected() -> bool {
    true
}

impl ExportItem {
    /// Creates a pending, selected item with no filename.
    pub fn new(kind: ItemKind, node: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            node: node.into(),
            name: name.into(),
            ns_or_name: String::new(),
            filename: String::new(),
            selected: true,
            status: ItemStatus::Pending,
            message: String::new(),
            bs_meshes: Vec::new(),
            bs_nodes: Vec::new(),
            bs_weight_attrs: Vec::new(),
        }
    }

    /// Sets the namespace-or-name used for filename templating.
    pub fn with_ns_or_name(mut self, ns_or_name: impl Into<String>) -> Self {
        self.ns_or_name = ns_or_name.into();
        self
    }

    /// Sets the output filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Sets the selected flag.
    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    /// Updates status and message together.
    pub fn set_status(&mut self, status: ItemStatus, message: impl Into<String>) {
        self.status = status;
        self.message = message.into();
    }

    /// Resets status and message before a new session.
    pub fn reset(&mut self) {
        self.status = ItemStatus::Pending;
        self.message.clear();
    }
}
