//! Animbatch Scene Library
//!
//! This crate defines how the export engine sees the host scene. The engine
//! never holds a scene itself; it receives a `&mut dyn SceneGraph` and does
//! every query and mutation through it.
//!
//! # Identity
//!
//! Nodes are addressed by [`NodeId`], a stable identity that survives
//! renames, namespace merges and reparenting. Paths like `|grp|ns:joint`
//! are derived from the current hierarchy on demand and are never used as
//! keys. Rename-and-restore protocols depend on this.
//!
//! # In-memory scene
//!
//! [`MemoryScene`] is an arena-backed implementation used by the CLI and
//! the test suites. It models the parts of a DCC scene the export engine
//! depends on:
//!
//! | Feature | Behavior |
//! |---------|----------|
//! | Evaluation | value at current time, then connection, then constraint, then keys, then static value |
//! | Keys | linear interpolation, clamped outside the keyed range |
//! | Undo | whole-scene snapshot per chunk |
//! | Export | synthetic ASCII FBX honoring skins, shapes, cameras and bake settings |
//! | Faults | injectable export, constraint, undo, merge and duplicate failures |
//!
//! # Example
//!
//! ```
//! use animbatch_scene::{MemoryScene, NodeType, SceneGraph};
//!
//! let mut scene = MemoryScene::new("Proj_SceneA01_Shot010.ma");
//! let root = scene.add_node("hero:root", NodeType::Joint, None);
//! let spine = scene.add_node("hero:spine", NodeType::Joint, Some(root));
//! assert_eq!(scene.path_of(spine).unwrap(), "|hero:root|hero:spine");
//!
//! scene.rename(root, ":Root").unwrap();
//! assert_eq!(scene.path_of(spine).unwrap(), "|Root|hero:spine");
//! ```
//!
//! # Crate Structure
//!
//! - [`graph`] - The [`SceneGraph`] trait and its value types
//! - [`settings`] - Exporter settings for one export call
//! - [`memory`] - The in-memory scene
//! - [`fbx_ascii`] - The synthetic FBX writer and its line parsers
//! - [`error`] - Error types

pub mod error;
pub mod fbx_ascii;
pub mod graph;
pub mod memory;
pub mod settings;

// Re-export main types for convenience
pub use error::{SceneError, SceneResult};
pub use graph::{
    weight_attr_name, ConstraintKind, DuplicateMode, NodeId, NodeType, Plug, SceneGraph, Xform,
    CAMERA_SHAPE_ATTRS, MOTION_CHANNELS, TRANSFORM_CHANNELS,
};
pub use memory::{ExportRecord, FaultInjection, MemoryScene, SceneDescription};
pub use settings::FbxSettings;
