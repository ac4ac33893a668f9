//! Animbatch Model Library
//!
//! This crate provides the plain data types shared by every stage of a batch
//! animation export: the items a scan produces, the option snapshot every
//! pipeline receives, the structured result every pipeline returns, and the
//! pure naming helpers used to derive bare node names and output filenames.
//!
//! Nothing in this crate touches a scene graph. Scene access lives in
//! `animbatch-scene`, and the export orchestration in `animbatch-engine`.
//!
//! # Example
//!
//! ```
//! use animbatch_model::{ExportItem, ItemKind, SceneTokens};
//! use animbatch_model::naming::build_skeleton_filename;
//!
//! let tokens = SceneTokens::from_text("Proj_SceneA01_Shot010_v003");
//! assert_eq!(tokens.project, "Proj");
//!
//! let filename = build_skeleton_filename("hero_Rig2", &tokens, "");
//! assert_eq!(filename, "A_Proj_hero_SceneA01_Shot010.fbx");
//!
//! let item = ExportItem::new(ItemKind::Skeleton, "|hero_Rig2:root", "hero_Rig2:root")
//!     .with_filename(filename);
//! assert!(item.selected);
//! ```
//!
//! # Modules
//!
//! - [`error`]: Error codes and the option loading error
//! - [`item`]: Export items, their kinds and statuses
//! - [`options`]: The FBX export option snapshot
//! - [`range`]: Integer frame ranges
//! - [`result`]: Per-item export results and their builder
//! - [`names`]: Namespace stripping and canonical root naming
//! - [`naming`]: Scene tokens and output filename templating
//! - [`report`]: The per-session text report

pub mod error;
pub mod item;
pub mod names;
pub mod naming;
pub mod options;
pub mod range;
pub mod report;
pub mod result;

// Re-export commonly used types at the crate root
pub use error::{CodedError, ModelError, ModelResult};
pub use item::{ExportItem, ItemKind, ItemStatus};
pub use names::{canonical_root_name, strip_namespace, ROOT_BONE_NAME};
pub use naming::SceneTokens;
pub use options::FbxExportOptions;
pub use range::FrameRange;
pub use report::{LogEntry, LogSummary, SessionReport};
pub use result::{ExportResult, ExportResultBuilder};
