//! FBX export option snapshot.
//!
//! One [`FbxExportOptions`] value is taken when a batch starts and passed by
//! reference into every pipeline call. Pipelines never mutate it; when a
//! pipeline needs a different exporter setting than the option implies it
//! derives a local value and records a warning.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ModelError, ModelResult};

/// FBX file versions the exporter accepts.
pub const SUPPORTED_FILE_VERSIONS: &[&str] = &["FBX202000", "FBX201800"];

/// Up axes the exporter accepts.
pub const SUPPORTED_UP_AXES: &[&str] = &["y", "z"];

/// Options that shape every export in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FbxExportOptions {
    // ========== Skeleton ==========
    /// Export joints only, without meshes or skin data.
    pub skel_animation_only: bool,
    /// Let the exporter sample complex animation (constraints, expressions).
    pub skel_bake_complex: bool,
    /// Write skeleton definition metadata.
    pub skel_skeleton_defs: bool,
    /// Export constraints as constraints.
    pub skel_constraints: bool,
    /// Follow input connections when collecting exported nodes.
    pub skel_input_conns: bool,
    /// Export blendshape curves together with the skeleton when detected.
    pub skel_blend_shape: bool,

    // ========== BlendShape ==========
    /// Export morph target geometry.
    pub bs_shapes: bool,
    /// Export smooth mesh preview.
    pub bs_smooth_mesh: bool,
    /// Export the skin influence joints with the blendshape mesh.
    pub bs_include_skeleton: bool,

    // ========== Common ==========
    /// Target FBX file version.
    pub file_version: String,
    /// Scene up axis.
    pub up_axis: String,
}

impl Default for FbxExportOptions {
    fn default() -> Self {
        Self {
            skel_animation_only: false,
            skel_bake_complex: true,
            skel_skeleton_defs: true,
            skel_constraints: false,
            skel_input_conns: false,
            skel_blend_shape: true,
            bs_shapes: true,
            bs_smooth_mesh: false,
            bs_include_skeleton: true,
            file_version: "FBX202000".to_string(),
            up_axis: "y".to_string(),
        }
    }
}

impl FbxExportOptions {
    /// Parses options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ModelResult<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Loads options from a JSON file.
    pub fn from_file(path: &Path) -> ModelResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Checks the enumerated string options.
    pub fn validate(&self) -> ModelResult<()> {
        if !SUPPORTED_FILE_VERSIONS.contains(&self.file_version.as_str()) {
            return Err(ModelError::UnsupportedOptionValue {
                option: "file_version",
                value: self.file_version.clone(),
            });
        }
        if !SUPPORTED_UP_AXES.contains(&self.up_axis.as_str()) {
            return Err(ModelError::UnsupportedOptionValue {
                option: "up_axis",
                value: self.up_axis.clone(),
            });
        }
        Ok(())
    }

    /// Sets animation-only mode.
    pub fn animation_only(mut self, value: bool) -> Self {
        self.skel_animation_only = value;
        self
    }

    /// Sets bake-complex mode.
    pub fn bake_complex(mut self, value: bool) -> Self {
        self.skel_bake_complex = value;
        self
    }

    /// Sets input-connection following.
    pub fn input_connections(mut self, value: bool) -> Self {
        self.skel_input_conns = value;
        self
    }

    /// Sets whether blendshape meshes export with their skeleton.
    pub fn include_skeleton(mut self, value: bool) -> Self {
        self.bs_include_skeleton = value;
        self
    }

    /// Sets whether skeleton items carry blendshape curves.
    pub fn skeleton_blend_shape(mut self, value: bool) -> Self {
        self.skel_blend_shape = value;
        self
    }
}
