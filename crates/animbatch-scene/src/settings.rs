//! Exporter settings applied to one `export_selection` call.

use serde::{Deserialize, Serialize};

/// The full set of exporter switches for a single export.
///
/// Pipelines start from [`FbxSettings::default`], which mirrors the
/// exporter's reset state, then override what their item needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbxSettings {
    pub smooth_mesh: bool,
    pub skins: bool,
    pub shapes: bool,
    pub animation_only: bool,
    pub bake_complex: bool,
    pub bake_start: i32,
    pub bake_end: i32,
    pub constraints: bool,
    pub input_connections: bool,
    pub cameras: bool,
    pub skeleton_definitions: bool,
    pub file_version: String,
    pub up_axis: String,
}

impl Default for FbxSettings {
    fn default() -> Self {
        Self {
            smooth_mesh: false,
            skins: true,
            shapes: true,
            animation_only: false,
            bake_complex: true,
            bake_start: 0,
            bake_end: 0,
            constraints: false,
            input_connections: false,
            cameras: true,
            skeleton_definitions: true,
            file_version: "FBX201800".to_string(),
            up_axis: "y".to_string(),
        }
    }
}

impl FbxSettings {
    /// Sets the bake range, swapping a reversed pair.
    pub fn with_bake_range(mut self, start: i32, end: i32) -> Self {
        let (s, e) = if end < start { (end, start) } else { (start, end) };
        self.bake_start = s;
        self.bake_end = e;
        self
    }

    /// Sets file version and up axis.
    pub fn with_format(mut self, file_version: &str, up_axis: &str) -> Self {
        self.file_version = file_version.to_string();
        self.up_axis = up_axis.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_exporter_reset_state() {
        let s = FbxSettings::default();
        assert!(!s.smooth_mesh);
        assert!(s.skins && s.shapes && s.cameras && s.bake_complex);
        assert!(!s.animation_only && !s.constraints && !s.input_connections);
        assert_eq!(s.file_version, "FBX201800");
        assert_eq!(s.up_axis, "y");
    }

    #[test]
    fn test_bake_range_is_normalized() {
        let s = FbxSettings::default().with_bake_range(20, 10);
        assert_eq!((s.bake_start, s.bake_end), (10, 20));
    }
}
