//! CLI command implementations

pub mod inspect;
pub mod names;
pub mod run;
pub mod scan;

use animbatch_model::ItemKind;
use animbatch_scene::MemoryScene;
use anyhow::{Context, Result};
use std::path::Path;

/// Item kind names accepted by `--only`.
pub const KIND_NAMES: [&str; 4] = ["camera", "skeleton", "blendshape", "skeleton+blendshape"];

/// Loads a JSON scene description.
pub(crate) fn load_scene(path: &str) -> Result<MemoryScene> {
    MemoryScene::from_file(Path::new(path))
        .with_context(|| format!("Failed to load scene file: {}", path))
}

/// Parses an item kind by its `as_str` name.
pub fn parse_kind(name: &str) -> Option<ItemKind> {
    [
        ItemKind::Camera,
        ItemKind::Skeleton,
        ItemKind::BlendShape,
        ItemKind::SkeletonBlendShape,
    ]
    .into_iter()
    .find(|k| k.as_str().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind_accepts_every_listed_name() {
        for name in KIND_NAMES {
            let kind = parse_kind(name).unwrap();
            assert_eq!(kind.as_str(), name);
        }
        assert_eq!(parse_kind("Camera"), Some(ItemKind::Camera));
        assert_eq!(parse_kind("light"), None);
    }

    #[test]
    fn test_load_scene_reports_path() {
        let err = load_scene("/nonexistent/scene.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/scene.json"));
    }
}
