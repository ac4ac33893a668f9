//! Canonical root naming and node re-identification after renames.

use animbatch_engine::mutation::NamespaceMergeSession;
use animbatch_engine::resolve::{resolve_post_rename, NodeIdentity, ResolveTier};
use animbatch_model::names::desired_export_name;
use animbatch_model::{canonical_root_name, strip_namespace, ROOT_BONE_NAME};
use animbatch_scene::{MemoryScene, NodeType, SceneGraph};
use pretty_assertions::assert_eq;

#[test]
fn test_canonical_root_keeps_any_casing_of_root() {
    for name in ["Root", "root", "ROOT"] {
        assert_eq!(canonical_root_name(name), name);
    }
}

#[test]
fn test_canonical_root_replaces_other_names() {
    assert_eq!(canonical_root_name("Pelvis"), "Root");
    assert_eq!(canonical_root_name("hips"), ROOT_BONE_NAME);
    assert_eq!(desired_export_name("|grp|hero:Pelvis", true), "Root");
    assert_eq!(desired_export_name("|grp|hero:Pelvis", false), "Pelvis");
}

#[test]
fn test_strip_namespace_keeps_last_segment() {
    assert_eq!(strip_namespace("A:B:hand_L"), "hand_L");
    assert_eq!(strip_namespace("hand_L"), "hand_L");
}

/// `|rig:Hand_L|rig:Finger` next to `|Hand_R|Finger`.
fn hands() -> MemoryScene {
    let mut scene = MemoryScene::new("shot.ma");
    let left = scene.add_node("rig:Hand_L", NodeType::Joint, None);
    scene.add_node("rig:Finger", NodeType::Joint, Some(left));
    let right = scene.add_node("Hand_R", NodeType::Joint, None);
    scene.add_node("Finger", NodeType::Joint, Some(right));
    scene
}

#[test]
fn test_unique_structural_match_after_merge() {
    let mut scene = hands();
    let before = scene.node_names();
    let stale = NodeIdentity::from_path("|rig:Hand_L|rig:Finger");
    {
        let mut merge = NamespaceMergeSession::new(&mut scene);
        assert!(merge.merge("rig"));
        assert_eq!(merge.find_by_name("Finger").len(), 2);

        let mut warnings = Vec::new();
        let resolved = resolve_post_rename(&*merge, &stale, &mut warnings);
        assert_eq!(resolved.path, "|Hand_L|Finger");
        assert_eq!(resolved.tier, ResolveTier::Structural);
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert!(merge.finish().is_empty());
    }
    assert_eq!(scene.node_names(), before);
}

#[test]
fn test_ambiguous_structural_match_picks_first_and_warns() {
    let mut scene = MemoryScene::new("shot.ma");
    let left = scene.add_node("Hand_L", NodeType::Joint, None);
    scene.add_node("Finger", NodeType::Joint, Some(left));
    let grp = scene.add_node("mirror_grp", NodeType::Transform, None);
    let other = scene.add_node("Hand_L", NodeType::Joint, Some(grp));
    scene.add_node("Finger", NodeType::Joint, Some(other));

    let stale = NodeIdentity::from_path("|rig:Hand_L|rig:Finger");
    let mut warnings = Vec::new();
    let resolved = resolve_post_rename(&scene, &stale, &mut warnings);

    assert_eq!(resolved.path, "|Hand_L|Finger");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("Ambiguous node resolution for 'Finger': 2 matches found"));
}

#[test]
fn test_live_handle_wins_over_names() {
    let mut scene = hands();
    let finger = scene.lookup("|rig:Hand_L|rig:Finger").unwrap();
    let identity = NodeIdentity::of(&scene, finger);
    scene.rename(finger, "Thumb").unwrap();

    let mut warnings = Vec::new();
    let resolved = resolve_post_rename(&scene, &identity, &mut warnings);
    assert_eq!(resolved.path, "|rig:Hand_L|Thumb");
    assert_eq!(resolved.tier, ResolveTier::Handle);
    assert!(warnings.is_empty());
}
