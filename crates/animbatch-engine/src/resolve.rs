//! Re-identifying nodes after renames and namespace merges.
//!
//! A path captured before a mutation may stop naming anything afterwards.
//! [`resolve_post_rename`] finds the node again in three tiers:
//!
//! 1. the captured [`NodeId`], when it is still alive;
//! 2. a unique node with the same bare name anywhere in the scene;
//! 3. among several such nodes, the unique one whose parent has the same
//!    bare name as the original's parent, else the first one with a
//!    warning.
//!
//! When nothing matches the original path is returned unchanged.

use animbatch_model::names::{bare_name, parent_path, pick_structural_match, Candidate};
use animbatch_scene::{NodeId, SceneGraph};

/// A node as captured before a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Stable handle, when the node could be looked up.
    pub id: Option<NodeId>,
    /// Full path at capture time.
    pub path: String,
}

impl NodeIdentity {
    /// Captures `path` and its current handle.
    pub fn capture<S: SceneGraph + ?Sized>(scene: &S, path: &str) -> Self {
        Self {
            id: scene.lookup(path),
            path: path.to_string(),
        }
    }

    /// Captures a node by handle.
    pub fn of<S: SceneGraph + ?Sized>(scene: &S, id: NodeId) -> Self {
        Self {
            id: Some(id),
            path: scene.path_of(id).unwrap_or_default(),
        }
    }

    /// An identity with only a path, as left by a stale handle.
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            id: None,
            path: path.into(),
        }
    }
}

/// Which tier produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveTier {
    Handle,
    UniqueName,
    Structural,
    Fallback,
}

/// Outcome of [`resolve_post_rename`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: String,
    pub id: Option<NodeId>,
    pub tier: ResolveTier,
}

/// Finds the current path of a node captured before a mutation.
///
/// An ambiguous structural pick appends a warning to `warnings`.
pub fn resolve_post_rename<S: SceneGraph + ?Sized>(
    scene: &S,
    identity: &NodeIdentity,
    warnings: &mut Vec<String>,
) -> Resolved {
    if let Some(id) = identity.id.filter(|id| scene.is_alive(*id)) {
        if let Ok(path) = scene.path_of(id) {
            return Resolved {
                path,
                id: Some(id),
                tier: ResolveTier::Handle,
            };
        }
    }

    let bare = bare_name(&identity.path);
    let found: Vec<(NodeId, String)> = scene
        .find_by_name(bare)
        .into_iter()
        .filter_map(|id| scene.path_of(id).ok().map(|p| (id, p)))
        .collect();

    match found.len() {
        0 => Resolved {
            path: identity.path.clone(),
            id: scene.lookup(&identity.path),
            tier: ResolveTier::Fallback,
        },
        1 => {
            let (id, path) = found[0].clone();
            Resolved {
                path,
                id: Some(id),
                tier: ResolveTier::UniqueName,
            }
        }
        n => {
            let candidates: Vec<Candidate> = found.iter().map(|(_, p)| Candidate::new(p.clone())).collect();
            let original_parent = parent_path(&identity.path).map(bare_name);
            let pick = pick_structural_match(&candidates, original_parent)
                .map(|p| (p.index, p.ambiguous))
                .unwrap_or((0, true));
            if pick.1 {
                warnings.push(format!(
                    "Ambiguous node resolution for '{}': {} matches found; exported skeleton may reference wrong node",
                    bare, n
                ));
            }
            let (id, path) = found[pick.0].clone();
            Resolved {
                path,
                id: Some(id),
                tier: ResolveTier::Structural,
            }
        }
    }
}
