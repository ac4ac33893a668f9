//! Reversible scene mutations.
//!
//! Every temporary edit a pipeline makes to the scene goes through one of
//! these guards. Each guard borrows the scene mutably, derefs to it, and
//! undoes its own edits when dropped, so an early return, a `?` or a panic
//! unwinding through the pipeline all leave the scene as they found it.
//!
//! | Guard | Edit | Teardown |
//! |-------|------|----------|
//! | [`RenameSession`] | in-place renames | original names restored by handle |
//! | [`DuplicateSession`] | throwaway nodes and constraints | constraints, then nodes, deleted |
//! | [`NamespaceMergeSession`] | namespace merges inside one undo chunk | chunk closed and undone |
//! | [`TimelineGuard`] | time unit, playback range, current time | previous values set back |
//!
//! Calling the explicit teardown (`restore`, `cleanup`, `finish`) returns
//! the problems it hit as warning strings; the `Drop` fallback only logs
//! them.
//!
//! Guards nest by borrowing through each other:
//!
//! ```
//! use animbatch_engine::mutation::{DuplicateSession, RenameSession};
//! use animbatch_scene::{DuplicateMode, MemoryScene, NodeType, SceneGraph};
//!
//! let mut scene = MemoryScene::new("shot.ma");
//! let root = scene.add_node("hero:root", NodeType::Joint, None);
//! let before = scene.node_names();
//! {
//!     let mut dup = DuplicateSession::new(&mut scene);
//!     let copy = dup.duplicate(root, DuplicateMode::RootsOnly).unwrap();
//!     let mut renames = RenameSession::new(&mut *dup);
//!     renames.rename(root, ":Root").unwrap();
//!     assert!(renames.is_alive(copy));
//! }
//! assert_eq!(scene.node_names(), before);
//! ```

use animbatch_model::FrameRange;
use animbatch_scene::{ConstraintKind, DuplicateMode, NodeId, SceneGraph, SceneResult};
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

use crate::timeunit::{restore_scene_time_unit, set_scene_time_unit};

macro_rules! deref_to_scene {
    ($guard:ident) => {
        impl<'a, S: SceneGraph + ?Sized> Deref for $guard<'a, S> {
            type Target = S;

            fn deref(&self) -> &S {
                self.scene
            }
        }

        impl<'a, S: SceneGraph + ?Sized> DerefMut for $guard<'a, S> {
            fn deref_mut(&mut self) -> &mut S {
                self.scene
            }
        }
    };
}

fn log_teardown(guard: &str, warnings: Vec<String>) {
    for w in warnings {
        warn!(guard, "{}", w);
    }
}

// ============================================================================
// RenameSession
// ============================================================================

#[derive(Debug, Clone)]
struct RenameRecord {
    id: NodeId,
    original: String,
}

/// In-place renames restored by handle.
///
/// The original name of a node is recorded the first time it is renamed.
/// Restoring walks the records newest first and renames each node back
/// through its [`NodeId`], so renamed ancestors never break the lookup.
pub struct RenameSession<'a, S: SceneGraph + ?Sized> {
    scene: &'a mut S,
    records: Vec<RenameRecord>,
}

impl<'a, S: SceneGraph + ?Sized> RenameSession<'a, S> {
    pub fn new(scene: &'a mut S) -> Self {
        Self {
            scene,
            records: Vec::new(),
        }
    }

    /// Renames a node and returns the name it ended up with.
    pub fn rename(&mut self, id: NodeId, new_name: &str) -> SceneResult<String> {
        let original = self.scene.name_of(id)?;
        let result = self.scene.rename(id, new_name)?;
        if result != original && !self.records.iter().any(|r| r.id == id) {
            self.records.push(RenameRecord { id, original });
        }
        Ok(result)
    }

    /// Number of nodes currently renamed.
    pub fn renamed(&self) -> usize {
        self.records.len()
    }

    /// Restores every recorded name.
    pub fn restore(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut restored = 0;
        for rec in self.records.drain(..).rev() {
            if !self.scene.is_alive(rec.id) {
                warnings.push(format!("Renamed node '{}' no longer exists; name not restored", rec.original));
                continue;
            }
            match self.scene.rename(rec.id, &rec.original) {
                Ok(name) if name == rec.original => restored += 1,
                Ok(name) => warnings.push(format!(
                    "Name restore mismatch: wanted '{}', got '{}'",
                    rec.original, name
                )),
                Err(e) => warnings.push(format!("Failed to restore name '{}': {}", rec.original, e)),
            }
        }
        debug!(restored, failed = warnings.len(), "rename session restored");
        warnings
    }
}

impl<S: SceneGraph + ?Sized> Drop for RenameSession<'_, S> {
    fn drop(&mut self) {
        if !self.records.is_empty() {
            let warnings = self.restore();
            log_teardown("rename", warnings);
        }
    }
}

deref_to_scene!(RenameSession);

// ============================================================================
// DuplicateSession
// ============================================================================

/// Throwaway nodes and the constraints driving them.
///
/// Nothing created here is restored; it is deleted. Constraints go first,
/// then the tracked roots newest first.
pub struct DuplicateSession<'a, S: SceneGraph + ?Sized> {
    scene: &'a mut S,
    roots: Vec<NodeId>,
    constraints: Vec<NodeId>,
}

impl<'a, S: SceneGraph + ?Sized> DuplicateSession<'a, S> {
    pub fn new(scene: &'a mut S) -> Self {
        Self {
            scene,
            roots: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Duplicates a hierarchy and tracks the copy.
    pub fn duplicate(&mut self, id: NodeId, mode: DuplicateMode) -> SceneResult<NodeId> {
        let copy = self.scene.duplicate(id, mode)?;
        self.roots.push(copy);
        Ok(copy)
    }

    /// Creates a camera and tracks its transform.
    pub fn create_camera(&mut self, name: &str) -> SceneResult<NodeId> {
        let camera = self.scene.create_camera(name)?;
        self.roots.push(camera);
        Ok(camera)
    }

    /// Tracks a node created elsewhere.
    pub fn track_root(&mut self, id: NodeId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    /// Creates a constraint and tracks it. `Ok(None)` means the host
    /// accepted the call but created nothing.
    pub fn constrain(
        &mut self,
        kind: ConstraintKind,
        driver: NodeId,
        driven: NodeId,
    ) -> SceneResult<Option<NodeId>> {
        let created = self.scene.constrain(kind, driver, driven)?;
        if let Some(c) = created {
            self.constraints.push(c);
        }
        Ok(created)
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Deletes every tracked constraint and node.
    pub fn cleanup(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let constraints: Vec<NodeId> = self.constraints.drain(..).collect();
        let roots: Vec<NodeId> = self.roots.drain(..).rev().collect();
        for id in constraints.into_iter().chain(roots) {
            if !self.scene.is_alive(id) {
                continue;
            }
            let label = self.scene.path_of(id).unwrap_or_else(|_| id.to_string());
            if let Err(e) = self.scene.delete(id) {
                warnings.push(format!("Failed to delete temporary node '{}': {}", label, e));
            }
        }
        warnings
    }
}

impl<S: SceneGraph + ?Sized> Drop for DuplicateSession<'_, S> {
    fn drop(&mut self) {
        if !self.roots.is_empty() || !self.constraints.is_empty() {
            let warnings = self.cleanup();
            log_teardown("duplicate", warnings);
        }
    }
}

deref_to_scene!(DuplicateSession);

// ============================================================================
// NamespaceMergeSession
// ============================================================================

const CHUNK_CLOSE_WARNING: &str =
    "Undo chunk close failed; scene undo queue may be in an inconsistent state";
const UNDO_WARNING: &str = "Undo failed after namespace merge; scene namespaces may not be restored. Consider reopening the scene if bone names appear changed.";

/// Namespace merges reverted through one undo chunk.
///
/// The chunk opens lazily before the first merge attempt. Teardown closes it
/// and, when at least one merge succeeded, undoes it.
pub struct NamespaceMergeSession<'a, S: SceneGraph + ?Sized> {
    scene: &'a mut S,
    chunk_open: bool,
    merged: Vec<String>,
    failed: Vec<String>,
}

impl<'a, S: SceneGraph + ?Sized> NamespaceMergeSession<'a, S> {
    pub fn new(scene: &'a mut S) -> Self {
        Self {
            scene,
            chunk_open: false,
            merged: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Merges one namespace into the root namespace. Namespaces that do not
    /// exist are skipped and not counted as failures.
    pub fn merge(&mut self, namespace: &str) -> bool {
        if !self.scene.namespace_exists(namespace) {
            debug!(namespace, "namespace absent, merge skipped");
            return false;
        }
        if !self.chunk_open {
            if let Err(e) = self.scene.open_undo_chunk() {
                debug!(namespace, error = %e, "undo chunk did not open");
                self.failed.push(namespace.to_string());
                return false;
            }
            self.chunk_open = true;
        }
        match self.scene.merge_namespace_with_root(namespace) {
            Ok(()) => {
                self.merged.push(namespace.to_string());
                true
            }
            Err(e) => {
                debug!(namespace, error = %e, "namespace merge failed");
                self.failed.push(namespace.to_string());
                false
            }
        }
    }

    pub fn merged(&self) -> &[String] {
        &self.merged
    }

    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    /// Closes the chunk and undoes the merges.
    pub fn finish(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.chunk_open {
            self.chunk_open = false;
            if self.scene.close_undo_chunk().is_err() {
                warnings.push(CHUNK_CLOSE_WARNING.to_string());
            }
        }
        if !self.merged.is_empty() {
            self.merged.clear();
            if self.scene.undo().is_err() {
                warnings.push(UNDO_WARNING.to_string());
            }
        }
        warnings
    }
}

impl<S: SceneGraph + ?Sized> Drop for NamespaceMergeSession<'_, S> {
    fn drop(&mut self) {
        if self.chunk_open || !self.merged.is_empty() {
            let warnings = self.finish();
            log_teardown("namespace-merge", warnings);
        }
    }
}

deref_to_scene!(NamespaceMergeSession);

// ============================================================================
// TimelineGuard
// ============================================================================

/// Time unit, playback range and current time, restored on drop.
pub struct TimelineGuard<'a, S: SceneGraph + ?Sized> {
    scene: &'a mut S,
    previous_unit: Option<String>,
    previous_playback: Option<(f64, f64)>,
    previous_time: f64,
}

impl<'a, S: SceneGraph + ?Sized> TimelineGuard<'a, S> {
    /// Captures the current time.
    pub fn new(scene: &'a mut S) -> Self {
        let previous_time = scene.current_time();
        Self {
            scene,
            previous_unit: None,
            previous_playback: None,
            previous_time,
        }
    }

    /// Switches the scene frame rate. Returns the unit that was active.
    pub fn set_fps(&mut self, fps: f64) -> SceneResult<String> {
        let previous = set_scene_time_unit(&mut *self.scene, fps)?;
        if self.previous_unit.is_none() {
            self.previous_unit = Some(previous.clone());
        }
        Ok(previous)
    }

    /// Sets playback to the range.
    pub fn clamp_playback(&mut self, range: FrameRange) {
        if self.previous_playback.is_none() {
            self.previous_playback = Some(self.scene.playback_range());
        }
        let r = range.normalized();
        self.scene
            .set_playback_range(f64::from(r.start), f64::from(r.end));
    }

    /// Puts everything back.
    pub fn restore(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(unit) = self.previous_unit.take() {
            if let Err(e) = restore_scene_time_unit(&mut *self.scene, &unit) {
                warnings.push(format!("Failed to restore time unit '{}': {}", unit, e));
            }
        }
        if let Some((start, end)) = self.previous_playback.take() {
            self.scene.set_playback_range(start, end);
        }
        self.scene.set_current_time(self.previous_time);
        warnings
    }
}

impl<S: SceneGraph + ?Sized> Drop for TimelineGuard<'_, S> {
    fn drop(&mut self) {
        let warnings = self.restore();
        log_teardown("timeline", warnings);
    }
}

deref_to_scene!(TimelineGuard);
