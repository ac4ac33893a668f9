//! Batch-wide bake planning.
//!
//! Cameras and skeletons are left alone here: the camera pipeline samples
//! its own throwaway camera frame by frame, and skeletons are baked by the
//! exporter from live constraints. Sampling them up front would flatten
//! driven joints into static keys. What remains are blendshape weights,
//! which are gathered across the whole batch and baked in one call.

use animbatch_model::{ExportItem, FrameRange, ItemKind};
use animbatch_scene::{weight_attr_name, NodeId, NodeType, Plug, SceneGraph, SceneResult};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// The weights to bake and the items that cannot be exported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BakePlan {
    /// Qualified `deformer.weight` references, first-seen order, unique.
    pub attrs: Vec<String>,
    /// Item index to failure reason.
    pub failed: BTreeMap<usize, String>,
    /// Camera items left to their own pipeline.
    pub cameras_skipped: usize,
    /// Skeletal items left to the exporter.
    pub skeletons_skipped: usize,
}

impl BakePlan {
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn failure_for(&self, index: usize) -> Option<&str> {
        self.failed.get(&index).map(String::as_str)
    }
}

/// Qualified weight references of every blendshape in the history of
/// `mesh`. `None` when the history holds no blendshape.
pub fn blend_shape_weights<S: SceneGraph + ?Sized>(scene: &S, mesh: NodeId) -> Option<Vec<String>> {
    let mut found = false;
    let mut attrs = Vec::new();
    for deformer in scene.history(mesh) {
        if scene.node_type(deformer).ok() != Some(NodeType::BlendShape) {
            continue;
        }
        found = true;
        let Ok(name) = scene.name_of(deformer) else {
            continue;
        };
        for (i, alias) in scene.weight_aliases(deformer).iter().enumerate() {
            attrs.push(format!("{}.{}", name, weight_attr_name(alias.as_deref(), i)));
        }
    }
    found.then_some(attrs)
}

/// Classifies the selected items and collects the weights to bake.
///
/// Planning only reads the scene, so two calls over an unchanged scene
/// yield the same plan.
pub fn plan_bake<S: SceneGraph + ?Sized>(scene: &S, items: &[ExportItem]) -> BakePlan {
    let mut plan = BakePlan::default();
    let mut seen = HashSet::new();

    for (index, item) in items.iter().enumerate() {
        let node = scene.lookup(&item.node);
        match item.kind {
            ItemKind::Camera => {
                if node.is_none() {
                    plan.failed
                        .insert(index, format!("Camera node missing: {}", item.node));
                    continue;
                }
                plan.cameras_skipped += 1;
            }
            ItemKind::Skeleton | ItemKind::SkeletonBlendShape => {
                if node.is_none() {
                    plan.failed
                        .insert(index, format!("Skeleton root missing: {}", item.node));
                    continue;
                }
                plan.skeletons_skipped += 1;
                for attr in &item.bs_weight_attrs {
                    if seen.insert(attr.clone()) {
                        plan.attrs.push(attr.clone());
                    }
                }
            }
            ItemKind::BlendShape => {
                let Some(mesh) = node else {
                    plan.failed
                        .insert(index, format!("Mesh node missing: {}", item.node));
                    continue;
                };
                match blend_shape_weights(scene, mesh) {
                    Some(attrs) => {
                        for attr in attrs {
                            if seen.insert(attr.clone()) {
                                plan.attrs.push(attr);
                            }
                        }
                    }
                    None => {
                        plan.failed
                            .insert(index, format!("No blendShape found on: {}", item.node));
                    }
                }
            }
        }
    }

    debug!(
        attrs = plan.attrs.len(),
        failed = plan.failed.len(),
        cameras = plan.cameras_skipped,
        skeletons = plan.skeletons_skipped,
        "bake planned"
    );
    plan
}

/// Bakes every planned weight over `range` in one call. References that no
/// longer resolve are skipped. Returns the number of plugs baked.
pub fn execute_bake<S: SceneGraph + ?Sized>(
    scene: &mut S,
    plan: &BakePlan,
    range: FrameRange,
) -> SceneResult<usize> {
    if plan.is_empty() {
        info!("Nothing to bake");
        return Ok(0);
    }
    let plugs: Vec<Plug> = plan
        .attrs
        .iter()
        .filter_map(|attr| {
            let plug = scene.resolve_plug(attr);
            if plug.is_none() {
                debug!(attr = %attr, "bake target does not resolve, skipped");
            }
            plug
        })
        .collect();
    if plugs.is_empty() {
        return Ok(0);
    }
    let r = range.normalized();
    info!(
        attrs = plugs.len(),
        start = r.start,
        end = r.end,
        "Baking blendShape weights"
    );
    scene.bake(&plugs, f64::from(r.start), f64::from(r.end))
}
