//! Arena-backed in-memory scene.
//!
//! [`MemoryScene`] implements [`SceneGraph`] over a vector of nodes indexed
//! by [`NodeId`]. Deleted nodes stay in the arena as tombstones so ids are
//! never reused. Attribute evaluation follows a fixed precedence: a value
//! set at the current time, then an incoming connection, then a driving
//! constraint, then keys (linear), then the static value.

mod description;
mod export;


pub use description::SceneDescription;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use animbatch_model::names::{bare_name, leaf_name, NAMESPACE_SEPARATOR};
use tracing::{debug, warn};

use crate::error::{SceneError, SceneResult};
use crate::graph::{
    ConstraintKind, DuplicateMode, NodeId, NodeType, Plug, SceneGraph, Xform,
    CAMERA_SHAPE_ATTRS, MOTION_CHANNELS, TRANSFORM_CHANNELS,
};
use crate::settings::FbxSettings;

const TIME_EPSILON: f64 = 1e-6;
const MAX_EVAL_DEPTH: usize = 64;

#[derive(Debug, Clone, Default)]
struct Attr {
    value: f64,
    keys: Vec<(f64, f64)>,
    locked: bool,
    source: Option<Plug>,
}

impl Attr {
    fn with_value(value: f64) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    fn sample(&self, frame: f64) -> f64 {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return self.value,
        };
        if frame <= first.0 {
            return first.1;
        }
        if frame >= last.0 {
            return last.1;
        }
        for pair in self.keys.windows(2) {
            let (t0, v0) = pair[0];
            let (t1, v1) = pair[1];
            if frame >= t0 && frame <= t1 {
                if (t1 - t0).abs() < TIME_EPSILON {
                    return v1;
                }
                return v0 + (v1 - v0) * (frame - t0) / (t1 - t0);
            }
        }
        last.1
    }

    fn insert_key(&mut self, time: f64, value: f64) {
        match self
            .keys
            .iter()
            .position(|(t, _)| (*t - time).abs() < TIME_EPSILON || *t > time)
        {
            Some(i) if (self.keys[i].0 - time).abs() < TIME_EPSILON => self.keys[i].1 = value,
            Some(i) => self.keys.insert(i, (time, value)),
            None => self.keys.push((time, value)),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    ty: NodeType,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    alive: bool,
    referenced: bool,
    lock_node: bool,
    startup: bool,
    attrs: BTreeMap<String, Attr>,
    /// Mesh transforms a deformer acts on.
    geometry: Vec<NodeId>,
    /// Joints a skin cluster binds.
    influences: Vec<NodeId>,
    /// Blendshape weight aliases.
    aliases: Vec<Option<String>>,
    /// Node a constraint follows.
    driver: Option<NodeId>,
}

impl Node {
    fn new(name: String, ty: NodeType, parent: Option<NodeId>) -> Self {
        let mut attrs = BTreeMap::new();
        if ty.is_transform_like() {
            for channel in TRANSFORM_CHANNELS {
                let v = if channel.starts_with("scale") { 1.0 } else { 0.0 };
                attrs.insert(channel.to_string(), Attr::with_value(v));
            }
        }
        if ty == NodeType::Camera {
            for (attr, v) in CAMERA_SHAPE_ATTRS {
                attrs.insert(attr.to_string(), Attr::with_value(v));
            }
        }
        Self {
            name,
            ty,
            parent,
            children: Vec::new(),
            alive: true,
            referenced: false,
            lock_node: false,
            startup: false,
            attrs,
            geometry: Vec::new(),
            influences: Vec::new(),
            aliases: Vec::new(),
            driver: None,
        }
    }

    /// DG nodes have no DAG path.
    fn is_dag(&self) -> bool {
        !self.ty.is_deformer()
    }
}

/// Everything an undo chunk snapshots.
#[derive(Debug, Clone)]
struct SceneState {
    nodes: Vec<Node>,
    current_time: f64,
    playback: (f64, f64),
    time_unit: String,
    selection: Vec<NodeId>,
    overrides: HashMap<Plug, f64>,
}

/// Switches that make specific scene operations fail, for exercising
/// recovery paths.
#[derive(Debug, Clone, Default)]
pub struct FaultInjection {
    /// The exporter plugin cannot be loaded.
    pub exporter_missing: bool,
    /// Every export call reports failure.
    pub fail_export: bool,
    /// The export call panics.
    pub panic_on_export: bool,
    /// Every duplicate call fails.
    pub fail_duplicate: bool,
    /// Parent constraints fail.
    pub fail_parent_constraint: bool,
    /// Orient constraints fail.
    pub fail_orient_constraint: bool,
    /// Constraint creation succeeds but returns no node.
    pub constraint_returns_zero: bool,
    /// Bare names of driven nodes whose constraints always fail.
    pub constraint_fail_for: BTreeSet<String>,
    /// Skin data of referenced meshes is only written when input
    /// connections are followed.
    pub skin_requires_input_connections: bool,
    /// Undo fails.
    pub fail_undo: bool,
    /// Namespaces whose merge fails.
    pub fail_namespace_merge: BTreeSet<String>,
}

/// One completed export call.
#[derive(Debug, Clone)]
pub struct ExportRecord {
    pub path: PathBuf,
    pub settings: FbxSettings,
    /// Full paths of the exported DAG nodes, in write order.
    pub nodes: Vec<String>,
}

/// In-memory [`SceneGraph`].
#[derive(Debug, Clone)]
pub struct MemoryScene {
    state: SceneState,
    open_chunk: Option<SceneState>,
    undo_stack: Vec<SceneState>,
    exports: Vec<ExportRecord>,
    faults: FaultInjection,
    scene_name: String,
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new("")
    }
}

impl MemoryScene {
    /// Creates an empty scene at 24 fps with playback range 1-120.
    pub fn new(scene_name: impl Into<String>) -> Self {
        Self {
            state: SceneState {
                nodes: Vec::new(),
                current_time: 1.0,
                playback: (1.0, 120.0),
                time_unit: "film".to_string(),
                selection: Vec::new(),
                overrides: HashMap::new(),
            },
            open_chunk: None,
            undo_stack: Vec::new(),
            exports: Vec::new(),
            faults: FaultInjection::default(),
            scene_name: scene_name.into(),
        }
    }

    /// Loads a scene from its JSON description.
    pub fn from_json(json: &str) -> SceneResult<Self> {
        let desc: SceneDescription = serde_json::from_str(json)?;
        desc.build()
    }

    /// Loads a scene description file.
    pub fn from_file(path: &Path) -> SceneResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    // ========== Building ==========

    /// Adds a node. Clashing names get a numeric suffix.
    pub fn add_node(&mut self, name: &str, ty: NodeType, parent: Option<NodeId>) -> NodeId {
        let name = self.unique_name(parent, name.trim_start_matches(NAMESPACE_SEPARATOR), None);
        self.push_node(Node::new(name, ty, parent))
    }

    /// Adds a mesh transform with a mesh shape child. Returns the transform.
    pub fn add_mesh(&mut self, name: &str, parent: Option<NodeId>) -> NodeId {
        let xform = self.add_node(name, NodeType::Transform, parent);
        let shape_name = format!("{}Shape", self.state.nodes[xform.0 as usize].name);
        self.add_node(&shape_name, NodeType::Mesh, Some(xform));
        xform
    }

    /// Adds a camera transform with a camera shape child. Returns the
    /// transform.
    pub fn add_camera(&mut self, name: &str, parent: Option<NodeId>) -> NodeId {
        let xform = self.add_node(name, NodeType::Transform, parent);
        let shape_name = format!("{}Shape", self.state.nodes[xform.0 as usize].name);
        self.add_node(&shape_name, NodeType::Camera, Some(xform));
        xform
    }

    /// Adds a skin cluster binding `geometry` to `influences`.
    pub fn add_skin_cluster(
        &mut self,
        name: &str,
        geometry: &[NodeId],
        influences: &[NodeId],
    ) -> NodeId {
        let id = self.add_node(name, NodeType::SkinCluster, None);
        let node = &mut self.state.nodes[id.0 as usize];
        node.geometry = geometry.to_vec();
        node.influences = influences.to_vec();
        id
    }

    /// Adds a blendshape on `geometry`. Each weight becomes an attribute
    /// named by its alias, or `weight[i]` without one.
    pub fn add_blend_shape(
        &mut self,
        name: &str,
        geometry: &[NodeId],
        aliases: &[Option<&str>],
    ) -> NodeId {
        let id = self.add_node(name, NodeType::BlendShape, None);
        let node = &mut self.state.nodes[id.0 as usize];
        node.geometry = geometry.to_vec();
        node.aliases = aliases.iter().map(|a| a.map(str::to_string)).collect();
        for (i, alias) in aliases.iter().enumerate() {
            let attr = crate::graph::weight_attr_name(*alias, i);
            node.attrs.insert(attr, Attr::with_value(0.0));
        }
        id
    }

    /// Marks a node (and nothing else) as coming from a reference.
    pub fn set_referenced(&mut self, id: NodeId, referenced: bool) {
        if let Some(node) = self.state.nodes.get_mut(id.0 as usize) {
            node.referenced = referenced;
        }
    }

    /// Marks a node and all its DAG descendants as referenced.
    pub fn set_referenced_tree(&mut self, id: NodeId) {
        self.set_referenced(id, true);
        for d in self.descendants(id, None) {
            self.set_referenced(d, true);
        }
    }

    pub fn set_startup(&mut self, id: NodeId, startup: bool) {
        if let Some(node) = self.state.nodes.get_mut(id.0 as usize) {
            node.startup = startup;
        }
    }

    /// Locks the node itself against renames.
    pub fn set_node_locked(&mut self, id: NodeId, locked: bool) {
        if let Some(node) = self.state.nodes.get_mut(id.0 as usize) {
            node.lock_node = locked;
        }
    }

    /// Replaces the keys of an attribute, creating it when missing.
    pub fn set_keys(&mut self, id: NodeId, attr: &str, keys: &[(f64, f64)]) {
        if let Some(node) = self.state.nodes.get_mut(id.0 as usize) {
            let entry = node.attrs.entry(attr.to_string()).or_default();
            entry.keys.clear();
            for (t, v) in keys {
                entry.insert_key(*t, *v);
            }
            if let Some((_, v)) = keys.first() {
                entry.value = *v;
            }
        }
    }

    /// Sets a static value without lock or connection checks.
    pub fn set_value(&mut self, id: NodeId, attr: &str, value: f64) {
        if let Some(node) = self.state.nodes.get_mut(id.0 as usize) {
            node.attrs.entry(attr.to_string()).or_default().value = value;
        }
    }

    pub fn set_scene_name(&mut self, name: impl Into<String>) {
        self.scene_name = name.into();
    }

    pub fn faults(&self) -> &FaultInjection {
        &self.faults
    }

    pub fn faults_mut(&mut self) -> &mut FaultInjection {
        &mut self.faults
    }

    // ========== Inspection ==========

    /// Every export performed so far, oldest first.
    pub fn exports(&self) -> &[ExportRecord] {
        &self.exports
    }

    pub fn last_export(&self) -> Option<&ExportRecord> {
        self.exports.last()
    }

    /// Paths of all live nodes (DAG full paths, DG names).
    pub fn node_names(&self) -> BTreeSet<String> {
        self.live_ids()
            .filter_map(|id| self.path_of(id).ok())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.live_ids().count()
    }

    /// Number of live constraint nodes.
    pub fn constraint_count(&self) -> usize {
        self.live_ids()
            .filter(|id| self.state.nodes[id.0 as usize].ty.is_constraint())
            .count()
    }

    pub fn is_chunk_open(&self) -> bool {
        self.open_chunk.is_some()
    }

    // ========== Internals ==========

    fn live_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.state
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.alive)
            .map(|(i, _)| NodeId(i as u32))
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.state.nodes.len() as u32);
        if let Some(parent) = node.parent {
            if let Some(p) = self.state.nodes.get_mut(parent.0 as usize) {
                p.children.push(id);
            }
        }
        self.state.nodes.push(node);
        id
    }

    fn node(&self, id: NodeId) -> SceneResult<&Node> {
        self.state
            .nodes
            .get(id.0 as usize)
            .filter(|n| n.alive)
            .ok_or_else(|| SceneError::NodeNotFound(id.to_string()))
    }

    fn node_mut(&mut self, id: NodeId) -> SceneResult<&mut Node> {
        self.state
            .nodes
            .get_mut(id.0 as usize)
            .filter(|n| n.alive)
            .ok_or_else(|| SceneError::NodeNotFound(id.to_string()))
    }

    fn display(&self, id: NodeId) -> String {
        self.path_of(id).unwrap_or_else(|_| id.to_string())
    }

    fn attr(&self, id: NodeId, attr: &str) -> SceneResult<&Attr> {
        let node = self.node(id)?;
        node.attrs
            .get(attr)
            .ok_or_else(|| SceneError::command(format!("No attribute '{}.{}'", node.name, attr)))
    }

    fn attr_mut(&mut self, id: NodeId, attr: &str) -> SceneResult<&mut Attr> {
        let node = self.node_mut(id)?;
        let name = node.name.clone();
        node.attrs
            .get_mut(attr)
            .ok_or_else(|| SceneError::command(format!("No attribute '{}.{}'", name, attr)))
    }

    fn siblings(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        match parent {
            Some(p) => self
                .state
                .nodes
                .get(p.0 as usize)
                .map(|n| {
                    n.children
                        .iter()
                        .copied()
                        .filter(|c| self.state.nodes[c.0 as usize].alive)
                        .collect()
                })
                .unwrap_or_default(),
            None => self
                .live_ids()
                .filter(|id| self.state.nodes[id.0 as usize].parent.is_none())
                .collect(),
        }
    }

    /// `desired` if no sibling uses it, otherwise the first free
    /// `<base><n>` where `base` is `desired` without trailing digits.
    fn unique_name(&self, parent: Option<NodeId>, desired: &str, exclude: Option<NodeId>) -> String {
        let taken: HashSet<&str> = self
            .siblings(parent)
            .into_iter()
            .filter(|id| Some(*id) != exclude)
            .map(|id| self.state.nodes[id.0 as usize].name.as_str())
            .collect();
        if !taken.contains(desired) {
            return desired.to_string();
        }
        let base = desired.trim_end_matches(|c: char| c.is_ascii_digit());
        let mut n = 1;
        loop {
            let candidate = format!("{}{}", base, n);
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Driver of a channel, when a live constraint under `id` drives it.
    fn constraint_driver(&self, id: NodeId, attr: &str) -> Option<NodeId> {
        let node = self.state.nodes.get(id.0 as usize)?;
        node.children.iter().find_map(|c| {
            let cn = &self.state.nodes[c.0 as usize];
            if !cn.alive || !cn.ty.is_constraint() {
                return None;
            }
            let driver = cn.driver.filter(|d| self.state.nodes[d.0 as usize].alive)?;
            let drives = match cn.ty {
                NodeType::ParentConstraint => MOTION_CHANNELS.contains(&attr),
                NodeType::OrientConstraint => attr.starts_with("rotate"),
                _ => false,
            };
            drives.then_some(driver)
        })
    }

    fn is_driven(&self, id: NodeId, attr: &str) -> bool {
        self.attr(id, attr).map(|a| a.source.is_some()).unwrap_or(false)
            || self.constraint_driver(id, attr).is_some()
    }

    fn eval(&self, id: NodeId, attr: &str, frame: f64, depth: usize) -> SceneResult<f64> {
        if depth > MAX_EVAL_DEPTH {
            return Err(SceneError::command(format!(
                "Evaluation cycle at {}.{}",
                self.display(id),
                attr
            )));
        }
        if (frame - self.state.current_time).abs() < TIME_EPSILON {
            if let Some(v) = self.state.overrides.get(&Plug::new(id, attr)) {
                return Ok(*v);
            }
        }
        let a = self.attr(id, attr)?;
        if let Some(src) = &a.source {
            return self.eval(src.node, &src.attr, frame, depth + 1);
        }
        if let Some(driver) = self.constraint_driver(id, attr) {
            let world = self.world_at(driver, frame, depth + 1)?;
            let parent_world = match self.node(id)?.parent {
                Some(p) => self.world_at(p, frame, depth + 1)?,
                None => Xform::IDENTITY,
            };
            let local = parent_world.relative(&world);
            return Ok(local.channel(attr).unwrap_or(a.value));
        }
        Ok(a.sample(frame))
    }

    fn local_at(&self, id: NodeId, frame: f64, depth: usize) -> SceneResult<Xform> {
        let mut out = Xform::IDENTITY;
        for (i, channel) in TRANSFORM_CHANNELS.iter().enumerate() {
            if !self.has_attr(id, channel) {
                continue;
            }
            let v = self.eval(id, channel, frame, depth)?;
            match i / 3 {
                0 => out.translate[i % 3] = v,
                1 => out.rotate[i % 3] = v,
                _ => out.scale[i % 3] = v,
            }
        }
        Ok(out)
    }

    fn world_at(&self, id: NodeId, frame: f64, depth: usize) -> SceneResult<Xform> {
        if depth > MAX_EVAL_DEPTH {
            return Err(SceneError::command("Evaluation cycle in transform chain"));
        }
        let node = self.node(id)?;
        let parent_world = match node.parent {
            Some(p) => self.world_at(p, frame, depth + 1)?,
            None => Xform::IDENTITY,
        };
        if !node.ty.is_transform_like() {
            return Ok(parent_world);
        }
        let local = self.local_at(id, frame, depth + 1)?;
        Ok(parent_world.compose(&local))
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if let Some(node) = self.state.nodes.get(id.0 as usize) {
            for c in &node.children {
                if self.state.nodes[c.0 as usize].alive {
                    out.push(*c);
                    self.collect_descendants(*c, out);
                }
            }
        }
    }

    fn detach(&mut self, id: NodeId) {
        let parent = self.state.nodes[id.0 as usize].parent;
        if let Some(p) = parent {
            self.state.nodes[p.0 as usize].children.retain(|c| *c != id);
        }
        self.state.nodes[id.0 as usize].parent = None;
    }

    fn check_writable_name(&self, id: NodeId) -> SceneResult<()> {
        let node = self.node(id)?;
        if node.referenced {
            return Err(SceneError::Referenced(self.display(id)));
        }
        if node.lock_node {
            return Err(SceneError::Locked(self.display(id)));
        }
        Ok(())
    }

    fn copy_subtree(
        &mut self,
        src: NodeId,
        parent: Option<NodeId>,
        name: String,
        mode: DuplicateMode,
        map: &mut Vec<(NodeId, NodeId)>,
    ) -> NodeId {
        let now = self.state.current_time;
        let (ty, attrs, children) = {
            let node = &self.state.nodes[src.0 as usize];
            let attrs: BTreeMap<String, Attr> = node
                .attrs
                .iter()
                .map(|(k, a)| {
                    let copied = match mode {
                        DuplicateMode::UpstreamNodes => a.clone(),
                        DuplicateMode::RootsOnly | DuplicateMode::Plain => Attr {
                            value: self.eval(src, k, now, 0).unwrap_or(a.value),
                            keys: Vec::new(),
                            locked: a.locked,
                            source: None,
                        },
                    };
                    (k.clone(), copied)
                })
                .collect();
            (node.ty, attrs, node.children.clone())
        };
        let mut copy = Node::new(name, ty, parent);
        copy.attrs = attrs;
        let new_id = self.push_node(copy);
        map.push((src, new_id));
        for child in children {
            let cn = &self.state.nodes[child.0 as usize];
            if !cn.alive || cn.ty.is_constraint() {
                continue;
            }
            let child_name = cn.name.clone();
            self.copy_subtree(child, Some(new_id), child_name, mode, map);
        }
        new_id
    }

    fn fps_for_unit(unit: &str) -> Option<f64> {
        match unit {
            "game" => Some(15.0),
            "film" => Some(24.0),
            "pal" => Some(25.0),
            "ntsc" => Some(30.0),
            "show" => Some(48.0),
            "palf" => Some(50.0),
            "ntscf" => Some(60.0),
            other => other
                .strip_suffix("fps")
                .and_then(|n| n.parse::<f64>().ok())
                .filter(|f| *f > 0.0),
        }
    }

    fn validate_name(name: &str) -> SceneResult<()> {
        let valid = !name.is_empty()
            && !name.starts_with(|c: char| c.is_ascii_digit())
            && !name.ends_with(NAMESPACE_SEPARATOR)
            && !name.contains("::")
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == NAMESPACE_SEPARATOR);
        if valid {
            Ok(())
        } else {
            Err(SceneError::InvalidName(name.to_string()))
        }
    }
}

impl SceneGraph for MemoryScene {
    fn lookup(&self, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return None;
        }
        if let Some(rest) = path.strip_prefix('|') {
            let mut current: Option<NodeId> = None;
            for comp in rest.split('|') {
                let comp = comp.trim_start_matches(NAMESPACE_SEPARATOR);
                let next = self.siblings(current).into_iter().find(|id| {
                    let n = &self.state.nodes[id.0 as usize];
                    n.is_dag() && n.name == comp
                })?;
                current = Some(next);
            }
            return current;
        }
        let leaf = leaf_name(path).trim_start_matches(NAMESPACE_SEPARATOR);
        let suffix = format!("|{}", path.trim_start_matches(NAMESPACE_SEPARATOR));
        let mut found = self.live_ids().filter(|id| {
            let n = &self.state.nodes[id.0 as usize];
            if n.name != leaf {
                return false;
            }
            if !n.is_dag() {
                return !path.contains('|');
            }
            self.path_of(*id).map(|p| p.ends_with(&suffix)).unwrap_or(false)
        });
        let first = found.next()?;
        if found.next().is_some() {
            return None;
        }
        Some(first)
    }

    fn is_alive(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    fn path_of(&self, id: NodeId) -> SceneResult<String> {
        let node = self.node(id)?;
        if !node.is_dag() {
            return Ok(node.name.clone());
        }
        let mut parts = vec![node.name.as_str()];
        let mut cursor = node.parent;
        while let Some(p) = cursor {
            let pn = &self.state.nodes[p.0 as usize];
            parts.push(pn.name.as_str());
            cursor = pn.parent;
        }
        parts.reverse();
        Ok(format!("|{}", parts.join("|")))
    }

    fn name_of(&self, id: NodeId) -> SceneResult<String> {
        Ok(self.node(id)?.name.clone())
    }

    fn node_type(&self, id: NodeId) -> SceneResult<NodeType> {
        Ok(self.node(id)?.ty)
    }

    fn is_referenced(&self, id: NodeId) -> bool {
        self.node(id).map(|n| n.referenced).unwrap_or(false)
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok()?.parent
    }

    fn children(&self, id: NodeId, filter: Option<NodeType>) -> Vec<NodeId> {
        self.siblings(Some(id))
            .into_iter()
            .filter(|c| filter.map_or(true, |t| self.state.nodes[c.0 as usize].ty == t))
            .collect()
    }

    fn descendants(&self, id: NodeId, filter: Option<NodeType>) -> Vec<NodeId> {
        let mut out = Vec::new();
        if self.is_alive(id) {
            self.collect_descendants(id, &mut out);
        }
        out.retain(|d| filter.map_or(true, |t| self.state.nodes[d.0 as usize].ty == t));
        out
    }

    fn find_by_name(&self, name: &str) -> Vec<NodeId> {
        let name = name.trim_start_matches(NAMESPACE_SEPARATOR);
        self.live_ids()
            .filter(|id| self.state.nodes[id.0 as usize].name == name)
            .collect()
    }

    fn list_by_type(&self, ty: NodeType) -> Vec<NodeId> {
        self.live_ids()
            .filter(|id| self.state.nodes[id.0 as usize].ty == ty)
            .collect()
    }

    fn history(&self, id: NodeId) -> Vec<NodeId> {
        let Ok(node) = self.node(id) else {
            return Vec::new();
        };
        let target = if node.ty.is_shape() {
            match node.parent {
                Some(p) => p,
                None => return Vec::new(),
            }
        } else {
            id
        };
        self.live_ids()
            .filter(|d| {
                let n = &self.state.nodes[d.0 as usize];
                n.ty.is_deformer() && n.geometry.contains(&target)
            })
            .collect()
    }

    fn skin_clusters(&self, joint: NodeId) -> Vec<NodeId> {
        self.list_by_type(NodeType::SkinCluster)
            .into_iter()
            .filter(|s| self.state.nodes[s.0 as usize].influences.contains(&joint))
            .collect()
    }

    fn skin_geometry(&self, skin: NodeId) -> Vec<NodeId> {
        self.node(skin)
            .map(|n| n.geometry.iter().copied().filter(|g| self.is_alive(*g)).collect())
            .unwrap_or_default()
    }

    fn skin_influences(&self, skin: NodeId) -> Vec<NodeId> {
        self.node(skin)
            .map(|n| n.influences.iter().copied().filter(|g| self.is_alive(*g)).collect())
            .unwrap_or_default()
    }

    fn blend_shape_geometry(&self, blend_shape: NodeId) -> Vec<NodeId> {
        self.skin_geometry(blend_shape)
    }

    fn weight_aliases(&self, blend_shape: NodeId) -> Vec<Option<String>> {
        self.node(blend_shape)
            .map(|n| n.aliases.clone())
            .unwrap_or_default()
    }

    fn has_attr(&self, id: NodeId, attr: &str) -> bool {
        self.node(id).map(|n| n.attrs.contains_key(attr)).unwrap_or(false)
    }

    fn get_attr(&self, id: NodeId, attr: &str) -> SceneResult<f64> {
        self.eval(id, attr, self.state.current_time, 0)
    }

    fn get_attr_at(&self, id: NodeId, attr: &str, frame: f64) -> SceneResult<f64> {
        self.eval(id, attr, frame, 0)
    }

    fn set_attr(&mut self, id: NodeId, attr: &str, value: f64) -> SceneResult<()> {
        let a = self.attr(id, attr)?;
        if a.locked {
            return Err(SceneError::Locked(format!("{}.{}", self.display(id), attr)));
        }
        if self.is_driven(id, attr) {
            return Err(SceneError::command(format!(
                "{}.{} is connected and cannot be set",
                self.display(id),
                attr
            )));
        }
        let a = self.attr_mut(id, attr)?;
        a.value = value;
        let keyed = !a.keys.is_empty();
        if keyed {
            self.state.overrides.insert(Plug::new(id, attr), value);
        }
        Ok(())
    }

    fn add_attr(&mut self, id: NodeId, attr: &str, value: f64) -> SceneResult<()> {
        if self.node(id)?.referenced {
            return Err(SceneError::Referenced(self.display(id)));
        }
        if self.has_attr(id, attr) {
            return Err(SceneError::command(format!(
                "Attribute '{}.{}' already exists",
                self.display(id),
                attr
            )));
        }
        self.node_mut(id)?
            .attrs
            .insert(attr.to_string(), Attr::with_value(value));
        Ok(())
    }

    fn is_locked(&self, id: NodeId, attr: &str) -> bool {
        self.attr(id, attr).map(|a| a.locked).unwrap_or(false)
    }

    fn set_locked(&mut self, id: NodeId, attr: &str, locked: bool) -> SceneResult<()> {
        if self.node(id)?.referenced {
            return Err(SceneError::Referenced(self.display(id)));
        }
        self.attr_mut(id, attr)?.locked = locked;
        Ok(())
    }

    fn input_source(&self, id: NodeId, attr: &str) -> Option<Plug> {
        self.attr(id, attr).ok()?.source.clone()
    }

    fn connect_attr(&mut self, src: &Plug, dst: &Plug) -> SceneResult<()> {
        self.attr(src.node, &src.attr)?;
        let target = self.attr(dst.node, &dst.attr)?;
        if target.locked {
            return Err(SceneError::Locked(format!(
                "{}.{}",
                self.display(dst.node),
                dst.attr
            )));
        }
        self.attr_mut(dst.node, &dst.attr)?.source = Some(src.clone());
        Ok(())
    }

    fn disconnect_attr(&mut self, dst: &Plug) -> SceneResult<()> {
        let now = self.state.current_time;
        let current = self.eval(dst.node, &dst.attr, now, 0)?;
        let a = self.attr_mut(dst.node, &dst.attr)?;
        if a.source.take().is_some() && a.keys.is_empty() {
            a.value = current;
        }
        Ok(())
    }

    fn world_transform(&self, id: NodeId, frame: f64) -> SceneResult<Xform> {
        self.world_at(id, frame, 0)
    }

    fn set_world_transform(&mut self, id: NodeId, world: &Xform) -> SceneResult<()> {
        let node = self.node(id)?;
        if !node.ty.is_transform_like() {
            return Err(SceneError::command(format!(
                "{} has no transform",
                self.display(id)
            )));
        }
        let parent_world = match node.parent {
            Some(p) => self.world_at(p, self.state.current_time, 0)?,
            None => Xform::IDENTITY,
        };
        let local = parent_world.relative(world);
        for (channel, v) in local.channels() {
            self.set_attr(id, channel, v)?;
        }
        Ok(())
    }

    fn set_key(&mut self, id: NodeId, attr: &str) -> SceneResult<()> {
        let a = self.attr(id, attr)?;
        if a.locked {
            return Err(SceneError::Locked(format!("{}.{}", self.display(id), attr)));
        }
        if self.is_driven(id, attr) {
            return Err(SceneError::command(format!(
                "{}.{} is connected and cannot be keyed",
                self.display(id),
                attr
            )));
        }
        let now = self.state.current_time;
        let v = self.eval(id, attr, now, 0)?;
        self.attr_mut(id, attr)?.insert_key(now, v);
        self.state.overrides.remove(&Plug::new(id, attr));
        Ok(())
    }

    fn key_range(&self, id: NodeId) -> Option<(f64, f64)> {
        let node = self.node(id).ok()?;
        let mut range: Option<(f64, f64)> = None;
        for a in node.attrs.values() {
            if let (Some(f), Some(l)) = (a.keys.first(), a.keys.last()) {
                range = Some(match range {
                    Some((lo, hi)) => (lo.min(f.0), hi.max(l.0)),
                    None => (f.0, l.0),
                });
            }
        }
        range
    }

    fn key_times(&self, id: NodeId, attr: &str) -> Vec<f64> {
        self.attr(id, attr)
            .map(|a| a.keys.iter().map(|(t, _)| *t).collect())
            .unwrap_or_default()
    }

    fn cut_keys_outside(&mut self, id: NodeId, start: f64, end: f64) -> SceneResult<()> {
        let (lo, hi) = if end < start { (end, start) } else { (start, end) };
        for a in self.node_mut(id)?.attrs.values_mut() {
            a.keys
                .retain(|(t, _)| *t >= lo - TIME_EPSILON && *t <= hi + TIME_EPSILON);
        }
        Ok(())
    }

    fn bake(&mut self, plugs: &[Plug], start: f64, end: f64) -> SceneResult<usize> {
        let (lo, hi) = if end < start { (end, start) } else { (start, end) };
        let first = lo.ceil() as i64;
        let last = hi.floor() as i64;
        let mut sampled = Vec::with_capacity(plugs.len());
        for plug in plugs {
            let mut keys = Vec::new();
            for f in first..=last {
                keys.push((f as f64, self.eval(plug.node, &plug.attr, f as f64, 0)?));
            }
            sampled.push((plug, keys));
        }
        for (plug, keys) in sampled {
            let a = self.attr_mut(plug.node, &plug.attr)?;
            a.source = None;
            a.keys = keys;
            self.state.overrides.remove(plug);
        }
        debug!(plugs = plugs.len(), start = lo, end = hi, "baked plugs");
        Ok(plugs.len())
    }

    fn current_time(&self) -> f64 {
        self.state.current_time
    }

    fn set_current_time(&mut self, frame: f64) {
        self.state.current_time = frame;
        self.state.overrides.clear();
    }

    fn playback_range(&self) -> (f64, f64) {
        self.state.playback
    }

    fn set_playback_range(&mut self, start: f64, end: f64) {
        self.state.playback = if end < start { (end, start) } else { (start, end) };
    }

    fn time_unit(&self) -> String {
        self.state.time_unit.clone()
    }

    fn set_time_unit(&mut self, unit: &str) -> SceneResult<()> {
        if Self::fps_for_unit(unit).is_none() {
            return Err(SceneError::command(format!("Unknown time unit: {}", unit)));
        }
        self.state.time_unit = unit.to_string();
        Ok(())
    }

    fn fps(&self) -> Option<f64> {
        Self::fps_for_unit(&self.state.time_unit)
    }

    fn create_camera(&mut self, name: &str) -> SceneResult<NodeId> {
        let name = name.trim_start_matches(NAMESPACE_SEPARATOR);
        Self::validate_name(name)?;
        Ok(self.add_camera(name, None))
    }

    fn duplicate(&mut self, id: NodeId, mode: DuplicateMode) -> SceneResult<NodeId> {
        if self.faults.fail_duplicate {
            return Err(SceneError::command(format!(
                "duplicate failed: {}",
                self.display(id)
            )));
        }
        let node = self.node(id)?;
        if !node.is_dag() || node.ty.is_constraint() {
            return Err(SceneError::command(format!(
                "Cannot duplicate {} node {}",
                node.ty,
                self.display(id)
            )));
        }
        let parent = node.parent;
        let name = self.unique_name(parent, &node.name.clone(), None);
        let mut map = Vec::new();
        let root = self.copy_subtree(id, parent, name, mode, &mut map);

        if mode == DuplicateMode::UpstreamNodes {
            let deformers: Vec<NodeId> = self
                .live_ids()
                .filter(|d| self.state.nodes[d.0 as usize].ty.is_deformer())
                .collect();
            for d in deformers {
                let src = self.state.nodes[d.0 as usize].clone();
                let geometry: Vec<NodeId> = src
                    .geometry
                    .iter()
                    .filter_map(|g| map.iter().find(|(o, _)| o == g).map(|(_, n)| *n))
                    .collect();
                if geometry.is_empty() {
                    continue;
                }
                let name = self.unique_name(None, &src.name, None);
                let mut copy = Node::new(name, src.ty, None);
                copy.attrs = src.attrs.clone();
                copy.geometry = geometry;
                copy.influences = src.influences.clone();
                copy.aliases = src.aliases.clone();
                self.push_node(copy);
            }
        }
        debug!(source = %self.display(id), duplicate = %self.display(root), "duplicated");
        Ok(root)
    }

    fn delete(&mut self, id: NodeId) -> SceneResult<()> {
        self.node(id)?;
        let mut doomed = vec![id];
        self.collect_descendants(id, &mut doomed);
        if let Some(r) = doomed.iter().find(|d| self.state.nodes[d.0 as usize].referenced) {
            return Err(SceneError::Referenced(self.display(*r)));
        }
        self.detach(id);
        for d in &doomed {
            self.state.nodes[d.0 as usize].alive = false;
        }
        // Deformers left without geometry go with it.
        let orphans: Vec<NodeId> = self
            .live_ids()
            .filter(|d| {
                let n = &self.state.nodes[d.0 as usize];
                n.ty.is_deformer()
                    && !n.geometry.is_empty()
                    && n.geometry.iter().all(|g| !self.state.nodes[g.0 as usize].alive)
            })
            .collect();
        for o in orphans {
            self.state.nodes[o.0 as usize].alive = false;
        }
        let nodes = &self.state.nodes;
        let dead: HashSet<NodeId> = (0..nodes.len())
            .filter(|i| !nodes[*i].alive)
            .map(|i| NodeId(i as u32))
            .collect();
        for node in self.state.nodes.iter_mut().filter(|n| n.alive) {
            for a in node.attrs.values_mut() {
                if a.source.as_ref().is_some_and(|s| dead.contains(&s.node)) {
                    a.source = None;
                }
            }
        }
        self.state.selection.retain(|s| !dead.contains(s));
        self.state.overrides.retain(|p, _| !dead.contains(&p.node));
        Ok(())
    }

    fn rename(&mut self, id: NodeId, new_name: &str) -> SceneResult<String> {
        self.check_writable_name(id)?;
        let target = new_name.trim_start_matches(NAMESPACE_SEPARATOR);
        Self::validate_name(target)?;
        let parent = self.node(id)?.parent;
        let final_name = self.unique_name(parent, target, Some(id));
        self.node_mut(id)?.name = final_name.clone();
        Ok(final_name)
    }

    fn reparent_to_world(&mut self, id: NodeId) -> SceneResult<()> {
        let node = self.node(id)?;
        if node.referenced {
            return Err(SceneError::Referenced(self.display(id)));
        }
        if node.parent.is_none() {
            return Ok(());
        }
        let transform_like = node.ty.is_transform_like();
        let now = self.state.current_time;
        let world = self.world_at(id, now, 0)?;
        let name = node.name.clone();
        self.detach(id);
        let unique = self.unique_name(None, &name, Some(id));
        self.node_mut(id)?.name = unique;
        if transform_like {
            for (channel, v) in world.channels() {
                if let Ok(a) = self.attr_mut(id, channel) {
                    if a.keys.is_empty() && a.source.is_none() {
                        a.value = v;
                    }
                }
            }
        }
        Ok(())
    }

    fn constrain(
        &mut self,
        kind: ConstraintKind,
        driver: NodeId,
        driven: NodeId,
    ) -> SceneResult<Option<NodeId>> {
        self.node(driver)?;
        let driven_name = self.node(driven)?.name.clone();
        let bare = bare_name(&driven_name).to_string();
        let kind_fails = match kind {
            ConstraintKind::Parent => self.faults.fail_parent_constraint,
            ConstraintKind::Orient => self.faults.fail_orient_constraint,
        };
        if kind_fails || self.faults.constraint_fail_for.contains(&bare) {
            return Err(SceneError::command(format!(
                "{} failed on {}",
                kind.node_type(),
                self.display(driven)
            )));
        }
        if self.faults.constraint_returns_zero {
            return Ok(None);
        }
        let channels: &[&str] = match kind {
            ConstraintKind::Parent => &MOTION_CHANNELS,
            ConstraintKind::Orient => &MOTION_CHANNELS[3..],
        };
        if let Some(locked) = channels.iter().find(|c| self.is_locked(driven, c)) {
            return Err(SceneError::Locked(format!("{}.{}", self.display(driven), locked)));
        }
        let desired = format!("{}_{}1", bare, kind.node_type());
        let name = self.unique_name(Some(driven), &desired, None);
        let mut node = Node::new(name, kind.node_type(), Some(driven));
        node.driver = Some(driver);
        Ok(Some(self.push_node(node)))
    }

    fn select(&mut self, ids: &[NodeId]) {
        let mut seen = HashSet::new();
        self.state.selection = ids
            .iter()
            .copied()
            .filter(|id| self.is_alive(*id) && seen.insert(*id))
            .collect();
    }

    fn selection(&self) -> Vec<NodeId> {
        self.state
            .selection
            .iter()
            .copied()
            .filter(|id| self.is_alive(*id))
            .collect()
    }

    fn open_undo_chunk(&mut self) -> SceneResult<()> {
        if self.open_chunk.is_some() {
            return Err(SceneError::command("An undo chunk is already open"));
        }
        self.open_chunk = Some(self.state.clone());
        Ok(())
    }

    fn close_undo_chunk(&mut self) -> SceneResult<()> {
        let snapshot = self
            .open_chunk
            .take()
            .ok_or_else(|| SceneError::command("No undo chunk is open"))?;
        self.undo_stack.push(snapshot);
        Ok(())
    }

    fn undo(&mut self) -> SceneResult<()> {
        if self.faults.fail_undo {
            return Err(SceneError::command("undo failed"));
        }
        let snapshot = self
            .undo_stack
            .pop()
            .ok_or_else(|| SceneError::command("Nothing to undo"))?;
        self.state = snapshot;
        Ok(())
    }

    fn namespaces(&self) -> Vec<String> {
        let mut out = BTreeSet::new();
        for id in self.live_ids() {
            let name = &self.state.nodes[id.0 as usize].name;
            let mut prefix = String::new();
            let segments: Vec<&str> = name.split(NAMESPACE_SEPARATOR).collect();
            for seg in &segments[..segments.len().saturating_sub(1)] {
                if !prefix.is_empty() {
                    prefix.push(NAMESPACE_SEPARATOR);
                }
                prefix.push_str(seg);
                out.insert(prefix.clone());
            }
        }
        out.into_iter().collect()
    }

    fn merge_namespace_with_root(&mut self, namespace: &str) -> SceneResult<()> {
        let ns = namespace.trim_start_matches(NAMESPACE_SEPARATOR);
        if !self.namespace_exists(ns) {
            return Err(SceneError::command(format!("Namespace does not exist: {}", ns)));
        }
        if self.faults.fail_namespace_merge.contains(ns) {
            return Err(SceneError::command(format!("Cannot merge namespace: {}", ns)));
        }
        let prefix = format!("{}{}", ns, NAMESPACE_SEPARATOR);
        let members: Vec<NodeId> = self
            .live_ids()
            .filter(|id| self.state.nodes[id.0 as usize].name.starts_with(&prefix))
            .collect();
        if let Some(r) = members.iter().find(|id| self.state.nodes[id.0 as usize].referenced) {
            warn!(namespace = ns, node = %self.display(*r), "namespace holds referenced nodes");
            return Err(SceneError::Referenced(self.display(*r)));
        }
        for id in members {
            let node = &self.state.nodes[id.0 as usize];
            let stripped = node.name[prefix.len()..].to_string();
            let unique = self.unique_name(node.parent, &stripped, Some(id));
            self.state.nodes[id.0 as usize].name = unique;
        }
        Ok(())
    }

    fn scene_name(&self) -> String {
        self.scene_name.clone()
    }

    fn is_startup_camera(&self, id: NodeId) -> bool {
        let Ok(node) = self.node(id) else {
            return false;
        };
        node.startup
            || (node.ty.is_shape()
                && node
                    .parent
                    .map(|p| self.state.nodes[p.0 as usize].startup)
                    .unwrap_or(false))
    }

    fn ensure_exporter(&mut self) -> bool {
        !self.faults.exporter_missing
    }

    fn export_selection(&mut self, path: &Path, settings: &FbxSettings) -> SceneResult<()> {
        if self.faults.exporter_missing {
            return Err(SceneError::command("Exporter plugin is not loaded"));
        }
        if self.faults.panic_on_export {
            panic!("exporter crashed while writing {}", path.display());
        }
        if self.faults.fail_export {
            return Err(SceneError::command(format!("Export failed: {}", path.display())));
        }
        let (text, nodes) = self.render_fbx(settings);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| SceneError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, text).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), nodes = nodes.len(), "exported selection");
        self.exports.push(ExportRecord {
            path: path.to_path_buf(),
            settings: settings.clone(),
            nodes,
        });
        Ok(())
    }
}
