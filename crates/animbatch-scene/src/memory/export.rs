//! Rendering the selection into a synthetic FBX document.

use std::collections::HashSet;

use crate::fbx_ascii::FbxAsciiWriter;
use crate::graph::{weight_attr_name, NodeId, NodeType, SceneGraph, CAMERA_SHAPE_ATTRS, TRANSFORM_CHANNELS};
use crate::settings::FbxSettings;

use super::MemoryScene;

impl MemoryScene {
    /// Renders the current selection and its descendants. Returns the
    /// document and the full paths of the written DAG nodes.
    pub(super) fn render_fbx(&self, settings: &FbxSettings) -> (String, Vec<String>) {
        let mut order: Vec<NodeId> = Vec::new();
        let mut seen = HashSet::new();
        for id in self.selection() {
            if seen.insert(id) {
                order.push(id);
            }
            for d in self.descendants(id, None) {
                if seen.insert(d) {
                    order.push(d);
                }
            }
        }

        let mut w = FbxAsciiWriter::new(settings);
        let mut written = Vec::new();
        let mut meshes = Vec::new();

        for id in order {
            let node = &self.state.nodes[id.0 as usize];
            let path = self.display(id);
            match node.ty {
                NodeType::Joint => {
                    w.model(&node.name, "LimbNode");
                    w.node_attribute(&node.name, "Skeleton");
                    self.write_curves(&mut w, id, &TRANSFORM_CHANNELS, settings);
                    written.push(path);
                }
                NodeType::Transform => {
                    let mesh_shape = self.children(id, Some(NodeType::Mesh)).into_iter().next();
                    let camera_shape = self.children(id, Some(NodeType::Camera)).into_iter().next();
                    if let Some(shape) = mesh_shape {
                        if settings.animation_only {
                            continue;
                        }
                        w.model(&node.name, "Mesh");
                        w.geometry(&self.state.nodes[shape.0 as usize].name);
                        self.write_curves(&mut w, id, &TRANSFORM_CHANNELS, settings);
                        meshes.push(id);
                    } else if let Some(shape) = camera_shape {
                        if !settings.cameras {
                            continue;
                        }
                        w.model(&node.name, "Camera");
                        self.write_curves(&mut w, id, &TRANSFORM_CHANNELS, settings);
                        let lens: Vec<&str> = CAMERA_SHAPE_ATTRS.iter().map(|(a, _)| *a).collect();
                        self.write_curves(&mut w, shape, &lens, settings);
                    } else {
                        w.model(&node.name, "Null");
                        self.write_curves(&mut w, id, &TRANSFORM_CHANNELS, settings);
                    }
                    written.push(path);
                }
                NodeType::ParentConstraint | NodeType::OrientConstraint => {
                    if settings.constraints {
                        w.constraint(&node.name, node.ty.as_str());
                    }
                }
                _ => {}
            }
        }

        let mut deformers_seen = HashSet::new();
        for mesh in meshes {
            for d in self.history(mesh) {
                if !deformers_seen.insert(d) {
                    continue;
                }
                let def = &self.state.nodes[d.0 as usize];
                match def.ty {
                    NodeType::SkinCluster => {
                        let referenced = self.state.nodes[mesh.0 as usize].referenced;
                        let follows = !self.faults.skin_requires_input_connections
                            || !referenced
                            || settings.input_connections;
                        if settings.skins && follows {
                            w.deformer(&def.name, "Skin");
                        }
                    }
                    NodeType::BlendShape => {
                        if !settings.shapes {
                            continue;
                        }
                        w.deformer(&def.name, "BlendShape");
                        let weights: Vec<String> = def
                            .aliases
                            .iter()
                            .enumerate()
                            .map(|(i, a)| weight_attr_name(a.as_deref(), i))
                            .collect();
                        for weight in &weights {
                            w.deformer(&format!("{}.{}", def.name, weight), "BlendShapeChannel");
                        }
                        let refs: Vec<&str> = weights.iter().map(String::as_str).collect();
                        self.write_curves(&mut w, d, &refs, settings);
                    }
                    _ => {}
                }
            }
        }

        (w.finish(), written)
    }

    /// Driven channels are sampled over the bake range when complex
    /// animation is baked and skipped otherwise. Keyed channels write their
    /// own key times.
    fn write_curves(
        &self,
        w: &mut FbxAsciiWriter,
        id: NodeId,
        attrs: &[&str],
        settings: &FbxSettings,
    ) {
        let node = &self.state.nodes[id.0 as usize];
        for attr in attrs {
            let Some(a) = node.attrs.get(*attr) else {
                continue;
            };
            let name = format!("{}.{}", node.name, attr);
            if self.is_driven(id, attr) {
                if settings.bake_complex {
                    let times: Vec<f64> = (settings.bake_start..=settings.bake_end)
                        .map(f64::from)
                        .collect();
                    w.curve(&name, &times);
                }
            } else if !a.keys.is_empty() {
                let times: Vec<f64> = a.keys.iter().map(|(t, _)| *t).collect();
                w.curve(&name, &times);
            }
        }
    }
}
