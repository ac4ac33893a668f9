//! Heuristic output validation.
//!
//! The exporter sometimes reports success while writing a file that is
//! useless downstream (no bones, no skin). These checks count marker
//! substrings in the raw bytes instead of parsing the format. Counts can be
//! off in either direction; they only catch gross failures such as zero
//! bones.

use serde::Serialize;
use std::fs;
use std::path::Path;

/// Marker occurrence counts from one scan of an output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FbxContentStats {
    pub limb_nodes: usize,
    pub meshes: usize,
    pub anim_curves: usize,
    pub skins: usize,
    pub deformers: usize,
    pub skeletons: usize,
    pub node_attributes: usize,
    pub nulls: usize,
    pub blend_shapes: usize,
}

impl FbxContentStats {
    /// Counts markers in raw file bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            limb_nodes: count_token(data, b"LimbNode"),
            meshes: count_token(data, b"Mesh"),
            anim_curves: count_token(data, b"AnimationCurve"),
            skins: count_token(data, b"Skin"),
            deformers: count_token(data, b"Deformer"),
            skeletons: count_token(data, b"Skeleton"),
            node_attributes: count_token(data, b"NodeAttribute"),
            nulls: count_token(data, b"Null"),
            blend_shapes: count_token(data, b"BlendShape"),
        }
    }

    /// Scans a file. A missing or unreadable file yields all zeros.
    pub fn scan_file(path: &Path) -> Self {
        fs::read(path)
            .map(|data| Self::from_bytes(&data))
            .unwrap_or_default()
    }

    /// True when skin or deformer markers are present.
    pub fn has_skin_data(&self) -> bool {
        self.skins > 0 || self.deformers > 0
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "limbNodes={}, meshes={}, animCurves={}, skins={}, deformers={}, skeletons={}, nodeAttrs={}, nulls={}, blendShapes={}",
            self.limb_nodes,
            self.meshes,
            self.anim_curves,
            self.skins,
            self.deformers,
            self.skeletons,
            self.node_attributes,
            self.nulls,
            self.blend_shapes
        )
    }
}

/// Non-overlapping occurrences of `token`.
fn count_token(data: &[u8], token: &[u8]) -> usize {
    if token.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut pos = 0;
    while pos + token.len() <= data.len() {
        if &data[pos..pos + token.len()] == token {
            count += 1;
            pos += token.len();
        } else {
            pos += 1;
        }
    }
    count
}

fn find(data: &[u8], token: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(token.len())
        .position(|w| w == token)
        .map(|p| p + from)
}

/// Window after a `Model` marker searched for the bone marker and name.
const MODEL_REGION: usize = 260;

/// Counts bone models whose name still carries a namespace separator.
///
/// For each `Model` marker the following region (up to 260 bytes, cut at the
/// first newline) must contain `LimbNode`; the name bytes right after the
/// marker are then searched for `:` up to a NUL or newline.
pub fn count_namespaced_bones(data: &[u8]) -> usize {
    const MODEL: &[u8] = b"Model";
    let mut count = 0;
    let mut pos = 0;
    while let Some(at) = find(data, MODEL, pos) {
        pos = at + MODEL.len();
        let mut end = (at + MODEL_REGION).min(data.len());
        if let Some(nl) = data[at..end].iter().position(|b| *b == b'\n') {
            end = at + nl;
        }
        let region = &data[at..end];
        if find(region, b"LimbNode", 0).is_none() {
            continue;
        }
        for b in &data[pos..end] {
            match *b {
                b':' => {
                    count += 1;
                    break;
                }
                b'\0' | b'\n' => break,
                _ => {}
            }
        }
    }
    count
}

/// [`count_namespaced_bones`] over a file; `None` when it cannot be read.
pub fn scan_namespaced_bones(path: &Path) -> Option<usize> {
    fs::read(path).ok().map(|data| count_namespaced_bones(&data))
}

/// Size of a file in bytes, 0 when it does not exist.
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
