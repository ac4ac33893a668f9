//! Scene tokens and output filename templating.
//!
//! Shot files are conventionally named `<Project>_<SceneXX>_<ShotNN>[_extra]`.
//! The tokens found there (or, for unsaved scenes, in namespace and node
//! names) feed every output filename of a batch.

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use crate::item::{ExportItem, ItemKind};
use crate::names::{basename_no_ext, leaf_name, strip_namespace};

fn scene_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(Scene[A-Za-z0-9]+)").expect("valid scene regex"))
}

fn shot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(Shot[A-Za-z0-9]+)").expect("valid shot regex"))
}

fn rig_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(_Skin_Rig|_PV_Rig|_Rig)\d*$").expect("valid rig regex"))
}

fn rig_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:_Skin_Rig|_PV_Rig|_Rig)(\d+)$").expect("valid rig number regex")
    })
}

fn sk_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^SK_").expect("valid prefix regex"))
}

fn trailing_digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_\d+$").expect("valid digits regex"))
}

/// Namespaces the host creates for itself; never a source of tokens.
const IGNORED_NAMESPACES: &[&str] = &["UI", "shared"];

/// Project, scene and shot tokens of the current scene.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneTokens {
    /// Project token, the text before the first scene/shot match.
    pub project: String,
    /// Scene token, like `SceneA01`.
    pub scene: String,
    /// Shot token, like `Shot010`.
    pub shot: String,
    /// Scene file basename the tokens were parsed from.
    pub basename: String,
}

impl SceneTokens {
    /// Parses tokens from a single piece of text.
    pub fn from_text(text: &str) -> Self {
        let mut tokens = Self::default();
        tokens.fill_missing_from_text(text);
        tokens
    }

    /// Parses tokens from the scene file path, falling back to namespaces.
    ///
    /// A namespace only contributes when it carries both a scene and a shot
    /// token; the first such namespace wins.
    pub fn from_scene(scene_path: &str, namespaces: &[String]) -> Self {
        let basename = basename_no_ext(scene_path).to_string();
        let mut tokens = Self::from_text(&basename);
        tokens.basename = basename;

        if tokens.is_complete() {
            return tokens;
        }
        for ns in namespaces {
            if ns.is_empty() || IGNORED_NAMESPACES.contains(&ns.as_str()) {
                continue;
            }
            let mut candidate = tokens.clone();
            candidate.fill_missing_from_text(ns);
            if candidate.scene.is_empty() || candidate.shot.is_empty() {
                continue;
            }
            tracing::debug!(namespace = %ns, "scene tokens matched from namespace");
            tokens = candidate;
            break;
        }
        tokens
    }

    /// True once project, scene and shot are all known.
    pub fn is_complete(&self) -> bool {
        !self.project.is_empty() && !self.scene.is_empty() && !self.shot.is_empty()
    }

    /// Fills empty tokens from `source`. Returns whether anything changed.
    pub fn fill_missing_from_text(&mut self, source: &str) -> bool {
        if source.is_empty() {
            return false;
        }
        let scene = scene_re().find(source);
        let shot = shot_re().find(source);

        let mut changed = false;
        if self.scene.is_empty() {
            if let Some(m) = scene {
                self.scene = m.as_str().to_string();
                changed = true;
            }
        }
        if self.shot.is_empty() {
            if let Some(m) = shot {
                self.shot = m.as_str().to_string();
                changed = true;
            }
        }
        if self.project.is_empty() {
            let first = [scene, shot].iter().flatten().map(|m| m.start()).min();
            if let Some(pos) = first {
                let project = trim_token_delimiters(&source[..pos]);
                if !project.is_empty() {
                    self.project = project.to_string();
                    changed = true;
                }
            }
        }
        changed
    }

    /// Fills missing tokens from item texts until complete.
    ///
    /// Sources are tried in order, so callers pass the most reliable ones
    /// first (character namespaces, then cameras, then blendshape groups).
    pub fn fill_missing_from_sources<'a>(&mut self, sources: impl IntoIterator<Item = &'a str>) {
        for source in sources {
            if self.is_complete() {
                break;
            }
            if self.fill_missing_from_text(source) {
                tracing::debug!(
                    source,
                    project = %self.project,
                    scene = %self.scene,
                    shot = %self.shot,
                    "scene tokens inferred"
                );
            }
        }
    }
}

fn trim_token_delimiters(s: &str) -> &str {
    s.trim_matches(|c| c == '_' || c == ':' || c == '|')
}

/// Cleans a namespace or node name into a character name.
///
/// Strips the namespace, an `SK_` prefix, `_Skin_Rig`/`_PV_Rig`/`_Rig`
/// suffixes with an optional copy number, and a trailing `_<digits>`.
/// Returns the input unchanged when cleaning would leave nothing.
pub fn clean_character_name(raw: &str) -> String {
    let name = strip_namespace(raw);
    let name = sk_prefix_re().replace(name, "");
    let name = rig_suffix_re().replace(&name, "");
    let name = trailing_digits_re().replace(&name, "");
    if name.is_empty() {
        raw.to_string()
    } else {
        name.into_owned()
    }
}

/// Extracts the rig copy number, like `2` from `hero_Rig2`.
pub fn extract_rig_number(raw: &str) -> String {
    rig_number_re()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn join_fbx(parts: &[&str]) -> String {
    format!("{}.fbx", parts.join("_"))
}

/// `Cam_<project>_<scene>_<shot>.fbx`, or `Cam_<camera>.fbx` without tokens.
pub fn build_camera_filename(camera_path: &str, tokens: &SceneTokens) -> String {
    let mut parts = vec!["Cam"];
    for token in [&tokens.project, &tokens.scene, &tokens.shot] {
        if !token.is_empty() {
            parts.push(token);
        }
    }
    if parts.len() == 1 {
        parts.push(strip_namespace(leaf_name(camera_path)));
    }
    join_fbx(&parts)
}

fn character_parts<'a>(
    character: &'a str,
    tokens: &'a SceneTokens,
    rig_suffix: &'a str,
) -> Vec<&'a str> {
    let mut parts = vec!["A"];
    if !tokens.project.is_empty() {
        parts.push(&tokens.project);
    }
    parts.push(character);
    if !rig_suffix.is_empty() {
        parts.push(rig_suffix);
    }
    if !tokens.scene.is_empty() {
        parts.push(&tokens.scene);
    }
    if !tokens.shot.is_empty() {
        parts.push(&tokens.shot);
    }
    parts
}

/// `A_[project_]<character>[_rig][_scene][_shot].fbx`
pub fn build_skeleton_filename(ns_or_name: &str, tokens: &SceneTokens, rig_suffix: &str) -> String {
    let character = clean_character_name(ns_or_name);
    join_fbx(&character_parts(&character, tokens, rig_suffix))
}

/// Skeleton filename with a trailing `_Face`.
pub fn build_blend_shape_filename(
    ns_or_name: &str,
    tokens: &SceneTokens,
    rig_suffix: &str,
) -> String {
    let character = clean_character_name(ns_or_name);
    let mut parts = character_parts(&character, tokens, rig_suffix);
    parts.push("Face");
    join_fbx(&parts)
}

/// The combined export is the character's main animation file, so it uses
/// the plain skeleton pattern.
pub fn build_skeleton_blend_shape_filename(
    ns_or_name: &str,
    tokens: &SceneTokens,
    rig_suffix: &str,
) -> String {
    build_skeleton_filename(ns_or_name, tokens, rig_suffix)
}

/// Builds the filename an item of `kind` gets by default.
pub fn build_filename(kind: ItemKind, item_source: &str, tokens: &SceneTokens, rig: &str) -> String {
    match kind {
        ItemKind::Camera => build_camera_filename(item_source, tokens),
        ItemKind::Skeleton => build_skeleton_filename(item_source, tokens, rig),
        ItemKind::BlendShape => build_blend_shape_filename(item_source, tokens, rig),
        ItemKind::SkeletonBlendShape => build_skeleton_blend_shape_filename(item_source, tokens, rig),
    }
}

/// Makes filenames unique across a batch.
///
/// Characters of the same kind whose cleaned names collide are renamed with
/// their rig numbers. Any filename still colliding afterwards gets `_2`,
/// `_3`... inserted before its extension.
pub fn deduplicate_filenames(items: &mut [ExportItem], tokens: &SceneTokens) {
    let mut groups: BTreeMap<(ItemKind, String), Vec<usize>> = BTreeMap::new();
    for (i, item) in items.iter().enumerate() {
        if item.kind == ItemKind::Camera {
            continue;
        }
        groups
            .entry((item.kind, clean_character_name(&item.ns_or_name)))
            .or_default()
            .push(i);
    }

    for ((kind, _), indices) in &groups {
        if indices.len() < 2 {
            continue;
        }
        for &idx in indices {
            let rig = extract_rig_number(&items[idx].ns_or_name);
            items[idx].filename = build_filename(*kind, &items[idx].ns_or_name, tokens, &rig);
        }
    }

    let mut seen: HashMap<String, u32> = HashMap::new();
    for item in items.iter_mut() {
        let count = seen.entry(item.filename.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            continue;
        }
        let n = *count;
        item.filename = match item.filename.rfind('.') {
            Some(dot) => format!("{}_{}{}", &item.filename[..dot], n, &item.filename[dot..]),
            None => format!("{}_{}", item.filename, n),
        };
    }
}
