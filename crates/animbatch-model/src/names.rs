//! Pure name resolution helpers.
//!
//! Scene paths look like `|grp|ns:sub:joint`: `|` separates DAG levels and
//! `:` separates namespaces. These helpers derive leaf, bare and namespace
//! forms from such paths, decide the canonical root bone name and pick among
//! ambiguous candidates after a rename. None of them query a scene.

/// Canonical name every exported skeleton root ends up with.
pub const ROOT_BONE_NAME: &str = "Root";

/// DAG level separator.
pub const DAG_SEPARATOR: char = '|';

/// Namespace separator.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Returns the last DAG component of a path.
///
/// `|grp|ns:joint` gives `ns:joint`.
pub fn leaf_name(path: &str) -> &str {
    match path.rfind(DAG_SEPARATOR) {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

/// Removes everything up to and including the last namespace separator.
pub fn strip_namespace(qualified: &str) -> &str {
    match qualified.rfind(NAMESPACE_SEPARATOR) {
        Some(pos) => &qualified[pos + 1..],
        None => qualified,
    }
}

/// Bare name of the node a path points at.
pub fn bare_name(path: &str) -> &str {
    strip_namespace(leaf_name(path))
}

/// Namespace of the leaf of `path`, without a leading `:`.
///
/// `|grp|A:B:joint` gives `Some("A:B")`; un-namespaced leaves give `None`.
pub fn namespace_of(path: &str) -> Option<&str> {
    let leaf = leaf_name(path);
    let pos = leaf.rfind(NAMESPACE_SEPARATOR)?;
    let ns = leaf[..pos].trim_start_matches(NAMESPACE_SEPARATOR);
    if ns.is_empty() {
        None
    } else {
        Some(ns)
    }
}

/// True when a name still carries a namespace separator.
///
/// A single leading `:` (the explicit root namespace) does not count.
pub fn has_namespace_residue(name: &str) -> bool {
    name.trim_start_matches(NAMESPACE_SEPARATOR)
        .contains(NAMESPACE_SEPARATOR)
}

/// Returns `bare` unchanged when it already reads "root" in any case,
/// otherwise the canonical root name.
pub fn canonical_root_name(bare: &str) -> &str {
    if bare.eq_ignore_ascii_case("root") {
        bare
    } else {
        ROOT_BONE_NAME
    }
}

/// Desired export name for a node: its bare name, normalized when it is the
/// skeleton root.
pub fn desired_export_name(path: &str, is_root: bool) -> String {
    let bare = bare_name(path);
    if is_root {
        canonical_root_name(bare).to_string()
    } else {
        bare.to_string()
    }
}

/// Number of DAG levels in a full path.
pub fn path_depth(path: &str) -> usize {
    path.matches(DAG_SEPARATOR).count()
}

/// Parent path of a full path, if it has one.
pub fn parent_path(path: &str) -> Option<&str> {
    match path.rfind(DAG_SEPARATOR) {
        Some(pos) if pos > 0 => Some(&path[..pos]),
        _ => None,
    }
}

/// Sorts namespaces deepest first, then alphabetically, removing duplicates.
///
/// Merging `A:B` before `A` keeps nested namespaces mergeable.
pub fn sort_namespaces_deepest_first(namespaces: &mut Vec<String>) {
    namespaces.sort_by(|a, b| {
        let da = a.matches(NAMESPACE_SEPARATOR).count();
        let db = b.matches(NAMESPACE_SEPARATOR).count();
        db.cmp(&da).then_with(|| a.cmp(b))
    });
    namespaces.dedup();
}

/// Makes a string usable as a node name.
///
/// Characters other than ASCII alphanumerics and `_` become `_`; a leading
/// digit gets an `n_` prefix; an empty result falls back to
/// `exported_camera`.
pub fn sanitize_node_name(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        return "exported_camera".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "n_");
    }
    out
}

/// File name of a path without directory or extension. Accepts both
/// separator styles.
pub fn basename_no_ext(path: &str) -> &str {
    let name = match path.rfind(['/', '\\']) {
        Some(pos) => &path[pos + 1..],
        None => path,
    };
    match name.rfind('.') {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// One candidate considered during post-rename disambiguation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Full path of the candidate.
    pub path: String,
}

impl Candidate {
    /// Creates a candidate from a full path.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Bare name of the candidate's DAG parent.
    pub fn parent_bare(&self) -> Option<&str> {
        parent_path(&self.path).map(bare_name)
    }
}

/// Result of structural disambiguation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralPick {
    /// Index into the candidate list.
    pub index: usize,
    /// True when no unique structural match existed.
    pub ambiguous: bool,
}

/// Chooses among candidates sharing a bare name by comparing each
/// candidate's parent bare name with the original node's parent bare name.
///
/// A unique parent match wins. Otherwise the first candidate is chosen and
/// the pick is flagged ambiguous. Returns `None` for an empty list.
pub fn pick_structural_match(
    candidates: &[Candidate],
    original_parent_bare: Option<&str>,
) -> Option<StructuralPick> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.len() == 1 {
        return Some(StructuralPick {
            index: 0,
            ambiguous: false,
        });
    }
    let matches: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| original_parent_bare.is_some() && c.parent_bare() == original_parent_bare)
        .map(|(i, _)| i)
        .collect();
    if matches.len() == 1 {
        Some(StructuralPick {
            index: matches[0],
            ambiguous: false,
        })
    } else {
        Some(StructuralPick {
            index: 0,
            ambiguous: true,
        })
    }
}
