//! Synthetic ASCII FBX output.
//!
//! [`MemoryScene`](crate::MemoryScene) writes a small line-oriented stand-in
//! for the real exporter's output. It uses the same marker words the real
//! format carries (`Model`, `LimbNode`, `NodeAttribute`, `Deformer`,
//! `AnimationCurve`...) so token-count validation behaves the same on it.
//! The header deliberately avoids every counted marker.

use crate::settings::FbxSettings;

/// Line writer for one synthetic FBX document.
#[derive(Debug)]
pub struct FbxAsciiWriter {
    lines: Vec<String>,
}

impl FbxAsciiWriter {
    /// Starts a document and echoes the export settings into its header.
    pub fn new(settings: &FbxSettings) -> Self {
        let flag = |b: bool| if b { 1 } else { 0 };
        let lines = vec![
            "; FBX 7.5.0 project file".to_string(),
            "; Creator: animbatch memory scene".to_string(),
            format!(
                "; Settings: version={} up={} range={}..{} bake={} skins={} shapes={} anim_only={} constraints={} input_conns={} cameras={} skel_defs={} smooth={}",
                settings.file_version,
                settings.up_axis,
                settings.bake_start,
                settings.bake_end,
                flag(settings.bake_complex),
                flag(settings.skins),
                flag(settings.shapes),
                flag(settings.animation_only),
                flag(settings.constraints),
                flag(settings.input_connections),
                flag(settings.cameras),
                flag(settings.skeleton_definitions),
                flag(settings.smooth_mesh),
            ),
            "Objects:".to_string(),
        ];
        Self { lines }
    }

    /// `Model "<name>" "<class>"`.
    pub fn model(&mut self, name: &str, class: &str) {
        self.lines.push(format!("\tModel \"{}\" \"{}\"", name, class));
    }

    pub fn node_attribute(&mut self, name: &str, class: &str) {
        self.lines
            .push(format!("\tNodeAttribute \"{}\" \"{}\"", name, class));
    }

    pub fn geometry(&mut self, name: &str) {
        self.lines.push(format!("\tGeometry \"{}\" \"Mesh\"", name));
    }

    pub fn deformer(&mut self, name: &str, class: &str) {
        self.lines.push(format!("\tDeformer \"{}\" \"{}\"", name, class));
    }

    pub fn constraint(&mut self, name: &str, class: &str) {
        self.lines
            .push(format!("\tConstraint \"{}\" \"{}\"", name, class));
    }

    /// `AnimationCurve "<node>.<attr>" KeyTime t1 t2 ...`.
    pub fn curve(&mut self, name: &str, times: &[f64]) {
        let mut line = format!("\tAnimationCurve \"{}\" KeyTime", name);
        for t in times {
            line.push(' ');
            line.push_str(&format_time(*t));
        }
        self.lines.push(line);
    }

    pub fn finish(mut self) -> String {
        self.lines.push("; end".to_string());
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

fn format_time(t: f64) -> String {
    if t.fract() == 0.0 {
        format!("{}", t as i64)
    } else {
        format!("{}", t)
    }
}

/// Key times written for curve `<node>.<attr>`, if the document has it.
pub fn curve_key_times(text: &str, curve: &str) -> Option<Vec<f64>> {
    let prefix = format!("AnimationCurve \"{}\" KeyTime", curve);
    text.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(&prefix)?;
        Some(
            rest.split_whitespace()
                .filter_map(|t| t.parse::<f64>().ok())
                .collect(),
        )
    })
}

/// Names of every curve in the document.
pub fn curve_names(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let rest = line.trim_start().strip_prefix("AnimationCurve \"")?;
            rest.split('"').next().map(str::to_string)
        })
        .collect()
}

/// Names of every `Model` of the given class.
pub fn model_names(text: &str, class: &str) -> Vec<String> {
    let suffix = format!("\" \"{}\"", class);
    text.lines()
        .filter_map(|line| {
            let rest = line.trim_start().strip_prefix("Model \"")?;
            rest.strip_suffix(&suffix).map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_header_has_no_counted_markers() {
        let text = FbxAsciiWriter::new(&FbxSettings::default()).finish();
        for token in [
            "LimbNode",
            "Mesh",
            "AnimationCurve",
            "Skin",
            "Deformer",
            "Skeleton",
            "NodeAttribute",
            "Null",
            "BlendShape",
            "Model",
        ] {
            assert!(!text.contains(token), "header contains {}", token);
        }
    }

    #[test]
    fn test_curve_lines_parse_back() {
        let mut w = FbxAsciiWriter::new(&FbxSettings::default());
        w.model("cam", "Camera");
        w.curve("cam.translateX", &[10.0, 11.0, 12.5]);
        let text = w.finish();
        assert_eq!(
            curve_key_times(&text, "cam.translateX"),
            Some(vec![10.0, 11.0, 12.5])
        );
        assert_eq!(curve_key_times(&text, "cam.rotateX"), None);
        assert_eq!(curve_names(&text), vec!["cam.translateX".to_string()]);
        assert_eq!(model_names(&text, "Camera"), vec!["cam".to_string()]);
    }
}
