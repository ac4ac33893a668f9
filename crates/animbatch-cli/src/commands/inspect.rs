//! Inspect command implementation
//!
//! Prints the content statistics of an exported FBX file.

use animbatch_engine::validate::{count_namespaced_bones, FbxContentStats};
use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::process::ExitCode;

/// Run the inspect command
///
/// # Arguments
/// * `file` - Path to the exported FBX file
/// * `json_output` - Print the statistics as JSON
///
/// # Returns
/// Exit code: 0 when any content marker was found, 1 when the file looks empty
pub fn run(file: &str, json_output: bool) -> Result<ExitCode> {
    let data = fs::read(file).with_context(|| format!("Failed to read FBX file: {}", file))?;
    let stats = FbxContentStats::from_bytes(&data);
    let residue = count_namespaced_bones(&data);

    if json_output {
        let out = serde_json::json!({
            "file": file,
            "size": data.len(),
            "stats": stats,
            "namespaced_bones": residue,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{} {} ({} bytes)", "Inspecting:".cyan().bold(), file, data.len());
        let rows = [
            ("LimbNode", stats.limb_nodes),
            ("Mesh", stats.meshes),
            ("AnimationCurve", stats.anim_curves),
            ("Skin", stats.skins),
            ("Deformer", stats.deformers),
            ("Skeleton", stats.skeletons),
            ("NodeAttribute", stats.node_attributes),
            ("Null", stats.nulls),
            ("BlendShape", stats.blend_shapes),
        ];
        for (label, count) in rows {
            println!("  {:<16} {}", label, count);
        }
        if residue > 0 {
            println!(
                "  {} {} LimbNode name(s) contain ':'",
                "warning:".yellow().bold(),
                residue
            );
        }
    }

    Ok(if stats == FbxContentStats::default() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
