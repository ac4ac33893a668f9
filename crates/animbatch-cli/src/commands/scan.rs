//! Scan command implementation
//!
//! Lists the exportable items found in a scene.

use animbatch_engine::scan_scene;
use anyhow::Result;
use colored::Colorize;
use std::process::ExitCode;

use super::load_scene;

/// Run the scan command
///
/// # Arguments
/// * `scene_path` - Path to the JSON scene description
/// * `json_output` - Print the items as JSON instead of a table
///
/// # Returns
/// Exit code: 0 when at least one item was found, 1 otherwise
pub fn run(scene_path: &str, json_output: bool) -> Result<ExitCode> {
    let scene = load_scene(scene_path)?;
    let report = scan_scene(&scene);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} {}", "Scanning:".cyan().bold(), scene_path);
        for (i, item) in report.items.iter().enumerate() {
            println!(
                "  [{}] {:<20} {:<32} {}",
                i + 1,
                item.kind.label().bold(),
                item.name,
                item.node.dimmed()
            );
            if !item.message.is_empty() {
                println!("      {}", item.message.yellow());
            }
        }
        println!("{}", report.summary());
    }

    Ok(if report.items.is_empty() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
