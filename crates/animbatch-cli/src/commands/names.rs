//! Names command implementation
//!
//! Prints the output filename every scanned item would be written to.

use animbatch_engine::scan_scene;
use anyhow::Result;
use colored::Colorize;
use std::process::ExitCode;

use super::load_scene;

/// Run the names command
pub fn run(scene_path: &str) -> Result<ExitCode> {
    let scene = load_scene(scene_path)?;
    let report = scan_scene(&scene);
    let tokens = &report.tokens;

    println!("{} {}", "Filename plan:".cyan().bold(), scene_path);
    let show = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
    println!(
        "  {} project={} scene={} shot={}",
        "tokens".dimmed(),
        show(&tokens.project),
        show(&tokens.scene),
        show(&tokens.shot)
    );
    if !tokens.is_complete() {
        println!(
            "  {}",
            "scene tokens incomplete; filenames fall back to item names".yellow()
        );
    }

    for item in &report.items {
        println!(
            "  {:<20} {:<32} {} {}",
            item.kind.label(),
            item.name,
            "->".dimmed(),
            item.filename.green()
        );
    }
    Ok(ExitCode::SUCCESS)
}
