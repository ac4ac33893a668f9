//! Animbatch CLI - batch FBX animation export over scene descriptions
//!
//! This binary scans a scene, plans output filenames, exports cameras,
//! skeletons and blendshapes to FBX, and inspects the written files.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use animbatch_cli::commands::{self, run::RunArgs};

/// Animbatch - Batch FBX Animation Export
#[derive(Parser)]
#[command(name = "animbatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Show debug logging on stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the exportable items found in a scene
    Scan {
        /// Path to the JSON scene description
        #[arg(short, long)]
        scene: String,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan, name and batch-export a scene into a directory
    Run {
        /// Path to the JSON scene description
        #[arg(short, long)]
        scene: String,

        /// Output directory
        #[arg(short, long)]
        out: String,

        /// First frame (default: playback start)
        #[arg(long, allow_hyphen_values = true)]
        start: Option<i32>,

        /// Last frame (default: playback end)
        #[arg(long, allow_hyphen_values = true)]
        end: Option<i32>,

        /// FBX export options file (JSON)
        #[arg(long)]
        options: Option<String>,

        /// Write a BatchExportDebug_<stamp>.log into the output directory
        #[arg(long)]
        debug_log: bool,

        /// Export at this frame rate; the scene time unit is restored afterwards
        #[arg(long)]
        fps: Option<f64>,

        /// Export only items of this kind
        #[arg(long, value_parser = commands::KIND_NAMES)]
        only: Option<String>,

        /// Take the export range from the first camera item's keys
        #[arg(long)]
        camera_range: bool,

        /// Set the playback range to the export range while exporting
        #[arg(long)]
        clamp_playback: bool,

        /// Skip the "Export range <s> - <e>.txt" log
        #[arg(long)]
        no_frame_range_log: bool,
    },

    /// Print content statistics of an exported FBX file
    Inspect {
        /// Path to the FBX file
        file: String,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the output filename plan of a scene
    Names {
        /// Path to the JSON scene description
        #[arg(short, long)]
        scene: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn dispatch(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Scan { scene, json } => commands::scan::run(&scene, json),
        Commands::Run {
            scene,
            out,
            start,
            end,
            options,
            debug_log,
            fps,
            only,
            camera_range,
            clamp_playback,
            no_frame_range_log,
        } => {
            let args = RunArgs {
                scene,
                out,
                start,
                end,
                options,
                debug_log,
                fps,
                only: only.as_deref().and_then(commands::parse_kind),
                camera_range,
                clamp_playback,
                no_frame_range_log,
            };
            commands::run::run(&args)
        }
        Commands::Inspect { file, json } => commands::inspect::run(&file, json),
        Commands::Names { scene } => commands::names::run(&scene),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::from(1)
        }
    }
}
