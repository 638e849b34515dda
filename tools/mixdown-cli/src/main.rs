//! Mixdown CLI: render DJ mix projects to a single audio file.
//!
//! Usage:
//!   mixdown export <PATH>      Render a mix (Ctrl-C cancels)
//!   mixdown validate <PATH>    Check that every track source exists
//!   mixdown info <PATH>        Show tracks, durations and start times
//!   mixdown cue <PATH>         Write only the cue sheet
//!   mixdown graph <PATH>       Print the compiled filter graph

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mixdown_common::config::AppConfig;

mod commands;

use commands::ExportOverrides;

#[derive(Parser)]
#[command(
    name = "mixdown",
    about = "Render ordered track lists with crossfades into a single mix",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Export options; anything left unset falls back to the saved defaults.
#[derive(Args)]
struct ExportFlags {
    /// Output format: wav|flac|mp3
    #[arg(long)]
    format: Option<String>,

    /// MP3 bitrate in kbps
    #[arg(long)]
    bitrate: Option<u32>,

    /// Run the loudness pre-pass and normalize every track
    #[arg(long, overrides_with = "no_normalize")]
    normalize: bool,

    /// Skip loudness normalization
    #[arg(long, overrides_with = "normalize")]
    no_normalize: bool,

    /// Crossfade for tracks without their own (seconds)
    #[arg(long)]
    crossfade: Option<f64>,

    /// Write a cue sheet beside the output
    #[arg(long, overrides_with = "no_cue")]
    cue: bool,

    /// Skip writing the cue sheet
    #[arg(long, overrides_with = "cue")]
    no_cue: bool,
}

impl From<ExportFlags> for ExportOverrides {
    fn from(flags: ExportFlags) -> Self {
        Self {
            format: flags.format,
            bitrate_kbps: flags.bitrate,
            normalize: toggle(flags.normalize, flags.no_normalize),
            crossfade_secs: flags.crossfade,
            write_cue_sheet: toggle(flags.cue, flags.no_cue),
        }
    }
}

/// `--x` / `--no-x` pair; `None` keeps the saved value.
fn toggle(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render a mix to an audio file
    Export {
        /// Path to project.json or its directory
        path: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        flags: ExportFlags,
    },

    /// Check that every track source exists
    Validate {
        /// Path to project.json or its directory
        path: PathBuf,
    },

    /// Show tracks, effective durations and start times
    Info {
        /// Path to project.json or its directory
        path: PathBuf,

        /// Crossfade for tracks without their own (seconds)
        #[arg(long)]
        crossfade: Option<f64>,
    },

    /// Write only the cue sheet
    Cue {
        /// Path to project.json or its directory
        path: PathBuf,

        /// Cue sheet path
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        flags: ExportFlags,
    },

    /// Print the compiled filter graph and encoder arguments
    Graph {
        /// Path to project.json or its directory
        path: PathBuf,

        /// Output file path used in the argument list
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the argument list as a JSON array
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        flags: ExportFlags,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    mixdown_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Export {
            path,
            output,
            flags,
        } => commands::export::run(path, output, flags.into(), &config).await,
        Commands::Validate { path } => commands::validate::run(path, &config),
        Commands::Info { path, crossfade } => commands::info::run(path, crossfade, &config),
        Commands::Cue {
            path,
            output,
            flags,
        } => commands::cue::run(path, output, flags.into(), &config).await,
        Commands::Graph {
            path,
            output,
            json,
            flags,
        } => commands::graph::run(path, output, json, flags.into(), &config),
    }
}
