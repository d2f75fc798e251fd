//! Slotreel CLI: command-line interface for template reels.
//!
//! Usage:
//!   slotreel init <NAME>             Create a skeleton reel manifest
//!   slotreel info <MANIFEST>         Show reel information
//!   slotreel validate <MANIFEST>     Validate a manifest and its clip sources
//!   slotreel assemble <MANIFEST>     Assemble the timeline and report coverage
//!   slotreel export <MANIFEST>       Export a reel to video
//!   slotreel check                   Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use slotreel_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "slotreel",
    about = "Assemble recorded clips into template reels",
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

#[derive(Subcommand)]
enum Commands {
    /// Create a new reel manifest
    Init {
        /// Reel name
        name: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Show reel information
    Info {
        /// Path to the reel manifest
        manifest: PathBuf,
    },

    /// Validate a manifest and resolve its clip sources
    Validate {
        /// Path to the reel manifest
        manifest: PathBuf,
    },

    /// Assemble the timeline and report per-slot coverage
    Assemble {
        /// Path to the reel manifest
        manifest: PathBuf,

        /// Abort on the first unusable clip (no-template reels only)
        #[arg(long)]
        strict: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a reel to video
    Export {
        /// Path to the reel manifest
        manifest: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (overrides the manifest): mp4-h264|mp4-h265|gif|webm
        #[arg(long)]
        format: Option<String>,

        /// Abort on the first unusable clip (no-template reels only)
        #[arg(long)]
        strict: bool,

        /// Print the ffmpeg command instead of running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load();

    // Initialize logging
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    slotreel_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Init { name, output } => commands::init::run(name, output, &config),
        Commands::Info { manifest } => commands::info::run(manifest),
        Commands::Validate { manifest } => commands::validate::run(manifest, &config),
        Commands::Assemble {
            manifest,
            strict,
            json,
        } => commands::assemble::run(manifest, strict, json, &config).await,
        Commands::Export {
            manifest,
            output,
            format,
            strict,
            dry_run,
        } => commands::export::run(manifest, output, format, strict, dry_run, &config).await,
        Commands::Check => commands::check::run(&config),
    }
}
