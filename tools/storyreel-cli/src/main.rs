//! Storyreel CLI: command-line interface for playing and exporting storyboards.
//!
//! Usage:
//!   storyreel export <MANIFEST>     Record one pass to a video file
//!   storyreel play <MANIFEST>       Play one pass live
//!   storyreel validate <MANIFEST>   Validate a storyboard
//!   storyreel info <MANIFEST>       Show storyboard information
//!   storyreel check                 Check encoder availability
//!   storyreel init <DIR>            Create a storyboard skeleton

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "storyreel",
    about = "Narrated slideshows with burned-in subtitles, played live or exported to video",
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
    /// Record one playback pass to a video file
    Export {
        /// Storyboard manifest, or the directory containing storyboard.json
        path: PathBuf,

        /// Output resolution: 720p or 1080p
        #[arg(short, long)]
        resolution: Option<String>,

        /// Output frame rate: 24, 30 or 60
        #[arg(long)]
        fps: Option<u32>,

        /// Playback speed while recording: 0.75, 1, 1.25 or 1.5
        #[arg(long)]
        speed: Option<f64>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Preferred video codec: vp9, vp8 or h264
        #[arg(long)]
        codec: Option<String>,

        /// Also play the narration through the speakers
        #[arg(long)]
        speaker: bool,
    },

    /// Play one pass live
    Play {
        /// Storyboard manifest, or the directory containing storyboard.json
        path: PathBuf,

        /// Playback speed: 0.75, 1, 1.25 or 1.5
        #[arg(long)]
        speed: Option<f64>,

        /// Play the narration through the speakers
        #[arg(long)]
        speaker: bool,

        /// Write a PNG of the first frame of every scene into this directory
        #[arg(long)]
        snapshots: Option<PathBuf>,
    },

    /// Validate a storyboard
    Validate {
        /// Storyboard manifest, or the directory containing storyboard.json
        path: PathBuf,
    },

    /// Show storyboard information
    Info {
        /// Storyboard manifest, or the directory containing storyboard.json
        path: PathBuf,
    },

    /// Check which export profiles this system can encode
    Check,

    /// Create a new storyboard skeleton
    Init {
        /// Storyboard directory
        dir: PathBuf,

        /// Storyboard title
        #[arg(short, long)]
        title: Option<String>,

        /// Number of placeholder scenes
        #[arg(long, default_value = "3")]
        scenes: u32,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = storyreel_common::config::AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    storyreel_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Export {
            path,
            resolution,
            fps,
            speed,
            output,
            codec,
            speaker,
        } => {
            let overrides = commands::export::ExportArgs {
                resolution,
                fps,
                speed,
                output,
                codec,
                speaker,
            };
            commands::export::run(config, path, overrides).await
        }
        Commands::Play {
            path,
            speed,
            speaker,
            snapshots,
        } => commands::play::run(config, path, speed, speaker, snapshots).await,
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Info { path } => commands::info::run(config, path),
        Commands::Check => commands::check::run(),
        Commands::Init { dir, title, scenes } => commands::init::run(dir, title, scenes),
    }
}
