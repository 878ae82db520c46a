//! Cutroom CLI: trim a video without leaving the terminal.
//!
//! Usage:
//!   cutroom probe <FILE>       Show source metadata
//!   cutroom estimate <FILE>    Project the size of a trimmed export
//!   cutroom export <FILE>      Trim and export a clip
//!   cutroom check              Check export capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use cutroom_common::config::{AppConfig, FidelityPreference};
use cutroom_media_model::job::{StrategyChoice, StrategyKind};

mod commands;

#[derive(Parser)]
#[command(
    name = "cutroom",
    about = "Trim video clips with stream copy, re-encode, or capture",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the standard location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what the prober reports for a source file
    Probe {
        /// Source video file
        path: PathBuf,
    },

    /// Estimate output size for a trim window
    Estimate {
        /// Source video file
        path: PathBuf,

        /// Window start (seconds)
        #[arg(long, default_value = "0")]
        start: f64,

        /// Window end (seconds, defaults to the source duration)
        #[arg(long)]
        end: Option<f64>,

        /// Re-encode bitrate in bits per second (defaults to config)
        #[arg(long)]
        bitrate: Option<u64>,
    },

    /// Export a trimmed clip
    Export {
        /// Source video file
        path: PathBuf,

        /// Window start (seconds)
        #[arg(long, default_value = "0")]
        start: f64,

        /// Window end (seconds, defaults to the source duration)
        #[arg(long)]
        end: Option<f64>,

        /// Output resolution: Original, 1080p, 720p, 480p, 360p, or WxH
        #[arg(long, default_value = "Original")]
        resolution: String,

        /// Export strategy
        #[arg(long, value_enum, default_value = "auto")]
        strategy: StrategyArg,

        /// Prefer speed (stream copy) or frame-accurate cuts
        #[arg(long, value_enum)]
        fidelity: Option<FidelityArg>,

        /// Output file or directory (defaults to the source directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check which export strategies this machine supports
    Check,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Auto,
    Copy,
    Codec,
    Canvas,
}

impl From<StrategyArg> for StrategyChoice {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Auto => StrategyChoice::Auto,
            StrategyArg::Copy => StrategyChoice::Only(StrategyKind::ExternalTranscoder),
            StrategyArg::Codec => StrategyChoice::Only(StrategyKind::CodecPipeline),
            StrategyArg::Canvas => StrategyChoice::Only(StrategyKind::CanvasCapture),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FidelityArg {
    Speed,
    Accuracy,
}

impl From<FidelityArg> for FidelityPreference {
    fn from(arg: FidelityArg) -> Self {
        match arg {
            FidelityArg::Speed => FidelityPreference::Speed,
            FidelityArg::Accuracy => FidelityPreference::Accuracy,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    cutroom_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Probe { path } => commands::probe::run(&config, path).await,
        Commands::Estimate {
            path,
            start,
            end,
            bitrate,
        } => commands::estimate::run(&config, path, start, end, bitrate).await,
        Commands::Export {
            path,
            start,
            end,
            resolution,
            strategy,
            fidelity,
            output,
        } => {
            commands::export::run(
                &config,
                commands::export::ExportArgs {
                    path,
                    start,
                    end,
                    resolution,
                    strategy: strategy.into(),
                    fidelity: fidelity.map(Into::into),
                    output,
                },
            )
            .await
        }
        Commands::Check => commands::check::run(&config).await,
    }
}
