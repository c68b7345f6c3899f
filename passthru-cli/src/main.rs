//! Passthru CLI
//!
//! Push pre-encoded video through a pull-based encoder pipeline.
//!
//! # Usage
//!
//! ```bash
//! # Replay an H.264 Annex-B stream at 30 fps
//! passthru replay capture.h264 --fps 30
//!
//! # Replay a VP9 IVF file as fast as possible and record the output
//! passthru replay clip.ivf --fps 0 --output out.ivf
//!
//! # Three-layer simulcast run with FIFO verification
//! passthru simulate --layers 3 --frames 600
//! ```

mod annexb;
mod commands;
mod ivf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Passthru - encoded frame passthrough for pull-based pipelines
#[derive(Parser)]
#[command(name = "passthru")]
#[command(author = "GhostKellz")]
#[command(version)]
#[command(about = "Encoded frame passthrough for pull-based media pipelines", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an Annex-B H.264 or IVF file through the passthrough
    Replay(commands::ReplayArgs),

    /// Run a synthetic simulcast session and verify ordering
    #[command(alias = "sim")]
    Simulate(commands::SimulateArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),

    /// Show supported codecs and encoder capabilities
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["passthru", "passthru_core"] {
        filter = filter.add_directive(format!("{}={}", target, level).parse()?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Replay(args) => commands::replay(args).await?,
        Commands::Simulate(args) => commands::simulate(args).await?,
        Commands::Config(args) => commands::config(args).await?,
        Commands::Info => commands::info().await?,
    }

    Ok(())
}
