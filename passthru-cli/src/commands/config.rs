//! Config command - inspect, check and create the configuration file

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use passthru_core::config::{sample_config, ConfigFile};
use std::path::PathBuf;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print where the config file is read from
    Path,

    /// Print the effective configuration
    Show,

    /// Parse a config file and report problems
    Check {
        /// File to check (default: the config path)
        file: Option<PathBuf>,
    },

    /// Write the sample config to the config path
    Init {
        /// Replace an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the sample config
    Sample,
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Path => {
            let path = ConfigFile::default_path();
            let state = if path.exists() { "present" } else { "missing, defaults apply" };
            println!("{} ({})", path.display(), state);
        }
        ConfigCommand::Show => show()?,
        ConfigCommand::Check { file } => check(file.unwrap_or_else(ConfigFile::default_path))?,
        ConfigCommand::Init { force } => init(force)?,
        ConfigCommand::Sample => print!("{}", sample_config()),
    }

    Ok(())
}

fn show() -> Result<()> {
    let path = ConfigFile::default_path();
    let origin = if path.exists() {
        path.display().to_string()
    } else {
        "built-in defaults".to_string()
    };

    let file = ConfigFile::load_from(path).context("Failed to load config file")?;
    let source = file.source_config().context("Invalid [source] section")?;
    let encoder = file.encoder_config().context("Invalid [encoder] section")?;

    println!("Effective configuration ({})\n", origin);
    println!("[source]");
    println!("  codec        {}", source.codec);
    println!("  resolution   {}", source.resolution);
    println!("[pump]");
    println!(
        "  placeholder  {}x{}",
        source.pump.placeholder_width, source.pump.placeholder_height
    );
    println!("[queue]");
    println!("  warn_depth   {}", source.queue_warn_depth);
    println!("[encoder]");
    println!("  name         {}", encoder.implementation_name);
    println!(
        "  packetization-mode {}",
        encoder.packetization_mode.fmtp_value()
    );

    for warning in source.validate() {
        println!("  [!!] {}", warning);
    }
    Ok(())
}

fn check(path: PathBuf) -> Result<()> {
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }

    let file = ConfigFile::load_from(path.clone())
        .with_context(|| format!("{} is not a valid config file", path.display()))?;
    let source = file.source_config()?;
    file.encoder_config()?;

    let warnings = source.validate();
    if warnings.is_empty() {
        println!("[OK] {}", path.display());
    } else {
        println!("[OK] {} ({} warning(s))", path.display(), warnings.len());
        for warning in warnings {
            println!("  [!!] {}", warning);
        }
    }
    Ok(())
}

fn init(force: bool) -> Result<()> {
    let path = ConfigFile::default_path();
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to replace it",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, sample_config())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote {}", path.display());
    Ok(())
}
