//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show`, and `config init`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Subcommand;
use geofix::config::{config_file_path, ConfigFile};

use super::common;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective settings
    Show,

    /// Write a configuration file with default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    let path = resolve_path(config_path);

    match command {
        ConfigCommands::Path => run_path(&path),
        ConfigCommands::Show => run_show(&path),
        ConfigCommands::Init { force } => run_init(&path, force),
    }
}

fn run_path(path: &Path) -> Result<(), CliError> {
    println!("{}", path.display());
    Ok(())
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = common::load_config(Some(path))?;
    let source = if path.exists() {
        path.display().to_string()
    } else {
        "(defaults, no config file)".to_string()
    };

    println!("Source: {}", source);
    println!();
    println!("[location]");
    println!("  accuracy             = {}", config.location.accuracy);
    println!(
        "  time_threshold       = {}",
        secs(config.location.time_threshold)
    );
    println!(
        "  distance_threshold   = {} m",
        config.location.distance_threshold
    );
    println!("  max_fix_age          = {}", secs(config.location.max_fix_age));
    println!(
        "  update_timeout       = {}",
        deadline(config.location.update_timeout)
    );
    println!(
        "  region_timeout       = {}",
        deadline(config.location.region_timeout)
    );
    println!(
        "  restore_last_known   = {}",
        config.location.restore_last_known
    );
    println!();
    println!("[geocoding]");
    println!("  endpoint             = {}", config.geocoding.endpoint);
    println!(
        "  api_key              = {}",
        if config.geocoding.api_key.is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    println!(
        "  result_type          = {}",
        config.geocoding.result_type.as_deref().unwrap_or("(not set)")
    );
    println!("  timeout              = {}", secs(config.geocoding.timeout));
    println!();
    println!("[storage]");
    println!(
        "  state_file           = {}",
        config.storage.state_file.display()
    );

    Ok(())
}

fn run_init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        )));
    }

    ConfigFile::default().save_to(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn secs(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

fn deadline(timeout: Option<Duration>) -> String {
    timeout.map(secs).unwrap_or_else(|| "none".to_string())
}

/// Path of the config file a command operates on.
fn resolve_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path)
}
