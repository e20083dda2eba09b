//! Geofix CLI - Command-line interface
//!
//! Runs location updates, reverse geocoding and configuration management on
//! top of the Geofix library.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use geofix::logging::{default_log_dir, default_log_file, init_logging, DEFAULT_FILTER};
use tracing::debug;

use commands::config::ConfigCommands;
use commands::geocode::GeocodeArgs;
use commands::locate::LocateArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "geofix")]
#[command(version = geofix::VERSION)]
#[command(about = "Location fixes and reverse geocoding", long_about = None)]
struct Cli {
    /// Config file to use instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one location update against a simulated sensor at the given position
    Locate(LocateArgs),

    /// Reverse geocode a coordinate with the remote geocoding API
    Geocode(GeocodeArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { DEFAULT_FILTER };
    let _logging = match init_logging(default_log_dir(), default_log_file(), filter) {
        Ok(guard) => guard,
        Err(e) => CliError::LoggingInit(e.to_string()).exit(),
    };
    debug!(version = geofix::VERSION, "Geofix starting");

    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Locate(args) => {
            let config = commands::common::load_config(config_path)?;
            commands::locate::run(args, config).await
        }
        Commands::Geocode(args) => {
            let config = commands::common::load_config(config_path)?;
            commands::geocode::run(args, config).await
        }
        Commands::Config(command) => commands::config::run(command, config_path),
    }
}
