//! `geofix geocode` - remote reverse geocoding of a coordinate.

use clap::Args;
use geofix::config::ConfigFile;
use geofix::{GeocodeProvider, LocationManager};
use tracing::info;

use super::common;
use crate::error::CliError;

/// Arguments for `geofix geocode`.
#[derive(Debug, Args)]
pub struct GeocodeArgs {
    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Geocoding API key (default: from config)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Result type filter, e.g. locality (default: from config)
    #[arg(long)]
    pub result_type: Option<String>,

    /// Geocoding endpoint (default: from config)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Print the provider's raw results array
    #[arg(long)]
    pub raw: bool,
}

/// Run `geofix geocode`.
pub async fn run(args: GeocodeArgs, mut config: ConfigFile) -> Result<(), CliError> {
    let coordinate = common::coordinate(args.lat, args.lon)?;

    if let Some(key) = args.api_key {
        config.geocoding.api_key = Some(key);
    }
    if let Some(result_type) = args.result_type {
        config.geocoding.result_type = Some(result_type);
    }
    if let Some(endpoint) = args.endpoint {
        config.geocoding.endpoint = endpoint;
    }

    let (platform, _sim) = common::platform(&config)?;
    let manager = LocationManager::new(config.to_manager_config(), platform);

    let result = manager
        .reverse_geocode(coordinate, GeocodeProvider::Remote)
        .await;

    if let Some(error) = result.error {
        return Err(error.into());
    }
    info!(%coordinate, place = %result.place, "Reverse geocode finished");

    println!("Coordinate:  {}", coordinate);
    println!("Country:     {}", result.place.country.as_deref().unwrap_or("-"));
    println!("State:       {}", result.place.state.as_deref().unwrap_or("-"));
    println!("City:        {}", result.place.city.as_deref().unwrap_or("-"));

    if args.raw {
        if let Some(raw) = &result.raw_payload {
            println!();
            println!("{:#}", raw);
        }
    }

    Ok(())
}
