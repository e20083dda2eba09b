//! `geofix locate` - run one location update.
//!
//! The sensor is simulated and reports the position given on the command
//! line. Accepted fixes are written to the state file, so repeated runs are
//! debounced against the previous one.

use std::time::Duration;

use clap::Args;
use geofix::config::ConfigFile;
use geofix::platform::DesiredAccuracy;
use geofix::{AuthorizationStatus, LocationError, LocationManager, OperationStatus};
use tracing::info;

use super::common;
use crate::error::CliError;

/// Arguments for `geofix locate`.
#[derive(Debug, Args)]
pub struct LocateArgs {
    /// Latitude the simulated sensor reports, in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude the simulated sensor reports, in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Horizontal accuracy of the reported fix, in meters
    #[arg(long, default_value = "5")]
    pub accuracy: f64,

    /// Sensor accuracy to request (best, 10m, 100m, 1km, 3km; default: from config)
    #[arg(long)]
    pub desired: Option<DesiredAccuracy>,

    /// Seconds to wait for an acceptable fix
    #[arg(long, default_value = "5")]
    pub timeout: u64,
}

/// Run `geofix locate`.
pub async fn run(args: LocateArgs, config: ConfigFile) -> Result<(), CliError> {
    let coordinate = common::coordinate(args.lat, args.lon)?;
    if !args.accuracy.is_finite() || args.accuracy <= 0.0 {
        return Err(CliError::InvalidInput(format!(
            "accuracy must be a positive number of meters, got {}",
            args.accuracy
        )));
    }

    let mut manager_config = config.to_manager_config();
    if let Some(desired) = args.desired {
        manager_config.accuracy = desired;
    }

    let (platform, sim) = common::platform(&config)?;
    sim.location
        .grant_on_request(Some(AuthorizationStatus::AuthorizedWhenInUse));
    sim.location.set_auto_fix(Some((coordinate, args.accuracy)));

    let manager = LocationManager::new(manager_config, platform);
    let update = manager
        .update_location_with_timeout(Duration::from_secs(args.timeout))
        .await;
    info!(status = %update.status, coordinate = %update.coordinate, "Location update finished");

    match update.status {
        OperationStatus::Ok => {
            println!("Status:      {}", update.status);
            println!("Location:    {}", update.coordinate);
        }
        OperationStatus::Time => {
            println!("Status:      {}", update.status);
            println!("Location:    {} (last known)", update.coordinate);
            if let Some(error) = &update.error {
                println!("Reason:      {}", error);
            }
        }
        status => {
            let error = update.error.unwrap_or(LocationError::Aborted);
            if matches!(error, LocationError::TimedOut(_)) {
                let threshold = manager.config().debounce.distance_threshold;
                let too_close = manager
                    .last_known_location()
                    .is_some_and(|last| last.distance_to(&coordinate) < threshold);
                if too_close {
                    eprintln!(
                        "The reported fix is within {} m of the last known location and was skipped.",
                        threshold
                    );
                }
            }
            return Err(CliError::Operation { status, error });
        }
    }

    if let Some(updated_at) = manager.last_update_at() {
        println!("Updated at:  {}", updated_at.to_rfc3339());
    }
    println!("State file:  {}", config.storage.state_file.display());

    Ok(())
}
