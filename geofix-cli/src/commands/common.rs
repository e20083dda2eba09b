//! Helpers shared across CLI commands.

use std::path::Path;
use std::sync::Arc;

use geofix::config::{config_file_path, ConfigFile};
use geofix::platform::simulated::SimulatedPlatform;
use geofix::platform::{HttpClient, ReqwestClient};
use geofix::store::IniFileStore;
use geofix::{Coordinate, Platform};
use tracing::debug;

use crate::error::CliError;

/// Load the config file given with `--config`, or the default one.
///
/// A missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
    debug!(path = %path.display(), "Loading configuration");
    Ok(ConfigFile::load_from(&path)?)
}

/// Parse and range-check a coordinate from command-line input.
pub fn coordinate(latitude: f64, longitude: f64) -> Result<Coordinate, CliError> {
    let coordinate = Coordinate::new(latitude, longitude);
    if !coordinate.is_valid() {
        return Err(CliError::InvalidInput(format!(
            "coordinate out of range: {} (latitude must be within ±90, longitude within ±180)",
            coordinate
        )));
    }
    Ok(coordinate)
}

/// Simulated platform with the real HTTP client and the configured state file.
pub fn platform(config: &ConfigFile) -> Result<(Platform, SimulatedPlatform), CliError> {
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::with_timeout(config.geocoding.timeout)?);
    let store = IniFileStore::open(&config.storage.state_file)?;
    debug!(state_file = %config.storage.state_file.display(), "Opened state file");

    let (platform, sim) = Platform::simulated(http);
    Ok((platform.with_store(Arc::new(store)), sim))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_from_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[location]\ndistance_threshold_m = 50\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.location.distance_threshold, 50.0);
    }

    #[test]
    fn test_load_config_reports_invalid_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[location]\naccuracy = everywhere\n").unwrap();

        assert!(matches!(
            load_config(Some(&path)),
            Err(CliError::ConfigFile(_))
        ));
    }

    #[test]
    fn test_coordinate_range() {
        assert!(coordinate(45.0, 90.0).is_ok());
        assert!(matches!(
            coordinate(91.0, 0.0),
            Err(CliError::InvalidInput(_))
        ));
    }
}
