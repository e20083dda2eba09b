//! Configuration file handling for `<config dir>/geofix/config.ini`.
//!
//! Loads and saves user settings with defaults for every key. Parsing lives
//! in [`parser`], serialization in [`writer`]. A loaded [`ConfigFile`] is
//! turned into a [`ManagerConfig`] with [`ConfigFile::to_manager_config`].

mod parser;
mod writer;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::debounce::{DebounceConfig, DEFAULT_DISTANCE_THRESHOLD_M, DEFAULT_MAX_FIX_AGE};
use crate::geocode::{GeocodingConfig, DEFAULT_GEOCODE_ENDPOINT};
use crate::manager::{ManagerConfig, DEFAULT_UPDATE_TIMEOUT};
use crate::platform::DesiredAccuracy;

/// Default geocoding request timeout.
pub const DEFAULT_GEOCODE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

/// `[location]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSettings {
    /// Sensor accuracy.
    pub accuracy: DesiredAccuracy,
    /// Minimum time between accepted updates.
    pub time_threshold: Duration,
    /// Minimum distance between accepted fixes in meters.
    pub distance_threshold: f64,
    /// Maximum age of a usable fix.
    pub max_fix_age: Duration,
    /// Update deadline; `None` when configured as 0.
    pub update_timeout: Option<Duration>,
    /// Region deadline; `None` when configured as 0.
    pub region_timeout: Option<Duration>,
    /// Restore last fix and place at startup.
    pub restore_last_known: bool,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            accuracy: DesiredAccuracy::Best,
            time_threshold: Duration::ZERO,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD_M,
            max_fix_age: DEFAULT_MAX_FIX_AGE,
            update_timeout: Some(DEFAULT_UPDATE_TIMEOUT),
            region_timeout: None,
            restore_last_known: true,
        }
    }
}

/// `[geocoding]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodingSettings {
    /// API endpoint.
    pub endpoint: String,
    /// API key.
    pub api_key: Option<String>,
    /// Result type filter.
    pub result_type: Option<String>,
    /// HTTP timeout.
    pub timeout: Duration,
}

impl Default for GeocodingSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GEOCODE_ENDPOINT.to_string(),
            api_key: None,
            result_type: None,
            timeout: DEFAULT_GEOCODE_TIMEOUT,
        }
    }
}

/// `[storage]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    /// INI file holding the last fix and place.
    pub state_file: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

/// Contents of `config.ini`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    /// `[location]`
    pub location: LocationSettings,
    /// `[geocoding]`
    pub geocoding: GeocodingSettings,
    /// `[storage]`
    pub storage: StorageSettings,
}

impl ConfigFile {
    /// Load configuration from the default path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        parser::parse_ini(&ini)
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Manager settings described by this file.
    pub fn to_manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            accuracy: self.location.accuracy,
            debounce: DebounceConfig {
                time_threshold: self.location.time_threshold,
                distance_threshold: self.location.distance_threshold,
                max_fix_age: self.location.max_fix_age,
            },
            update_timeout: self.location.update_timeout,
            region_timeout: self.location.region_timeout,
            restore_last_known: self.location.restore_last_known,
            geocoding: GeocodingConfig {
                endpoint: self.geocoding.endpoint.clone(),
                api_key: self.geocoding.api_key.clone(),
                result_type: self.geocoding.result_type.clone(),
                timeout: self.geocoding.timeout,
            },
            ..ManagerConfig::default()
        }
    }
}

/// Directory holding `config.ini`: `<config dir>/geofix`.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("geofix")
}

/// Path of the default config file.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// Default state file: `<data dir>/geofix/state.ini`.
pub fn default_state_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("geofix")
        .join("state.ini")
}
