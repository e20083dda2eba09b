//! Configuration for the location manager.

use std::time::Duration;

use crate::debounce::DebounceConfig;
use crate::geocode::GeocodingConfig;
use crate::platform::DesiredAccuracy;

/// Default deadline for a location update.
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the location manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Accuracy requested from the sensor.
    pub accuracy: DesiredAccuracy,

    /// Time and distance debounce thresholds.
    pub debounce: DebounceConfig,

    /// Deadline for location updates. `None` waits indefinitely.
    pub update_timeout: Option<Duration>,

    /// Deadline for region waits. `None` waits indefinitely.
    pub region_timeout: Option<Duration>,

    /// Seed the debounce and place caches from the store on construction.
    pub restore_last_known: bool,

    /// Remote geocoding settings.
    pub geocoding: GeocodingConfig,

    /// Capacity of the `LocationUpdated` broadcast channel.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            accuracy: DesiredAccuracy::Best,
            debounce: DebounceConfig::default(),
            update_timeout: Some(DEFAULT_UPDATE_TIMEOUT),
            region_timeout: None,
            restore_last_known: true,
            geocoding: GeocodingConfig::default(),
            event_capacity: 64,
        }
    }
}

impl ManagerConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the requested accuracy.
    pub fn with_accuracy(mut self, accuracy: DesiredAccuracy) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Set the minimum time between accepted updates.
    pub fn with_time_threshold(mut self, threshold: Duration) -> Self {
        self.debounce.time_threshold = threshold;
        self
    }

    /// Set the minimum distance between accepted fixes, in meters.
    pub fn with_distance_threshold(mut self, meters: f64) -> Self {
        self.debounce.distance_threshold = meters;
        self
    }

    /// Set the maximum age of a usable fix.
    pub fn with_max_fix_age(mut self, age: Duration) -> Self {
        self.debounce.max_fix_age = age;
        self
    }

    /// Set the location update deadline.
    pub fn with_update_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.update_timeout = timeout;
        self
    }

    /// Set the region wait deadline.
    pub fn with_region_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.region_timeout = timeout;
        self
    }

    /// Enable or disable restoring the last fix and place on construction.
    pub fn with_restore_last_known(mut self, restore: bool) -> Self {
        self.restore_last_known = restore;
        self
    }

    /// Set the remote geocoding settings.
    pub fn with_geocoding(mut self, geocoding: GeocodingConfig) -> Self {
        self.geocoding = geocoding;
        self
    }

    /// Set the geocoding API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.geocoding.api_key = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.accuracy, DesiredAccuracy::Best);
        assert_eq!(config.debounce.time_threshold, Duration::ZERO);
        assert_eq!(config.debounce.distance_threshold, 10.0);
        assert_eq!(config.debounce.max_fix_age, Duration::from_secs(5));
        assert_eq!(config.update_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.region_timeout, None);
        assert!(config.restore_last_known);
        assert!(config.geocoding.api_key.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ManagerConfig::new()
            .with_accuracy(DesiredAccuracy::Kilometer)
            .with_time_threshold(Duration::from_secs(60))
            .with_distance_threshold(250.0)
            .with_update_timeout(None)
            .with_region_timeout(Some(Duration::from_secs(600)))
            .with_restore_last_known(false)
            .with_api_key("k");

        assert_eq!(config.accuracy, DesiredAccuracy::Kilometer);
        assert_eq!(config.debounce.time_threshold, Duration::from_secs(60));
        assert_eq!(config.debounce.distance_threshold, 250.0);
        assert_eq!(config.update_timeout, None);
        assert_eq!(config.region_timeout, Some(Duration::from_secs(600)));
        assert!(!config.restore_last_known);
        assert_eq!(config.geocoding.api_key.as_deref(), Some("k"));
    }
}
