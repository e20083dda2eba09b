//! Serialization of `ConfigFile` into the commented INI written to `config.ini`.

use std::time::Duration;

use super::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let location = &config.location;
    let geocoding = &config.geocoding;

    format!(
        r#"[location]
; Sensor accuracy: best, 10m, 100m, 1km, 3km
accuracy = {}
; Minimum seconds between accepted updates (0 disables)
time_threshold_secs = {}
; Minimum meters between accepted fixes
distance_threshold_m = {}
; Fixes older than this many seconds are discarded
max_fix_age_secs = {}
; Seconds to wait for a fix (0 waits indefinitely)
update_timeout_secs = {}
; Seconds to wait for a region event (0 waits indefinitely)
region_timeout_secs = {}
; Restore the last fix and place at startup
restore_last_known = {}

[geocoding]
; Remote reverse geocoding endpoint
endpoint = {}
; API key sent as the `key` parameter
api_key = {}
; Optional result type filter, e.g. locality
result_type = {}
; HTTP request timeout in seconds
timeout_secs = {}

[storage]
; INI file holding the last accepted fix and resolved place
state_file = {}
"#,
        location.accuracy,
        location.time_threshold.as_secs(),
        location.distance_threshold,
        location.max_fix_age.as_secs(),
        timeout_secs(location.update_timeout),
        timeout_secs(location.region_timeout),
        location.restore_last_known,
        geocoding.endpoint,
        geocoding.api_key.as_deref().unwrap_or(""),
        geocoding.result_type.as_deref().unwrap_or(""),
        geocoding.timeout.as_secs(),
        config.storage.state_file.display(),
    )
}

fn timeout_secs(timeout: Option<Duration>) -> u64 {
    timeout.map(|d| d.as_secs()).unwrap_or(0)
}
