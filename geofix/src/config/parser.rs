//! INI parsing for `config.ini`.
//!
//! Every INI key name is mapped to its field here.

use std::path::PathBuf;
use std::time::Duration;

use ini::{Ini, Properties};

use super::{ConfigFile, ConfigFileError};

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [location] section
    if let Some(section) = ini.section(Some("location")) {
        if let Some(v) = section.get("accuracy") {
            config.location.accuracy = v.parse().map_err(|reason| ConfigFileError::InvalidValue {
                section: "location".to_string(),
                key: "accuracy".to_string(),
                value: v.to_string(),
                reason,
            })?;
        }
        if let Some(secs) = get_secs(section, "location", "time_threshold_secs")? {
            config.location.time_threshold = secs;
        }
        if let Some(v) = section.get("distance_threshold_m") {
            let meters: f64 = v.trim().parse().map_err(|_| {
                invalid(
                    "location",
                    "distance_threshold_m",
                    v,
                    "expected a number of meters",
                )
            })?;
            if !meters.is_finite() || meters < 0.0 {
                return Err(invalid(
                    "location",
                    "distance_threshold_m",
                    v,
                    "must be zero or positive",
                ));
            }
            config.location.distance_threshold = meters;
        }
        if let Some(secs) = get_secs(section, "location", "max_fix_age_secs")? {
            config.location.max_fix_age = secs;
        }
        if let Some(secs) = get_secs(section, "location", "update_timeout_secs")? {
            config.location.update_timeout = optional_timeout(secs);
        }
        if let Some(secs) = get_secs(section, "location", "region_timeout_secs")? {
            config.location.region_timeout = optional_timeout(secs);
        }
        if let Some(v) = section.get("restore_last_known") {
            config.location.restore_last_known = parse_bool(v);
        }
    }

    // [geocoding] section
    if let Some(section) = ini.section(Some("geocoding")) {
        if let Some(v) = section.get("endpoint") {
            let v = v.trim();
            if !v.is_empty() {
                if reqwest::Url::parse(v).is_err() {
                    return Err(invalid("geocoding", "endpoint", v, "expected an absolute URL"));
                }
                config.geocoding.endpoint = v.to_string();
            }
        }
        if let Some(v) = section.get("api_key") {
            config.geocoding.api_key = non_empty(v);
        }
        if let Some(v) = section.get("result_type") {
            config.geocoding.result_type = non_empty(v);
        }
        if let Some(secs) = get_secs(section, "geocoding", "timeout_secs")? {
            if secs.is_zero() {
                return Err(invalid(
                    "geocoding",
                    "timeout_secs",
                    "0",
                    "must be at least 1 second",
                ));
            }
            config.geocoding.timeout = secs;
        }
    }

    // [storage] section
    if let Some(section) = ini.section(Some("storage")) {
        if let Some(v) = section.get("state_file") {
            let v = v.trim();
            if !v.is_empty() {
                config.storage.state_file = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn get_secs(
    section: &Properties,
    name: &str,
    key: &str,
) -> Result<Option<Duration>, ConfigFileError> {
    match section.get(key) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| invalid(name, key, v, "expected a whole number of seconds")),
    }
}

/// Zero disables a deadline.
fn optional_timeout(secs: Duration) -> Option<Duration> {
    (!secs.is_zero()).then_some(secs)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse a boolean value from a config string.
/// Accepts "true", "yes", "1", "on" (case-insensitive) as true; everything else is false.
pub(super) fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "yes" | "1" | "on"
    )
}

/// Expand a leading `~` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::DesiredAccuracy;

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(text).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_is_default() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_partial_config() {
        let config = parse(
            r#"
[location]
accuracy = 1km
time_threshold_secs = 300
update_timeout_secs = 0

[geocoding]
api_key = my-key
"#,
        )
        .unwrap();

        assert_eq!(config.location.accuracy, DesiredAccuracy::Kilometer);
        assert_eq!(config.location.time_threshold, Duration::from_secs(300));
        assert_eq!(config.location.update_timeout, None);
        assert_eq!(config.location.distance_threshold, 10.0);
        assert_eq!(config.geocoding.api_key.as_deref(), Some("my-key"));
        assert!(config.geocoding.result_type.is_none());
    }

    #[test]
    fn test_blank_api_key_is_none() {
        let config = parse("[geocoding]\napi_key =\n").unwrap();
        assert!(config.geocoding.api_key.is_none());
    }

    #[test]
    fn test_invalid_accuracy() {
        let err = parse("[location]\naccuracy = 5m\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue { section, key, .. } => {
                assert_eq!(section, "location");
                assert_eq!(key, "accuracy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_numbers() {
        for text in [
            "[location]\ntime_threshold_secs = soon\n",
            "[location]\ndistance_threshold_m = -3\n",
            "[location]\nmax_fix_age_secs = 1.5\n",
            "[geocoding]\ntimeout_secs = 0\n",
            "[geocoding]\nendpoint = not a url\n",
        ] {
            assert!(
                matches!(parse(text), Err(ConfigFileError::InvalidValue { .. })),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn test_parse_bool_values() {
        for v in ["true", "TRUE", "yes", "1", "on"] {
            assert!(parse_bool(v), "{v}");
        }
        for v in ["false", "no", "0", "off", ""] {
            assert!(!parse_bool(v), "{v}");
        }
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/geo/state.ini"), home.join("geo/state.ini"));
        }
        assert_eq!(expand_tilde("/abs/state.ini"), PathBuf::from("/abs/state.ini"));
    }
}
