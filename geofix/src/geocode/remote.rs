//! Google Geocoding API adapter.
//!
//! # Request
//!
//! `GET {endpoint}?latlng={lat},{lon}&sensor=true[&result_type=..][&key=..]`
//! with coordinates formatted to six decimals. The request is abandoned
//! after [`GeocodingConfig::timeout`] whatever the HTTP client's own timeout.
//!
//! # Response
//!
//! ```json
//! { "status": "OK", "results": [ { "address_components": [
//!     { "long_name": "Hamburg", "short_name": "HH", "types": ["locality"] } ] } ] }
//! ```

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{GeocodeResult, GeocodingConfig, Place};
use crate::coord::Coordinate;
use crate::error::LocationError;
use crate::platform::HttpClient;

/// Default Google Geocoding API endpoint.
pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: Option<String>,
    short_name: Option<String>,
    #[serde(default)]
    types: Vec<String>,
}

/// Build the request URL for `coordinate`.
pub(super) fn build_url(
    config: &GeocodingConfig,
    coordinate: Coordinate,
) -> Result<Url, LocationError> {
    let latlng = format!("{:.6},{:.6}", coordinate.latitude, coordinate.longitude);

    let mut params = vec![("latlng", latlng.as_str()), ("sensor", "true")];
    if let Some(result_type) = config.result_type.as_deref() {
        params.push(("result_type", result_type));
    }
    if let Some(key) = config.api_key.as_deref() {
        params.push(("key", key));
    }

    Url::parse_with_params(&config.endpoint, &params).map_err(|e| LocationError::Network {
        status: None,
        message: format!("invalid geocoding endpoint '{}': {}", config.endpoint, e),
    })
}

/// Fetch and normalize the address for `coordinate`.
pub(super) async fn reverse_geocode(
    http: &dyn HttpClient,
    config: &GeocodingConfig,
    coordinate: Coordinate,
) -> GeocodeResult {
    let url = match build_url(config, coordinate) {
        Ok(url) => url,
        Err(e) => return GeocodeResult::failed(e),
    };

    let response = match tokio::time::timeout(config.timeout, http.get(url.as_str())).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return GeocodeResult::failed(e),
        Err(_) => return GeocodeResult::failed(LocationError::TimedOut(config.timeout)),
    };

    if !response.is_ok() {
        // The endpoint alone; the full URL may carry the API key
        return GeocodeResult::failed(LocationError::http_status(
            response.status,
            &config.endpoint,
        ));
    }

    parse_response(&response.body)
}

/// Interpret a geocoding response body.
pub(super) fn parse_response(body: &[u8]) -> GeocodeResult {
    let document: Value = match serde_json::from_slice(body) {
        Ok(document) => document,
        Err(e) => return GeocodeResult::failed(LocationError::GeocodeParse(e.to_string())),
    };

    let status = match document.get("status").and_then(Value::as_str) {
        Some(status) => status.to_uppercase(),
        None => {
            return GeocodeResult::failed(LocationError::GeocodeParse(
                "response has no status".to_string(),
            ))
        }
    };

    if status != "OK" {
        // ZERO_RESULTS, OVER_QUERY_LIMIT, REQUEST_DENIED, INVALID_REQUEST and
        // anything unrecognized
        debug!(%status, "Geocoding API returned no usable result");
        return GeocodeResult::failed(LocationError::GeocodeProvider(status));
    }

    let results = match document.get("results") {
        Some(Value::Array(results)) => results,
        _ => {
            return GeocodeResult::failed(LocationError::GeocodeParse(
                "OK response without a results array".to_string(),
            ))
        }
    };

    GeocodeResult {
        place: classify_components(results),
        raw_payload: Some(Value::Array(results.clone())),
        ..GeocodeResult::default()
    }
}

/// Fold the address components of every result into one place.
///
/// Each component is classified by its first matching type, checked in the
/// order `country` (short name), `administrative_area_level_1` (short name),
/// `administrative_area_level_2` (long name), `locality` (long name). Later
/// components overwrite earlier ones for the same field across all results,
/// so with the usual most-specific-first ordering a `locality` in a later
/// result replaces an `administrative_area_level_2` seen before it. A
/// matching component without the needed name clears the field.
///
/// Results without an `address_components` array are skipped.
pub fn classify_components(results: &[Value]) -> Place {
    let mut place = Place::empty();

    for result in results {
        let Some(Value::Array(components)) = result.get("address_components") else {
            continue;
        };

        for raw in components {
            let Ok(component) = AddressComponent::deserialize(raw) else {
                continue;
            };
            let has = |tag: &str| component.types.iter().any(|t| t == tag);

            if has("country") {
                place.country = component.short_name;
            } else if has("administrative_area_level_1") {
                place.state = component.short_name;
            } else if has("administrative_area_level_2") || has("locality") {
                place.city = component.long_name;
            }
        }
    }

    place
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockHttpClient;
    use proptest::prelude::*;
    use serde_json::json;

    fn component(long: &str, short: &str, types: &[&str]) -> Value {
        json!({ "long_name": long, "short_name": short, "types": types })
    }

    // ==================== URL ====================

    #[test]
    fn test_url_minimal() {
        let url = build_url(&GeocodingConfig::default(), Coordinate::new(53.5511, 9.9937)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://maps.googleapis.com/maps/api/geocode/json?latlng=53.551100%2C9.993700&sensor=true"
        );
    }

    #[test]
    fn test_url_with_result_type_and_key() {
        let config = GeocodingConfig {
            api_key: Some("abc 123".into()),
            result_type: Some("locality|country".into()),
            ..GeocodingConfig::default()
        };

        let url = build_url(&config, Coordinate::new(-33.0, 151.5)).unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(
            query,
            vec![
                ("latlng".to_string(), "-33.000000,151.500000".to_string()),
                ("sensor".to_string(), "true".to_string()),
                ("result_type".to_string(), "locality|country".to_string()),
                ("key".to_string(), "abc 123".to_string()),
            ]
        );
        assert!(!url.as_str().contains(' '));
    }

    #[test]
    fn test_invalid_endpoint() {
        let config = GeocodingConfig {
            endpoint: "not a url".into(),
            ..GeocodingConfig::default()
        };
        assert!(matches!(
            build_url(&config, Coordinate::new(0.0, 0.0)),
            Err(LocationError::Network { status: None, .. })
        ));
    }

    // ==================== Classification ====================

    #[test]
    fn test_locality_overrides_earlier_admin_level_2() {
        let results = vec![
            json!({ "address_components": [
                component("Kreis Pinneberg", "PI", &["administrative_area_level_2", "political"]),
            ]}),
            json!({ "address_components": [
                component("Wedel", "Wedel", &["locality", "political"]),
                component("Schleswig-Holstein", "SH", &["administrative_area_level_1"]),
                component("Germany", "DE", &["country", "political"]),
            ]}),
        ];

        assert_eq!(
            classify_components(&results),
            Place::new(Some("DE"), Some("SH"), Some("Wedel"))
        );
    }

    #[test]
    fn test_first_matching_tag_decides() {
        // Tagged as both; country is checked first
        let results = vec![json!({ "address_components": [
            component("Monaco", "MC", &["locality", "country"]),
        ]})];

        let place = classify_components(&results);
        assert_eq!(place.country.as_deref(), Some("MC"));
        assert_eq!(place.city, None);
    }

    #[test]
    fn test_results_without_components_are_skipped() {
        let results = vec![
            json!({ "formatted_address": "nowhere" }),
            json!({ "address_components": [component("Oslo", "Oslo", &["locality"])] }),
        ];

        assert_eq!(classify_components(&results).city.as_deref(), Some("Oslo"));
    }

    #[test]
    fn test_components_without_types_are_ignored() {
        let results = vec![json!({ "address_components": [
            { "long_name": "Somewhere", "short_name": "SW" },
        ]})];

        assert!(classify_components(&results).is_empty());
    }

    proptest! {
        #[test]
        fn prop_last_country_wins(codes in prop::collection::vec("[A-Z]{2}", 1..8)) {
            let results: Vec<Value> = codes
                .iter()
                .map(|code| json!({ "address_components": [component("x", code, &["country"])] }))
                .collect();

            let place = classify_components(&results);
            prop_assert_eq!(place.country.as_deref(), codes.last().map(String::as_str));
            prop_assert_eq!(place.state, None);
            prop_assert_eq!(place.city, None);
        }
    }

    // ==================== Response parsing ====================

    #[test]
    fn test_status_is_case_insensitive() {
        let result = parse_response(br#"{"status": "ok", "results": []}"#);
        assert!(result.is_ok());
        assert!(result.place.is_empty());
        assert_eq!(result.raw_payload, Some(json!([])));
    }

    #[test]
    fn test_provider_statuses() {
        for status in [
            "ZERO_RESULTS",
            "OVER_QUERY_LIMIT",
            "REQUEST_DENIED",
            "INVALID_REQUEST",
            "SOMETHING_NEW",
        ] {
            let body = format!(r#"{{"status": "{}", "results": []}}"#, status);
            let result = parse_response(body.as_bytes());

            match result.error {
                Some(LocationError::GeocodeProvider(s)) => assert_eq!(s, status),
                other => panic!("{}: unexpected {:?}", status, other),
            }
            assert!(result.place.is_empty());
            assert!(result.raw_payload.is_none());
        }
    }

    #[test]
    fn test_parse_errors() {
        for body in [
            &b"not json"[..],
            br#"{"results": []}"#,
            br#"{"status": "OK"}"#,
            br#"{"status": "OK", "results": {}}"#,
        ] {
            let result = parse_response(body);
            assert!(
                matches!(result.error, Some(LocationError::GeocodeParse(_))),
                "body {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    // ==================== Transport ====================

    #[tokio::test]
    async fn test_non_200_is_network_error() {
        let http = MockHttpClient::responding(503, "unavailable");
        let result =
            reverse_geocode(&http, &GeocodingConfig::default(), Coordinate::new(1.0, 2.0)).await;

        assert!(matches!(
            result.error,
            Some(LocationError::Network {
                status: Some(503),
                ..
            })
        ));
        assert!(result.place.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_passes_through() {
        let http = MockHttpClient::failing(LocationError::Network {
            status: None,
            message: "connection refused".into(),
        });
        let result =
            reverse_geocode(&http, &GeocodingConfig::default(), Coordinate::new(1.0, 2.0)).await;

        assert!(matches!(result.error, Some(LocationError::Network { .. })));
    }

    #[tokio::test]
    async fn test_key_not_leaked_in_error() {
        let http = MockHttpClient::responding(403, "");
        let config = GeocodingConfig {
            api_key: Some("secret".into()),
            ..GeocodingConfig::default()
        };

        let result = reverse_geocode(&http, &config, Coordinate::new(1.0, 2.0)).await;

        assert!(!result.error.unwrap().to_string().contains("secret"));
        assert!(http.requested_urls()[0].contains("key=secret"));
    }

    /// Client whose requests never finish.
    struct StalledHttpClient;

    impl HttpClient for StalledHttpClient {
        fn get<'a>(
            &'a self,
            _url: &'a str,
        ) -> futures::future::BoxFuture<'a, Result<crate::platform::HttpResponse, LocationError>>
        {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out() {
        let config = GeocodingConfig {
            timeout: std::time::Duration::from_secs(10),
            ..GeocodingConfig::default()
        };

        let result = reverse_geocode(&StalledHttpClient, &config, Coordinate::new(1.0, 2.0)).await;

        assert!(matches!(
            result.error,
            Some(LocationError::TimedOut(d)) if d == std::time::Duration::from_secs(10)
        ));
        assert!(result.place.is_empty());
    }
}
