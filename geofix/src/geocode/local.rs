//! On-device geocoder adapter.

use tracing::debug;

use super::{GeocodeResult, Place, Placemark};
use crate::coord::Coordinate;
use crate::error::LocationError;
use crate::platform::LocalGeocoder;

/// Look up `coordinate` and normalize the first placemark.
pub(super) async fn reverse_geocode(
    geocoder: &dyn LocalGeocoder,
    coordinate: Coordinate,
) -> GeocodeResult {
    let placemarks = match geocoder.reverse_geocode(coordinate).await {
        Ok(placemarks) => placemarks,
        Err(e) => return GeocodeResult::failed(LocationError::GeocodeProvider(e.to_string())),
    };

    debug!(count = placemarks.len(), "Local geocoder answered");

    match placemarks.into_iter().next() {
        Some(placemark) => GeocodeResult {
            place: normalize(&placemark),
            placemark: Some(placemark),
            ..GeocodeResult::default()
        },
        None => GeocodeResult::failed(LocationError::GeocodeProvider(
            "no placemarks for coordinate".to_string(),
        )),
    }
}

fn normalize(placemark: &Placemark) -> Place {
    Place {
        country: placemark.country_code.clone(),
        state: placemark.administrative_area.clone(),
        city: placemark.locality.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::simulated::SimulatedGeocoder;

    fn placemark(code: &str, area: &str, city: &str) -> Placemark {
        Placemark {
            country_code: Some(code.into()),
            country: Some("ignored".into()),
            administrative_area: Some(area.into()),
            sub_administrative_area: Some("ignored".into()),
            locality: Some(city.into()),
            name: Some("ignored".into()),
        }
    }

    #[tokio::test]
    async fn test_first_placemark_wins() {
        let geocoder = SimulatedGeocoder::new();
        geocoder.set_response(Ok(vec![
            placemark("US", "CA", "Cupertino"),
            placemark("US", "NY", "New York"),
        ]));

        let result = reverse_geocode(&geocoder, Coordinate::new(37.33, -122.03)).await;

        assert!(result.is_ok());
        assert_eq!(result.place, Place::new(Some("US"), Some("CA"), Some("Cupertino")));
        assert_eq!(result.placemark.unwrap().locality.as_deref(), Some("Cupertino"));
        assert!(result.raw_payload.is_none());
    }

    #[tokio::test]
    async fn test_empty_list_is_provider_error() {
        let geocoder = SimulatedGeocoder::new();

        let result = reverse_geocode(&geocoder, Coordinate::new(0.0, 0.0)).await;

        assert!(matches!(result.error, Some(LocationError::GeocodeProvider(_))));
        assert!(result.place.is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_stay_empty() {
        let geocoder = SimulatedGeocoder::new();
        geocoder.set_response(Ok(vec![Placemark {
            country_code: Some("AQ".into()),
            ..Placemark::default()
        }]));

        let result = reverse_geocode(&geocoder, Coordinate::new(-75.0, 0.0)).await;

        assert_eq!(result.place, Place::new(Some("AQ"), None, None));
    }
}
