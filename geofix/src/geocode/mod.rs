//! Reverse geocoding.
//!
//! Turns a coordinate into a normalized [`Place`] (country, state, city)
//! through one of two providers:
//!
//! - [`GeocodeProvider::Local`] - the platform's on-device geocoder
//! - [`GeocodeProvider::Remote`] - the Google Geocoding HTTP API
//!
//! Both produce a [`GeocodeResult`]. A successful lookup is written to the
//! coordinator's place cache and to the store.

mod local;
mod remote;

pub use remote::{classify_components, DEFAULT_GEOCODE_ENDPOINT};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::coord::Coordinate;
use crate::error::LocationError;
use crate::operation::Outcome;
use crate::platform::{HttpClient, LocalGeocoder};
use crate::store::{KeyValueStore, PersistedState};

/// Which provider answers a reverse geocode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeocodeProvider {
    /// On-device geocoder.
    #[default]
    Local,
    /// Remote HTTP geocoding API.
    Remote,
}

impl fmt::Display for GeocodeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Normalized address triple.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Place {
    /// Country code (e.g. "DE").
    pub country: Option<String>,
    /// State or first-level administrative area.
    pub state: Option<String>,
    /// City, locality or second-level administrative area.
    pub city: Option<String>,
}

impl Place {
    /// Create a place from optional parts.
    pub fn new(country: Option<&str>, state: Option<&str>, city: Option<&str>) -> Self {
        Self {
            country: country.map(str::to_string),
            state: state.map(str::to_string),
            city: city.map(str::to_string),
        }
    }

    /// The empty triple.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.state.is_none() && self.city.is_none()
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            write!(f, "(unknown)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Address record from the on-device geocoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placemark {
    /// ISO country code.
    pub country_code: Option<String>,
    /// Country name.
    pub country: Option<String>,
    /// State or province.
    pub administrative_area: Option<String>,
    /// County or district.
    pub sub_administrative_area: Option<String>,
    /// City.
    pub locality: Option<String>,
    /// Display name of the place.
    pub name: Option<String>,
}

/// Completion of a reverse geocode.
#[derive(Debug, Clone, Default)]
pub struct GeocodeResult {
    /// Normalized triple. Empty on failure.
    pub place: Place,
    /// The remote provider's `results` array.
    pub raw_payload: Option<serde_json::Value>,
    /// The local provider's first placemark.
    pub placemark: Option<Placemark>,
    /// Why the lookup failed.
    pub error: Option<LocationError>,
}

impl GeocodeResult {
    /// A failed result with the empty triple.
    pub fn failed(error: LocationError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Returns true if the lookup succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl Outcome for GeocodeResult {
    fn aborted(error: LocationError) -> Self {
        Self::failed(error)
    }
}

/// Remote geocoding settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodingConfig {
    /// Geocoding API endpoint, without query string.
    pub endpoint: String,
    /// API key appended as `key`.
    pub api_key: Option<String>,
    /// Result type filter appended as `result_type`.
    pub result_type: Option<String>,
    /// Limit on one remote request, applied by the coordinator.
    pub timeout: Duration,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GEOCODE_ENDPOINT.to_string(),
            api_key: None,
            result_type: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Resolves coordinates to places and remembers the last one.
pub struct GeocodingCoordinator {
    config: GeocodingConfig,
    geocoder: Arc<dyn LocalGeocoder>,
    http: Arc<dyn HttpClient>,
    store: Arc<dyn KeyValueStore>,
    last_place: Mutex<Place>,
}

impl GeocodingCoordinator {
    /// Create a coordinator seeded with a previously persisted place.
    pub fn new(
        config: GeocodingConfig,
        geocoder: Arc<dyn LocalGeocoder>,
        http: Arc<dyn HttpClient>,
        store: Arc<dyn KeyValueStore>,
        last_place: Place,
    ) -> Self {
        Self {
            config,
            geocoder,
            http,
            store,
            last_place: Mutex::new(last_place),
        }
    }

    /// The most recently resolved place.
    pub fn last_place(&self) -> Place {
        self.last_place.lock().clone()
    }

    /// Resolve `coordinate` with the given provider.
    ///
    /// Always returns exactly one result; failures carry the empty triple and
    /// an error.
    pub async fn reverse_geocode(
        &self,
        coordinate: Coordinate,
        provider: GeocodeProvider,
    ) -> GeocodeResult {
        debug!(%coordinate, %provider, "Reverse geocoding");

        let result = match provider {
            GeocodeProvider::Local => {
                local::reverse_geocode(self.geocoder.as_ref(), coordinate).await
            }
            GeocodeProvider::Remote => {
                remote::reverse_geocode(self.http.as_ref(), &self.config, coordinate).await
            }
        };

        match &result.error {
            None => {
                info!(%coordinate, %provider, place = %result.place, "Reverse geocode complete");
                self.record(&result.place);
            }
            Some(e) => warn!(%coordinate, %provider, error = %e, "Reverse geocode failed"),
        }

        result
    }

    fn record(&self, place: &Place) {
        let mut last = self.last_place.lock();
        *last = place.clone();
        if let Err(e) = PersistedState::save_place(self.store.as_ref(), place) {
            warn!(error = %e, "Failed to persist place");
        }
    }
}

impl fmt::Debug for GeocodingCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeocodingCoordinator")
            .field("config", &self.config)
            .field("last_place", &*self.last_place.lock())
            .finish_non_exhaustive()
    }
}
