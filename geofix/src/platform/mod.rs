//! Platform capability abstraction.
//!
//! The operation scheduler never talks to a sensor, a geofencing service or
//! the network directly. It consumes the capabilities defined here, which
//! keeps every state machine testable with the [`simulated`] platform.
//!
//! # Capabilities
//!
//! - [`LocationSource`] - fix stream, service/authorization state, escalation
//! - [`RegionMonitor`] - geofence registration and enter/exit events
//! - [`LocalGeocoder`] - on-device reverse geocoding
//! - [`HttpClient`] - HTTP GET for remote geocoding
//! - [`KeyValueStore`](crate::store::KeyValueStore) - persistence
//!
//! [`Platform`] bundles one of each and is handed to the manager.

mod http;
pub mod simulated;

pub use http::{HttpClient, HttpResponse, ReqwestClient};

#[cfg(test)]
pub use http::tests::MockHttpClient;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc};

use crate::auth::{AuthorizationLevel, AuthorizationStatus};
use crate::coord::{Coordinate, Fix};
use crate::error::PlatformError;
use crate::geocode::Placemark;
use crate::operation::Region;
use crate::store::{KeyValueStore, MemoryStore};

/// Accuracy a subscriber asks the sensor for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DesiredAccuracy {
    /// Highest available accuracy.
    #[default]
    Best,
    /// Within ten meters.
    NearestTenMeters,
    /// Within a hundred meters.
    HundredMeters,
    /// Within one kilometer.
    Kilometer,
    /// Within three kilometers.
    ThreeKilometers,
}

impl fmt::Display for DesiredAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best => write!(f, "best"),
            Self::NearestTenMeters => write!(f, "10m"),
            Self::HundredMeters => write!(f, "100m"),
            Self::Kilometer => write!(f, "1km"),
            Self::ThreeKilometers => write!(f, "3km"),
        }
    }
}

impl std::str::FromStr for DesiredAccuracy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "10m" => Ok(Self::NearestTenMeters),
            "100m" => Ok(Self::HundredMeters),
            "1km" => Ok(Self::Kilometer),
            "3km" => Ok(Self::ThreeKilometers),
            other => Err(format!(
                "unknown accuracy '{}', expected best, 10m, 100m, 1km or 3km",
                other
            )),
        }
    }
}

/// Identifies one fix subscription.
pub type SubscriptionId = u64;

/// An event on a fix stream.
#[derive(Debug, Clone, PartialEq)]
pub enum FixEvent {
    /// The sensor produced a sample.
    Fix(Fix),
    /// The sensor reported a failure.
    Error(PlatformError),
}

/// A live fix stream returned by [`LocationSource::subscribe`].
#[derive(Debug)]
pub struct FixSubscription {
    /// Handle for [`LocationSource::unsubscribe`].
    pub id: SubscriptionId,
    /// Events in delivery order.
    pub events: mpsc::UnboundedReceiver<FixEvent>,
}

/// Platform location sensor and its permission state.
pub trait LocationSource: Send + Sync {
    /// Whether the device location service is switched on.
    fn service_enabled(&self) -> bool;

    /// Current authorization status.
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Largest region radius (meters) the platform can monitor.
    fn maximum_monitorable_radius(&self) -> f64;

    /// Ask the platform to prompt for `level`.
    fn request_authorization(&self, level: AuthorizationLevel);

    /// Stream of authorization changes.
    fn authorization_changes(&self) -> broadcast::Receiver<AuthorizationStatus>;

    /// Start delivering fixes.
    fn subscribe(&self, accuracy: DesiredAccuracy) -> FixSubscription;

    /// Stop delivering fixes to a subscription.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// An event on a region stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionEvent {
    /// The platform confirmed the registration.
    Started,
    /// The device entered the region.
    Entered,
    /// The device left the region.
    Exited,
    /// Monitoring failed.
    Failed(PlatformError),
}

/// Platform geofencing service.
pub trait RegionMonitor: Send + Sync {
    /// Register a region and return its event stream.
    fn start_monitoring(&self, region: &Region) -> mpsc::UnboundedReceiver<RegionEvent>;

    /// Deregister a region.
    fn stop_monitoring(&self, region: &Region);
}

/// On-device reverse geocoder.
pub trait LocalGeocoder: Send + Sync {
    /// Resolve a coordinate to zero or more placemarks.
    fn reverse_geocode(
        &self,
        coordinate: Coordinate,
    ) -> BoxFuture<'_, Result<Vec<Placemark>, PlatformError>>;
}

/// One of each platform capability.
#[derive(Clone)]
pub struct Platform {
    /// Location sensor.
    pub location: Arc<dyn LocationSource>,
    /// Geofencing service.
    pub regions: Arc<dyn RegionMonitor>,
    /// On-device geocoder.
    pub geocoder: Arc<dyn LocalGeocoder>,
    /// HTTP transport for remote geocoding.
    pub http: Arc<dyn HttpClient>,
    /// Persistence for last fix and last place.
    pub store: Arc<dyn KeyValueStore>,
}

impl Platform {
    /// Bundle the given capabilities.
    pub fn new(
        location: Arc<dyn LocationSource>,
        regions: Arc<dyn RegionMonitor>,
        geocoder: Arc<dyn LocalGeocoder>,
        http: Arc<dyn HttpClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            location,
            regions,
            geocoder,
            http,
            store,
        }
    }

    /// Replace the store.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = store;
        self
    }

    /// Replace the HTTP client.
    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = http;
        self
    }

    /// A fully simulated platform with an in-memory store.
    ///
    /// The simulated parts are returned alongside so callers can drive them.
    pub fn simulated(http: Arc<dyn HttpClient>) -> (Self, simulated::SimulatedPlatform) {
        let parts = simulated::SimulatedPlatform::new();
        let platform = Self::new(
            parts.location.clone(),
            parts.regions.clone(),
            parts.geocoder.clone(),
            http,
            Arc::new(MemoryStore::new()),
        );
        (platform, parts)
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("service_enabled", &self.location.service_enabled())
            .field("authorization", &self.location.authorization_status())
            .finish_non_exhaustive()
    }
}
