//! Location manager facade.
//!
//! The [`LocationManager`] owns every piece of shared state (debounce cache,
//! place cache, authorization gate, in-flight operations) and is the only
//! entry point callers need. Each request returns an [`OperationHandle`]
//! that resolves exactly once.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use geofix::{GeocodeProvider, LocationManager, ManagerConfig, Platform, RegionRequest};
//! use geofix::platform::ReqwestClient;
//!
//! let (platform, sim) = Platform::simulated(Arc::new(ReqwestClient::new()?));
//! let manager = LocationManager::new(ManagerConfig::default(), platform);
//!
//! let update = manager.update_location().await;
//! let region = manager.monitor_region(RegionRequest::new(53.55, 9.99).with_radius(250.0));
//! let place = manager.reverse_geocode_location(GeocodeProvider::Remote).await;
//! ```

mod config;

pub use config::{ManagerConfig, DEFAULT_UPDATE_TIMEOUT};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{AuthorizationGate, AuthorizationLevel, AuthorizationStatus, EscalationOutcome};
use crate::coord::Coordinate;
use crate::debounce::DebounceCache;
use crate::error::LocationError;
use crate::geocode::{GeocodeProvider, GeocodeResult, GeocodingCoordinator, Place};
use crate::operation::{
    InFlightOperation, LocationUpdate, LocationUpdateOperation, OperationHandle, OperationKind,
    OperationQueue, OperationStatus, Region, RegionMonitoringOperation, RegionOutcome,
    UpdateContext,
};
use crate::platform::Platform;
use crate::store::PersistedState;

/// Default region radius in meters.
pub const DEFAULT_REGION_RADIUS: f64 = 100.0;

/// Event broadcast to [`LocationManager::subscribe`] receivers.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    /// A location update accepted a new fix.
    LocationUpdated {
        /// Accepted position.
        coordinate: Coordinate,
        /// Horizontal accuracy of the fix in meters.
        accuracy: f64,
        /// When the fix was accepted.
        updated_at: DateTime<Utc>,
    },
}

/// Callback invoked on every authorization change.
pub type AuthorizationCallback = Arc<dyn Fn(AuthorizationStatus) + Send + Sync>;

/// Parameters of a region wait.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRequest {
    /// Center latitude in degrees.
    pub latitude: f64,
    /// Center longitude in degrees.
    pub longitude: f64,
    /// Radius in meters.
    pub radius: f64,
    /// Complete on entry.
    pub notify_on_entry: bool,
    /// Complete on exit.
    pub notify_on_exit: bool,
    /// Deadline overriding the configured region timeout.
    pub timeout: Option<Duration>,
}

impl RegionRequest {
    /// Exit notification for a 100 m circle around the given center.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius: DEFAULT_REGION_RADIUS,
            notify_on_entry: false,
            notify_on_exit: true,
            timeout: None,
        }
    }

    /// Set the radius in meters.
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    /// Enable or disable completion on entry.
    pub fn with_entry(mut self, notify: bool) -> Self {
        self.notify_on_entry = notify;
        self
    }

    /// Enable or disable completion on exit.
    pub fn with_exit(mut self, notify: bool) -> Self {
        self.notify_on_exit = notify;
        self
    }

    /// Set a deadline for this wait.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn region(&self) -> Region {
        Region::new(
            Coordinate::new(self.latitude, self.longitude),
            self.radius,
            self.notify_on_entry,
            self.notify_on_exit,
        )
    }
}

/// Coordinates location updates, region waits and reverse geocoding.
pub struct LocationManager {
    config: ManagerConfig,
    platform: Platform,
    queue: Arc<OperationQueue>,
    gate: Arc<AuthorizationGate>,
    cache: Arc<DebounceCache>,
    geocoding: Arc<GeocodingCoordinator>,
    events: broadcast::Sender<LocationEvent>,
    auth_callback: Arc<Mutex<Option<AuthorizationCallback>>>,
    auth_listener_started: AtomicBool,
    listener_cancel: CancellationToken,
}

impl LocationManager {
    /// Create a manager over the given platform.
    ///
    /// Persisted state is read once here when `restore_last_known` is set.
    pub fn new(config: ManagerConfig, platform: Platform) -> Self {
        let persisted = if config.restore_last_known {
            PersistedState::load(platform.store.as_ref())
        } else {
            PersistedState::default()
        };

        if let Some(fix) = &persisted.last_fix {
            info!(
                coordinate = %fix.coordinate,
                updated_at = %fix.updated_at,
                "Restored last known location"
            );
        }

        let cache = Arc::new(DebounceCache::new(
            config.debounce.clone(),
            platform.store.clone(),
            persisted.last_fix,
        ));
        let geocoding = Arc::new(GeocodingCoordinator::new(
            config.geocoding.clone(),
            platform.geocoder.clone(),
            platform.http.clone(),
            platform.store.clone(),
            persisted.last_place,
        ));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            gate: Arc::new(AuthorizationGate::new(platform.location.clone())),
            queue: Arc::new(OperationQueue::new()),
            cache,
            geocoding,
            events,
            auth_callback: Arc::new(Mutex::new(None)),
            auth_listener_started: AtomicBool::new(false),
            listener_cancel: CancellationToken::new(),
            config,
            platform,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn update_context(&self) -> UpdateContext {
        UpdateContext {
            source: self.platform.location.clone(),
            gate: self.gate.clone(),
            cache: self.cache.clone(),
            events: self.events.clone(),
        }
    }

    fn update_operation(&self, timeout: Option<Duration>) -> LocationUpdateOperation {
        LocationUpdateOperation::new(self.update_context(), self.config.accuracy, timeout)
    }

    // =========================================================================
    // Location updates
    // =========================================================================

    /// Acquire one fix with the configured deadline.
    pub fn update_location(&self) -> OperationHandle<LocationUpdate> {
        self.submit_update(self.config.update_timeout)
    }

    /// Acquire one fix with an explicit deadline.
    pub fn update_location_with_timeout(
        &self,
        timeout: Duration,
    ) -> OperationHandle<LocationUpdate> {
        self.submit_update(Some(timeout))
    }

    fn submit_update(&self, timeout: Option<Duration>) -> OperationHandle<LocationUpdate> {
        let op = self.update_operation(timeout);
        self.queue
            .submit(OperationKind::LocationUpdate, move |id, cancel| op.run(id, cancel))
    }

    // =========================================================================
    // Regions
    // =========================================================================

    /// Wait for one entry into or exit from a region.
    pub fn monitor_region(&self, request: RegionRequest) -> OperationHandle<RegionOutcome> {
        let op = RegionMonitoringOperation::new(
            self.platform.location.clone(),
            self.platform.regions.clone(),
            request.region(),
            request.timeout.or(self.config.region_timeout),
        );
        self.queue
            .submit(OperationKind::RegionMonitoring, move |id, cancel| op.run(id, cancel))
    }

    // =========================================================================
    // Geocoding
    // =========================================================================

    /// Update the location, then reverse geocode it.
    ///
    /// A `TIME` rejection geocodes the last known coordinate. Any other
    /// failure of the update completes with the empty place and its error.
    pub fn reverse_geocode_location(
        &self,
        provider: GeocodeProvider,
    ) -> OperationHandle<GeocodeResult> {
        let op = self.update_operation(self.config.update_timeout);
        let geocoding = self.geocoding.clone();

        self.queue
            .submit(OperationKind::ReverseGeocode, move |id, cancel| async move {
                let update = op.run(id, cancel.clone()).await;
                match update.status {
                    OperationStatus::Ok | OperationStatus::Time => {}
                    status => {
                        debug!(%id, %status, "Update failed, skipping geocode");
                        let error = update.error.unwrap_or(LocationError::Aborted);
                        return GeocodeResult::failed(error);
                    }
                }

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => GeocodeResult::failed(LocationError::Cancelled),
                    result = geocoding.reverse_geocode(update.coordinate, provider) => result,
                }
            })
    }

    /// Reverse geocode a known coordinate.
    pub fn reverse_geocode(
        &self,
        coordinate: Coordinate,
        provider: GeocodeProvider,
    ) -> OperationHandle<GeocodeResult> {
        let geocoding = self.geocoding.clone();

        self.queue
            .submit(OperationKind::ReverseGeocode, move |_, cancel| async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => GeocodeResult::failed(LocationError::Cancelled),
                    result = geocoding.reverse_geocode(coordinate, provider) => result,
                }
            })
    }

    // =========================================================================
    // Authorization
    // =========================================================================

    /// Current platform authorization status.
    pub fn authorization_status(&self) -> AuthorizationStatus {
        self.gate.current_status()
    }

    /// Escalate authorization to `level` if possible.
    pub fn request_authorization(&self, level: AuthorizationLevel) -> EscalationOutcome {
        self.gate.request_authorization(level)
    }

    /// Escalate authorization and call `callback` on every later change.
    ///
    /// The callback replaces any previously registered one. It is invoked
    /// from a background task, so a Tokio runtime must be running.
    pub fn request_authorization_with_callback<F>(
        &self,
        level: AuthorizationLevel,
        callback: F,
    ) -> EscalationOutcome
    where
        F: Fn(AuthorizationStatus) + Send + Sync + 'static,
    {
        *self.auth_callback.lock() = Some(Arc::new(callback));
        self.start_auth_listener();
        self.gate.request_authorization(level)
    }

    fn start_auth_listener(&self) {
        if self.auth_listener_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No Tokio runtime, authorization callback will not fire");
                self.auth_listener_started.store(false, Ordering::SeqCst);
                return;
            }
        };

        // Subscribed before the request is issued so an immediate answer is seen
        let mut changes = self.platform.location.authorization_changes();
        let callback = self.auth_callback.clone();
        let cancel = self.listener_cancel.clone();

        runtime.spawn(async move {
            loop {
                let status = tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(status) => status,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Authorization listener lagged");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    },
                };

                debug!(%status, "Authorization changed");
                let current = callback.lock().clone();
                if let Some(f) = current {
                    f(status);
                }
            }
        });
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Receive a [`LocationEvent`] for every accepted fix.
    pub fn subscribe(&self) -> broadcast::Receiver<LocationEvent> {
        self.events.subscribe()
    }

    /// Coordinate of the last accepted fix.
    pub fn last_known_location(&self) -> Option<Coordinate> {
        self.cache.last_coordinate()
    }

    /// When the last fix was accepted.
    pub fn last_update_at(&self) -> Option<DateTime<Utc>> {
        self.cache.last_fix().map(|f| f.updated_at)
    }

    /// Place from the last successful reverse geocode.
    pub fn last_known_place(&self) -> Place {
        self.geocoding.last_place()
    }

    /// Operations that have not finished yet.
    pub fn in_flight(&self) -> Vec<InFlightOperation> {
        self.queue.in_flight()
    }

    /// Cancel every in-flight operation and stop the authorization listener.
    ///
    /// Operations submitted afterwards complete immediately with `Cancelled`.
    pub fn shutdown(&self) {
        info!(in_flight = self.queue.len(), "Location manager shutting down");
        self.queue.shutdown();
        self.listener_cancel.cancel();
    }
}

impl Drop for LocationManager {
    fn drop(&mut self) {
        self.listener_cancel.cancel();
    }
}

impl std::fmt::Debug for LocationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationManager")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::simulated::SimulatedPlatform;
    use crate::platform::MockHttpClient;
    use crate::store::{MemoryStore, PersistedFix};
    use tokio::sync::mpsc;

    fn manager(config: ManagerConfig) -> (LocationManager, SimulatedPlatform) {
        let (platform, sim) = Platform::simulated(Arc::new(MockHttpClient::responding(500, "")));
        (LocationManager::new(config, platform), sim)
    }

    #[test]
    fn test_region_request_defaults() {
        let request = RegionRequest::new(1.0, 2.0);
        assert_eq!(request.radius, 100.0);
        assert!(request.notify_on_exit);
        assert!(!request.notify_on_entry);
        assert_eq!(request.timeout, None);
    }

    #[test]
    fn test_restores_persisted_state() {
        let store = Arc::new(MemoryStore::new());
        let fix = PersistedFix {
            coordinate: Coordinate::new(53.55, 9.99),
            updated_at: Utc::now(),
        };
        PersistedState::save_fix(store.as_ref(), &fix).unwrap();
        PersistedState::save_place(store.as_ref(), &Place::new(Some("DE"), None, None)).unwrap();

        let (platform, _) = Platform::simulated(Arc::new(MockHttpClient::responding(500, "")));
        let platform = platform.with_store(store.clone());

        let restored = LocationManager::new(ManagerConfig::default(), platform.clone());
        assert_eq!(restored.last_known_location(), Some(fix.coordinate));
        assert_eq!(restored.last_known_place().country.as_deref(), Some("DE"));

        let fresh = LocationManager::new(
            ManagerConfig::default().with_restore_last_known(false),
            platform,
        );
        assert_eq!(fresh.last_known_location(), None);
        assert!(fresh.last_known_place().is_empty());
    }

    #[test]
    fn test_without_runtime_completes_with_error() {
        let (manager, sim) = manager(ManagerConfig::default());
        sim.location.set_authorization(AuthorizationStatus::AuthorizedWhenInUse);

        let handle = manager.update_location();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let update = runtime.block_on(handle);

        assert_eq!(update.status, OperationStatus::Error);
        assert!(matches!(update.error, Some(LocationError::NoRuntime)));
        assert_eq!(sim.location.subscribe_count(), 0);
    }

    #[tokio::test]
    async fn test_authorization_callback_replaced() {
        let (manager, sim) = manager(ManagerConfig::default());
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();

        let outcome = manager.request_authorization_with_callback(
            AuthorizationLevel::WhenInUse,
            move |status| {
                let _ = first_tx.send(status);
            },
        );
        assert_eq!(outcome, EscalationOutcome::Requested);

        sim.location.set_authorization(AuthorizationStatus::AuthorizedWhenInUse);
        assert_eq!(
            first_rx.recv().await,
            Some(AuthorizationStatus::AuthorizedWhenInUse)
        );

        manager.request_authorization_with_callback(AuthorizationLevel::Always, move |status| {
            let _ = second_tx.send(status);
        });
        sim.location.set_authorization(AuthorizationStatus::AuthorizedAlways);

        assert_eq!(
            second_rx.recv().await,
            Some(AuthorizationStatus::AuthorizedAlways)
        );
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight() {
        let (manager, sim) = manager(ManagerConfig::default().with_update_timeout(None));
        sim.location.set_authorization(AuthorizationStatus::AuthorizedWhenInUse);

        let handle = manager.update_location();
        sim.location.wait_for_subscriber().await;
        assert_eq!(manager.in_flight().len(), 1);

        manager.shutdown();

        let update = handle.await;
        assert!(matches!(update.error, Some(LocationError::Cancelled)));
        assert!(manager.in_flight().is_empty());
        assert_eq!(sim.location.active_subscriptions(), 0);
    }
}
