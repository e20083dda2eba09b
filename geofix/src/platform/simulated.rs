//! Programmable in-process platform.
//!
//! Stand-ins for the sensor, geofencing service and on-device geocoder of a
//! real device. Tests drive them explicitly (push a fix, enter a region,
//! flip authorization); the CLI uses [`SimulatedLocationSource::set_auto_fix`]
//! to report a fixed position on hosts without a location sensor.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::trace;

use super::{
    DesiredAccuracy, FixEvent, FixSubscription, LocalGeocoder, LocationSource, RegionEvent,
    RegionMonitor, SubscriptionId,
};
use crate::auth::{AuthorizationLevel, AuthorizationStatus};
use crate::coord::{Coordinate, Fix};
use crate::error::PlatformError;
use crate::geocode::Placemark;
use crate::operation::Region;

/// Capacity of the authorization change channel.
const AUTH_CHANNEL_CAPACITY: usize = 16;

/// Default maximum monitorable region radius in meters.
pub const DEFAULT_MAX_REGION_RADIUS: f64 = 10_000.0;

struct SourceState {
    service_enabled: bool,
    authorization: AuthorizationStatus,
    maximum_radius: f64,
    grant_on_request: Option<AuthorizationStatus>,
    auto_fix: Option<(Coordinate, f64)>,
    subscribers: HashMap<SubscriptionId, mpsc::UnboundedSender<FixEvent>>,
    next_id: SubscriptionId,
    subscribe_count: usize,
    requests: Vec<AuthorizationLevel>,
}

/// Simulated location sensor.
///
/// Starts with the service enabled and authorization `NotDetermined`.
pub struct SimulatedLocationSource {
    state: Mutex<SourceState>,
    auth_tx: broadcast::Sender<AuthorizationStatus>,
    active_tx: watch::Sender<usize>,
    requests_tx: watch::Sender<usize>,
}

impl SimulatedLocationSource {
    /// Create a source with default state.
    pub fn new() -> Self {
        let (auth_tx, _) = broadcast::channel(AUTH_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(SourceState {
                service_enabled: true,
                authorization: AuthorizationStatus::NotDetermined,
                maximum_radius: DEFAULT_MAX_REGION_RADIUS,
                grant_on_request: None,
                auto_fix: None,
                subscribers: HashMap::new(),
                next_id: 1,
                subscribe_count: 0,
                requests: Vec::new(),
            }),
            auth_tx,
            active_tx: watch::channel(0).0,
            requests_tx: watch::channel(0).0,
        }
    }

    /// Switch the location service on or off.
    pub fn set_service_enabled(&self, enabled: bool) {
        self.state.lock().service_enabled = enabled;
    }

    /// Change the authorization status and notify listeners.
    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.state.lock().authorization = status;
        trace!(%status, "Simulated authorization change");
        // No listeners is fine
        let _ = self.auth_tx.send(status);
    }

    /// Set the largest monitorable region radius.
    pub fn set_maximum_radius(&self, meters: f64) {
        self.state.lock().maximum_radius = meters;
    }

    /// Answer every authorization request with `status`.
    ///
    /// `None` leaves requests unanswered until [`set_authorization`](Self::set_authorization).
    pub fn grant_on_request(&self, status: Option<AuthorizationStatus>) {
        self.state.lock().grant_on_request = status;
    }

    /// Report a fresh fix at `position` (coordinate, accuracy) to every new
    /// subscriber as soon as it subscribes.
    pub fn set_auto_fix(&self, position: Option<(Coordinate, f64)>) {
        self.state.lock().auto_fix = position;
    }

    /// Deliver a fix to every active subscriber. Returns how many received it.
    pub fn push_fix(&self, fix: Fix) -> usize {
        self.broadcast(FixEvent::Fix(fix))
    }

    /// Deliver a sensor error to every active subscriber.
    pub fn push_error(&self, error: PlatformError) -> usize {
        self.broadcast(FixEvent::Error(error))
    }

    /// Drop every subscriber's stream without unsubscribing.
    pub fn close_streams(&self) {
        self.state.lock().subscribers.clear();
        self.active_tx.send_replace(0);
    }

    /// Total number of `subscribe` calls so far.
    pub fn subscribe_count(&self) -> usize {
        self.state.lock().subscribe_count
    }

    /// Number of currently open subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Authorization levels requested so far, in order.
    pub fn authorization_requests(&self) -> Vec<AuthorizationLevel> {
        self.state.lock().requests.clone()
    }

    /// Wait until at least one subscription is open.
    pub async fn wait_for_subscriber(&self) {
        let mut rx = self.active_tx.subscribe();
        let _ = rx.wait_for(|active| *active > 0).await;
    }

    /// Wait until `count` authorization requests have been made in total.
    pub async fn wait_for_authorization_requests(&self, count: usize) {
        let mut rx = self.requests_tx.subscribe();
        let _ = rx.wait_for(|made| *made >= count).await;
    }

    fn broadcast(&self, event: FixEvent) -> usize {
        let state = self.state.lock();
        state
            .subscribers
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }
}

impl Default for SimulatedLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationSource for SimulatedLocationSource {
    fn service_enabled(&self) -> bool {
        self.state.lock().service_enabled
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        self.state.lock().authorization
    }

    fn maximum_monitorable_radius(&self) -> f64 {
        self.state.lock().maximum_radius
    }

    fn request_authorization(&self, level: AuthorizationLevel) {
        let grant = {
            let mut state = self.state.lock();
            state.requests.push(level);
            self.requests_tx.send_replace(state.requests.len());
            state.grant_on_request
        };
        if let Some(status) = grant {
            self.set_authorization(status);
        }
    }

    fn authorization_changes(&self) -> broadcast::Receiver<AuthorizationStatus> {
        self.auth_tx.subscribe()
    }

    fn subscribe(&self, accuracy: DesiredAccuracy) -> FixSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();

        let id = state.next_id;
        state.next_id += 1;
        state.subscribe_count += 1;

        if let Some((coordinate, horizontal)) = state.auto_fix {
            let _ = tx.send(FixEvent::Fix(Fix::new(
                coordinate.latitude,
                coordinate.longitude,
                horizontal,
            )));
        }

        state.subscribers.insert(id, tx);
        self.active_tx.send_replace(state.subscribers.len());
        trace!(id, %accuracy, "Simulated subscription opened");

        FixSubscription { id, events: rx }
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.state.lock();
        if state.subscribers.remove(&id).is_some() {
            trace!(id, "Simulated subscription closed");
        }
        self.active_tx.send_replace(state.subscribers.len());
    }
}

#[derive(Default)]
struct MonitorState {
    active: HashMap<String, (Region, mpsc::UnboundedSender<RegionEvent>)>,
    registered: Vec<Region>,
    stopped: Vec<Region>,
}

/// Simulated geofencing service.
///
/// Every registration immediately reports [`RegionEvent::Started`].
pub struct SimulatedRegionMonitor {
    state: Mutex<MonitorState>,
    active_tx: watch::Sender<usize>,
}

impl SimulatedRegionMonitor {
    /// Create a monitor with no regions.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MonitorState::default()),
            active_tx: watch::channel(0).0,
        }
    }

    /// Send `event` to the region with `identifier`. Returns false if the
    /// region is not being monitored.
    pub fn emit(&self, identifier: &str, event: RegionEvent) -> bool {
        let state = self.state.lock();
        match state.active.get(identifier) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Send `event` to every monitored region. Returns how many received it.
    pub fn emit_all(&self, event: RegionEvent) -> usize {
        let state = self.state.lock();
        state
            .active
            .values()
            .filter(|(_, tx)| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Regions currently monitored.
    pub fn active_regions(&self) -> Vec<Region> {
        self.state
            .lock()
            .active
            .values()
            .map(|(region, _)| region.clone())
            .collect()
    }

    /// Every region ever registered, in order.
    pub fn registered(&self) -> Vec<Region> {
        self.state.lock().registered.clone()
    }

    /// Every region ever deregistered, in order.
    pub fn stopped(&self) -> Vec<Region> {
        self.state.lock().stopped.clone()
    }

    /// Wait until at least `count` regions are monitored at once.
    pub async fn wait_for_active(&self, count: usize) {
        let mut rx = self.active_tx.subscribe();
        let _ = rx.wait_for(|active| *active >= count).await;
    }
}

impl Default for SimulatedRegionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionMonitor for SimulatedRegionMonitor {
    fn start_monitoring(&self, region: &Region) -> mpsc::UnboundedReceiver<RegionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(RegionEvent::Started);

        let mut state = self.state.lock();
        state.registered.push(region.clone());
        state
            .active
            .insert(region.identifier().to_string(), (region.clone(), tx));
        self.active_tx.send_replace(state.active.len());
        rx
    }

    fn stop_monitoring(&self, region: &Region) {
        let mut state = self.state.lock();
        state.active.remove(region.identifier());
        state.stopped.push(region.clone());
        self.active_tx.send_replace(state.active.len());
    }
}

/// Simulated on-device reverse geocoder.
///
/// Answers every lookup with the configured response (initially no placemarks).
pub struct SimulatedGeocoder {
    response: Mutex<Result<Vec<Placemark>, PlatformError>>,
    lookups: Mutex<Vec<Coordinate>>,
}

impl SimulatedGeocoder {
    /// Create a geocoder that finds nothing.
    pub fn new() -> Self {
        Self {
            response: Mutex::new(Ok(Vec::new())),
            lookups: Mutex::new(Vec::new()),
        }
    }

    /// Set the answer for subsequent lookups.
    pub fn set_response(&self, response: Result<Vec<Placemark>, PlatformError>) {
        *self.response.lock() = response;
    }

    /// Coordinates looked up so far.
    pub fn lookups(&self) -> Vec<Coordinate> {
        self.lookups.lock().clone()
    }
}

impl Default for SimulatedGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalGeocoder for SimulatedGeocoder {
    fn reverse_geocode(
        &self,
        coordinate: Coordinate,
    ) -> BoxFuture<'_, Result<Vec<Placemark>, PlatformError>> {
        self.lookups.lock().push(coordinate);
        let response = self.response.lock().clone();
        Box::pin(async move { response })
    }
}

/// Handles to the simulated capabilities of a [`Platform`](super::Platform).
#[derive(Clone)]
pub struct SimulatedPlatform {
    /// Location sensor.
    pub location: Arc<SimulatedLocationSource>,
    /// Geofencing service.
    pub regions: Arc<SimulatedRegionMonitor>,
    /// On-device geocoder.
    pub geocoder: Arc<SimulatedGeocoder>,
}

impl SimulatedPlatform {
    /// Create fresh simulated capabilities.
    pub fn new() -> Self {
        Self {
            location: Arc::new(SimulatedLocationSource::new()),
            regions: Arc::new(SimulatedRegionMonitor::new()),
            geocoder: Arc::new(SimulatedGeocoder::new()),
        }
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}
