//! Single-shot geofence waits.
//!
//! A region is validated, registered with the platform, and deregistered
//! again after the first entry or exit the caller asked to be notified of.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{deadline_after, deadline_elapsed, OperationId, RegionOutcome};
use crate::auth::AuthorizationStatus;
use crate::coord::Coordinate;
use crate::error::{LocationError, PlatformError};
use crate::platform::{LocationSource, RegionEvent, RegionMonitor};

/// Error code reported when the platform closes a region stream.
pub const REGION_STREAM_CLOSED_CODE: i64 = -2;

/// A circular geofence.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    identifier: String,
    center: Coordinate,
    radius: f64,
    notify_on_entry: bool,
    notify_on_exit: bool,
}

impl Region {
    /// Create a region. The identifier is derived from center and radius,
    /// so two regions with the same geometry share an identifier.
    pub fn new(
        center: Coordinate,
        radius: f64,
        notify_on_entry: bool,
        notify_on_exit: bool,
    ) -> Self {
        Self {
            identifier: format!("{}_{}_{}", center.latitude, center.longitude, radius),
            center,
            radius,
            notify_on_entry,
            notify_on_exit,
        }
    }

    /// Platform registration key.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Center of the circle.
    pub fn center(&self) -> Coordinate {
        self.center
    }

    /// Radius in meters.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Complete on entry.
    pub fn notify_on_entry(&self) -> bool {
        self.notify_on_entry
    }

    /// Complete on exit.
    pub fn notify_on_exit(&self) -> bool {
        self.notify_on_exit
    }

    fn wants(&self, event: &RegionEvent) -> bool {
        match event {
            RegionEvent::Entered => self.notify_on_entry,
            RegionEvent::Exited => self.notify_on_exit,
            _ => false,
        }
    }
}

/// One region wait.
pub struct RegionMonitoringOperation {
    source: Arc<dyn LocationSource>,
    monitor: Arc<dyn RegionMonitor>,
    region: Region,
    timeout: Option<Duration>,
}

impl RegionMonitoringOperation {
    /// Create a wait for `region` with an optional deadline.
    pub fn new(
        source: Arc<dyn LocationSource>,
        monitor: Arc<dyn RegionMonitor>,
        region: Region,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            source,
            monitor,
            region,
            timeout,
        }
    }

    fn validate(&self) -> Result<(), LocationError> {
        if !self.source.service_enabled() {
            return Err(LocationError::ServiceDisabled);
        }

        let status = self.source.authorization_status();
        if status != AuthorizationStatus::AuthorizedAlways {
            return Err(LocationError::AuthorizationMissing { status });
        }

        let maximum = self.source.maximum_monitorable_radius();
        if self.region.radius >= maximum {
            return Err(LocationError::RegionTooLarge {
                radius: self.region.radius,
                maximum,
            });
        }

        if !self.region.radius.is_finite() || self.region.radius <= 0.0 {
            return Err(LocationError::InvalidRegion(format!(
                "radius must be positive, got {}",
                self.region.radius
            )));
        }
        if !self.region.center.is_valid() {
            return Err(LocationError::InvalidRegion(format!(
                "center out of range: {}",
                self.region.center
            )));
        }

        Ok(())
    }

    /// Run to completion.
    pub async fn run(self, id: OperationId, cancel: CancellationToken) -> RegionOutcome {
        if let Err(e) = self.validate() {
            debug!(%id, region = self.region.identifier(), error = %e, "Region rejected");
            return RegionOutcome::failed(Some(self.region), e);
        }

        let deadline = deadline_after(self.timeout);
        let mut events = self.monitor.start_monitoring(&self.region);
        debug!(%id, region = self.region.identifier(), "Region registered");

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(LocationError::Cancelled),
                _ = deadline_elapsed(deadline) => {
                    break Err(LocationError::TimedOut(self.timeout.unwrap_or_default()));
                }
                event = events.recv() => match event {
                    Some(RegionEvent::Started) => {
                        debug!(%id, region = self.region.identifier(), "Region monitoring started");
                    }
                    Some(RegionEvent::Failed(e)) => {
                        warn!(%id, region = self.region.identifier(), error = %e, "Region monitoring failed");
                        break Err(e.into());
                    }
                    Some(event) if self.region.wants(&event) => break Ok(event),
                    Some(event) => debug!(%id, ?event, "Region event ignored"),
                    None => {
                        break Err(PlatformError::new(REGION_STREAM_CLOSED_CODE, "region stream closed").into());
                    }
                },
            }
        };

        self.monitor.stop_monitoring(&self.region);

        match result {
            Ok(event) => {
                info!(%id, region = self.region.identifier(), ?event, "Region event");
                RegionOutcome::ok(self.region)
            }
            Err(e) => RegionOutcome::failed(Some(self.region), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationStatus;
    use crate::platform::simulated::{SimulatedLocationSource, SimulatedRegionMonitor};

    struct Fixture {
        source: Arc<SimulatedLocationSource>,
        monitor: Arc<SimulatedRegionMonitor>,
    }

    impl Fixture {
        fn new() -> Self {
            let source = Arc::new(SimulatedLocationSource::new());
            source.set_authorization(AuthorizationStatus::AuthorizedAlways);
            source.set_maximum_radius(1_000.0);
            Self {
                source,
                monitor: Arc::new(SimulatedRegionMonitor::new()),
            }
        }

        fn spawn(
            &self,
            region: Region,
            timeout: Option<Duration>,
        ) -> (CancellationToken, tokio::task::JoinHandle<RegionOutcome>) {
            let cancel = CancellationToken::new();
            let op = RegionMonitoringOperation::new(
                self.source.clone(),
                self.monitor.clone(),
                region,
                timeout,
            );
            let task = tokio::spawn(op.run(OperationId::next(), cancel.clone()));
            (cancel, task)
        }
    }

    fn exit_region() -> Region {
        Region::new(Coordinate::new(10.0, 20.0), 100.0, false, true)
    }

    #[test]
    fn test_identifier_is_deterministic() {
        let a = Region::new(Coordinate::new(10.5, -20.25), 150.0, false, true);
        let b = Region::new(Coordinate::new(10.5, -20.25), 150.0, true, false);
        assert_eq!(a.identifier(), "10.5_-20.25_150");
        assert_eq!(a.identifier(), b.identifier());
    }

    #[tokio::test]
    async fn test_exit_completes_and_deregisters() {
        let f = Fixture::new();
        let (_, task) = f.spawn(exit_region(), None);

        f.monitor.wait_for_active(1).await;
        f.monitor.emit_all(RegionEvent::Exited);

        let outcome = task.await.unwrap();
        assert!(outcome.is_ok());
        assert_eq!(outcome.region, Some(exit_region()));
        assert_eq!(f.monitor.stopped(), vec![exit_region()]);
        assert!(f.monitor.active_regions().is_empty());
    }

    #[tokio::test]
    async fn test_unwanted_events_are_ignored() {
        let f = Fixture::new();
        let (_, task) = f.spawn(exit_region(), None);

        f.monitor.wait_for_active(1).await;
        f.monitor.emit_all(RegionEvent::Entered);
        f.monitor.emit_all(RegionEvent::Started);
        f.monitor.emit_all(RegionEvent::Exited);

        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_entry_only_region() {
        let f = Fixture::new();
        let region = Region::new(Coordinate::new(10.0, 20.0), 50.0, true, false);
        let (_, task) = f.spawn(region.clone(), None);

        f.monitor.wait_for_active(1).await;
        f.monitor.emit_all(RegionEvent::Exited);
        f.monitor.emit_all(RegionEvent::Entered);

        let outcome = task.await.unwrap();
        assert!(outcome.is_ok());
        assert_eq!(outcome.region, Some(region.clone()));
        assert_eq!(f.monitor.stopped(), vec![region.clone()]);
        assert!(f.monitor.active_regions().is_empty());

        // Single shot: a later entry reaches nobody
        assert!(!f.monitor.emit(region.identifier(), RegionEvent::Entered));
        assert_eq!(f.monitor.emit_all(RegionEvent::Entered), 0);
    }

    #[tokio::test]
    async fn test_huge_timeout_waits_without_deadline() {
        let f = Fixture::new();
        let (_, task) = f.spawn(exit_region(), Some(Duration::MAX));

        f.monitor.wait_for_active(1).await;
        f.monitor.emit_all(RegionEvent::Exited);

        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_validation_order() {
        let f = Fixture::new();
        f.source.set_service_enabled(false);
        f.source.set_authorization(AuthorizationStatus::AuthorizedWhenInUse);
        let too_big = Region::new(Coordinate::new(10.0, 20.0), 5_000.0, false, true);

        let (_, task) = f.spawn(too_big.clone(), None);
        assert_eq!(
            task.await.unwrap().status,
            OperationStatus::LocationServiceDisabled
        );

        f.source.set_service_enabled(true);
        let (_, task) = f.spawn(too_big.clone(), None);
        assert_eq!(
            task.await.unwrap().status,
            OperationStatus::MissingAuthorization
        );

        f.source.set_authorization(AuthorizationStatus::AuthorizedAlways);
        let (_, task) = f.spawn(too_big, None);
        assert_eq!(task.await.unwrap().status, OperationStatus::Distance);

        assert!(f.monitor.registered().is_empty());
    }

    #[tokio::test]
    async fn test_radius_at_maximum_is_too_large() {
        let f = Fixture::new();
        let region = Region::new(Coordinate::new(10.0, 20.0), 1_000.0, false, true);

        let (_, task) = f.spawn(region, None);
        let outcome = task.await.unwrap();

        assert!(matches!(
            outcome.error,
            Some(LocationError::RegionTooLarge { radius, maximum }) if radius == 1_000.0 && maximum == 1_000.0
        ));
    }

    #[tokio::test]
    async fn test_invalid_geometry() {
        let f = Fixture::new();
        for region in [
            Region::new(Coordinate::new(10.0, 20.0), 0.0, false, true),
            Region::new(Coordinate::new(10.0, 20.0), f64::NAN, false, true),
            Region::new(Coordinate::new(95.0, 20.0), 100.0, false, true),
        ] {
            let (_, task) = f.spawn(region, None);
            let outcome = task.await.unwrap();
            assert!(matches!(outcome.error, Some(LocationError::InvalidRegion(_))));
        }
        assert!(f.monitor.registered().is_empty());
    }

    #[tokio::test]
    async fn test_platform_failure_deregisters() {
        let f = Fixture::new();
        let (_, task) = f.spawn(exit_region(), None);

        f.monitor.wait_for_active(1).await;
        f.monitor
            .emit_all(RegionEvent::Failed(PlatformError::new(5, "monitoring unavailable")));

        let outcome = task.await.unwrap();
        assert_eq!(outcome.status, OperationStatus::Error);
        assert_eq!(f.monitor.stopped().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_deregisters() {
        let f = Fixture::new();
        let (_, task) = f.spawn(exit_region(), Some(Duration::from_secs(60)));

        let outcome = task.await.unwrap();
        assert!(matches!(outcome.error, Some(LocationError::TimedOut(_))));
        assert_eq!(f.monitor.stopped().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_deregisters() {
        let f = Fixture::new();
        let (cancel, task) = f.spawn(exit_region(), None);

        f.monitor.wait_for_active(1).await;
        cancel.cancel();

        let outcome = task.await.unwrap();
        assert!(matches!(outcome.error, Some(LocationError::Cancelled)));
        assert!(f.monitor.active_regions().is_empty());
    }
}
