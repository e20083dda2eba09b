//! Asynchronous location operations.
//!
//! Every request the manager accepts becomes one operation: a Tokio task
//! registered in the [`OperationQueue`] that runs a small state machine and
//! finishes with exactly one completion value.
//!
//! # Completion Guarantee
//!
//! The task owns a [`Completion`]; the caller owns the matching
//! [`OperationHandle`]. `Completion::complete` consumes the completion, and
//! dropping it without completing (early return, panic, runtime shutdown)
//! delivers an `Aborted` outcome instead. A handle therefore always resolves,
//! and resolves exactly once.
//!
//! # Operations
//!
//! - [`LocationUpdateOperation`] - acquire one qualifying fix
//! - [`RegionMonitoringOperation`] - wait for one geofence entry or exit

mod location_update;
mod queue;
mod region;

pub use location_update::{LocationUpdateOperation, UpdateContext};
pub use queue::{InFlightOperation, OperationQueue};
pub use region::{Region, RegionMonitoringOperation};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::coord::Coordinate;
use crate::error::LocationError;

// =============================================================================
// Identity and lifecycle
// =============================================================================

static OPERATION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of an operation within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    /// Allocate the next identifier.
    pub(crate) fn next() -> Self {
        Self(OPERATION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// What an operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Acquire one fix.
    LocationUpdate,
    /// Wait for a region event.
    RegionMonitoring,
    /// Update followed by a reverse geocode.
    ReverseGeocode,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocationUpdate => write!(f, "location update"),
            Self::RegionMonitoring => write!(f, "region monitoring"),
            Self::ReverseGeocode => write!(f, "reverse geocode"),
        }
    }
}

/// Lifecycle state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Queued, task not yet polled.
    Pending,
    /// Task running.
    Executing,
    /// Completion delivered.
    Finished,
}

/// Terminal status reported with every completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    /// Finished successfully.
    Ok,
    /// Rejected because the last update is too recent.
    Time,
    /// Rejected on distance (region larger than monitorable).
    Distance,
    /// Failed; the completion carries the cause.
    Error,
    /// Authorization is missing or refused.
    MissingAuthorization,
    /// The device location service is off.
    LocationServiceDisabled,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Time => write!(f, "TIME"),
            Self::Distance => write!(f, "DISTANCE"),
            Self::Error => write!(f, "ERROR"),
            Self::MissingAuthorization => write!(f, "MISSING AUTHORIZATION"),
            Self::LocationServiceDisabled => write!(f, "LOCATION SERVICE DISABLED"),
        }
    }
}

// =============================================================================
// Completion values
// =============================================================================

/// A value an operation completes with.
pub trait Outcome: Send + 'static {
    /// The value delivered when the operation ends without completing.
    fn aborted(error: LocationError) -> Self;
}

/// Completion of a location update.
#[derive(Debug, Clone)]
pub struct LocationUpdate {
    /// Accepted coordinate; the last known one for `TIME`; `(0, 0)` otherwise.
    pub coordinate: Coordinate,
    /// Terminal status.
    pub status: OperationStatus,
    /// Cause when `status` is not `OK`.
    pub error: Option<LocationError>,
}

impl LocationUpdate {
    /// A successful update at `coordinate`.
    pub fn ok(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            status: OperationStatus::Ok,
            error: None,
        }
    }

    /// A failed update carrying `coordinate`.
    pub fn rejected(coordinate: Coordinate, error: LocationError) -> Self {
        Self {
            coordinate,
            status: error.status(),
            error: Some(error),
        }
    }

    /// A failed update with no coordinate.
    pub fn failed(error: LocationError) -> Self {
        Self::rejected(Coordinate::default(), error)
    }

    /// Returns true if the status is `OK`.
    pub fn is_ok(&self) -> bool {
        self.status == OperationStatus::Ok
    }
}

impl Outcome for LocationUpdate {
    fn aborted(error: LocationError) -> Self {
        Self::failed(error)
    }
}

/// Completion of a region wait.
#[derive(Debug, Clone)]
pub struct RegionOutcome {
    /// The region, if it passed validation.
    pub region: Option<Region>,
    /// Terminal status.
    pub status: OperationStatus,
    /// Cause when `status` is not `OK`.
    pub error: Option<LocationError>,
}

impl RegionOutcome {
    /// The region event fired.
    pub fn ok(region: Region) -> Self {
        Self {
            region: Some(region),
            status: OperationStatus::Ok,
            error: None,
        }
    }

    /// The wait failed.
    pub fn failed(region: Option<Region>, error: LocationError) -> Self {
        Self {
            region,
            status: error.status(),
            error: Some(error),
        }
    }

    /// Returns true if the status is `OK`.
    pub fn is_ok(&self) -> bool {
        self.status == OperationStatus::Ok
    }
}

impl Outcome for RegionOutcome {
    fn aborted(error: LocationError) -> Self {
        Self::failed(None, error)
    }
}

// =============================================================================
// Completion / handle pair
// =============================================================================

/// Sending half of an operation's result. Fires exactly once.
pub struct Completion<T: Outcome> {
    tx: Option<oneshot::Sender<T>>,
}

impl<T: Outcome> Completion<T> {
    /// Create a completion and its receiver.
    pub(crate) fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Deliver the result.
    pub fn complete(mut self, value: T) {
        if let Some(tx) = self.tx.take() {
            // Receiver gone means nobody is waiting
            let _ = tx.send(value);
        }
    }
}

impl<T: Outcome> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(T::aborted(LocationError::Aborted));
        }
    }
}

/// Caller's half of an operation. Resolves to the completion value.
pub struct OperationHandle<T: Outcome> {
    id: OperationId,
    rx: oneshot::Receiver<T>,
    cancel: CancellationToken,
}

impl<T: Outcome> OperationHandle<T> {
    pub(crate) fn new(id: OperationId, rx: oneshot::Receiver<T>, cancel: CancellationToken) -> Self {
        Self { id, rx, cancel }
    }

    /// Identifier of the operation.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Request cancellation. The operation still completes, with `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run `f` with the result once it is available.
    ///
    /// Spawns a waiter on the current runtime. Without a runtime, `f` runs
    /// immediately if the result is already there, otherwise with `NoRuntime`.
    pub fn on_complete<F>(mut self, f: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { f(self.await) });
            }
            Err(_) => {
                let value = self
                    .rx
                    .try_recv()
                    .unwrap_or_else(|_| T::aborted(LocationError::NoRuntime));
                f(value)
            }
        }
    }
}

impl<T: Outcome> Future for OperationHandle<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or_else(|_| T::aborted(LocationError::Aborted)))
    }
}

impl<T: Outcome> fmt::Debug for OperationHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

// =============================================================================
// Deadlines
// =============================================================================

/// Resolve when `deadline` passes; never without one.
pub(crate) async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Absolute deadline for an optional timeout starting now.
///
/// A timeout too large to represent as an instant means no deadline.
pub(crate) fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|t| Instant::now().checked_add(t))
}
