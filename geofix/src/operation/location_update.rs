//! Single-fix acquisition.
//!
//! ```text
//! Created ─► ServiceCheck ─► TimeCheck ─► AuthCheck ─┬─► Acquiring ─► Finished
//!                 ▲                                  │
//!                 └──── authorization change ◄───────┘ (NotDetermined: prompt, wait)
//! ```
//!
//! While acquiring, stale and inaccurate fixes are dropped and fixes too
//! close to the last accepted one are skipped. The first fix the debounce
//! cache accepts is broadcast as [`LocationEvent::LocationUpdated`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{deadline_after, deadline_elapsed, LocationUpdate, OperationId};
use crate::auth::{AuthorizationGate, AuthorizationLevel, AuthorizationStatus};
use crate::coord::Fix;
use crate::debounce::{DebounceCache, FixVerdict};
use crate::error::{LocationError, PlatformError};
use crate::manager::LocationEvent;
use crate::platform::{DesiredAccuracy, FixEvent, LocationSource};
use crate::store::PersistedFix;

/// Error code reported when the platform closes a fix stream.
pub const STREAM_CLOSED_CODE: i64 = -1;

/// Shared collaborators of every location update.
#[derive(Clone)]
pub struct UpdateContext {
    /// Location sensor.
    pub source: Arc<dyn LocationSource>,
    /// Authorization tracking.
    pub gate: Arc<AuthorizationGate>,
    /// Last accepted fix.
    pub cache: Arc<DebounceCache>,
    /// `LocationUpdated` broadcast.
    pub events: broadcast::Sender<LocationEvent>,
}

enum Entry {
    Proceed,
    AwaitAuthorization,
    Finished(LocationUpdate),
}

/// One location update.
pub struct LocationUpdateOperation {
    ctx: UpdateContext,
    accuracy: DesiredAccuracy,
    timeout: Option<Duration>,
}

impl LocationUpdateOperation {
    /// Create an update with the given accuracy and optional deadline.
    pub fn new(ctx: UpdateContext, accuracy: DesiredAccuracy, timeout: Option<Duration>) -> Self {
        Self {
            ctx,
            accuracy,
            timeout,
        }
    }

    /// Entry checks, in order: service, time debounce, authorization.
    fn entry_check(&self) -> Entry {
        if !self.ctx.source.service_enabled() {
            return Entry::Finished(LocationUpdate::failed(LocationError::ServiceDisabled));
        }

        if let Err(e) = self.ctx.cache.check_time(Utc::now()) {
            let last = self.ctx.cache.last_coordinate().unwrap_or_default();
            return Entry::Finished(LocationUpdate::rejected(last, e));
        }

        match self.ctx.gate.current_status() {
            status @ (AuthorizationStatus::Denied | AuthorizationStatus::Restricted) => {
                Entry::Finished(LocationUpdate::failed(LocationError::AuthorizationMissing {
                    status,
                }))
            }
            AuthorizationStatus::NotDetermined => Entry::AwaitAuthorization,
            _ => Entry::Proceed,
        }
    }

    fn interrupted(&self, cancel: &CancellationToken) -> LocationError {
        if cancel.is_cancelled() {
            LocationError::Cancelled
        } else {
            LocationError::TimedOut(self.timeout.unwrap_or_default())
        }
    }

    /// Run to completion.
    pub async fn run(self, id: OperationId, cancel: CancellationToken) -> LocationUpdate {
        let deadline = deadline_after(self.timeout);
        // Subscribe before any request so a synchronous answer is not missed
        let mut auth_changes = self.ctx.source.authorization_changes();
        let mut auth_open = true;

        loop {
            match self.entry_check() {
                Entry::Proceed => break,
                Entry::Finished(update) => {
                    debug!(%id, status = %update.status, "Location update short-circuited");
                    return update;
                }
                Entry::AwaitAuthorization => {
                    let outcome = self
                        .ctx
                        .gate
                        .request_authorization(AuthorizationLevel::WhenInUse);
                    debug!(%id, ?outcome, "Waiting for authorization");

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return LocationUpdate::failed(LocationError::Cancelled),
                        _ = deadline_elapsed(deadline) => {
                            return LocationUpdate::failed(self.interrupted(&cancel));
                        }
                        change = auth_changes.recv(), if auth_open => match change {
                            Ok(status) => debug!(%id, %status, "Authorization changed"),
                            Err(RecvError::Lagged(_)) => {}
                            Err(RecvError::Closed) => auth_open = false,
                        },
                    }

                    if !auth_open {
                        return LocationUpdate::failed(LocationError::AuthorizationMissing {
                            status: self.ctx.gate.current_status(),
                        });
                    }
                }
            }
        }

        let mut subscription = self.ctx.source.subscribe(self.accuracy);
        debug!(%id, subscription = subscription.id, accuracy = %self.accuracy, "Acquiring fix");

        let result: Result<(Fix, PersistedFix), LocationError> = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(LocationError::Cancelled),
                _ = deadline_elapsed(deadline) => break Err(self.interrupted(&cancel)),
                change = auth_changes.recv(), if auth_open => {
                    let status = match change {
                        Ok(status) => status,
                        Err(RecvError::Lagged(_)) => self.ctx.gate.current_status(),
                        Err(RecvError::Closed) => {
                            auth_open = false;
                            continue;
                        }
                    };
                    if status.is_refused() {
                        break Err(LocationError::AuthorizationMissing { status });
                    }
                }
                event = subscription.events.recv() => match event {
                    Some(FixEvent::Fix(fix)) => match self.ctx.cache.check_fix(&fix, Utc::now()) {
                        // Another update may have accepted a nearby fix since the check
                        FixVerdict::Accept => match self.ctx.cache.accept(&fix, Utc::now()) {
                            Ok(accepted) => break Ok((fix, accepted)),
                            Err(e) => debug!(%id, error = %e, "Fix skipped"),
                        },
                        verdict => debug!(%id, ?verdict, "Fix filtered"),
                    },
                    Some(FixEvent::Error(e)) => {
                        warn!(%id, error = %e, "Location stream error");
                        break Err(e.into());
                    }
                    None => {
                        break Err(PlatformError::new(STREAM_CLOSED_CODE, "location stream closed").into());
                    }
                },
            }
        };

        self.ctx.source.unsubscribe(subscription.id);

        match result {
            Ok((fix, accepted)) => {
                // No subscribers is fine
                let _ = self.ctx.events.send(LocationEvent::LocationUpdated {
                    coordinate: accepted.coordinate,
                    accuracy: fix.accuracy,
                    updated_at: accepted.updated_at,
                });
                info!(%id, coordinate = %accepted.coordinate, accuracy = fix.accuracy, "Location updated");
                LocationUpdate::ok(accepted.coordinate)
            }
            Err(e) => {
                debug!(%id, error = %e, "Location update failed");
                LocationUpdate::failed(e)
            }
        }
    }
}
