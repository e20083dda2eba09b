//! Temporal and spatial debounce of location updates.
//!
//! The [`DebounceCache`] holds the last accepted fix and when it was
//! accepted. It answers two questions:
//!
//! - **Too soon?** An update requested less than `time_threshold` after the
//!   last accepted one finishes with `TIME` without touching the sensor.
//! - **Too close?** A candidate fix within `distance_threshold` meters of the
//!   last accepted fix is skipped while the operation keeps listening.
//!
//! Stale fixes (older than `max_fix_age`) and fixes with a non-positive
//! accuracy are discarded before the distance check.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::coord::{Coordinate, Fix};
use crate::error::LocationError;
use crate::store::{KeyValueStore, PersistedFix, PersistedState};

/// Default minimum movement between accepted fixes, in meters.
pub const DEFAULT_DISTANCE_THRESHOLD_M: f64 = 10.0;

/// Default maximum age of a usable fix.
pub const DEFAULT_MAX_FIX_AGE: Duration = Duration::from_secs(5);

/// Debounce thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct DebounceConfig {
    /// Minimum time between accepted updates. Zero disables the check.
    pub time_threshold: Duration,
    /// Minimum distance between accepted fixes in meters.
    pub distance_threshold: f64,
    /// Fixes captured this long before (or after) now are discarded.
    pub max_fix_age: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            time_threshold: Duration::ZERO,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD_M,
            max_fix_age: DEFAULT_MAX_FIX_AGE,
        }
    }
}

/// Why a candidate fix was not accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixVerdict {
    /// The fix qualifies.
    Accept,
    /// Captured too far from now.
    Stale { age: Duration },
    /// Accuracy is zero or negative.
    InvalidAccuracy,
    /// Too close to the last accepted fix.
    TooClose { distance: f64 },
}

/// Last accepted fix plus the thresholds applied against it.
pub struct DebounceCache {
    config: DebounceConfig,
    store: Arc<dyn KeyValueStore>,
    last: Mutex<Option<PersistedFix>>,
}

/// Absolute difference between two instants.
fn abs_elapsed(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).abs().to_std().unwrap_or(Duration::MAX)
}

impl DebounceCache {
    /// Create a cache, optionally seeded with a persisted fix.
    pub fn new(
        config: DebounceConfig,
        store: Arc<dyn KeyValueStore>,
        restored: Option<PersistedFix>,
    ) -> Self {
        Self {
            config,
            store,
            last: Mutex::new(restored),
        }
    }

    /// The thresholds in use.
    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    /// The last accepted fix.
    pub fn last_fix(&self) -> Option<PersistedFix> {
        *self.last.lock()
    }

    /// Coordinate of the last accepted fix.
    pub fn last_coordinate(&self) -> Option<Coordinate> {
        self.last_fix().map(|f| f.coordinate)
    }

    /// Reject the update if the last one was accepted too recently.
    pub fn check_time(&self, now: DateTime<Utc>) -> Result<(), LocationError> {
        let Some(last) = self.last_fix() else {
            return Ok(());
        };

        let elapsed = abs_elapsed(now, last.updated_at);
        if elapsed < self.config.time_threshold {
            return Err(LocationError::DebounceRejectedByTime {
                elapsed,
                threshold: self.config.time_threshold,
            });
        }
        Ok(())
    }

    /// Decide whether `fix` qualifies at `now`.
    pub fn check_fix(&self, fix: &Fix, now: DateTime<Utc>) -> FixVerdict {
        let age = abs_elapsed(now, fix.captured_at);
        if age >= self.config.max_fix_age {
            return FixVerdict::Stale { age };
        }
        if fix.accuracy <= 0.0 {
            return FixVerdict::InvalidAccuracy;
        }

        if let Some(last) = self.last_fix() {
            if let Some(distance) = self.too_close(fix, &last) {
                return FixVerdict::TooClose { distance };
            }
        }

        FixVerdict::Accept
    }

    /// Distance from `last` when `fix` is inside the distance threshold.
    fn too_close(&self, fix: &Fix, last: &PersistedFix) -> Option<f64> {
        let distance = fix.coordinate().distance_to(&last.coordinate);
        // Exactly the threshold is far enough
        (distance < self.config.distance_threshold).then_some(distance)
    }

    /// Record `fix` as the last accepted one and write it through to the store.
    ///
    /// The distance check is repeated under the lock, so of two concurrent
    /// updates reporting nearby fixes only the first is accepted; the second
    /// gets `DebounceRejectedByDistance`. Store failures are logged and the
    /// in-memory cache is updated regardless.
    pub fn accept(&self, fix: &Fix, now: DateTime<Utc>) -> Result<PersistedFix, LocationError> {
        let mut last = self.last.lock();
        if let Some(previous) = last.as_ref() {
            if let Some(distance) = self.too_close(fix, previous) {
                return Err(LocationError::DebounceRejectedByDistance {
                    distance,
                    threshold: self.config.distance_threshold,
                });
            }
        }

        let accepted = PersistedFix {
            coordinate: fix.coordinate(),
            updated_at: now,
        };
        *last = Some(accepted);
        if let Err(e) = PersistedState::save_fix(self.store.as_ref(), &accepted) {
            warn!(error = %e, "Failed to persist last fix");
        }
        debug!(coordinate = %accepted.coordinate, "Debounce cache updated");

        Ok(accepted)
    }
}

impl std::fmt::Debug for DebounceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceCache")
            .field("config", &self.config)
            .field("last", &*self.last.lock())
            .finish_non_exhaustive()
    }
}
