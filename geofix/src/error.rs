//! Error types for location operations.
//!
//! Every terminal outcome of an operation carries an [`OperationStatus`] and,
//! unless the status is `OK`, a [`LocationError`] describing the cause.

use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthorizationStatus;
use crate::operation::OperationStatus;

/// An error reported by a platform capability (sensor, region monitor,
/// on-device geocoder).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct PlatformError {
    /// Platform-specific error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
}

impl PlatformError {
    /// Create a new platform error.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors that can terminate a location, region or geocoding operation.
#[derive(Debug, Clone, Error)]
pub enum LocationError {
    /// The device location service is switched off.
    #[error("location service disabled")]
    ServiceDisabled,

    /// The app lacks the required authorization level.
    #[error("missing authorization (status: {status})")]
    AuthorizationMissing { status: AuthorizationStatus },

    /// Wrapped error from a platform capability.
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// An update was requested before the time threshold elapsed.
    #[error("last update {elapsed:?} ago, threshold is {threshold:?}")]
    DebounceRejectedByTime {
        elapsed: Duration,
        threshold: Duration,
    },

    /// A fix was too close to the last accepted fix.
    ///
    /// Reported by [`DebounceCache::accept`](crate::debounce::DebounceCache::accept).
    /// Never terminal: the operation keeps waiting for a farther fix.
    #[error("fix {distance:.1}m from last fix, threshold is {threshold:.1}m")]
    DebounceRejectedByDistance { distance: f64, threshold: f64 },

    /// The region radius exceeds what the platform can monitor.
    #[error("region radius {radius}m exceeds monitorable maximum {maximum}m")]
    RegionTooLarge { radius: f64, maximum: f64 },

    /// The region parameters are not usable.
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// The geocoding provider answered but had no usable result.
    #[error("geocoding provider error: {0}")]
    GeocodeProvider(String),

    /// The geocoding response could not be parsed.
    #[error("failed to parse geocoding response: {0}")]
    GeocodeParse(String),

    /// HTTP transport failure or non-success status.
    #[error("network error: {message}")]
    Network {
        status: Option<u16>,
        message: String,
    },

    /// The operation did not finish before its deadline.
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    /// The operation was cancelled through its handle or manager shutdown.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation task ended without producing a result.
    #[error("operation aborted before completion")]
    Aborted,

    /// No async runtime was available to run the operation.
    #[error("no tokio runtime available")]
    NoRuntime,
}

impl LocationError {
    /// Build a network error from an HTTP status code.
    pub fn http_status(status: u16, url: &str) -> Self {
        Self::Network {
            status: Some(status),
            message: format!("HTTP {} from {}", status, url),
        }
    }

    /// The operation status this error is reported under.
    pub fn status(&self) -> OperationStatus {
        match self {
            Self::ServiceDisabled => OperationStatus::LocationServiceDisabled,
            Self::AuthorizationMissing { .. } => OperationStatus::MissingAuthorization,
            Self::DebounceRejectedByTime { .. } => OperationStatus::Time,
            Self::DebounceRejectedByDistance { .. } | Self::RegionTooLarge { .. } => {
                OperationStatus::Distance
            }
            _ => OperationStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            LocationError::ServiceDisabled.status(),
            OperationStatus::LocationServiceDisabled
        );
        assert_eq!(
            LocationError::AuthorizationMissing {
                status: AuthorizationStatus::Denied
            }
            .status(),
            OperationStatus::MissingAuthorization
        );
        assert_eq!(
            LocationError::DebounceRejectedByTime {
                elapsed: Duration::from_secs(1),
                threshold: Duration::from_secs(10),
            }
            .status(),
            OperationStatus::Time
        );
        assert_eq!(
            LocationError::RegionTooLarge {
                radius: 5000.0,
                maximum: 1000.0
            }
            .status(),
            OperationStatus::Distance
        );
        assert_eq!(LocationError::Cancelled.status(), OperationStatus::Error);
        assert_eq!(
            LocationError::GeocodeParse("bad".into()).status(),
            OperationStatus::Error
        );
    }

    #[test]
    fn test_platform_error_wraps() {
        let err: LocationError = PlatformError::new(1, "denied by sensor").into();
        assert!(matches!(err, LocationError::Platform(_)));
        assert!(err.to_string().contains("denied by sensor"));
    }

    #[test]
    fn test_platform_error_display() {
        let err = PlatformError::new(5, "monitoring unavailable");
        assert_eq!(err.to_string(), "monitoring unavailable (code 5)");
    }

    #[test]
    fn test_distance_rejection_status() {
        let err = LocationError::DebounceRejectedByDistance {
            distance: 4.0,
            threshold: 10.0,
        };
        assert_eq!(err.status(), OperationStatus::Distance);
        assert_eq!(err.to_string(), "fix 4.0m from last fix, threshold is 10.0m");
    }

    #[test]
    fn test_http_status_message() {
        let err = LocationError::http_status(500, "http://example.com");
        assert!(matches!(
            err,
            LocationError::Network {
                status: Some(500),
                ..
            }
        ));
        assert!(err.to_string().contains("HTTP 500"));
    }
}
