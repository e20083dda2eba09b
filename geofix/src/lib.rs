//! Geofix - position fixes, geofence waits and reverse geocoding
//!
//! This library schedules location operations on top of a platform location
//! capability: single-fix acquisition with time and distance debouncing,
//! single-shot geofence region waits, and reverse geocoding through either an
//! on-device geocoder or a remote HTTP geocoding API.
//!
//! # High-Level API
//!
//! The [`manager`] module provides the facade. Construct a [`LocationManager`]
//! with a [`Platform`] bundle of capabilities and await the returned handles:
//!
//! ```ignore
//! use geofix::{LocationManager, ManagerConfig, Platform, GeocodeProvider};
//!
//! let manager = LocationManager::new(ManagerConfig::default(), platform);
//!
//! let update = manager.update_location().await;
//! println!("{} at {}", update.status, update.coordinate);
//!
//! let place = manager.reverse_geocode_location(GeocodeProvider::Remote).await;
//! println!("{:?}", place.place);
//! ```

pub mod auth;
pub mod config;
pub mod coord;
pub mod debounce;
pub mod error;
pub mod geocode;
pub mod logging;
pub mod manager;
pub mod operation;
pub mod platform;
pub mod store;

pub use auth::{AuthorizationGate, AuthorizationLevel, AuthorizationStatus};
pub use coord::{Coordinate, Fix};
pub use error::{LocationError, PlatformError};
pub use geocode::{GeocodeProvider, GeocodeResult, GeocodingCoordinator, Place, Placemark};
pub use manager::{LocationEvent, LocationManager, ManagerConfig, RegionRequest};
pub use operation::{LocationUpdate, OperationHandle, OperationStatus, Region, RegionOutcome};
pub use platform::Platform;

/// Version of the Geofix library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
