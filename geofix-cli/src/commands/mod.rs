//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (path, show, init)
//! - [`geocode`] - Remote reverse geocoding of a coordinate
//! - [`locate`] - One location update against a simulated sensor

pub mod common;
pub mod config;
pub mod geocode;
pub mod locate;
