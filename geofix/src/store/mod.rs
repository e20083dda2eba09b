//! Key-value persistence for state that survives restarts.
//!
//! The manager remembers the last accepted fix and the last geocoded place
//! between runs. Storage goes through the [`KeyValueStore`] trait so the
//! backing mechanism can be swapped:
//!
//! - [`MemoryStore`] - process-local, used in tests and for ephemeral managers
//! - [`IniFileStore`] - a single INI file on disk
//!
//! [`PersistedState`] is the typed view over the fixed key set and is read
//! exactly once when a manager is constructed.

mod file;
mod memory;

pub use file::IniFileStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::coord::Coordinate;
use crate::geocode::Place;

/// Key for the latitude of the last accepted fix.
pub const KEY_LAST_LATITUDE: &str = "last_fix.latitude";
/// Key for the longitude of the last accepted fix.
pub const KEY_LAST_LONGITUDE: &str = "last_fix.longitude";
/// Key for the RFC 3339 time the last fix was accepted.
pub const KEY_LAST_UPDATE: &str = "last_fix.updated_at";
/// Key for the last geocoded country.
pub const KEY_LAST_COUNTRY: &str = "last_place.country";
/// Key for the last geocoded state.
pub const KEY_LAST_STATE: &str = "last_place.state";
/// Key for the last geocoded city.
pub const KEY_LAST_CITY: &str = "last_place.city";

/// Errors from a key-value store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to read the backing file.
    #[error("failed to read store: {0}")]
    Read(String),

    /// Failed to write the backing file.
    #[error("failed to write store: {0}")]
    Write(String),
}

/// String key-value storage.
///
/// Implementations must be safe to call from any thread. Writes are expected
/// to be durable when they return `Ok`.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Write several values as one update.
    ///
    /// Backends that persist on every mutation should override this to
    /// write once.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Delete a value. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// The last accepted fix as persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersistedFix {
    /// Where the fix was.
    pub coordinate: Coordinate,
    /// When it was accepted.
    pub updated_at: DateTime<Utc>,
}

/// Typed snapshot of everything the manager persists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    /// Last accepted fix, if all of its keys are present and parse.
    pub last_fix: Option<PersistedFix>,
    /// Last geocoded place.
    pub last_place: Place,
}

impl PersistedState {
    /// Read the persisted key set from a store.
    ///
    /// Partially written or unparsable fix keys yield no fix rather than an
    /// error; the manager then behaves as on first launch.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let latitude = store
            .get(KEY_LAST_LATITUDE)
            .and_then(|v| v.parse::<f64>().ok());
        let longitude = store
            .get(KEY_LAST_LONGITUDE)
            .and_then(|v| v.parse::<f64>().ok());
        let updated_at = store
            .get(KEY_LAST_UPDATE)
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc));

        let last_fix = match (latitude, longitude, updated_at) {
            (Some(latitude), Some(longitude), Some(updated_at)) => Some(PersistedFix {
                coordinate: Coordinate::new(latitude, longitude),
                updated_at,
            }),
            _ => None,
        };

        let last_place = Place {
            country: store.get(KEY_LAST_COUNTRY),
            state: store.get(KEY_LAST_STATE),
            city: store.get(KEY_LAST_CITY),
        };

        Self {
            last_fix,
            last_place,
        }
    }

    /// Write the fix keys in one batch.
    pub fn save_fix(store: &dyn KeyValueStore, fix: &PersistedFix) -> Result<(), StoreError> {
        let latitude = fix.coordinate.latitude.to_string();
        let longitude = fix.coordinate.longitude.to_string();
        let updated_at = fix.updated_at.to_rfc3339();
        store.set_many(&[
            (KEY_LAST_LATITUDE, latitude.as_str()),
            (KEY_LAST_LONGITUDE, longitude.as_str()),
            (KEY_LAST_UPDATE, updated_at.as_str()),
        ])
    }

    /// Write the place keys. Absent fields remove their key.
    pub fn save_place(store: &dyn KeyValueStore, place: &Place) -> Result<(), StoreError> {
        for (key, value) in [
            (KEY_LAST_COUNTRY, &place.country),
            (KEY_LAST_STATE, &place.state),
            (KEY_LAST_CITY, &place.city),
        ] {
            match value {
                Some(v) => store.set(key, v)?,
                None => store.remove(key)?,
            }
        }
        Ok(())
    }
}
