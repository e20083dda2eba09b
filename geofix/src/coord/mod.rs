//! Geographic coordinates and position fixes.
//!
//! Provides the [`Coordinate`] and [`Fix`] types shared by every operation,
//! plus great-circle distance used by the spatial debounce.

use std::fmt;

use chrono::{DateTime, Utc};

/// Mean earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Minimum valid latitude in degrees.
pub const MIN_LAT: f64 = -90.0;

/// Maximum valid latitude in degrees.
pub const MAX_LAT: f64 = 90.0;

/// Minimum valid longitude in degrees.
pub const MIN_LON: f64 = -180.0;

/// Maximum valid longitude in degrees.
pub const MAX_LON: f64 = 180.0;

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coordinate {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns true if both components are finite and within range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (MIN_LAT..=MAX_LAT).contains(&self.latitude)
            && (MIN_LON..=MAX_LON).contains(&self.longitude)
    }

    /// Great-circle distance to `other` in meters (haversine).
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// One position sample reported by the location capability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Horizontal accuracy radius in meters. Non-positive means invalid.
    pub accuracy: f64,
    /// When the platform captured this sample.
    pub captured_at: DateTime<Utc>,
}

impl Fix {
    /// Create a fix captured now.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self::with_timestamp(latitude, longitude, accuracy, Utc::now())
    }

    /// Create a fix with an explicit capture time (for testing and replay).
    pub fn with_timestamp(
        latitude: f64,
        longitude: f64,
        accuracy: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            captured_at,
        }
    }

    /// The position of this fix.
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Distance to another fix in meters.
    pub fn distance_to(&self, other: &Fix) -> f64 {
        self.coordinate().distance_to(&other.coordinate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero_for_same_point() {
        let a = Coordinate::new(53.55, 9.99);
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        // One degree of latitude is ~111.2km on the mean sphere
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(1.0, 0.0);
        let d = a.distance_to(&b);
        assert!((d - 111_195.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn test_distance_hamburg_to_london() {
        let hamburg = Coordinate::new(53.5511, 9.9937);
        let london = Coordinate::new(51.5074, -0.1278);
        let d = hamburg.distance_to(&london) / 1000.0;
        assert!((d - 720.0).abs() < 10.0, "got {}km", d);
    }

    #[test]
    fn test_validity() {
        assert!(Coordinate::new(10.0, 20.0).is_valid());
        assert!(Coordinate::new(-90.0, 180.0).is_valid());
        assert!(!Coordinate::new(90.5, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -180.1).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_fix_coordinate() {
        let fix = Fix::new(10.0, 20.0, 5.0);
        assert_eq!(fix.coordinate(), Coordinate::new(10.0, 20.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Coordinate::new(10.0, 20.5).to_string(),
            "10.000000, 20.500000"
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_distance_symmetric(
                lat1 in -90.0f64..=90.0,
                lon1 in -180.0f64..=180.0,
                lat2 in -90.0f64..=90.0,
                lon2 in -180.0f64..=180.0,
            ) {
                let a = Coordinate::new(lat1, lon1);
                let b = Coordinate::new(lat2, lon2);
                prop_assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-6);
            }

            #[test]
            fn test_distance_bounded_by_half_circumference(
                lat1 in -90.0f64..=90.0,
                lon1 in -180.0f64..=180.0,
                lat2 in -90.0f64..=90.0,
                lon2 in -180.0f64..=180.0,
            ) {
                let d = Coordinate::new(lat1, lon1).distance_to(&Coordinate::new(lat2, lon2));
                prop_assert!(d >= 0.0);
                prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_M + 1.0);
            }
        }
    }
}
