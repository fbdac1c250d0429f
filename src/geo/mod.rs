//! Geographic location and solar position.
//!
//! ## Module Structure
//!
//! - [`solar`]: Solar elevation, solar noon and sunrise/sunset for a location
//! - [`geocoder`]: Offline place-name lookup over a world city table
//!
//! A [`Location`] is either entered as raw coordinates (`manual`) or resolved
//! from a place name, in which case the name is kept for display.

pub mod geocoder;
pub mod solar;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::common::constants::*;

pub use geocoder::{CitiesGeocoder, GeocodeMatch, Geocoder};
pub use solar::{SolarSample, solar_elevation, solar_noon, sun_times};

/// Where the sun is computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// True when coordinates were entered directly rather than looked up
    pub manual: bool,
    pub name: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, manual: bool, name: Option<String>) -> Result<Self> {
        validate_coordinates(latitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
            manual,
            name,
        })
    }

    /// Solar elevation in degrees at an instant.
    pub fn elevation_at(&self, at: chrono::DateTime<chrono::Utc>) -> f64 {
        solar_elevation(self.latitude, self.longitude, at)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let coords = format_coordinates(self.latitude, self.longitude);
        match &self.name {
            Some(name) => write!(f, "{name} ({coords})"),
            None => write!(f, "{coords}"),
        }
    }
}

/// Reject coordinates outside the valid ranges or not finite.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || !(MINIMUM_LATITUDE..=MAXIMUM_LATITUDE).contains(&latitude) {
        return Err(invalid_input!(
            "latitude must be between {MINIMUM_LATITUDE} and {MAXIMUM_LATITUDE} degrees (got {latitude})"
        ));
    }
    if !longitude.is_finite() || !(MINIMUM_LONGITUDE..=MAXIMUM_LONGITUDE).contains(&longitude) {
        return Err(invalid_input!(
            "longitude must be between {MINIMUM_LONGITUDE} and {MAXIMUM_LONGITUDE} degrees (got {longitude})"
        ));
    }
    Ok(())
}

/// Format coordinates as `40.713°N, 74.006°W`.
pub fn format_coordinates(latitude: f64, longitude: f64) -> String {
    let lat_dir = if latitude >= 0.0 { "N" } else { "S" };
    let lon_dir = if longitude >= 0.0 { "E" } else { "W" };
    format!(
        "{:.3}°{lat_dir}, {:.3}°{lon_dir}",
        latitude.abs(),
        longitude.abs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_validation() {
        assert!(Location::new(40.7, -74.0, true, None).is_ok());
        assert!(Location::new(91.0, 0.0, true, None).is_err());
        assert!(Location::new(0.0, -180.5, true, None).is_err());
        assert!(Location::new(f64::NAN, 0.0, true, None).is_err());
    }

    #[test]
    fn test_format_coordinates() {
        assert_eq!(format_coordinates(40.7128, -74.006), "40.713°N, 74.006°W");
        assert_eq!(format_coordinates(-33.8688, 151.2093), "33.869°S, 151.209°E");
    }

    #[test]
    fn test_display_with_name() {
        let location = Location::new(51.5074, -0.1278, false, Some("London".into())).unwrap();
        assert_eq!(location.to_string(), "London (51.507°N, 0.128°W)");
    }
}
