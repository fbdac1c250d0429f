//! Place-name lookup.
//!
//! The daemon resolves names offline against the world city table shipped by
//! the `cities` crate. Other sources can be plugged in through [`Geocoder`].

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::common::error::ControlError;

/// A resolved place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeMatch {
    pub name: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl GeocodeMatch {
    pub fn display_name(&self) -> String {
        if self.country.is_empty() {
            self.name.clone()
        } else {
            format!("{}, {}", self.name, self.country)
        }
    }
}

pub trait Geocoder: Send + Sync {
    /// Resolve a place name, failing with `LocationLookupFailure`.
    fn lookup(&self, query: &str) -> Result<GeocodeMatch>;
}

/// Offline geocoder over `cities::all()`.
///
/// Queries are case-insensitive and may carry a `, Country` suffix to narrow
/// the search. Exact city names win over prefix matches; among equals the
/// first entry in the table is used.
#[derive(Debug, Default, Clone, Copy)]
pub struct CitiesGeocoder;

impl CitiesGeocoder {
    pub fn new() -> Self {
        Self
    }
}

fn split_query(query: &str) -> (String, Option<String>) {
    match query.split_once(',') {
        Some((city, country)) if !country.trim().is_empty() => (
            city.trim().to_lowercase(),
            Some(country.trim().to_lowercase()),
        ),
        Some((city, _)) => (city.trim().to_lowercase(), None),
        None => (query.trim().to_lowercase(), None),
    }
}

impl Geocoder for CitiesGeocoder {
    fn lookup(&self, query: &str) -> Result<GeocodeMatch> {
        let (city_query, country_query) = split_query(query);
        if city_query.is_empty() {
            return Err(ControlError::LocationLookupFailure("empty location name".into()).into());
        }

        let country_matches = |country: &str| {
            country_query.as_ref().is_none_or(|wanted| {
                let country = country.to_lowercase();
                country == *wanted || country.starts_with(wanted.as_str())
            })
        };

        let mut prefix_match = None;
        for city in cities::all().iter() {
            if !country_matches(&city.country) {
                continue;
            }
            let name = city.city.to_lowercase();
            let found = || GeocodeMatch {
                name: city.city.to_string(),
                country: city.country.to_string(),
                latitude: f64::from(city.latitude),
                longitude: f64::from(city.longitude),
            };
            if name == city_query {
                return Ok(found());
            }
            if prefix_match.is_none() && name.starts_with(&city_query) {
                prefix_match = Some(found());
            }
        }

        prefix_match.ok_or_else(|| {
            ControlError::LocationLookupFailure(format!("no place found matching '{}'", query.trim()))
                .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::control_error;

    #[test]
    fn test_split_query() {
        assert_eq!(split_query("  Paris "), ("paris".to_string(), None));
        assert_eq!(
            split_query("Paris, France"),
            ("paris".to_string(), Some("france".to_string()))
        );
        assert_eq!(split_query("Paris,"), ("paris".to_string(), None));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let geocoder = CitiesGeocoder::new();
        let found = geocoder.lookup("lONDON").unwrap();
        assert_eq!(found.name.to_lowercase(), "london");
        assert!((-90.0..=90.0).contains(&found.latitude));
    }

    #[test]
    fn test_lookup_failure_kind() {
        let geocoder = CitiesGeocoder::new();
        let err = geocoder.lookup("Qxzzyvv Nowhere").unwrap_err();
        assert_eq!(control_error(&err).unwrap().kind(), "location_lookup_failure");

        let err = geocoder.lookup("   ").unwrap_err();
        assert_eq!(control_error(&err).unwrap().kind(), "location_lookup_failure");
    }
}
