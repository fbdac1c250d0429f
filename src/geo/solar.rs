//! Solar position calculations.
//!
//! Elevation is computed with the NOAA "general solar position" formulation:
//! a fractional-year angle drives Fourier series for the equation of time and
//! the solar declination, true solar time gives the hour angle, and the
//! standard spherical formula turns latitude, declination and hour angle into
//! the solar zenith. Accuracy is well within a degree, which is far below what
//! a brightness curve can resolve.
//!
//! Everything here is a pure function of its inputs.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::brightness::Phase;

/// Solar elevation and the brightness phase derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolarSample {
    /// Degrees above the horizon, negative at night
    pub elevation: f64,
    pub phase: Phase,
}

fn days_in_year(year: i32) -> f64 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366.0
    } else {
        365.0
    }
}

/// Fractional year angle in radians for a UTC date and hour.
fn fractional_year(date: NaiveDate, utc_hours: f64) -> f64 {
    let day_of_year = f64::from(date.ordinal());
    2.0 * std::f64::consts::PI / days_in_year(date.year())
        * (day_of_year - 1.0 + (utc_hours - 12.0) / 24.0)
}

/// Equation of time in minutes.
fn equation_of_time(gamma: f64) -> f64 {
    229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin())
}

/// Solar declination in radians.
fn declination(gamma: f64) -> f64 {
    0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin()
}

/// Compute the solar elevation angle in degrees.
///
/// # Arguments
/// * `latitude` - Degrees north, in [-90, 90]
/// * `longitude` - Degrees east, in [-180, 180]
/// * `at` - Instant of observation
///
/// Coordinates are validated by the config layer before they reach this
/// function.
pub fn solar_elevation(latitude: f64, longitude: f64, at: DateTime<Utc>) -> f64 {
    let utc_hours = f64::from(at.hour())
        + f64::from(at.minute()) / 60.0
        + f64::from(at.second()) / 3600.0;
    let gamma = fractional_year(at.date_naive(), utc_hours);

    let eqtime = equation_of_time(gamma);
    let decl = declination(gamma);

    // True solar time in minutes; UTC input so no timezone term
    let true_solar_time = utc_hours * 60.0 + eqtime + 4.0 * longitude;
    let hour_angle = (true_solar_time / 4.0 - 180.0).to_radians();

    let lat = latitude.to_radians();
    let cos_zenith = (lat.sin() * decl.sin() + lat.cos() * decl.cos() * hour_angle.cos())
        .clamp(-1.0, 1.0);

    90.0 - cos_zenith.acos().to_degrees()
}

/// UTC instant of local solar noon (sun on the meridian) for a date and longitude.
pub fn solar_noon(longitude: f64, date: NaiveDate) -> DateTime<Utc> {
    let gamma = fractional_year(date, 12.0);
    let minutes = 720.0 - 4.0 * longitude - equation_of_time(gamma);
    let midnight = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    midnight + chrono::Duration::milliseconds((minutes * 60_000.0).round() as i64)
}

/// Sunrise and sunset for a date, computed by the `sunrise` crate.
///
/// Returns `None` for invalid coordinates.
pub fn sun_times(
    latitude: f64,
    longitude: f64,
    date: NaiveDate,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    use sunrise::{Coordinates, SolarDay, SolarEvent};

    let coord = Coordinates::new(latitude, longitude)?;
    let solar_day = SolarDay::new(coord, date);
    Some((
        solar_day.event_time(SolarEvent::Sunrise),
        solar_day.event_time(SolarEvent::Sunset),
    ))
}
