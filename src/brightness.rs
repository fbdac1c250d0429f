//! Mapping from solar elevation to a target brightness.
//!
//! Two curve shapes are supported:
//!
//! - **Elevation scaling** (default): five named phases. Night up to -6°
//!   holds the minimum, Twilight ramps to the midpoint at the horizon, Low Sun
//!   and Daylight keep climbing until 40°, and Bright holds the maximum.
//!   The value is piecewise-linear through fixed anchors, so it is continuous
//!   at every threshold and never decreases as the sun rises.
//! - **Simple**: minimum below -6°, maximum above 6°, a straight ramp between.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::constants::*;
use crate::config::Config;

/// Named band of solar elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Night,
    Twilight,
    LowSun,
    Daylight,
    Bright,
    /// Daytime in the simple curve
    Day,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Night => "Night",
            Phase::Twilight => "Twilight",
            Phase::LowSun => "Low Sun",
            Phase::Daylight => "Daylight",
            Phase::Bright => "Bright",
            Phase::Day => "Day",
        };
        write!(f, "{label}")
    }
}

/// Anchors of the elevation-scaled curve: (elevation, share of the span).
const SCALED_ANCHORS: [(f64, f64); 4] = [
    (NIGHT_ELEVATION, 0.0),
    (HORIZON_ELEVATION, HORIZON_FRACTION),
    (LOW_SUN_ELEVATION, LOW_SUN_FRACTION),
    (BRIGHT_ELEVATION, 1.0),
];

/// Target brightness as a function of solar elevation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessCurve {
    min: u8,
    max: u8,
    elevation_scaling: bool,
}

impl BrightnessCurve {
    /// Create a curve between `min` and `max` percent.
    ///
    /// Fails with `InvalidInput` unless `min < max <= 100`.
    pub fn new(min: u8, max: u8, elevation_scaling: bool) -> Result<Self> {
        if max > MAXIMUM_BRIGHTNESS {
            return Err(invalid_input!(
                "max_brightness ({max}) must be at most {MAXIMUM_BRIGHTNESS}"
            ));
        }
        if min >= max {
            return Err(invalid_input!(
                "min_brightness ({min}) must be lower than max_brightness ({max})"
            ));
        }
        Ok(Self {
            min,
            max,
            elevation_scaling,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.min_brightness,
            config.max_brightness,
            config.use_elevation_scaling,
        )
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    /// Phase label for an elevation.
    pub fn phase(&self, elevation: f64) -> Phase {
        if !elevation.is_finite() || elevation <= NIGHT_ELEVATION {
            return Phase::Night;
        }
        if self.elevation_scaling {
            if elevation <= HORIZON_ELEVATION {
                Phase::Twilight
            } else if elevation <= LOW_SUN_ELEVATION {
                Phase::LowSun
            } else if elevation <= BRIGHT_ELEVATION {
                Phase::Daylight
            } else {
                Phase::Bright
            }
        } else if elevation <= SIMPLE_DAY_ELEVATION {
            Phase::Twilight
        } else {
            Phase::Day
        }
    }

    /// Share of the min..max span reached at an elevation, in [0, 1].
    fn fraction(&self, elevation: f64) -> f64 {
        if !elevation.is_finite() || elevation <= NIGHT_ELEVATION {
            return 0.0;
        }

        if !self.elevation_scaling {
            if elevation > SIMPLE_DAY_ELEVATION {
                return 1.0;
            }
            return (elevation - NIGHT_ELEVATION) / (SIMPLE_DAY_ELEVATION - NIGHT_ELEVATION);
        }

        for pair in SCALED_ANCHORS.windows(2) {
            let (e0, f0) = pair[0];
            let (e1, f1) = pair[1];
            if elevation <= e1 {
                return f0 + (f1 - f0) * (elevation - e0) / (e1 - e0);
            }
        }
        1.0
    }

    /// Target brightness in percent, always within [min, max].
    pub fn brightness(&self, elevation: f64) -> u8 {
        let span = f64::from(self.max - self.min);
        let value = f64::from(self.min) + span * self.fraction(elevation).clamp(0.0, 1.0);
        (value.round() as u8).clamp(self.min, self.max)
    }

    /// Brightness and phase together.
    pub fn evaluate(&self, elevation: f64) -> (u8, Phase) {
        (self.brightness(elevation), self.phase(elevation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaled() -> BrightnessCurve {
        BrightnessCurve::new(10, 90, true).unwrap()
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        assert!(BrightnessCurve::new(50, 50, true).is_err());
        assert!(BrightnessCurve::new(60, 40, false).is_err());
        assert!(BrightnessCurve::new(0, 101, true).is_err());
        assert!(BrightnessCurve::new(0, 100, true).is_ok());
    }

    #[test]
    fn test_scaled_phase_thresholds() {
        let curve = scaled();
        assert_eq!(curve.phase(-10.0), Phase::Night);
        assert_eq!(curve.phase(-6.0), Phase::Night);
        assert_eq!(curve.phase(-5.9), Phase::Twilight);
        assert_eq!(curve.phase(0.0), Phase::Twilight);
        assert_eq!(curve.phase(0.1), Phase::LowSun);
        assert_eq!(curve.phase(15.0), Phase::LowSun);
        assert_eq!(curve.phase(15.1), Phase::Daylight);
        assert_eq!(curve.phase(40.0), Phase::Daylight);
        assert_eq!(curve.phase(40.1), Phase::Bright);
    }

    #[test]
    fn test_scaled_anchor_values() {
        let curve = scaled();
        assert_eq!(curve.brightness(-6.0), 10);
        assert_eq!(curve.brightness(0.0), 50); // midpoint at the horizon
        assert_eq!(curve.brightness(15.0), 74);
        assert_eq!(curve.brightness(40.0), 90);
        assert_eq!(curve.brightness(75.0), 90);
    }

    #[test]
    fn test_scaled_continuity_at_thresholds() {
        let curve = scaled();
        for threshold in [NIGHT_ELEVATION, HORIZON_ELEVATION, LOW_SUN_ELEVATION, BRIGHT_ELEVATION] {
            let below = curve.fraction(threshold - 1e-9);
            let above = curve.fraction(threshold + 1e-9);
            assert!((below - above).abs() < 1e-6, "jump at {threshold}");
        }
    }

    #[test]
    fn test_simple_mode() {
        let curve = BrightnessCurve::new(20, 80, false).unwrap();
        assert_eq!(curve.evaluate(-12.0), (20, Phase::Night));
        assert_eq!(curve.evaluate(0.0), (50, Phase::Twilight));
        assert_eq!(curve.evaluate(6.0), (80, Phase::Twilight));
        assert_eq!(curve.evaluate(6.5), (80, Phase::Day));
    }

    #[test]
    fn test_non_finite_elevation_is_night() {
        let curve = scaled();
        assert_eq!(curve.evaluate(f64::NAN), (10, Phase::Night));
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(Phase::LowSun.to_string(), "Low Sun");
        assert_eq!(serde_json::to_string(&Phase::LowSun).unwrap(), "\"low_sun\"");
    }
}
