//! Configuration validation functionality.
//!
//! Every check fails with an `InvalidInput` error naming the offending key,
//! so a bad file on reload, or a bad command, leaves the previous
//! configuration in place.

use anyhow::Result;
use std::fmt::Display;
use std::ops::RangeInclusive;

use super::Config;
use crate::common::constants::*;
use crate::geo::validate_coordinates;

fn check_range<T: PartialOrd + Display>(key: &str, value: T, range: RangeInclusive<T>, unit: &str) -> Result<()> {
    if !range.contains(&value) {
        return Err(invalid_input!(
            "{key} ({value}{unit}) must be between {}{unit} and {}{unit}",
            range.start(),
            range.end()
        ));
    }
    Ok(())
}

/// Validate a complete configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    match (config.latitude, config.longitude) {
        (Some(lat), Some(lon)) => validate_coordinates(lat, lon)?,
        (None, None) => {}
        _ => {
            return Err(invalid_input!(
                "latitude and longitude must be set together"
            ));
        }
    }

    validate_brightness_range(config.min_brightness, config.max_brightness)?;
    check_range(
        "fullscreen_brightness",
        config.fullscreen_brightness,
        MINIMUM_BRIGHTNESS..=MAXIMUM_BRIGHTNESS,
        "%",
    )?;

    for (monitor, offset) in &config.monitor_offsets {
        validate_offset(monitor, *offset)?;
    }

    check_range(
        "update_interval",
        config.update_interval,
        MINIMUM_UPDATE_INTERVAL..=MAXIMUM_UPDATE_INTERVAL,
        "s",
    )?;
    check_range(
        "fullscreen_poll_interval",
        config.fullscreen_poll_interval,
        MINIMUM_FULLSCREEN_POLL_INTERVAL_MS..=MAXIMUM_FULLSCREEN_POLL_INTERVAL_MS,
        "ms",
    )?;
    check_range(
        "preview_cooldown_ms",
        config.preview_cooldown_ms,
        MINIMUM_PREVIEW_COOLDOWN_MS..=MAXIMUM_PREVIEW_COOLDOWN_MS,
        "ms",
    )?;
    check_range(
        "ddc_retries",
        config.ddc_retries,
        MINIMUM_DDC_RETRIES..=MAXIMUM_DDC_RETRIES,
        "",
    )?;
    check_range(
        "ddc_timeout_ms",
        config.ddc_timeout_ms,
        MINIMUM_DDC_TIMEOUT_MS..=MAXIMUM_DDC_TIMEOUT_MS,
        "ms",
    )?;

    if config.service_name.trim().is_empty() {
        return Err(invalid_input!("service_name must not be empty"));
    }

    Ok(())
}

/// min and max must both be percentages with min strictly below max.
pub fn validate_brightness_range(min: u8, max: u8) -> Result<()> {
    check_range("min_brightness", min, MINIMUM_BRIGHTNESS..=MAXIMUM_BRIGHTNESS, "%")?;
    check_range("max_brightness", max, MINIMUM_BRIGHTNESS..=MAXIMUM_BRIGHTNESS, "%")?;
    if min >= max {
        return Err(invalid_input!(
            "min_brightness ({min}%) must be lower than max_brightness ({max}%)"
        ));
    }
    Ok(())
}

pub fn validate_offset(monitor: &str, offset: i32) -> Result<()> {
    if !(MINIMUM_OFFSET..=MAXIMUM_OFFSET).contains(&offset) {
        return Err(invalid_input!(
            "offset for {monitor} ({offset}) must be between {MINIMUM_OFFSET} and {MAXIMUM_OFFSET}"
        ));
    }
    Ok(())
}
