//! Configuration system for solbright.
//!
//! Settings live in a single TOML file, by default
//! `$XDG_CONFIG_HOME/solbright/solbright.toml` (or `<dir>/solbright.toml` when
//! started with `--config <dir>`). A commented default file is written on
//! first run.
//!
//! ```toml
//! #[Location]
//! latitude = 40.7128                  # Degrees north (-90 to 90)
//! longitude = -74.006                 # Degrees east (-180 to 180)
//! location_override = true            # true when coordinates were entered by hand
//!
//! #[Brightness]
//! auto_brightness_enabled = true      # Follow the sun
//! use_elevation_scaling = true        # Five-phase curve instead of the simple ramp
//! min_brightness = 10                 # Night brightness (0-100)
//! max_brightness = 100                # Full daylight brightness (0-100)
//!
//! #[Fullscreen]
//! fullscreen_brightness_enabled = false
//! fullscreen_brightness = 100
//!
//! [monitor_offsets]
//! "DEL:DELL U2720Q:ABC123" = -10      # Per-monitor calibration (-50 to 50)
//! ```
//!
//! ## Runtime ownership
//!
//! At runtime the live configuration is owned by a [`ConfigStore`]: commands
//! mutate it through [`ConfigStore::update`], which validates, persists and
//! notifies subscribers. Edits made to the file by hand are picked up by the
//! [`watcher`] and applied through [`ConfigStore::replace`].

pub mod builder;
pub mod loading;
pub mod store;
pub mod validation;
pub mod watcher;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::common::constants::*;
use crate::geo::{Location, format_coordinates};

pub use builder::{create_default_config, render_config};
pub use loading::{get_config_path, get_custom_config_dir, load, load_from_path, parse_config, set_config_dir};
pub use store::{ConfigChange, ConfigStore};
pub use validation::validate_config;
pub use watcher::start_config_watcher;

/// Which fullscreen detector the poller uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Hyprland when its instance signature is set, else X11 when DISPLAY is set
    #[default]
    Auto,
    Hyprland,
    X11,
    /// Never report fullscreen
    None,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Auto => "auto",
            DetectorKind::Hyprland => "hyprland",
            DetectorKind::X11 => "x11",
            DetectorKind::None => "none",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration structure for solbright.
///
/// Every key is optional in the file; missing keys take the defaults from
/// `common::constants`. Values are range-checked by
/// [`validation::validate_config`] whenever a config is loaded or changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Coordinates were entered directly rather than resolved from a name
    pub location_override: bool,
    pub location_name: Option<String>,

    pub auto_brightness_enabled: bool,
    pub use_elevation_scaling: bool,
    pub min_brightness: u8,
    pub max_brightness: u8,

    pub fullscreen_brightness_enabled: bool,
    pub fullscreen_brightness: u8,

    pub update_interval: u64,          // seconds between ticks
    pub fullscreen_poll_interval: u64, // milliseconds
    pub preview_cooldown_ms: u64,
    pub ddc_retries: u32,
    pub ddc_timeout_ms: u64,
    pub fullscreen_detector: DetectorKind,
    pub service_name: String,

    /// Calibration offsets keyed by monitor id
    pub monitor_offsets: BTreeMap<String, i32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            location_override: false,
            location_name: None,
            auto_brightness_enabled: DEFAULT_AUTO_BRIGHTNESS_ENABLED,
            use_elevation_scaling: DEFAULT_USE_ELEVATION_SCALING,
            min_brightness: DEFAULT_MIN_BRIGHTNESS,
            max_brightness: DEFAULT_MAX_BRIGHTNESS,
            fullscreen_brightness_enabled: DEFAULT_FULLSCREEN_BRIGHTNESS_ENABLED,
            fullscreen_brightness: DEFAULT_FULLSCREEN_BRIGHTNESS,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            fullscreen_poll_interval: DEFAULT_FULLSCREEN_POLL_INTERVAL_MS,
            preview_cooldown_ms: DEFAULT_PREVIEW_COOLDOWN_MS,
            ddc_retries: DEFAULT_DDC_RETRIES,
            ddc_timeout_ms: DEFAULT_DDC_TIMEOUT_MS,
            fullscreen_detector: DetectorKind::Auto,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            monitor_offsets: BTreeMap::new(),
        }
    }
}

impl Config {
    /// The configured location, if both coordinates are set.
    pub fn location(&self) -> Option<Location> {
        let (latitude, longitude) = (self.latitude?, self.longitude?);
        Some(Location {
            latitude,
            longitude,
            manual: self.location_override,
            name: self.location_name.clone(),
        })
    }

    /// Store a location, replacing coordinates, flag and name together.
    pub fn set_location(&mut self, location: &Location) {
        self.latitude = Some(location.latitude);
        self.longitude = Some(location.longitude);
        self.location_override = location.manual;
        self.location_name = location.name.clone();
    }

    pub fn offset_for(&self, monitor_id: &str) -> i32 {
        self.monitor_offsets.get(monitor_id).copied().unwrap_or(0)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    pub fn fullscreen_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fullscreen_poll_interval)
    }

    pub fn preview_cooldown(&self) -> Duration {
        Duration::from_millis(self.preview_cooldown_ms)
    }

    pub fn ddc_timeout(&self) -> Duration {
        Duration::from_millis(self.ddc_timeout_ms)
    }

    /// Print the loaded settings as a log block.
    pub fn log_config(&self) {
        log_block_start!("Loaded configuration");

        match self.location() {
            Some(location) => {
                let source = if location.manual { "manual" } else { "lookup" };
                log_indented!(
                    "Location: {} ({source})",
                    location
                        .name
                        .clone()
                        .unwrap_or_else(|| format_coordinates(location.latitude, location.longitude))
                );
            }
            None => log_indented!("Location: not set (automatic brightness inactive)"),
        }

        let curve = if self.use_elevation_scaling {
            "elevation scaling"
        } else {
            "simple"
        };
        log_indented!(
            "Automatic brightness: {} ({curve}, {}-{}%)",
            if self.auto_brightness_enabled { "on" } else { "off" },
            self.min_brightness,
            self.max_brightness
        );

        if self.fullscreen_brightness_enabled {
            log_indented!(
                "Fullscreen override: {}% (detector: {})",
                self.fullscreen_brightness,
                self.fullscreen_detector
            );
        } else {
            log_indented!("Fullscreen override: off");
        }

        log_indented!("Update interval: {} seconds", self.update_interval);

        for (monitor, offset) in &self.monitor_offsets {
            log_indented!("Offset {monitor}: {offset:+}");
        }
    }
}

#[cfg(test)]
mod tests;
