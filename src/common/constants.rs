//! Application constants and default values for solbright.
//!
//! This module contains the configuration defaults, validation limits,
//! curve anchors, DDC/CI timing and the file names used throughout the
//! application.

// ═══ Application Configuration Defaults ═══
// Used when a key is missing from solbright.toml

pub const DEFAULT_AUTO_BRIGHTNESS_ENABLED: bool = true;
pub const DEFAULT_USE_ELEVATION_SCALING: bool = true;
pub const DEFAULT_MIN_BRIGHTNESS: u8 = 10; // percent
pub const DEFAULT_MAX_BRIGHTNESS: u8 = 100; // percent
pub const DEFAULT_FULLSCREEN_BRIGHTNESS_ENABLED: bool = false;
pub const DEFAULT_FULLSCREEN_BRIGHTNESS: u8 = 100; // percent
pub const DEFAULT_UPDATE_INTERVAL: u64 = 60; // seconds between control loop ticks
pub const DEFAULT_FULLSCREEN_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_PREVIEW_COOLDOWN_MS: u64 = 500;
pub const DEFAULT_DDC_RETRIES: u32 = 3;
pub const DEFAULT_DDC_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_SERVICE_NAME: &str = "solbright.service";

// ═══ Validation Limits ═══

pub const MINIMUM_BRIGHTNESS: u8 = 0;
pub const MAXIMUM_BRIGHTNESS: u8 = 100;

pub const MINIMUM_OFFSET: i32 = -50; // percentage points
pub const MAXIMUM_OFFSET: i32 = 50;

pub const MINIMUM_LATITUDE: f64 = -90.0;
pub const MAXIMUM_LATITUDE: f64 = 90.0;
pub const MINIMUM_LONGITUDE: f64 = -180.0;
pub const MAXIMUM_LONGITUDE: f64 = 180.0;

pub const MINIMUM_UPDATE_INTERVAL: u64 = 10; // seconds
pub const MAXIMUM_UPDATE_INTERVAL: u64 = 3600;

pub const MINIMUM_FULLSCREEN_POLL_INTERVAL_MS: u64 = 250;
pub const MAXIMUM_FULLSCREEN_POLL_INTERVAL_MS: u64 = 60_000;

pub const MINIMUM_PREVIEW_COOLDOWN_MS: u64 = 50;
pub const MAXIMUM_PREVIEW_COOLDOWN_MS: u64 = 5000;

pub const MINIMUM_DDC_RETRIES: u32 = 1;
pub const MAXIMUM_DDC_RETRIES: u32 = 10;

pub const MINIMUM_DDC_TIMEOUT_MS: u64 = 250;
pub const MAXIMUM_DDC_TIMEOUT_MS: u64 = 30_000;

// ═══ Brightness Curve ═══
// Elevation thresholds in degrees and the share of the min..max span
// reached at each anchor of the elevation-scaled curve.

pub const NIGHT_ELEVATION: f64 = -6.0; // civil twilight boundary
pub const HORIZON_ELEVATION: f64 = 0.0;
pub const LOW_SUN_ELEVATION: f64 = 15.0;
pub const BRIGHT_ELEVATION: f64 = 40.0;
pub const SIMPLE_DAY_ELEVATION: f64 = 6.0;

pub const HORIZON_FRACTION: f64 = 0.5; // the "midpoint" reached at sunrise
pub const LOW_SUN_FRACTION: f64 = 0.8;

// ═══ DDC/CI ═══

pub const DDCUTIL_BINARY: &str = "ddcutil";
pub const DDC_INITIAL_BACKOFF_MS: u64 = 100;
pub const DDC_MAX_BACKOFF_MS: u64 = 800;
pub const FREE_NUMERIC_MAX: u16 = 255; // bound for VCP codes we know nothing about

// ═══ Operational Timing ═══

pub const MAIN_LOOP_POLL_CHUNK_MS: u64 = 250; // signal responsiveness during sleeps
pub const IPC_POLL_INTERVAL_MS: u64 = 10;
pub const CONFIG_WATCH_DEBOUNCE_MS: u64 = 500;
pub const PROCESS_CHECK_TIMEOUT_MS: u64 = 2000;

// ═══ File Names ═══

pub const CONFIG_DIR_NAME: &str = "solbright";
pub const CONFIG_FILE_NAME: &str = "solbright.toml";
pub const LOCK_FILE_NAME: &str = "solbright.lock";
pub const SOCKET_FILE_NAME: &str = "solbright.sock";

// ═══ Exit Codes ═══

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
