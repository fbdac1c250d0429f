use super::validation::{validate_brightness_range, validate_config};
use super::*;
use crate::common::error::control_error;
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

fn assert_invalid(config: &Config) {
    let err = validate_config(config).expect_err("config should be rejected");
    assert_eq!(control_error(&err).map(|e| e.kind()), Some("invalid_input"));
}

#[test]
#[serial]
fn test_config_load_default_creation() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("solbright").join("solbright.toml");

    let original = std::env::var("XDG_CONFIG_HOME").ok();
    unsafe {
        std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());
    }

    let result = load();

    unsafe {
        match original {
            Some(val) => std::env::set_var("XDG_CONFIG_HOME", val),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
    }

    let (config, path) = result.unwrap();
    assert_eq!(path, config_path);
    assert!(config_path.exists());
    assert_eq!(config, Config::default());
}

#[test]
fn test_default_config_is_valid() {
    validate_config(&Config::default()).unwrap();
}

#[test]
fn test_empty_file_uses_defaults() {
    assert_eq!(parse_config("").unwrap(), Config::default());
}

#[test]
fn test_parse_full_schema() {
    let content = r#"
latitude = 40.7128
longitude = -74.006
location_override = true
auto_brightness_enabled = false
use_elevation_scaling = false
min_brightness = 5
max_brightness = 80
fullscreen_brightness_enabled = true
fullscreen_brightness = 90
fullscreen_detector = "x11"
update_interval = 30

[monitor_offsets]
"DEL:DELL U2720Q:ABC123" = -10
"i2c-6" = 15
"#;
    let config = parse_config(content).unwrap();
    assert_eq!(config.latitude, Some(40.7128));
    assert!(config.location_override);
    assert!(!config.auto_brightness_enabled);
    assert_eq!((config.min_brightness, config.max_brightness), (5, 80));
    assert_eq!(config.fullscreen_detector, DetectorKind::X11);
    assert_eq!(config.offset_for("DEL:DELL U2720Q:ABC123"), -10);
    assert_eq!(config.offset_for("i2c-6"), 15);
    assert_eq!(config.offset_for("unknown"), 0);

    let location = config.location().unwrap();
    assert!(location.manual);
}

#[test]
fn test_coordinates_validation() {
    assert_invalid(&Config {
        latitude: Some(95.0),
        longitude: Some(0.0),
        ..Config::default()
    });
    assert_invalid(&Config {
        latitude: Some(10.0),
        longitude: Some(-200.0),
        ..Config::default()
    });
    // One coordinate without the other
    assert_invalid(&Config {
        latitude: Some(10.0),
        ..Config::default()
    });
}

#[test]
fn test_brightness_range_validation() {
    assert!(validate_brightness_range(0, 100).is_ok());
    assert!(validate_brightness_range(50, 50).is_err());
    assert!(validate_brightness_range(70, 30).is_err());
    assert!(validate_brightness_range(0, 101).is_err());

    assert_invalid(&Config {
        fullscreen_brightness: 120,
        ..Config::default()
    });
}

#[test]
fn test_offset_validation() {
    let mut config = Config::default();
    config.monitor_offsets.insert("a".into(), 50);
    config.monitor_offsets.insert("b".into(), -50);
    validate_config(&config).unwrap();

    config.monitor_offsets.insert("c".into(), 51);
    assert_invalid(&config);
}

#[test]
fn test_timing_limits() {
    assert_invalid(&Config {
        update_interval: 5,
        ..Config::default()
    });
    assert_invalid(&Config {
        fullscreen_poll_interval: 100,
        ..Config::default()
    });
    assert_invalid(&Config {
        preview_cooldown_ms: 10_000,
        ..Config::default()
    });
    assert_invalid(&Config {
        ddc_retries: 0,
        ..Config::default()
    });
    assert_invalid(&Config {
        service_name: "  ".into(),
        ..Config::default()
    });
}

#[test]
fn test_invalid_file_reports_path() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("solbright.toml");
    fs::write(&path, "min_brightness = 90\nmax_brightness = 20\n").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(format!("{err:#}").contains("solbright.toml"));
    assert!(control_error(&err).is_some());
}

#[test]
fn test_render_round_trip() {
    let mut config = Config {
        latitude: Some(-33.8688),
        longitude: Some(151.2093),
        location_override: false,
        location_name: Some("Sydney, \"AU\"".into()),
        min_brightness: 0,
        max_brightness: 75,
        fullscreen_detector: DetectorKind::Hyprland,
        ..Config::default()
    };
    config.monitor_offsets.insert("GSM:LG HDR 4K:0x1234".into(), -25);

    let rendered = render_config(&config);
    assert!(rendered.contains("#[Brightness]"));
    assert_eq!(parse_config(&rendered).unwrap(), config);
}

#[test]
fn test_render_without_location_comments_keys() {
    let rendered = render_config(&Config::default());
    assert!(!rendered.lines().any(|l| l.starts_with("latitude")));
    assert!(rendered.contains("# latitude"));
    assert_eq!(parse_config(&rendered).unwrap(), Config::default());
}

#[test]
fn test_set_location_replaces_all_fields() {
    let mut config = Config {
        location_name: Some("Old".into()),
        ..Config::default()
    };
    let location = crate::geo::Location::new(48.85, 2.35, true, None).unwrap();
    config.set_location(&location);
    assert_eq!(config.location(), Some(location));
    assert!(config.location_override);
    assert!(config.location_name.is_none());
}
