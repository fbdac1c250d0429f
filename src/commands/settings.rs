//! Output for the settings and brightness commands.

use crate::config::Config;
use crate::core::control::ApplyOutcome;
use crate::preview::ALL_MONITORS;

pub fn target_name(target: &str) -> &str {
    if target == ALL_MONITORS {
        "all monitors"
    } else {
        target
    }
}

pub fn display_settings(config: &Config) {
    let on_off = |enabled: bool| if enabled { "on" } else { "off" };
    let row = |label: &str, value: String| println!("{label:>20} {value}");

    row("Auto brightness:", on_off(config.auto_brightness_enabled).to_string());
    row("Elevation scaling:", on_off(config.use_elevation_scaling).to_string());
    row(
        "Brightness range:",
        format!("{}% - {}%", config.min_brightness, config.max_brightness),
    );
    row(
        "Fullscreen override:",
        format!(
            "{} ({}%)",
            on_off(config.fullscreen_brightness_enabled),
            config.fullscreen_brightness
        ),
    );
    row(
        "Location:",
        config
            .location()
            .map_or_else(|| "not set".to_string(), |l| l.to_string()),
    );
}

pub fn display_committed(target: &str, value: u8, outcome: &ApplyOutcome) {
    println!("Brightness {value}% set on {}", target_name(target));
    for (monitor, written) in &outcome.applied {
        println!("  {monitor}: {written}");
    }
    for (monitor, reason) in &outcome.failures {
        println!("  {monitor}: failed ({reason})");
    }
}
