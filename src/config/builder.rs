//! Configuration file rendering.
//!
//! The file is always written through [`ConfigBuilder`], both for the default
//! file created on first run and when the daemon saves a changed config, so
//! the layout and the explanatory comments survive every save.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use super::Config;
use crate::common::constants::*;

/// Write the default configuration to `path`, creating parent directories.
pub fn create_default_config(path: &Path) -> Result<()> {
    write_config(path, &Config::default())
}

/// Atomically replace the file at `path` with the rendered `config`.
///
/// Content goes to a temporary file in the same directory first, then is
/// renamed over the target, so readers never observe a half-written file.
pub fn write_config(path: &Path, config: &Config) -> Result<()> {
    let dir = path
        .parent()
        .context("Configuration path has no parent directory")?;
    fs::create_dir_all(dir).context("Failed to create config directory")?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .context("Failed to create temporary config file")?;
    temp.write_all(render_config(config).as_bytes())
        .context("Failed to write temporary config file")?;
    temp.flush()?;
    temp.persist(path)
        .map_err(|e| e.error)
        .context("Failed to replace config file")?;
    Ok(())
}

fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

fn toml_float(value: f64) -> String {
    toml::Value::Float(value).to_string()
}

/// Render a configuration as commented TOML.
pub fn render_config(config: &Config) -> String {
    let mut builder = ConfigBuilder::new().add_section("Location");

    match (config.latitude, config.longitude) {
        (Some(lat), Some(lon)) => {
            builder = builder
                .add_setting("latitude", &toml_float(lat), "Degrees north (-90 to 90)")
                .add_setting("longitude", &toml_float(lon), "Degrees east (-180 to 180)");
        }
        _ => {
            builder = builder
                .add_comment("latitude = 40.7128     # Set coordinates, or run 'solbright location --name <city>'")
                .add_comment("longitude = -74.006");
        }
    }
    builder = builder.add_setting(
        "location_override",
        &config.location_override.to_string(),
        "true when coordinates were entered by hand",
    );
    if let Some(name) = &config.location_name {
        builder = builder.add_setting("location_name", &toml_string(name), "Resolved place name");
    }

    let builder = builder
        .add_section("Brightness")
        .add_setting(
            "auto_brightness_enabled",
            &config.auto_brightness_enabled.to_string(),
            "Follow the sun",
        )
        .add_setting(
            "use_elevation_scaling",
            &config.use_elevation_scaling.to_string(),
            "Five-phase elevation curve (false = simple ramp around sunrise/sunset)",
        )
        .add_setting(
            "min_brightness",
            &config.min_brightness.to_string(),
            &format!("Night brightness ({MINIMUM_BRIGHTNESS}-{MAXIMUM_BRIGHTNESS}%)"),
        )
        .add_setting(
            "max_brightness",
            &config.max_brightness.to_string(),
            &format!("Full daylight brightness ({MINIMUM_BRIGHTNESS}-{MAXIMUM_BRIGHTNESS}%)"),
        )
        .add_section("Fullscreen")
        .add_setting(
            "fullscreen_brightness_enabled",
            &config.fullscreen_brightness_enabled.to_string(),
            "Override brightness while a window is fullscreen",
        )
        .add_setting(
            "fullscreen_brightness",
            &config.fullscreen_brightness.to_string(),
            &format!("Override value ({MINIMUM_BRIGHTNESS}-{MAXIMUM_BRIGHTNESS}%)"),
        )
        .add_setting(
            "fullscreen_detector",
            &toml_string(config.fullscreen_detector.as_str()),
            "Select: \"auto\", \"hyprland\", \"x11\", \"none\"",
        )
        .add_setting(
            "fullscreen_poll_interval",
            &config.fullscreen_poll_interval.to_string(),
            &format!(
                "Fullscreen check period ({MINIMUM_FULLSCREEN_POLL_INTERVAL_MS}-{MAXIMUM_FULLSCREEN_POLL_INTERVAL_MS})ms"
            ),
        )
        .add_section("Timing")
        .add_setting(
            "update_interval",
            &config.update_interval.to_string(),
            &format!(
                "Seconds between brightness updates ({MINIMUM_UPDATE_INTERVAL}-{MAXIMUM_UPDATE_INTERVAL})"
            ),
        )
        .add_setting(
            "preview_cooldown_ms",
            &config.preview_cooldown_ms.to_string(),
            &format!(
                "Minimum gap between preview writes ({MINIMUM_PREVIEW_COOLDOWN_MS}-{MAXIMUM_PREVIEW_COOLDOWN_MS})ms"
            ),
        )
        .add_section("DDC/CI")
        .add_setting(
            "ddc_retries",
            &config.ddc_retries.to_string(),
            &format!("Attempts per bus transaction ({MINIMUM_DDC_RETRIES}-{MAXIMUM_DDC_RETRIES})"),
        )
        .add_setting(
            "ddc_timeout_ms",
            &config.ddc_timeout_ms.to_string(),
            &format!(
                "Timeout per attempt ({MINIMUM_DDC_TIMEOUT_MS}-{MAXIMUM_DDC_TIMEOUT_MS})ms"
            ),
        )
        .add_setting(
            "service_name",
            &toml_string(&config.service_name),
            "systemd user unit restarted by 'solbright restart'",
        )
        .add_table(
            "monitor_offsets",
            &config.monitor_offsets,
            &format!("Per-monitor calibration ({MINIMUM_OFFSET} to {MAXIMUM_OFFSET}), keyed by monitor id"),
        );

    builder.build()
}

/// Builder for properly formatted configuration files with aligned comments.
struct ConfigBuilder {
    entries: Vec<ConfigEntry>,
}

enum ConfigEntry {
    Section(String),
    Setting { line: String, comment: String },
    Comment(String),
    Table { header: String, comment: String, rows: Vec<String> },
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add_section(mut self, title: &str) -> Self {
        self.entries.push(ConfigEntry::Section(format!("#[{title}]")));
        self
    }

    fn add_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        self.entries.push(ConfigEntry::Setting {
            line: format!("{key} = {value}"),
            comment: format!("# {comment}"),
        });
        self
    }

    fn add_comment(mut self, text: &str) -> Self {
        self.entries.push(ConfigEntry::Comment(format!("# {text}")));
        self
    }

    /// A TOML table. Must be added last since top-level keys cannot follow it.
    fn add_table(mut self, name: &str, rows: &BTreeMap<String, i32>, comment: &str) -> Self {
        self.entries.push(ConfigEntry::Table {
            header: format!("[{name}]"),
            comment: format!("# {comment}"),
            rows: rows
                .iter()
                .map(|(key, value)| format!("{} = {value}", toml_string(key)))
                .collect(),
        });
        self
    }

    fn build(self) -> String {
        let max_width = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                ConfigEntry::Setting { line, .. } => Some(line.len()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut result = Vec::new();
        let mut first_section = true;

        for entry in self.entries {
            match entry {
                ConfigEntry::Section(title) => {
                    if !first_section {
                        result.push(String::new());
                    }
                    result.push(title);
                    first_section = false;
                }
                ConfigEntry::Setting { line, comment } => {
                    let padding = " ".repeat(max_width.saturating_sub(line.len()));
                    result.push(format!("{line}{padding}{comment}"));
                }
                ConfigEntry::Comment(text) => result.push(text),
                ConfigEntry::Table {
                    header,
                    comment,
                    rows,
                } => {
                    result.push(String::new());
                    result.push(comment);
                    result.push(header);
                    result.extend(rows);
                }
            }
        }

        let mut content = result.join("\n");
        content.push('\n');
        content
    }
}
