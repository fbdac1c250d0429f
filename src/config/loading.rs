//! Configuration loading functionality.
//!
//! Resolves the config path (custom directory or XDG default), creates the
//! default file on first run and parses plus validates TOML content.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::Config;
use super::validation::validate_config;
use crate::common::constants::*;
use crate::common::utils::private_path;

static CONFIG_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Set a custom configuration directory (from `--config`).
///
/// Can only be called once per process.
pub fn set_config_dir(dir: Option<String>) -> Result<()> {
    #[cfg(debug_assertions)]
    eprintln!("DEBUG: set_config_dir() called with: {dir:?}");

    CONFIG_DIR
        .set(dir.map(PathBuf::from))
        .map_err(|_| anyhow::anyhow!("Configuration directory already set"))
}

pub fn get_custom_config_dir() -> Option<PathBuf> {
    CONFIG_DIR.get().and_then(|d| d.clone())
}

/// Path of the active configuration file.
pub fn get_config_path() -> Result<PathBuf> {
    if let Some(custom_dir) = get_custom_config_dir() {
        return Ok(custom_dir.join(CONFIG_FILE_NAME));
    }

    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load the active configuration, creating the default file if missing.
pub fn load() -> Result<(Config, PathBuf)> {
    let config_path = get_config_path()?;

    #[cfg(debug_assertions)]
    eprintln!("DEBUG: config::load() - config_path: {}", private_path(&config_path));

    if !config_path.exists() {
        super::builder::create_default_config(&config_path)
            .context("Failed to create default config during load")?;
        log_block_start!("Created default configuration");
        log_indented!("{}", private_path(&config_path));
    }

    let config = load_from_path(&config_path)?;
    Ok((config, config_path))
}

/// Read, parse and validate a configuration file.
pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", private_path(path)))?;

    parse_config(&content)
        .with_context(|| format!("Failed to load configuration from {}", private_path(path)))
}

/// Parse and validate TOML content.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    validate_config(&config)?;
    Ok(config)
}
