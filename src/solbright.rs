//! Application coordinator that manages the complete lifecycle of the daemon.
//!
//! This module handles resource acquisition, initialization, and orchestration
//! of the core application logic. It manages:
//! - Configuration loading
//! - Lock file management for single-instance enforcement
//! - Signal handler setup
//! - Background monitors (D-Bus sleep/resume, config watcher)
//! - The DDC/CI transport
//!
//! Startup: `Solbright::new(debug_enabled).run()`

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::common::utils::private_path;
use crate::config;
use crate::core::{Core, CoreParams};
use crate::ddc::{DdcutilBus, HardwareBus, RetryPolicy};
use crate::geo::CitiesGeocoder;
use crate::io::{dbus, lock, signals::setup_signal_handler};
use crate::ipc;

/// Runner for the daemon.
///
/// # Examples
///
/// ```no_run
/// use solbright::Solbright;
///
/// # fn main() -> anyhow::Result<()> {
/// Solbright::new(false).run()?;
/// # Ok(())
/// # }
/// ```
pub struct Solbright {
    debug_enabled: bool,
}

impl Solbright {
    pub fn new(debug_enabled: bool) -> Self {
        Self { debug_enabled }
    }

    /// Execute the daemon until a shutdown signal arrives.
    pub fn run(self) -> Result<()> {
        log_version!();

        #[cfg(debug_assertions)]
        eprintln!(
            "DEBUG: Process {} startup: debug_enabled={}",
            std::process::id(),
            self.debug_enabled
        );

        let (config, config_path) = config::load().context("Configuration failed")?;

        // Lock before anything else talks to the hardware
        let instance_lock = lock::acquire_lock()?;

        let signal_state = setup_signal_handler(self.debug_enabled)?;

        dbus::start_system_event_monitor(signal_state.signal_sender.clone(), self.debug_enabled);

        if let Err(e) = config::start_config_watcher(
            config_path.clone(),
            signal_state.signal_sender.clone(),
            self.debug_enabled,
        ) {
            log_pipe!();
            log_warning!("Config file watching unavailable: {e}");
            log_indented!("Hot config reload disabled, use SIGUSR2 for manual reload");
        }

        if let Some(custom_dir) = config::get_custom_config_dir() {
            log_block_start!("Base directory: {}", private_path(&custom_dir));
        }
        config.log_config();

        let transport = Arc::new(DdcutilBus::new(config.ddc_timeout()));
        let bus = HardwareBus::new(transport, RetryPolicy::from_config(&config));

        let store = Arc::new(config::ConfigStore::new(config, Some(config_path)));

        log_block_start!("Lock acquired, starting solbright...");

        let core = Core::new(CoreParams {
            store,
            bus,
            signal_state,
            debug_enabled: self.debug_enabled,
            lock: Some(instance_lock),
            socket_path: Some(ipc::socket_path()),
            geocoder: Arc::new(CitiesGeocoder::new()),
        })
        .context("Failed to initialize solbright")?;

        core.execute()
    }
}
