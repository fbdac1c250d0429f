//! Implementation of the restart command.
//!
//! Asks the running daemon to restart its systemd user service. When no
//! daemon answers, the service is restarted directly.

use anyhow::Result;

use crate::config;
use crate::io::{lock, service};
use crate::ipc::{IpcClient, Reply, Request};

pub fn handle_restart_command(debug_enabled: bool) -> Result<()> {
    log_version!();

    if IpcClient::is_running() {
        let mut client = super::connect()?;
        if let Reply::Restarting { service } = client.request(&Request::RestartService)? {
            log_block_start!("Restarting {service}...");
        }
        log_end!();
        return Ok(());
    }

    if debug_enabled && let Some(pid) = lock::running_instance() {
        log_pipe!();
        log_debug!("Instance {pid} holds the lock but does not answer IPC");
    }

    // Use the configured service name when the file is readable
    let service_name = config::get_config_path()
        .and_then(|path| config::load_from_path(&path))
        .map(|c| c.service_name)
        .unwrap_or_else(|_| crate::common::constants::DEFAULT_SERVICE_NAME.to_string());

    log_block_start!("solbright is not running, starting {service_name}...");
    service::restart_service(&service_name)?;
    log_end!();
    Ok(())
}

/// Display help for the restart command.
pub fn display_help() {
    log_version!();
    log_block_start!("restart - Restart the solbright service");
    log_block_start!("Usage: solbright restart");
    log_block_start!("Description:");
    log_indented!("Runs 'systemctl --user restart' on the configured service_name.");
    log_indented!("Works whether or not the daemon is currently running.");
    log_end!();
}
