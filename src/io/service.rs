//! systemd user service control.

use anyhow::Result;
use std::process::Command;
use std::time::Duration;

use crate::common::utils::run_with_timeout;

const SYSTEMCTL_TIMEOUT: Duration = Duration::from_secs(10);

/// `systemctl --user --no-block restart <service>`.
///
/// `--no-block` matters when the daemon restarts itself: systemctl must not
/// wait for the stop job of the process that is calling it.
pub fn restart_command(service_name: &str) -> Command {
    let mut command = Command::new("systemctl");
    command.args(["--user", "--no-block", "restart", service_name]);
    command
}

/// Queue a restart of the user service.
pub fn restart_service(service_name: &str) -> Result<()> {
    let service_name = service_name.trim();
    if service_name.is_empty() {
        return Err(invalid_input!("service name must not be empty"));
    }

    let output = run_with_timeout(&mut restart_command(service_name), SYSTEMCTL_TIMEOUT)?;
    if !output.status.success() {
        anyhow::bail!(
            "systemctl restart {service_name} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_command_args() {
        let command = restart_command("solbright.service");
        assert_eq!(command.get_program(), "systemctl");
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy()).collect();
        assert_eq!(args, ["--user", "--no-block", "restart", "solbright.service"]);
    }

    #[test]
    fn test_empty_service_name_is_invalid() {
        let err = restart_service("   ").unwrap_err();
        assert_eq!(
            crate::common::error::control_error(&err).map(|e| e.kind()),
            Some("invalid_input")
        );
    }
}
