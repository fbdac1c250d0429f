//! Transport backed by the `ddcutil` command-line tool.
//!
//! Every call spawns one `ddcutil` process addressed by I2C bus number and
//! kills it if it outlives the configured timeout. Output is parsed with
//! regular expressions tolerant of the small format differences between
//! ddcutil releases.

use anyhow::{Context, Result};
use regex::Regex;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use super::{DisplayBus, MonitorHandle, VcpReading};
use crate::common::constants::DDCUTIL_BINARY;
use crate::common::utils::run_with_timeout;

static CONTINUOUS_VALUE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"current value\s*=\s*(\d+)\s*,\s*max value\s*=\s*(\d+)").ok()
});
static SINGLE_BYTE_VALUE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\(sl=0x([0-9A-Fa-f]+)\)").ok());
static I2C_BUS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"I2C bus:\s*/dev/i2c-(\d+)").ok());

pub struct DdcutilBus {
    binary: String,
    timeout: Duration,
}

impl DdcutilBus {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: DDCUTIL_BINARY.to_string(),
            timeout,
        }
    }

    fn run(&self, args: &[String]) -> Result<String> {
        #[cfg(debug_assertions)]
        eprintln!("DEBUG: {} {}", self.binary, args.join(" "));

        let output = run_with_timeout(Command::new(&self.binary).args(args), self.timeout)
            .with_context(|| format!("{} {}", self.binary, args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            anyhow::bail!("{} {} failed: {detail}", self.binary, args.join(" "));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn bus_args(monitor: &MonitorHandle, rest: &[String]) -> Vec<String> {
        let mut args = vec!["--bus".to_string(), monitor.bus.to_string()];
        args.extend_from_slice(rest);
        args
    }
}

impl DisplayBus for DdcutilBus {
    fn detect(&self) -> Result<Vec<MonitorHandle>> {
        let output = self.run(&["detect".to_string(), "--brief".to_string()])?;
        Ok(parse_detect(&output))
    }

    fn capabilities(&self, monitor: &MonitorHandle) -> Result<String> {
        self.run(&Self::bus_args(monitor, &["capabilities".to_string()]))
    }

    fn read_vcp(&self, monitor: &MonitorHandle, code: u8) -> Result<VcpReading> {
        let output = self.run(&Self::bus_args(
            monitor,
            &["getvcp".to_string(), format!("{code:02X}")],
        ))?;
        parse_getvcp(&output)
            .with_context(|| format!("unrecognized getvcp output: {}", output.trim()))
    }

    fn write_vcp(&self, monitor: &MonitorHandle, code: u8, value: u16) -> Result<()> {
        self.run(&Self::bus_args(
            monitor,
            &[
                "setvcp".to_string(),
                format!("{code:02X}"),
                value.to_string(),
            ],
        ))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ddcutil"
    }
}

/// Parse `ddcutil detect --brief` output into handles.
///
/// Blocks flagged `Invalid display` (laptop panels, phantom connectors) are
/// dropped.
pub fn parse_detect(output: &str) -> Vec<MonitorHandle> {
    let mut monitors = Vec::new();

    for block in output.split("\n\n") {
        let block = block.trim();
        if block.is_empty() || block.starts_with("Invalid display") {
            continue;
        }

        let Some(bus) = I2C_BUS
            .as_ref()
            .and_then(|re| re.captures(block))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        else {
            continue;
        };

        let identity = block
            .lines()
            .find_map(|line| line.trim().strip_prefix("Monitor:"))
            .map(str::trim)
            .filter(|s| !s.is_empty() && s.split(':').any(|part| !part.trim().is_empty()));

        let (id, label) = match identity {
            Some(identity) => {
                let model = identity.split(':').nth(1).map(str::trim).unwrap_or("");
                let label = if model.is_empty() {
                    identity.to_string()
                } else {
                    model.to_string()
                };
                (identity.to_string(), label)
            }
            None => (format!("i2c-{bus}"), format!("Display on i2c-{bus}")),
        };

        monitors.push(MonitorHandle { id, label, bus });
    }

    monitors
}

/// Parse `ddcutil getvcp` output.
pub fn parse_getvcp(output: &str) -> Option<VcpReading> {
    if let Some(caps) = CONTINUOUS_VALUE.as_ref().and_then(|re| re.captures(output)) {
        let current = caps.get(1)?.as_str().parse().ok()?;
        let max = caps.get(2)?.as_str().parse().ok()?;
        return Some(VcpReading { current, max });
    }

    let caps = SINGLE_BYTE_VALUE.as_ref()?.captures(output)?;
    let current = u16::from_str_radix(caps.get(1)?.as_str(), 16).ok()?;
    Some(VcpReading { current, max: 0xFF })
}
