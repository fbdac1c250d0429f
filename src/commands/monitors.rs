//! Output for the monitor commands (`monitors`, `refresh`, `caps`, `get`,
//! `set`), plus the `export` and `import` commands that move settings
//! snapshots between the daemon and JSON files.

use anyhow::{Context, Result, bail};
use std::fs;

use crate::core::status::MonitorInfo;
use crate::ddc::FeatureKind;
use crate::ipc::{FeatureValue, Reply, Request};
use crate::monitors::{ImportOutcome, MonitorSettings, RefreshSummary};

/// Export a monitor's settings to `file`, or print them when no file is given.
pub fn handle_export_command(monitor: &str, file: Option<&str>) -> Result<()> {
    let mut client = super::connect()?;
    let snapshot = match client.request(&Request::ExportSettings {
        monitor: monitor.to_string(),
    })? {
        Reply::Exported(snapshot) => snapshot,
        other => bail!("Unexpected reply to export: {other:?}"),
    };

    let json = serde_json::to_string_pretty(&snapshot)?;
    match file {
        Some(path) => {
            fs::write(path, json + "\n").with_context(|| format!("Failed to write {path}"))?;
            log_decorated!("Saved {} settings of {monitor} to {path}", snapshot.settings.len());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Restore settings saved by `export` onto `monitor`.
pub fn handle_import_command(monitor: &str, file: &str, json: bool) -> Result<()> {
    let snapshot = read_snapshot(file)?;
    let mut client = super::connect()?;
    let reply = client.request(&Request::ImportSettings {
        monitor: monitor.to_string(),
        snapshot,
    })?;
    super::print_reply(&reply, json)?;

    if let Reply::Imported { outcome, .. } = &reply
        && !outcome.is_complete()
    {
        bail!("{} settings could not be restored", outcome.failures.len());
    }
    Ok(())
}

pub fn read_snapshot(path: &str) -> Result<MonitorSettings> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("{path} is not a settings export"))
}

pub fn display_snapshot(snapshot: &MonitorSettings) {
    println!("{}:", snapshot.monitor);
    for setting in &snapshot.settings {
        println!("  {:02X} {:<28} {}", setting.code, setting.name, setting.value);
    }
}

pub fn display_import(monitor: &str, outcome: &ImportOutcome) {
    println!("Restored {} settings on {monitor}", outcome.applied.len());
    for setting in &outcome.applied {
        println!("  {:02X} {:<28} {}", setting.code, setting.name, setting.value);
    }
    if !outcome.skipped.is_empty() {
        let codes: Vec<String> = outcome.skipped.iter().map(|c| format!("{c:02X}")).collect();
        println!("  skipped: {}", codes.join(" "));
    }
    for failure in &outcome.failures {
        println!("  {:02X} failed ({})", failure.code, failure.reason);
    }
}

pub fn display_monitor_list(monitors: &[MonitorInfo]) {
    if monitors.is_empty() {
        println!("No monitors found");
        return;
    }
    for monitor in monitors {
        println!("{}", monitor_line(monitor));
    }
}

/// One-line summary: id, label, bus, offset and connection state.
pub fn monitor_line(monitor: &MonitorInfo) -> String {
    let mut line = format!("{}  {} (i2c-{})", monitor.id, monitor.label, monitor.bus);
    if monitor.offset != 0 {
        line.push_str(&format!("  offset {:+}", monitor.offset));
    }
    if monitor.brightness_code.is_none() {
        line.push_str("  [no brightness control]");
    }
    if monitor.stale {
        line.push_str("  [disconnected]");
    }
    line
}

pub fn display_refresh(summary: &RefreshSummary) {
    println!(
        "{} live, {} disconnected",
        summary.live, summary.stale
    );
    for id in &summary.added {
        println!("  + {id}");
    }
    for id in &summary.lost {
        println!("  - {id}");
    }
    for id in &summary.incomplete {
        println!("  ! {id}: capabilities only partly readable");
    }
}

pub fn display_monitor(monitor: &MonitorInfo) {
    println!("{}", monitor_line(monitor));
    if let Some(model) = &monitor.model {
        println!("        Model: {model}");
    }
    if let Some(version) = &monitor.mccs_version {
        println!("         MCCS: {version}");
    }
    println!("     Features:");
    for feature in &monitor.features {
        println!("       {:02X} {:<28} {}", feature.code, feature.name, kind_summary(&feature.kind));
    }
}

fn kind_summary(kind: &FeatureKind) -> String {
    match kind {
        FeatureKind::Continuous { min, max } => format!("{min}-{max}"),
        FeatureKind::Incremental { min, max, step } => format!("{min}-{max} step {step}"),
        FeatureKind::FreeNumeric { min, max } => format!("{min}-{max} (raw)"),
        FeatureKind::Discrete { values } => values
            .iter()
            .map(|(code, name)| format!("{code:02X}={name}"))
            .collect::<Vec<_>>()
            .join(", "),
        FeatureKind::ReadOnly => "read-only".to_string(),
    }
}

pub fn display_feature(value: &FeatureValue) {
    let mut line = format!(
        "{}: {:02X} {} = {}",
        value.monitor, value.code, value.name, value.current
    );
    if let Some(label) = &value.label {
        line.push_str(&format!(" ({label})"));
    }
    if let Some(max) = value.max {
        line.push_str(&format!(" / {max}"));
    }
    println!("{line}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desk.json");
        let snapshot = MonitorSettings {
            monitor: "i2c-6".into(),
            settings: vec![crate::monitors::SettingValue {
                code: 0x10,
                name: "Brightness".into(),
                value: 70,
            }],
        };
        fs::write(&path, serde_json::to_string_pretty(&snapshot).unwrap()).unwrap();
        assert_eq!(read_snapshot(path.to_str().unwrap()).unwrap(), snapshot);

        fs::write(&path, "{\"brightness\": 70}").unwrap();
        let err = read_snapshot(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("not a settings export"));
        assert!(read_snapshot("/nonexistent/desk.json").is_err());
    }

    #[test]
    fn test_monitor_line() {
        let monitor = MonitorInfo {
            id: "DEL:U2720Q:ABC".into(),
            label: "U2720Q".into(),
            bus: 6,
            model: None,
            mccs_version: None,
            offset: -5,
            stale: true,
            brightness_code: Some(0x10),
            features: vec![],
        };
        assert_eq!(
            monitor_line(&monitor),
            "DEL:U2720Q:ABC  U2720Q (i2c-6)  offset -5  [disconnected]"
        );
    }
}
