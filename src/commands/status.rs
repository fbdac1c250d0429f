//! Status command - display the daemon state via IPC.
//!
//! Supports JSON and human-readable output, with an optional follow mode
//! that streams events until interrupted.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::core::control::{TickReport, TickSource};
use crate::core::status::StatusReport;
use crate::fullscreen::FullscreenState;
use crate::ipc::{IpcClient, IpcEvent, Reply, Request};

/// Handle the status command.
///
/// # Arguments
/// * `json` - Output in JSON format
/// * `follow` - Keep printing events after the initial state
pub fn handle_status_command(json: bool, follow: bool) -> Result<()> {
    let mut client = super::connect()?;

    let report = match client.request(&Request::Status)? {
        Reply::Status(report) => report,
        other => anyhow::bail!("Unexpected reply to status: {other:?}"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display_human_readable(&report);
    }

    if follow {
        follow_events(client, json)?;
    }
    Ok(())
}

/// Display the status report in human-readable format.
pub fn display_human_readable(report: &StatusReport) {
    let on_off = |enabled: bool| if enabled { "on" } else { "off" };

    println!("   solbright: v{} (PID {})", report.version, report.pid);
    println!(
        "        Auto: {} ({}% - {}%, {})",
        on_off(report.auto_brightness_enabled),
        report.min_brightness,
        report.max_brightness,
        if report.use_elevation_scaling {
            "elevation scaling"
        } else {
            "simple curve"
        }
    );

    match &report.location {
        Some(location) => println!("    Location: {}", location.display),
        None => println!("    Location: not set"),
    }

    if let Some(sun) = &report.sun {
        println!(
            "         Sun: {:.1}° ({}), curve {}%",
            sun.elevation, sun.phase, sun.curve_brightness
        );
        match (sun.sunrise, sun.sunset) {
            (Some(rise), Some(set)) => println!(
                "     Daylight: {} - {} (noon {})",
                local_time(rise),
                local_time(set),
                local_time(sun.solar_noon)
            ),
            _ => println!("     Daylight: no sunrise or sunset today"),
        }
    }

    let fullscreen = match (report.fullscreen_brightness_enabled, report.fullscreen_state) {
        (false, _) => "off".to_string(),
        (true, FullscreenState::Normal) => format!("on ({}%), inactive", report.fullscreen_brightness),
        (true, FullscreenState::FullscreenActive) => {
            format!("on ({}%), ACTIVE", report.fullscreen_brightness)
        }
    };
    println!("  Fullscreen: {fullscreen}");

    if let Some(tick) = &report.last_tick {
        println!("   Last tick: {}", describe_tick(tick));
    }

    println!("    Monitors:");
    if report.monitors.is_empty() {
        println!("      none");
    }
    for monitor in &report.monitors {
        let written = report
            .last_tick
            .as_ref()
            .and_then(|t| t.outcome.applied.get(&monitor.id));
        let mut line = format!("      {}", super::monitors::monitor_line(monitor));
        if let Some(value) = written {
            line.push_str(&format!("  → {value}"));
        }
        println!("{line}");
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}

fn describe_tick(tick: &TickReport) -> String {
    let at = tick.at.with_timezone(&Local).format("%H:%M:%S");
    match (tick.source, tick.target) {
        (TickSource::Skipped, _) => format!(
            "{at} skipped ({})",
            tick.skipped_reason.as_deref().unwrap_or("no reason")
        ),
        (source, Some(target)) => {
            let source = match source {
                TickSource::Curve => "sun",
                TickSource::Fullscreen => "fullscreen",
                TickSource::Manual => "manual",
                TickSource::Skipped => "skipped",
            };
            let mut text = format!("{at} {target}% ({source})");
            if !tick.outcome.failures.is_empty() {
                text.push_str(&format!(", {} failed", tick.outcome.failures.len()));
            }
            text
        }
        (_, None) => format!("{at}"),
    }
}

/// Stream events until Ctrl+C or until the daemon goes away.
fn follow_events(mut client: IpcClient, json: bool) -> Result<()> {
    // Flag starts false and becomes true on signal
    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&stop))?;

    client.subscribe().context("Failed to subscribe to events")?;
    if !json {
        println!("\nFollowing solbright events (press Ctrl+C to stop)...\n");
    }

    while !stop.load(Ordering::SeqCst) {
        match client.poll_event(Duration::from_millis(200)) {
            Ok(Some(event)) => display_event(&event, json)?,
            Ok(None) => {}
            Err(e) => {
                if !json {
                    eprintln!("solbright stopped ({e}). Exiting follow mode.");
                }
                break;
            }
        }
    }

    if !json {
        println!("\nStopped following solbright events.");
    }
    Ok(())
}

fn display_event(event: &IpcEvent, json: bool) -> Result<()> {
    if json {
        // One JSON object per line
        println!("{}", serde_json::to_string(event)?);
    } else {
        print!("[{}] ", Local::now().format("%H:%M:%S"));
        match event {
            IpcEvent::BrightnessApplied { report } => println!("{}", describe_tick(report)),
            IpcEvent::PhaseChanged {
                to_phase,
                elevation,
                ..
            } => println!("sun entered {to_phase} ({elevation:.1}°)"),
            IpcEvent::FullscreenChanged { active: true } => println!("fullscreen override active"),
            IpcEvent::FullscreenChanged { active: false } => println!("fullscreen override ended"),
            IpcEvent::MonitorsRefreshed { summary } => println!(
                "monitors refreshed: {} live, {} disconnected",
                summary.live, summary.stale
            ),
            IpcEvent::ConfigChanged { .. } => println!("settings changed"),
        }
    }
    std::io::stdout().flush()?;
    Ok(())
}

/// Display help for the status command.
pub fn display_help() {
    log_version!();
    log_block_start!("status - Display the daemon state");
    log_block_start!("Usage: solbright status [--json] [--follow]");
    log_block_start!("Description:");
    log_indented!("Shows the sun position, the computed brightness, the fullscreen");
    log_indented!("override and the value last written to each monitor.");
    log_block_start!("Options:");
    log_indented!("--json     Output state information in JSON format");
    log_indented!("--follow   Keep printing events as they happen");
    log_block_start!("Examples:");
    log_indented!("# Show current state once");
    log_indented!("solbright status");
    log_pipe!();
    log_indented!("# Stream events as JSON lines");
    log_indented!("solbright status --json --follow");
    log_end!();
}
