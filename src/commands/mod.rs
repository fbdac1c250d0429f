//! Command-line command handlers for solbright.
//!
//! Every command except `run` is a client of the running daemon: it sends one
//! IPC request and prints the reply, either human-readable or as JSON.
//! Each group of commands renders its replies in its own submodule.

pub mod help;
pub mod monitors;
pub mod restart;
pub mod settings;
pub mod status;

use anyhow::{Context, Result};

use crate::ipc::{IpcClient, Reply, Request};

/// Connect to the daemon, explaining how to start it when it is not running.
pub(crate) fn connect() -> Result<IpcClient> {
    IpcClient::connect().context("No solbright process is running. Start it with 'solbright run'")
}

/// Send one request and print its reply.
pub fn handle_send_command(request: Request, json: bool) -> Result<()> {
    let mut client = connect()?;
    let reply = client.request(&request)?;
    print_reply(&reply, json)
}

/// Print a reply in the requested format.
pub fn print_reply(reply: &Reply, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reply)?);
        return Ok(());
    }

    match reply {
        Reply::Status(report) => status::display_human_readable(report),
        Reply::Monitors { monitors } => monitors::display_monitor_list(monitors),
        Reply::Refreshed(summary) => monitors::display_refresh(summary),
        Reply::Monitor(monitor) => monitors::display_monitor(monitor),
        Reply::Feature(value) => monitors::display_feature(value),
        Reply::Offset { monitor, offset } => println!("{monitor}: offset {offset:+}"),
        Reply::Exported(snapshot) => monitors::display_snapshot(snapshot),
        Reply::Imported { monitor, outcome } => monitors::display_import(monitor, outcome),
        Reply::Settings(config) => settings::display_settings(config),
        Reply::Location(location) => println!("Location: {}", location.display),
        Reply::PreviewQueued { target, value } => {
            println!("Preview {value}% queued for {}", settings::target_name(target))
        }
        Reply::Committed {
            target,
            value,
            outcome,
        } => settings::display_committed(target, *value, outcome),
        Reply::Restarting { service } => println!("Restarting {service}"),
        Reply::Subscribed => println!("Subscribed"),
    }
    Ok(())
}
