//! Help command implementation for solbright.
//!
//! Shows command-specific help or the general command list.

use anyhow::Result;

/// Run the help command (dispatcher)
///
/// # Arguments
/// * `command` - Optional command name to get help for (None = general help)
pub fn run_help_command(command: Option<&str>) -> Result<()> {
    match command {
        None => display_general_help(),
        Some("status" | "s") => super::status::display_help(),
        Some("restart") => super::restart::display_help(),
        Some("monitors" | "m" | "refresh" | "caps" | "get" | "g" | "set" | "export" | "import") => {
            display_monitor_help()
        }
        Some("offset" | "o") => display_offset_help(),
        Some("brightness" | "b") => display_brightness_help(),
        Some("auto" | "a" | "scaling" | "range" | "r" | "fullscreen" | "f" | "location" | "l") => {
            display_settings_help()
        }
        Some("help" | "h") => display_help_help(),
        Some(unknown) => {
            log_warning!("Unknown command: {unknown}");
            display_general_help();
        }
    }
    Ok(())
}

/// Display general help focused on commands
fn display_general_help() {
    log_version!();
    log_block_start!("Available Commands:");
    log_indented!("run                     Start the daemon (default)");
    log_indented!("status, s               Show the daemon state");
    log_indented!("monitors, m             List monitors");
    log_indented!("get, g / set            Read or write a VCP feature");
    log_indented!("export / import         Save and restore monitor settings");
    log_indented!("offset, o               Per-monitor calibration offset");
    log_indented!("brightness, b           Set brightness by hand");
    log_indented!("auto, scaling, range    Curve settings");
    log_indented!("fullscreen, f           Fullscreen override");
    log_indented!("location, l             Where the sun is computed for");
    log_indented!("restart                 Restart the systemd user service");
    log_pipe!();
    log_info!("Use 'solbright help <command>' to see detailed help for a specific command.");
    log_indented!("Use 'solbright --help' to see all options and general usage.");
    log_end!();
}

fn display_monitor_help() {
    log_version!();
    log_block_start!("Monitor commands");
    log_block_start!("Usage:");
    log_indented!("solbright monitors                   List monitors and their ids");
    log_indented!("solbright refresh                    Re-scan the DDC/CI bus");
    log_indented!("solbright caps <MONITOR>             Re-read capabilities");
    log_indented!("solbright get <MONITOR> <CODE>       Read a feature");
    log_indented!("solbright set <MONITOR> <CODE> <N>   Write a feature");
    log_indented!("solbright export <MONITOR> [FILE]    Save settings as JSON (stdout without FILE)");
    log_indented!("solbright import <MONITOR> <FILE>    Restore saved settings");
    log_block_start!("Notes:");
    log_indented!("CODE is the hexadecimal VCP code, e.g. 10 (brightness) or 0x60 (input).");
    log_indented!("Values are clamped to the range the monitor advertises.");
    log_indented!("Import skips codes the target monitor lacks; power mode is never saved.");
    log_end!();
}

fn display_offset_help() {
    log_version!();
    log_block_start!("offset - Per-monitor calibration");
    log_block_start!("Usage: solbright offset <MONITOR> [OFFSET]");
    log_block_start!("Description:");
    log_indented!("The offset (-50 to 50) is added to the computed brightness of this");
    log_indented!("monitor, to even out panels that are brighter than the others.");
    log_block_start!("Examples:");
    log_indented!("solbright offset DEL:U2720Q:ABC123 -10");
    log_end!();
}

fn display_brightness_help() {
    log_version!();
    log_block_start!("brightness - Set brightness by hand");
    log_block_start!("Usage: solbright brightness <0-100> [--monitor ID] [--preview]");
    log_block_start!("Options:");
    log_indented!("--monitor ID   Only this monitor (default: all)");
    log_indented!("--preview      Throttled write, as sent while dragging a slider");
    log_block_start!("Notes:");
    log_indented!("The next scheduled tick returns to the sun curve while auto is on.");
    log_end!();
}

fn display_settings_help() {
    log_version!();
    log_block_start!("Settings commands");
    log_block_start!("Usage:");
    log_indented!("solbright auto on|off              Follow the sun");
    log_indented!("solbright scaling on|off           Five-phase curve instead of the simple ramp");
    log_indented!("solbright range <MIN> <MAX>        Curve brightness range");
    log_indented!("solbright fullscreen on|off|<N>    Fullscreen override");
    log_indented!("solbright location <LAT> <LON>     Set coordinates");
    log_indented!("solbright location --name <CITY>   Look up a city (\"Oslo, NO\")");
    log_block_start!("Notes:");
    log_indented!("Changes are saved to the configuration file and applied at once.");
    log_end!();
}

fn display_help_help() {
    log_version!();
    log_block_start!("help - Display help information");
    log_block_start!("Usage: solbright help [COMMAND]");
    log_block_start!("Examples:");
    log_indented!("solbright help");
    log_indented!("solbright help offset");
    log_end!();
}
