//! Main application entry point.
//!
//! Parses the command line and dispatches to the daemon runner or to one of
//! the client commands. The application itself lives in the library crate:
//!
//! - `args`: Command-line argument parsing and help/version display
//! - `Solbright`: Daemon lifecycle (config, lock, signals, Core)
//! - `commands`: One-shot client commands talking to the daemon over IPC

use anyhow::Result;
use solbright::args::{self, CliAction, ParsedArgs};
use solbright::common::constants::EXIT_FAILURE;
use solbright::logger::Log;
use solbright::{Solbright, commands, config, log_error_exit};

fn main() -> Result<()> {
    let parsed_args = ParsedArgs::from_env();

    let result = match parsed_args.action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp | CliAction::ShowHelpDueToError => {
            args::display_help();
            Ok(())
        }
        CliAction::Help { command } => commands::help::run_help_command(command.as_deref()),
        CliAction::Run {
            debug_enabled,
            config_dir,
            log_file,
        } => run_daemon(debug_enabled, config_dir, log_file),
        CliAction::Status { json, follow } => {
            commands::status::handle_status_command(json, follow)
        }
        CliAction::Send { request, json } => commands::handle_send_command(request, json),
        CliAction::Export { monitor, file } => {
            commands::monitors::handle_export_command(&monitor, file.as_deref())
        }
        CliAction::Import {
            monitor,
            file,
            json,
        } => commands::monitors::handle_import_command(&monitor, &file, json),
        CliAction::Restart => commands::restart::handle_restart_command(false),
    };

    if let Err(e) = result {
        log_error_exit!("{e:#}");
        std::process::exit(EXIT_FAILURE);
    }
    Ok(())
}

fn run_daemon(
    debug_enabled: bool,
    config_dir: Option<String>,
    log_file: Option<String>,
) -> Result<()> {
    config::set_config_dir(config_dir)?;

    // Keep the guard alive until the daemon exits so the file gets flushed
    let _log_guard = match log_file {
        Some(path) => {
            Log::set_timestamps(true);
            Some(Log::start_file_logging(path)?)
        }
        None => None,
    };

    Solbright::new(debug_enabled).run()
}
