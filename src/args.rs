//! Command-line argument parsing and processing.
//!
//! This module turns the command line into a [`CliAction`]. Running without a
//! subcommand (or with `run`) starts the daemon; every other subcommand is a
//! client of a running daemon and maps onto one IPC [`Request`].
//!
//! Feature codes are hexadecimal like in `ddcutil`, with or without a `0x`
//! prefix (`10` and `0x10` both mean brightness).

use crate::ipc::Request;

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon with these settings
    Run {
        debug_enabled: bool,
        config_dir: Option<String>,
        log_file: Option<String>,
    },
    /// Show the daemon state, optionally streaming events
    Status { json: bool, follow: bool },
    /// Send one request to the daemon and print the reply
    Send { request: Request, json: bool },
    /// Save a monitor's settings as JSON, to a file or stdout
    Export {
        monitor: String,
        file: Option<String>,
    },
    /// Restore a monitor's settings from a JSON file
    Import {
        monitor: String,
        file: String,
        json: bool,
    },
    /// Restart the systemd user service
    Restart,
    /// Detailed help for a command
    Help { command: Option<String> },

    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to unknown arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
#[derive(Debug)]
pub struct ParsedArgs {
    pub action: CliAction,
}

/// Global flags that may appear anywhere on the line.
#[derive(Default)]
struct Flags {
    debug_enabled: bool,
    json: bool,
    follow: bool,
    preview: bool,
    help: bool,
    version: bool,
    config_dir: Option<String>,
    log_file: Option<String>,
    monitor: Option<String>,
    name: Option<String>,
}

impl ParsedArgs {
    /// Parse command-line arguments into a structured result.
    ///
    /// # Arguments
    /// * `args` - Iterator over command-line arguments (typically from std::env::args())
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut flags = Flags::default();
        let mut positionals: Vec<String> = Vec::new();

        let mut iter = args_vec.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--debug" | "-d" => flags.debug_enabled = true,
                "--json" | "-j" => flags.json = true,
                "--follow" | "-f" => flags.follow = true,
                "--preview" | "-p" => flags.preview = true,
                "--help" | "-h" => flags.help = true,
                "--version" | "-V" | "-v" => flags.version = true,
                "--config" | "-c" | "--log" | "-l" | "--monitor" | "-m" | "--name" | "-n" => {
                    let Some(value) = iter.next() else {
                        log_error!("Missing value for {arg}");
                        return Self::error();
                    };
                    let slot = match arg.as_str() {
                        "--config" | "-c" => &mut flags.config_dir,
                        "--log" | "-l" => &mut flags.log_file,
                        "--monitor" | "-m" => &mut flags.monitor,
                        _ => &mut flags.name,
                    };
                    *slot = Some(value);
                }
                // Negative numbers are values, not flags
                _ if arg.starts_with('-') && arg.parse::<f64>().is_err() => {
                    log_warning!("Unknown option: {arg}");
                    return Self::error();
                }
                _ => positionals.push(arg),
            }
        }

        if flags.version {
            return ParsedArgs {
                action: CliAction::ShowVersion,
            };
        }
        if flags.help {
            return ParsedArgs {
                action: match positionals.first() {
                    Some(command) => CliAction::Help {
                        command: Some(command.clone()),
                    },
                    None => CliAction::ShowHelp,
                },
            };
        }

        let action = match positionals.split_first() {
            None => Some(run_action(&mut flags)),
            Some((command, rest)) => parse_command(command, rest, &mut flags),
        };

        ParsedArgs {
            action: action.unwrap_or(CliAction::ShowHelpDueToError),
        }
    }

    /// Parse the arguments of the current process.
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }

    fn error() -> ParsedArgs {
        ParsedArgs {
            action: CliAction::ShowHelpDueToError,
        }
    }
}

fn run_action(flags: &mut Flags) -> CliAction {
    CliAction::Run {
        debug_enabled: flags.debug_enabled,
        config_dir: flags.config_dir.take(),
        log_file: flags.log_file.take(),
    }
}

fn parse_command(command: &str, rest: &[String], flags: &mut Flags) -> Option<CliAction> {
    let json = flags.json;
    let send = |request: Request| Some(CliAction::Send { request, json });

    let args: Vec<&str> = rest.iter().map(String::as_str).collect();
    let result = match (command, args.as_slice()) {
        ("run", []) => Some(run_action(flags)),
        ("status" | "s", []) => Some(CliAction::Status {
            json,
            follow: flags.follow,
        }),
        ("monitors" | "m", []) => send(Request::ListMonitors),
        ("refresh", []) => send(Request::RefreshMonitors),
        ("caps", [monitor]) => send(Request::DetectCapabilities {
            monitor: monitor.to_string(),
        }),
        ("get" | "g", [monitor, code]) => send(Request::GetFeature {
            monitor: monitor.to_string(),
            code: parse_vcp_code(code)?,
        }),
        ("set", [monitor, code, value]) => send(Request::SetFeature {
            monitor: monitor.to_string(),
            code: parse_vcp_code(code)?,
            value: parse_number(value)?,
        }),
        ("offset" | "o", [monitor]) => send(Request::GetOffset {
            monitor: monitor.to_string(),
        }),
        ("offset" | "o", [monitor, offset]) => send(Request::SetOffset {
            monitor: monitor.to_string(),
            offset: parse_number(offset)?,
        }),
        ("export", [monitor]) => Some(CliAction::Export {
            monitor: monitor.to_string(),
            file: None,
        }),
        ("export", [monitor, file]) => Some(CliAction::Export {
            monitor: monitor.to_string(),
            file: Some(file.to_string()),
        }),
        ("import", [monitor, file]) => Some(CliAction::Import {
            monitor: monitor.to_string(),
            file: file.to_string(),
            json,
        }),
        ("brightness" | "b", [value]) => {
            let value = parse_number(value)?;
            let monitor = flags.monitor.take();
            if flags.preview {
                send(Request::PreviewBrightness { value, monitor })
            } else {
                send(Request::CommitBrightness { value, monitor })
            }
        }
        ("auto" | "a", [state]) => send(Request::SetAutoBrightness {
            enabled: parse_switch(state)?,
        }),
        ("scaling", [state]) => send(Request::SetElevationScaling {
            enabled: parse_switch(state)?,
        }),
        ("range" | "r", [min, max]) => send(Request::SetBrightnessRange {
            min: parse_number(min)?,
            max: parse_number(max)?,
        }),
        ("fullscreen" | "f", [setting]) => match parse_switch(setting) {
            Some(enabled) => send(Request::SetFullscreen {
                enabled: Some(enabled),
                brightness: None,
            }),
            None => send(Request::SetFullscreen {
                enabled: None,
                brightness: Some(parse_number(setting)?),
            }),
        },
        ("location" | "l", []) => match flags.name.take() {
            Some(name) => send(Request::LookupLocation { name }),
            None => None,
        },
        ("location" | "l", [latitude, longitude]) => send(Request::SetLocation {
            latitude: latitude.parse().ok()?,
            longitude: longitude.parse().ok()?,
        }),
        ("restart", []) => Some(CliAction::Restart),
        ("help" | "h", []) => Some(CliAction::Help { command: None }),
        ("help" | "h", [command]) => Some(CliAction::Help {
            command: Some(command.to_string()),
        }),
        _ => None,
    };

    if result.is_none() {
        log_error!("Invalid arguments for '{command}'");
    }
    result
}

/// Parse a VCP code written in hex, with or without `0x`.
pub fn parse_vcp_code(text: &str) -> Option<u8> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u8::from_str_radix(digits, 16).ok()
}

fn parse_number(text: &str) -> Option<i64> {
    text.parse().ok()
}

fn parse_switch(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "enable" => Some(true),
        "off" | "false" | "no" | "disable" => Some(false),
        _ => None,
    }
}

/// Display version information.
pub fn display_version_info() {
    log_version!();
    log_pipe!();
    log_info!("{}", env!("CARGO_PKG_DESCRIPTION"));
    log_end!();
}

/// Display general usage.
pub fn display_help() {
    log_version!();
    log_block_start!("Usage: solbright [OPTIONS] [COMMAND]");
    log_block_start!("Options:");
    log_indented!("-c, --config <DIR>      Use a custom configuration directory");
    log_indented!("-d, --debug             Enable detailed debug output");
    log_indented!("-l, --log <FILE>        Also write the log to FILE");
    log_indented!("-j, --json              Print replies as JSON");
    log_indented!("-h, --help              Print help information");
    log_indented!("-V, --version           Print version information");
    log_block_start!("Commands:");
    log_indented!("run                     Start the daemon (default)");
    log_indented!("status [--follow]       Show the daemon state");
    log_indented!("monitors                List monitors");
    log_indented!("refresh                 Re-scan the DDC/CI bus");
    log_indented!("caps <MONITOR>          Re-read a monitor's capabilities");
    log_indented!("get <MONITOR> <CODE>    Read a VCP feature");
    log_indented!("set <MONITOR> <CODE> <VALUE>");
    log_indented!("                        Write a VCP feature");
    log_indented!("export <MONITOR> [FILE] Save a monitor's settings as JSON");
    log_indented!("import <MONITOR> <FILE> Restore saved settings");
    log_indented!("offset <MONITOR> [N]    Show or set a calibration offset");
    log_indented!("brightness <N>          Set brightness now (--monitor ID, --preview)");
    log_indented!("auto on|off             Follow the sun");
    log_indented!("scaling on|off          Use the elevation-scaled curve");
    log_indented!("range <MIN> <MAX>       Brightness range of the curve");
    log_indented!("fullscreen on|off|<N>   Fullscreen override");
    log_indented!("location <LAT> <LON>    Set coordinates (or --name CITY)");
    log_indented!("restart                 Restart the systemd user service");
    log_indented!("help [COMMAND]          Show help for a command");
    log_end!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliAction {
        let mut full = vec!["solbright"];
        full.extend_from_slice(args);
        ParsedArgs::parse(full).action
    }

    #[test]
    fn test_no_arguments_runs_daemon() {
        assert_eq!(
            parse(&[]),
            CliAction::Run {
                debug_enabled: false,
                config_dir: None,
                log_file: None
            }
        );
    }

    #[test]
    fn test_run_flags() {
        assert_eq!(
            parse(&["--debug", "--config", "/tmp/sb", "run", "--log", "/tmp/sb.log"]),
            CliAction::Run {
                debug_enabled: true,
                config_dir: Some("/tmp/sb".into()),
                log_file: Some("/tmp/sb.log".into())
            }
        );
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse(&["--help"]), CliAction::ShowHelp);
        assert_eq!(parse(&["-V"]), CliAction::ShowVersion);
        assert_eq!(
            parse(&["offset", "--help"]),
            CliAction::Help {
                command: Some("offset".into())
            }
        );
        assert_eq!(parse(&["--bogus"]), CliAction::ShowHelpDueToError);
        assert_eq!(parse(&["frobnicate"]), CliAction::ShowHelpDueToError);
    }

    #[test]
    fn test_feature_commands() {
        assert_eq!(
            parse(&["get", "i2c-6", "0x10"]),
            CliAction::Send {
                request: Request::GetFeature {
                    monitor: "i2c-6".into(),
                    code: 0x10
                },
                json: false
            }
        );
        assert_eq!(
            parse(&["set", "i2c-6", "60", "15", "--json"]),
            CliAction::Send {
                request: Request::SetFeature {
                    monitor: "i2c-6".into(),
                    code: 0x60,
                    value: 15
                },
                json: true
            }
        );
        assert_eq!(parse(&["get", "i2c-6", "zz"]), CliAction::ShowHelpDueToError);
    }

    #[test]
    fn test_export_and_import() {
        assert_eq!(
            parse(&["export", "i2c-6"]),
            CliAction::Export {
                monitor: "i2c-6".into(),
                file: None
            }
        );
        assert_eq!(
            parse(&["export", "i2c-6", "desk.json"]),
            CliAction::Export {
                monitor: "i2c-6".into(),
                file: Some("desk.json".into())
            }
        );
        assert_eq!(
            parse(&["import", "i2c-7", "desk.json", "--json"]),
            CliAction::Import {
                monitor: "i2c-7".into(),
                file: "desk.json".into(),
                json: true
            }
        );
        assert_eq!(parse(&["import", "i2c-7"]), CliAction::ShowHelpDueToError);
    }

    #[test]
    fn test_negative_offset() {
        assert_eq!(
            parse(&["offset", "i2c-6", "-10"]),
            CliAction::Send {
                request: Request::SetOffset {
                    monitor: "i2c-6".into(),
                    offset: -10
                },
                json: false
            }
        );
    }

    #[test]
    fn test_brightness_preview_and_commit() {
        assert_eq!(
            parse(&["brightness", "40", "--preview", "--monitor", "i2c-6"]),
            CliAction::Send {
                request: Request::PreviewBrightness {
                    value: 40,
                    monitor: Some("i2c-6".into())
                },
                json: false
            }
        );
        assert_eq!(
            parse(&["b", "40"]),
            CliAction::Send {
                request: Request::CommitBrightness {
                    value: 40,
                    monitor: None
                },
                json: false
            }
        );
    }

    #[test]
    fn test_settings_commands() {
        assert_eq!(
            parse(&["fullscreen", "off"]),
            CliAction::Send {
                request: Request::SetFullscreen {
                    enabled: Some(false),
                    brightness: None
                },
                json: false
            }
        );
        assert_eq!(
            parse(&["fullscreen", "80"]),
            CliAction::Send {
                request: Request::SetFullscreen {
                    enabled: None,
                    brightness: Some(80)
                },
                json: false
            }
        );
        assert_eq!(
            parse(&["location", "-33.87", "151.21"]),
            CliAction::Send {
                request: Request::SetLocation {
                    latitude: -33.87,
                    longitude: 151.21
                },
                json: false
            }
        );
        assert_eq!(
            parse(&["location", "--name", "Oslo"]),
            CliAction::Send {
                request: Request::LookupLocation {
                    name: "Oslo".into()
                },
                json: false
            }
        );
        assert_eq!(parse(&["auto", "maybe"]), CliAction::ShowHelpDueToError);
    }

    #[test]
    fn test_status_flags() {
        assert_eq!(
            parse(&["status", "--json", "--follow"]),
            CliAction::Status {
                json: true,
                follow: true
            }
        );
    }

    #[test]
    fn test_parse_vcp_code() {
        assert_eq!(parse_vcp_code("10"), Some(0x10));
        assert_eq!(parse_vcp_code("0xD6"), Some(0xD6));
        assert_eq!(parse_vcp_code("100"), None);
    }
}
