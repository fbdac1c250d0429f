//! Structured logging system with visual formatting.
//!
//! solbright prints its progress as a single vertical "pipe" of box-drawing
//! characters so that a long-running daemon's output stays readable in a
//! terminal or in the journal. The module also supports:
//!
//! - runtime enable/disable for quiet CLI commands and tests
//! - an optional `[HH:MM:SS]` prefix for long-running service output
//! - routing every line to a file through a dedicated writer thread
//!
//! ## Logging Conventions
//!
//! - **`log_block_start!`** opens a new conceptual block (`┃` spacer, then `┣ message`).
//! - **`log_decorated!`** continues a block (`┣ message`).
//! - **`log_indented!`** nests details under the previous line (`┃   message`).
//! - **`log_pipe!`** inserts a bare `┃` before a semantic message that starts a block.
//! - **`log_version!`** / **`log_end!`** open and close the whole pipe.
//! - **`log_info!`**, **`log_warning!`**, **`log_error!`**, **`log_debug!`**,
//!   **`log_critical!`** carry a colored `[LEVEL]` tag.
//! - **`log_error_exit!`** terminates the pipe with an error corner.

use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, channel};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

static TIMESTAMPS_ENABLED: AtomicBool = AtomicBool::new(false);

// Channel for routing output to file when --log is active
static LOG_CHANNEL: OnceLock<Option<Sender<LogMessage>>> = OnceLock::new();

enum LogMessage {
    Formatted(String),
    Shutdown,
}

/// Visual style of a single log line.
#[doc(hidden)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Decorated,
    Indented,
    BlockStart,
    Info,
    Warning,
    Error,
    Debug,
    Critical,
    ErrorExit,
}

/// Main logging interface.
pub struct Log;

impl Log {
    /// Enable or disable logging.
    ///
    /// CLI subcommands that print machine-readable output disable the pipe
    /// so that only their own output reaches stdout.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    /// Check if logging is currently enabled.
    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Prefix every line with the local wall-clock time.
    pub fn set_timestamps(enabled: bool) {
        TIMESTAMPS_ENABLED.store(enabled, Ordering::SeqCst);
    }

    /// Start file logging to the specified path.
    ///
    /// Output is stripped of ANSI color codes and appended by a background
    /// thread. Dropping the returned guard flushes and closes the file.
    pub fn start_file_logging(file_path: String) -> anyhow::Result<LoggerGuard> {
        let (tx, rx) = channel();

        LOG_CHANNEL
            .set(Some(tx.clone()))
            .map_err(|_| anyhow::anyhow!("Logger channel already initialized"))?;

        let handle = std::thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                let mut file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&file_path)?;

                loop {
                    match rx.recv() {
                        Ok(LogMessage::Formatted(text)) => {
                            file.write_all(text.as_bytes())?;
                        }
                        Ok(LogMessage::Shutdown) | Err(_) => {
                            file.flush()?;
                            break;
                        }
                    }
                }

                Ok::<(), anyhow::Error>(())
            })?;

        Ok(LoggerGuard {
            tx,
            handle: Some(handle),
        })
    }

    /// Timestamp prefix for the current line, empty unless enabled.
    pub fn get_timestamp_prefix() -> String {
        if TIMESTAMPS_ENABLED.load(Ordering::SeqCst) {
            format!("[{}] ", chrono::Local::now().format("%H:%M:%S"))
        } else {
            String::new()
        }
    }
}

/// Guard for file logging that ensures clean shutdown.
pub struct LoggerGuard {
    tx: Sender<LogMessage>,
    handle: Option<std::thread::JoinHandle<anyhow::Result<()>>>,
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(LogMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == 'm' {
                    break;
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Render one line in the given style, including the timestamp prefix.
#[doc(hidden)]
pub fn format_line(style: Style, message: &str) -> String {
    let p = Log::get_timestamp_prefix();
    match style {
        Style::Decorated => format!("{p}┣ {message}\n"),
        Style::Indented => format!("{p}┃   {message}\n"),
        Style::BlockStart => format!("{p}┃\n{p}┣ {message}\n"),
        Style::Info => format!("{p}┣[\x1b[32mINFO\x1b[0m] {message}\n"),
        Style::Warning => format!("{p}┣[\x1b[33mWARNING\x1b[0m] {message}\n"),
        Style::Error => format!("{p}┣[\x1b[31mERROR\x1b[0m] {message}\n"),
        Style::Debug => format!("{p}┣[\x1b[32mDEBUG\x1b[0m] {message}\n"),
        Style::Critical => format!("{p}┣[\x1b[31mCRITICAL\x1b[0m] {message}\n"),
        Style::ErrorExit => format!("{p}┃\n{p}┗[\x1b[31mERROR\x1b[0m] {message}\n"),
    }
}

#[doc(hidden)]
pub fn emit(style: Style, message: &str) {
    write_output(&format_line(style, message));
}

// Public function that routes output (needed by macros)
pub fn write_output(text: &str) {
    if let Some(Some(tx)) = LOG_CHANNEL.get() {
        let _ = tx.send(LogMessage::Formatted(strip_ansi_codes(text)));
    } else {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }
}

// # Logging Macros

/// Shared body of the message macros: accepts a format string with arguments
/// or any single `Display` expression.
#[doc(hidden)]
#[macro_export]
macro_rules! __log_line {
    ($style:expr, $fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::is_enabled() {
            $crate::logger::emit($style, &format!($fmt $($arg)*));
        }
    }};
    ($style:expr, $expr:expr) => {{
        if $crate::logger::Log::is_enabled() {
            $crate::logger::emit($style, &format!("{}", $expr));
        }
    }};
}

/// Log a decorated message, typically as part of an existing block.
#[macro_export]
macro_rules! log_decorated {
    ($($arg:tt)+) => { $crate::__log_line!($crate::logger::Style::Decorated, $($arg)+) };
}

/// Log an indented message for sub-items or details within a block.
#[macro_export]
macro_rules! log_indented {
    ($($arg:tt)+) => { $crate::__log_line!($crate::logger::Style::Indented, $($arg)+) };
}

/// Log a block start message, initiating a new conceptual block of information.
#[macro_export]
macro_rules! log_block_start {
    ($($arg:tt)+) => { $crate::__log_line!($crate::logger::Style::BlockStart, $($arg)+) };
}

/// Log an informational message with a green `[INFO]` tag.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => { $crate::__log_line!($crate::logger::Style::Info, $($arg)+) };
}

/// Log a warning message with a yellow `[WARNING]` tag.
#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)+) => { $crate::__log_line!($crate::logger::Style::Warning, $($arg)+) };
}

/// Log an error message with a red `[ERROR]` tag.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::__log_line!($crate::logger::Style::Error, $($arg)+) };
}

/// Log a debug/operational message.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => { $crate::__log_line!($crate::logger::Style::Debug, $($arg)+) };
}

/// Log a critical message with a red `[CRITICAL]` tag.
#[macro_export]
macro_rules! log_critical {
    ($($arg:tt)+) => { $crate::__log_line!($crate::logger::Style::Critical, $($arg)+) };
}

/// Log an error that terminates the pipe.
#[macro_export]
macro_rules! log_error_exit {
    ($($arg:tt)+) => { $crate::__log_line!($crate::logger::Style::ErrorExit, $($arg)+) };
}

/// Log a visual pipe separator for vertical spacing.
#[macro_export]
macro_rules! log_pipe {
    () => {{
        if $crate::logger::Log::is_enabled() {
            let prefix = $crate::logger::Log::get_timestamp_prefix();
            $crate::logger::write_output(&format!("{prefix}┃\n"));
        }
    }};
}

/// Log the application version header.
#[macro_export]
macro_rules! log_version {
    () => {{
        if $crate::logger::Log::is_enabled() {
            let prefix = $crate::logger::Log::get_timestamp_prefix();
            let version = env!("CARGO_PKG_VERSION");
            $crate::logger::write_output(&format!("{prefix}┏ solbright v{version} ━━╸\n"));
        }
    }};
}

/// Log the final termination marker.
#[macro_export]
macro_rules! log_end {
    () => {{
        if $crate::logger::Log::is_enabled() {
            let prefix = $crate::logger::Log::get_timestamp_prefix();
            $crate::logger::write_output(&format!("{prefix}╹\n"));
        }
    }};
}
