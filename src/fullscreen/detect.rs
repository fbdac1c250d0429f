//! Fullscreen detection backends.
//!
//! - **Hyprland**: asks the compositor for the active window over its IPC
//!   socket (`j/activewindow`) and reads the `fullscreen` field
//! - **X11**: reads `_NET_ACTIVE_WINDOW` from the root window and checks the
//!   active window's `_NET_WM_STATE` for `_NET_WM_STATE_FULLSCREEN`, via `xprop`
//!
//! Auto-detection priority: Hyprland → X11 → none.

use anyhow::{Context, Result};
use regex::Regex;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use crate::common::utils::run_with_timeout;
use crate::config::DetectorKind;

const DETECTOR_TIMEOUT: Duration = Duration::from_millis(1000);

static ACTIVE_WINDOW_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"window id # (0x[0-9a-fA-F]+)").ok());

/// Source of "is the focused window fullscreen".
pub trait FullscreenDetector: Send {
    fn is_fullscreen(&mut self) -> Result<bool>;

    fn name(&self) -> &'static str;
}

/// Pick a detector for the configured kind.
///
/// Returns `None` when nothing usable is available; the override then stays
/// inactive.
pub fn create_detector(kind: DetectorKind) -> Option<Box<dyn FullscreenDetector>> {
    match kind {
        DetectorKind::Hyprland => Some(Box::new(HyprlandDetector::from_env())),
        DetectorKind::X11 => Some(Box::new(X11Detector)),
        DetectorKind::None => None,
        DetectorKind::Auto => {
            if std::env::var("HYPRLAND_INSTANCE_SIGNATURE").is_ok() {
                Some(Box::new(HyprlandDetector::from_env()))
            } else if std::env::var("DISPLAY").is_ok() {
                Some(Box::new(X11Detector))
            } else {
                log_warning!("No fullscreen detector available (neither Hyprland nor X11 found)");
                log_indented!("Fullscreen brightness override stays inactive");
                None
            }
        }
    }
}

pub struct HyprlandDetector {
    socket_path: PathBuf,
}

impl HyprlandDetector {
    /// Socket path: `{runtime_dir}/hypr/{instance}/.socket.sock`, with the
    /// runtime dir falling back to `/run/user/{uid}`.
    pub fn from_env() -> Self {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .unwrap_or_else(|_| format!("/run/user/{}", nix::unistd::getuid()));
        let instance = std::env::var("HYPRLAND_INSTANCE_SIGNATURE").unwrap_or_default();
        Self::new(PathBuf::from(format!("{runtime_dir}/hypr/{instance}/.socket.sock")))
    }

    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }
}

impl FullscreenDetector for HyprlandDetector {
    fn is_fullscreen(&mut self) -> Result<bool> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .with_context(|| format!("Failed to connect to socket at {:?}", self.socket_path))?;
        stream.set_read_timeout(Some(DETECTOR_TIMEOUT)).ok();
        stream.set_write_timeout(Some(DETECTOR_TIMEOUT)).ok();

        stream
            .write_all(b"j/activewindow")
            .context("Failed to write command to socket")?;

        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .context("Failed to read active window")?;
        parse_hyprland_active_window(&response)
    }

    fn name(&self) -> &'static str {
        "hyprland"
    }
}

/// Interpret Hyprland's active-window JSON.
///
/// Older releases report `fullscreen` as a bool, newer ones as a mode number
/// where 0 means windowed. An empty object means no focused window.
pub fn parse_hyprland_active_window(response: &str) -> Result<bool> {
    let value: serde_json::Value =
        serde_json::from_str(response.trim()).context("Invalid active window JSON")?;
    Ok(match value.get("fullscreen") {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_i64().is_some_and(|mode| mode > 0),
        _ => false,
    })
}

pub struct X11Detector;

impl X11Detector {
    fn xprop(args: &[&str]) -> Result<String> {
        let output = run_with_timeout(Command::new("xprop").args(args), DETECTOR_TIMEOUT)?;
        if !output.status.success() {
            anyhow::bail!(
                "xprop {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl FullscreenDetector for X11Detector {
    fn is_fullscreen(&mut self) -> Result<bool> {
        let root = Self::xprop(&["-root", "_NET_ACTIVE_WINDOW"])?;
        let Some(window) = parse_active_window_id(&root) else {
            return Ok(false);
        };
        let state = Self::xprop(&["-id", &window, "_NET_WM_STATE"])?;
        Ok(state.contains("_NET_WM_STATE_FULLSCREEN"))
    }

    fn name(&self) -> &'static str {
        "x11"
    }
}

/// Extract the active window id; `None` when no window is focused.
pub fn parse_active_window_id(output: &str) -> Option<String> {
    let caps = ACTIVE_WINDOW_ID.as_ref()?.captures(output)?;
    let id = caps.get(1)?.as_str();
    let numeric = u64::from_str_radix(id.trim_start_matches("0x"), 16).ok()?;
    (numeric != 0).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_parse_hyprland_bool_and_mode() {
        assert!(parse_hyprland_active_window(r#"{"class":"mpv","fullscreen":true}"#).unwrap());
        assert!(!parse_hyprland_active_window(r#"{"fullscreen":false}"#).unwrap());
        assert!(parse_hyprland_active_window(r#"{"fullscreen":2}"#).unwrap());
        assert!(!parse_hyprland_active_window(r#"{"fullscreen":0}"#).unwrap());
        assert!(!parse_hyprland_active_window("{}").unwrap());
        assert!(parse_hyprland_active_window("not json").is_err());
    }

    #[test]
    fn test_parse_active_window_id() {
        assert_eq!(
            parse_active_window_id("_NET_ACTIVE_WINDOW(WINDOW): window id # 0x3a00007"),
            Some("0x3a00007".to_string())
        );
        assert_eq!(
            parse_active_window_id("_NET_ACTIVE_WINDOW(WINDOW): window id # 0x0"),
            None
        );
        assert_eq!(parse_active_window_id("_NET_ACTIVE_WINDOW:  not found."), None);
    }

    #[test]
    fn test_hyprland_detector_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".socket.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"j/activewindow");
            stream.write_all(br#"{"fullscreen": 1}"#).unwrap();
        });

        let mut detector = HyprlandDetector::new(path);
        assert!(detector.is_fullscreen().unwrap());
        server.join().unwrap();
    }

    #[test]
    #[serial]
    fn test_auto_selection_without_display() {
        let saved: Vec<_> = ["HYPRLAND_INSTANCE_SIGNATURE", "DISPLAY"]
            .iter()
            .map(|k| (*k, std::env::var(k).ok()))
            .collect();
        unsafe {
            std::env::remove_var("HYPRLAND_INSTANCE_SIGNATURE");
            std::env::remove_var("DISPLAY");
        }

        assert!(create_detector(DetectorKind::Auto).is_none());
        unsafe {
            std::env::set_var("DISPLAY", ":0");
        }
        assert_eq!(create_detector(DetectorKind::Auto).unwrap().name(), "x11");
        unsafe {
            std::env::set_var("HYPRLAND_INSTANCE_SIGNATURE", "abc");
        }
        assert_eq!(create_detector(DetectorKind::Auto).unwrap().name(), "hyprland");
        assert!(create_detector(DetectorKind::None).is_none());

        unsafe {
            for (key, value) in saved {
                match value {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
