//! File watching module for hot config reloading.
//!
//! Watches the directory holding the config file (more reliable than watching
//! the file itself, since editors and our own atomic saves replace the file)
//! and sends [`SignalMessage::Reload`] once changes have been quiet for the
//! debounce window.

use anyhow::{Context, Result};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::common::constants::{CONFIG_FILE_NAME, CONFIG_WATCH_DEBOUNCE_MS};
use crate::common::utils::private_path;
use crate::io::signals::SignalMessage;

pub struct ConfigWatcher {
    signal_sender: Sender<SignalMessage>,
    debug_enabled: bool,
    config_path: PathBuf,
    debounce: Duration,
}

impl ConfigWatcher {
    pub fn new(config_path: PathBuf, signal_sender: Sender<SignalMessage>, debug_enabled: bool) -> Self {
        Self {
            signal_sender,
            debug_enabled,
            config_path,
            debounce: Duration::from_millis(CONFIG_WATCH_DEBOUNCE_MS),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. The watcher lives on its own thread until the signal
    /// channel closes.
    pub fn start(self) -> Result<()> {
        let watch_dir = self
            .config_path
            .parent()
            .context("Configuration path has no parent directory")?
            .to_path_buf();

        let (tx, rx) = std::sync::mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res
                    && matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    )
                {
                    let _ = tx.send(event);
                }
            },
            NotifyConfig::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", private_path(&watch_dir)))?;

        if self.debug_enabled {
            log_pipe!();
            log_debug!("Watching {} for changes", private_path(&self.config_path));
        }

        let Self {
            signal_sender,
            debug_enabled,
            config_path,
            debounce,
        } = self;

        thread::Builder::new()
            .name("config-watcher".to_string())
            .spawn(move || {
                // Keep the watcher alive for the thread's lifetime
                let _watcher = watcher;
                let mut pending_since: Option<Instant> = None;

                loop {
                    let timeout = match pending_since {
                        Some(since) => debounce.saturating_sub(since.elapsed()),
                        None => Duration::from_secs(3600),
                    };

                    match rx.recv_timeout(timeout) {
                        Ok(event) => {
                            if event.paths.iter().any(|p| affects_config(p, &config_path)) {
                                // Restart the quiet window on every relevant event
                                pending_since = Some(Instant::now());
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if pending_since.take().is_none() {
                                continue;
                            }
                            if debug_enabled {
                                log_pipe!();
                                log_info!("Configuration file change detected");
                            }
                            if signal_sender.send(SignalMessage::Reload).is_err() {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }

                #[cfg(debug_assertions)]
                eprintln!("DEBUG: Config watcher thread exiting");
            })
            .context("Failed to spawn config watcher thread")?;

        Ok(())
    }
}

/// Whether an event path refers to the config file or an editor's temporary
/// copy of it.
fn affects_config(event_path: &Path, config_path: &Path) -> bool {
    if event_path == config_path {
        return true;
    }
    let watched_name = config_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(CONFIG_FILE_NAME);

    event_path.parent() == config_path.parent()
        && event_path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(watched_name) || name.ends_with(watched_name))
}

pub fn start_config_watcher(
    config_path: PathBuf,
    signal_sender: Sender<SignalMessage>,
    debug_enabled: bool,
) -> Result<()> {
    ConfigWatcher::new(config_path, signal_sender, debug_enabled).start()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affects_config() {
        let config = Path::new("/home/u/.config/solbright/solbright.toml");
        assert!(affects_config(config, config));
        assert!(affects_config(
            Path::new("/home/u/.config/solbright/solbright.toml~"),
            config
        ));
        assert!(affects_config(
            Path::new("/home/u/.config/solbright/.#solbright.toml"),
            config
        ));
        assert!(!affects_config(
            Path::new("/home/u/.config/solbright/other.toml"),
            config
        ));
        assert!(!affects_config(
            Path::new("/tmp/solbright.toml"),
            config
        ));
    }

    #[test]
    fn test_edit_triggers_single_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "min_brightness = 10\n").unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        ConfigWatcher::new(path.clone(), tx, false)
            .with_debounce(Duration::from_millis(150))
            .start()
            .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        std::fs::write(&path, "min_brightness = 20\n").unwrap();
        std::fs::write(&path, "min_brightness = 30\n").unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(first, SignalMessage::Reload));
        // Both writes fall into one debounce window
        assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    }
}
