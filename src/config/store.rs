//! Observable, persistent configuration state.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Mutex, RwLock};

use super::Config;
use super::builder::write_config;
use super::validation::validate_config;
use crate::common::utils::private_path;

/// A committed configuration change.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    pub previous: Config,
    pub current: Config,
}

impl ConfigChange {
    pub fn changed<T: PartialEq>(&self, field: impl Fn(&Config) -> T) -> bool {
        field(&self.previous) != field(&self.current)
    }
}

/// Owner of the live configuration.
///
/// Readers get a clone of the current value. Writers go through
/// [`update`](Self::update), which validates the candidate, saves it to disk
/// and only then publishes it; an invalid candidate leaves the store
/// untouched. Every committed change is sent to all subscribers.
pub struct ConfigStore {
    config: RwLock<Config>,
    path: Option<PathBuf>,
    subscribers: Mutex<Vec<Sender<ConfigChange>>>,
}

impl ConfigStore {
    pub fn new(config: Config, path: Option<PathBuf>) -> Self {
        Self {
            config: RwLock::new(config),
            path,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// A store that never touches the filesystem.
    pub fn in_memory(config: Config) -> Self {
        Self::new(config, None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Apply `change` to a copy of the config and commit it if valid.
    ///
    /// Returns the committed config. A failure to save is logged and the
    /// change still takes effect in memory.
    pub fn update<F>(&self, change: F) -> Result<Config>
    where
        F: FnOnce(&mut Config),
    {
        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        let mut candidate = guard.clone();
        change(&mut candidate);

        if candidate == *guard {
            return Ok(candidate);
        }
        validate_config(&candidate)?;

        if let Some(path) = &self.path
            && let Err(e) = write_config(path, &candidate)
        {
            log_warning!("Failed to save configuration to {}: {e:#}", private_path(path));
        }

        let previous = std::mem::replace(&mut *guard, candidate.clone());
        drop(guard);

        self.notify(ConfigChange {
            previous,
            current: candidate.clone(),
        });
        Ok(candidate)
    }

    /// Install a config read from disk without saving it back.
    ///
    /// Returns `false` when it equals the current config, which is the case
    /// for the reload triggered by our own save.
    pub fn replace(&self, config: Config) -> Result<bool> {
        validate_config(&config)?;

        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        if *guard == config {
            return Ok(false);
        }
        let previous = std::mem::replace(&mut *guard, config.clone());
        drop(guard);

        self.notify(ConfigChange {
            previous,
            current: config,
        });
        Ok(true)
    }

    pub fn subscribe(&self) -> Receiver<ConfigChange> {
        let (tx, rx) = channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    fn notify(&self, change: ConfigChange) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        // Drop subscribers whose receiver is gone
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::control_error;

    #[test]
    fn test_update_notifies_subscribers() {
        let store = ConfigStore::in_memory(Config::default());
        let rx = store.subscribe();

        store.update(|c| c.min_brightness = 25).unwrap();

        let change = rx.try_recv().unwrap();
        assert_eq!(change.previous.min_brightness, 10);
        assert_eq!(change.current.min_brightness, 25);
        assert!(change.changed(|c| c.min_brightness));
        assert!(!change.changed(|c| c.max_brightness));
    }

    #[test]
    fn test_invalid_update_keeps_previous() {
        let store = ConfigStore::in_memory(Config::default());
        let rx = store.subscribe();

        let err = store
            .update(|c| {
                c.min_brightness = 80;
                c.max_brightness = 40;
            })
            .unwrap_err();
        assert_eq!(control_error(&err).unwrap().kind(), "invalid_input");
        assert_eq!(store.get(), Config::default());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_noop_update_is_silent() {
        let store = ConfigStore::in_memory(Config::default());
        let rx = store.subscribe();
        store.update(|_| {}).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_replace_identical_is_noop() {
        let store = ConfigStore::in_memory(Config::default());
        assert!(!store.replace(Config::default()).unwrap());

        let changed = Config {
            auto_brightness_enabled: false,
            ..Config::default()
        };
        assert!(store.replace(changed).unwrap());
        assert!(!store.get().auto_brightness_enabled);
    }

    #[test]
    fn test_update_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solbright.toml");
        let store = ConfigStore::new(Config::default(), Some(path.clone()));

        store
            .update(|c| {
                c.monitor_offsets.insert("DEL:U2720Q:1".into(), -7);
            })
            .unwrap();

        let reloaded = crate::config::load_from_path(&path).unwrap();
        assert_eq!(reloaded, store.get());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let store = ConfigStore::in_memory(Config::default());
        drop(store.subscribe());
        store.update(|c| c.max_brightness = 90).unwrap();
        assert!(store.subscribers.lock().unwrap().is_empty());
    }
}
