//! Registry of known monitors.
//!
//! The registry publishes the monitor set as an immutable snapshot behind an
//! `RwLock<Arc<MonitorSet>>`: readers clone the `Arc` and work on a complete,
//! consistent set while a refresh builds the next one off to the side and
//! swaps it in. Refreshes are serialized by their own mutex so two concurrent
//! refreshes cannot interleave their merges.
//!
//! Monitors that stop answering are kept as `stale` rather than dropped, so
//! their features and calibration survive a flaky cable or a monitor that
//! was briefly switched off.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use crate::common::error::ControlError;
use crate::config::ConfigStore;
use crate::config::validation::validate_offset;
use crate::ddc::features::{
    FeatureKind, VCP_BACKLIGHT, VCP_BRIGHTNESS, VCP_POWER_MODE, VCP_RESTORE_COLOR_DEFAULTS,
    known_feature,
};
use crate::ddc::{Feature, HardwareBus, MonitorHandle};

/// A monitor as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub handle: MonitorHandle,
    pub features: BTreeMap<u8, Feature>,
    pub model: Option<String>,
    pub mccs_version: Option<String>,
    /// Calibration added to every automatic or manual brightness value
    pub offset: i32,
    /// Missing from the latest enumeration
    pub stale: bool,
}

impl Monitor {
    fn new(handle: MonitorHandle, offset: i32) -> Self {
        Self {
            handle,
            features: BTreeMap::new(),
            model: None,
            mccs_version: None,
            offset,
            stale: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.handle.id
    }

    /// The feature used for brightness writes.
    ///
    /// Prefers a continuous 0x10, then a continuous 0x13 (legacy backlight).
    /// When capabilities are unknown 0x10 with 0-100 bounds is assumed, which
    /// nearly every DDC/CI monitor supports.
    pub fn brightness_feature(&self) -> Option<Feature> {
        for code in [VCP_BRIGHTNESS, VCP_BACKLIGHT] {
            if let Some(feature) = self.features.get(&code)
                && matches!(feature.kind, FeatureKind::Continuous { .. })
            {
                return Some(feature.clone());
            }
        }
        if self.features.is_empty() {
            return known_feature(VCP_BRIGHTNESS);
        }
        None
    }

    pub fn feature(&self, code: u8) -> Option<&Feature> {
        self.features.get(&code)
    }
}

/// One consistent view of all monitors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSet {
    pub monitors: Vec<Monitor>,
}

impl MonitorSet {
    pub fn get(&self, id: &str) -> Option<&Monitor> {
        self.monitors.iter().find(|m| m.handle.id == id)
    }

    /// Monitors present in the latest enumeration.
    pub fn live(&self) -> impl Iterator<Item = &Monitor> {
        self.monitors.iter().filter(|m| !m.stale)
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}

/// Outcome of a refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub live: usize,
    pub stale: usize,
    pub added: Vec<String>,
    pub lost: Vec<String>,
    /// Monitors whose capability string had entries we had to drop
    pub incomplete: Vec<String>,
}

/// Codes left out of settings snapshots. Replaying them would reset the
/// colour settings or switch the monitor off.
const NOT_SNAPSHOTTED: [u8; 2] = [VCP_RESTORE_COLOR_DEFAULTS, VCP_POWER_MODE];

/// One feature value in a settings snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingValue {
    pub code: u8,
    pub name: String,
    pub value: u16,
}

/// The writable settings of a monitor as read at one point in time.
///
/// Written to disk as JSON by `solbright export` and fed back by
/// `solbright import`, possibly to a different monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Monitor the settings were read from
    pub monitor: String,
    pub settings: Vec<SettingValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingFailure {
    pub code: u8,
    pub reason: String,
}

/// Result of restoring a settings snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    /// Values actually written, after clamping
    pub applied: Vec<SettingValue>,
    /// Codes the target monitor does not support or cannot write
    pub skipped: Vec<u8>,
    pub failures: Vec<SettingFailure>,
}

impl ImportOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct MonitorRegistry {
    bus: HardwareBus,
    store: Arc<ConfigStore>,
    current: RwLock<Arc<MonitorSet>>,
    refresh_lock: Mutex<()>,
}

impl MonitorRegistry {
    pub fn new(bus: HardwareBus, store: Arc<ConfigStore>) -> Self {
        Self {
            bus,
            store,
            current: RwLock::new(Arc::new(MonitorSet::default())),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn bus(&self) -> &HardwareBus {
        &self.bus
    }

    pub fn snapshot(&self) -> Arc<MonitorSet> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn publish(&self, set: MonitorSet) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(set);
    }

    /// Copy-on-write edit of the current snapshot.
    fn modify(&self, edit: impl FnOnce(&mut MonitorSet)) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = (**guard).clone();
        edit(&mut next);
        *guard = Arc::new(next);
    }

    /// Re-enumerate the bus and rebuild the monitor set.
    pub fn refresh(&self) -> RefreshSummary {
        let _refreshing = self.refresh_lock.lock().unwrap_or_else(|e| e.into_inner());

        let previous = self.snapshot();
        let handles = self.bus.enumerate();

        let mut summary = RefreshSummary::default();
        let mut monitors = Vec::with_capacity(handles.len());
        let mut seen = HashSet::new();

        for handle in handles {
            if !seen.insert(handle.id.clone()) {
                log_warning!("Duplicate monitor id {}, ignoring second instance", handle.id);
                continue;
            }

            let mut monitor = match previous.get(&handle.id) {
                Some(known) => {
                    let mut monitor = known.clone();
                    monitor.handle = handle.clone();
                    monitor.stale = false;
                    monitor
                }
                None => {
                    summary.added.push(handle.id.clone());
                    Monitor::new(handle.clone(), 0)
                }
            };

            match self.bus.capabilities(&handle) {
                Ok(parsed) => {
                    if !parsed.is_complete() {
                        let err = ControlError::CapabilityParseIncomplete {
                            monitor: handle.id.clone(),
                            skipped: parsed.skipped.len(),
                        };
                        log_warning!("{err}");
                        summary.incomplete.push(handle.id.clone());
                    }
                    monitor.features = parsed.features;
                    monitor.model = parsed.model.or(monitor.model);
                    monitor.mccs_version = parsed.mccs_version.or(monitor.mccs_version);
                }
                Err(e) => {
                    // Keep what we knew; a brightness write still works without it
                    log_warning!("Capability detection failed for {}: {e}", handle.id);
                }
            }

            monitors.push(monitor);
        }

        for known in &previous.monitors {
            if !seen.contains(&known.handle.id) {
                if !known.stale {
                    summary.lost.push(known.handle.id.clone());
                }
                let mut kept = known.clone();
                kept.stale = true;
                monitors.push(kept);
            }
        }

        // The store is authoritative for offsets
        let offsets = self.store.get().monitor_offsets;
        for monitor in &mut monitors {
            monitor.offset = offsets.get(&monitor.handle.id).copied().unwrap_or(0);
        }

        summary.live = monitors.iter().filter(|m| !m.stale).count();
        summary.stale = monitors.len() - summary.live;
        self.publish(MonitorSet { monitors });

        summary
    }

    /// Re-read one monitor's capabilities.
    pub fn detect_capabilities(&self, id: &str) -> Result<Monitor> {
        let snapshot = self.snapshot();
        let monitor = snapshot
            .get(id)
            .ok_or_else(|| invalid_input!("unknown monitor '{id}'"))?;
        let parsed = self.bus.capabilities(&monitor.handle)?;

        let skipped = parsed.skipped.len();
        let mut updated = monitor.clone();
        updated.features = parsed.features;
        updated.model = parsed.model.or(updated.model);
        updated.mccs_version = parsed.mccs_version.or(updated.mccs_version);

        self.modify(|set| {
            if let Some(slot) = set.monitors.iter_mut().find(|m| m.handle.id == id) {
                *slot = updated.clone();
            }
        });

        if skipped > 0 {
            log_warning!(
                "{}",
                ControlError::CapabilityParseIncomplete {
                    monitor: id.to_string(),
                    skipped,
                }
            );
        }
        Ok(updated)
    }

    /// Brightness to write to a monitor for a computed value.
    pub fn effective_brightness(&self, id: &str, computed: u8) -> u8 {
        let offset = self.snapshot().get(id).map_or(0, |m| m.offset);
        apply_offset(computed, offset)
    }

    /// Set and persist a monitor's calibration offset.
    ///
    /// Serialized with [`refresh`](Self::refresh) so a refresh in progress
    /// cannot publish the old value afterwards.
    pub fn set_offset(&self, id: &str, offset: i32) -> Result<()> {
        validate_offset(id, offset)?;
        let _refreshing = self.refresh_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.snapshot().get(id).is_none() {
            return Err(invalid_input!("unknown monitor '{id}'"));
        }

        self.store.update(|config| {
            if offset == 0 {
                config.monitor_offsets.remove(id);
            } else {
                config.monitor_offsets.insert(id.to_string(), offset);
            }
        })?;

        self.modify(|set| {
            if let Some(monitor) = set.monitors.iter_mut().find(|m| m.handle.id == id) {
                monitor.offset = offset;
            }
        });
        Ok(())
    }

    /// Apply offsets from a reloaded configuration.
    pub fn sync_offsets(&self, offsets: &BTreeMap<String, i32>) {
        let _refreshing = self.refresh_lock.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = self.snapshot();
        let differs = snapshot
            .monitors
            .iter()
            .any(|m| offsets.get(&m.handle.id).copied().unwrap_or(0) != m.offset);
        if !differs {
            return;
        }
        self.modify(|set| {
            for monitor in &mut set.monitors {
                monitor.offset = offsets.get(&monitor.handle.id).copied().unwrap_or(0);
            }
        });
    }
}

impl MonitorRegistry {
    fn live_monitor(&self, id: &str) -> Result<Monitor> {
        let snapshot = self.snapshot();
        let monitor = snapshot
            .get(id)
            .ok_or_else(|| invalid_input!("unknown monitor '{id}'"))?;
        if monitor.stale {
            return Err(ControlError::HardwareUnavailable {
                monitor: id.to_string(),
                reason: "monitor is disconnected".to_string(),
            }
            .into());
        }
        Ok(monitor.clone())
    }

    /// Read the current value of every writable feature of a monitor.
    ///
    /// Features that fail to read are left out of the snapshot.
    pub fn export_settings(&self, id: &str) -> Result<MonitorSettings> {
        let monitor = self.live_monitor(id)?;
        let mut settings = Vec::new();

        for feature in monitor.features.values() {
            if !feature.is_writable() || NOT_SNAPSHOTTED.contains(&feature.code) {
                continue;
            }
            match self.bus.get_value(&monitor.handle, feature.code) {
                Ok(reading) => settings.push(SettingValue {
                    code: feature.code,
                    name: feature.name.clone(),
                    value: reading.current,
                }),
                Err(e) => log_warning!("Leaving {:02X} out of the export: {e}", feature.code),
            }
        }

        log_decorated!("Exported {} settings from {id}", settings.len());
        Ok(MonitorSettings {
            monitor: id.to_string(),
            settings,
        })
    }

    /// Write a settings snapshot back to a monitor.
    ///
    /// Every value is clamped to the target's feature bounds. Codes the
    /// target lacks or cannot write are skipped, and a failed write does not
    /// stop the remaining ones.
    pub fn import_settings(&self, id: &str, snapshot: &MonitorSettings) -> Result<ImportOutcome> {
        let monitor = self.live_monitor(id)?;
        let mut outcome = ImportOutcome::default();

        for setting in &snapshot.settings {
            let feature = if monitor.features.is_empty() {
                known_feature(setting.code)
            } else {
                monitor.feature(setting.code).cloned()
            };
            let Some(feature) = feature.filter(|f| {
                f.is_writable() && !NOT_SNAPSHOTTED.contains(&f.code)
            }) else {
                outcome.skipped.push(setting.code);
                continue;
            };

            match self
                .bus
                .set_value(&monitor.handle, &feature, i64::from(setting.value))
            {
                Ok(written) => outcome.applied.push(SettingValue {
                    code: feature.code,
                    name: feature.name,
                    value: written,
                }),
                Err(e) => {
                    log_warning!("Failed to restore {:02X} on {id}: {e}", setting.code);
                    outcome.failures.push(SettingFailure {
                        code: setting.code,
                        reason: e.to_string(),
                    });
                }
            }
        }

        log_decorated!(
            "Restored {} of {} settings on {id}",
            outcome.applied.len(),
            snapshot.settings.len()
        );
        Ok(outcome)
    }
}

/// computed + offset, clamped to 0-100.
pub fn apply_offset(computed: u8, offset: i32) -> u8 {
    (i32::from(computed) + offset).clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::control_error;
    use crate::config::Config;
    use crate::ddc::RetryPolicy;
    use crate::testing::FakeBus;
    use std::time::Duration;

    fn registry_with(bus: Arc<FakeBus>, config: Config) -> MonitorRegistry {
        let policy = RetryPolicy {
            attempts: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        };
        MonitorRegistry::new(
            HardwareBus::new(bus, policy),
            Arc::new(ConfigStore::in_memory(config)),
        )
    }

    #[test]
    fn test_apply_offset_clamps() {
        assert_eq!(apply_offset(70, -10), 60);
        assert_eq!(apply_offset(95, 20), 100);
        assert_eq!(apply_offset(5, -30), 0);
    }

    #[test]
    fn test_refresh_assigns_persisted_offsets() {
        let bus = Arc::new(FakeBus::new());
        bus.add_monitor("A:1:x", 1);
        bus.add_monitor("B:2:y", 2);

        let mut config = Config::default();
        config.monitor_offsets.insert("B:2:y".into(), -15);
        let registry = registry_with(bus, config);

        let summary = registry.refresh();
        assert_eq!(summary.live, 2);
        assert_eq!(summary.added.len(), 2);

        let set = registry.snapshot();
        assert_eq!(set.get("A:1:x").unwrap().offset, 0);
        assert_eq!(set.get("B:2:y").unwrap().offset, -15);
        assert_eq!(registry.effective_brightness("B:2:y", 60), 45);
    }

    #[test]
    fn test_vanished_monitor_is_kept_stale() {
        let bus = Arc::new(FakeBus::new());
        bus.add_monitor("A:1:x", 1);
        bus.add_monitor("B:2:y", 2);
        let registry = registry_with(bus.clone(), Config::default());
        registry.refresh();
        let before = registry.snapshot();

        bus.remove_monitor("B:2:y");
        let summary = registry.refresh();
        assert_eq!(summary.lost, vec!["B:2:y".to_string()]);
        assert_eq!((summary.live, summary.stale), (1, 1));

        let after = registry.snapshot();
        let stale = after.get("B:2:y").unwrap();
        assert!(stale.stale);
        assert_eq!(stale.features, before.get("B:2:y").unwrap().features);
        assert_eq!(after.live().count(), 1);

        // Old snapshots are untouched by the swap
        assert!(!before.get("B:2:y").unwrap().stale);
    }

    #[test]
    fn test_capability_failure_keeps_previous_features() {
        let bus = Arc::new(FakeBus::new());
        bus.add_monitor("A:1:x", 1);
        let registry = registry_with(bus.clone(), Config::default());
        registry.refresh();
        let features = registry.snapshot().get("A:1:x").unwrap().features.clone();
        assert!(!features.is_empty());

        bus.fail_capabilities("A:1:x", true);
        registry.refresh();
        assert_eq!(registry.snapshot().get("A:1:x").unwrap().features, features);
    }

    #[test]
    fn test_set_offset_validates_and_persists() {
        let bus = Arc::new(FakeBus::new());
        bus.add_monitor("A:1:x", 1);
        let store = Arc::new(ConfigStore::in_memory(Config::default()));
        let registry = MonitorRegistry::new(
            HardwareBus::new(bus, RetryPolicy::default()),
            store.clone(),
        );
        registry.refresh();

        registry.set_offset("A:1:x", 12).unwrap();
        assert_eq!(registry.snapshot().get("A:1:x").unwrap().offset, 12);
        assert_eq!(store.get().offset_for("A:1:x"), 12);

        assert!(registry.set_offset("A:1:x", 51).is_err());
        assert!(registry.set_offset("missing", 5).is_err());
        assert_eq!(store.get().offset_for("A:1:x"), 12);
    }

    #[test]
    fn test_sync_offsets_from_reload() {
        let bus = Arc::new(FakeBus::new());
        bus.add_monitor("A:1:x", 1);
        let registry = registry_with(bus, Config::default());
        registry.refresh();

        let offsets = BTreeMap::from([("A:1:x".to_string(), -20)]);
        registry.sync_offsets(&offsets);
        assert_eq!(registry.snapshot().get("A:1:x").unwrap().offset, -20);
    }

    #[test]
    fn test_export_reads_writable_features() {
        let bus = Arc::new(FakeBus::new());
        bus.add_monitor("A:1:x", 1);
        let registry = registry_with(bus, Config::default());
        registry.refresh();

        let exported = registry.export_settings("A:1:x").unwrap();
        assert_eq!(exported.monitor, "A:1:x");
        let codes: Vec<(u8, u16)> = exported.settings.iter().map(|s| (s.code, s.value)).collect();
        // Unreadable codes drop out, power mode and read-only codes never go in
        assert_eq!(codes, vec![(0x10, 50), (0x12, 50), (0x60, 0x0F)]);
        assert_eq!(exported.settings[0].name, "Brightness");

        assert!(registry.export_settings("missing").is_err());
    }

    #[test]
    fn test_import_restores_clamps_and_skips() {
        let bus = Arc::new(FakeBus::new());
        bus.add_monitor("A:1:x", 1);
        bus.add_monitor("B:2:y", 2);
        let registry = registry_with(bus.clone(), Config::default());
        registry.refresh();

        let snapshot = MonitorSettings {
            monitor: "A:1:x".into(),
            settings: vec![
                SettingValue { code: 0x10, name: "Brightness".into(), value: 70 },
                SettingValue { code: 0x12, name: "Contrast".into(), value: 300 },
                SettingValue { code: 0x60, name: "Input Source".into(), value: 0x11 },
                SettingValue { code: 0x87, name: "Sharpness".into(), value: 10 },
                SettingValue { code: 0xAC, name: "Horizontal Frequency".into(), value: 1 },
                SettingValue { code: 0xD6, name: "Power Mode".into(), value: 4 },
            ],
        };
        let outcome = registry.import_settings("B:2:y", &snapshot).unwrap();

        assert!(outcome.is_complete());
        let applied: Vec<(u8, u16)> = outcome.applied.iter().map(|s| (s.code, s.value)).collect();
        assert_eq!(applied, vec![(0x10, 70), (0x12, 100), (0x60, 0x11)]);
        assert_eq!(outcome.skipped, vec![0x87, 0xAC, 0xD6]);
        assert_eq!(bus.value("B:2:y", 0x12), Some(100));
        assert_eq!(bus.value("B:2:y", 0xD6), Some(1));
        assert!(bus.writes_to("A:1:x").is_empty());
    }

    #[test]
    fn test_import_continues_past_failed_writes() {
        let bus = Arc::new(FakeBus::new());
        bus.add_monitor("A:1:x", 1);
        let registry = registry_with(bus.clone(), Config::default());
        registry.refresh();
        let snapshot = registry.export_settings("A:1:x").unwrap();

        bus.fail_writes("A:1:x", 1);
        let outcome = registry.import_settings("A:1:x", &snapshot).unwrap();
        assert!(!outcome.is_complete());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].code, 0x10);
        assert_eq!(outcome.applied.len(), 2);

        bus.remove_monitor("A:1:x");
        registry.refresh();
        let err = registry.import_settings("A:1:x", &snapshot).unwrap_err();
        assert_eq!(control_error(&err).map(|e| e.kind()), Some("hardware_unavailable"));
    }

    #[test]
    fn test_brightness_feature_fallbacks() {
        let handle = MonitorHandle {
            id: "x".into(),
            label: "x".into(),
            bus: 1,
        };
        let mut monitor = Monitor::new(handle, 0);
        assert_eq!(monitor.brightness_feature().unwrap().code, VCP_BRIGHTNESS);

        monitor
            .features
            .insert(VCP_BACKLIGHT, known_feature(VCP_BACKLIGHT).unwrap());
        assert_eq!(monitor.brightness_feature().unwrap().code, VCP_BACKLIGHT);

        monitor.features.clear();
        monitor
            .features
            .insert(0x12, known_feature(0x12).unwrap());
        assert!(monitor.brightness_feature().is_none());
    }
}
