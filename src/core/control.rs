//! One control decision and its application to the hardware.
//!
//! A tick picks the brightness source in priority order:
//!
//! 1. the fullscreen override, while enabled and active and the curve is in
//!    charge (auto-brightness on, location known)
//! 2. the sun curve, while auto-brightness is on and a location is known
//! 3. nothing (the tick is recorded as skipped and the monitors are left alone)
//!
//! Writes go to every live monitor concurrently from scoped threads, each
//! with its own calibration offset. A monitor that fails is reported in the
//! [`TickReport`] and never stops the others.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::brightness::BrightnessCurve;
use crate::common::error::ControlError;
use crate::config::ConfigStore;
use crate::fullscreen::FullscreenOverride;
use crate::geo::SolarSample;
use crate::monitors::{Monitor, MonitorRegistry, apply_offset};
use crate::preview::ALL_MONITORS;

/// What decided the brightness of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickSource {
    Curve,
    Fullscreen,
    Manual,
    Skipped,
}

/// Per-monitor results of one write round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Monitor id → value written (after offset and clamping)
    pub applied: BTreeMap<String, u16>,
    /// Monitor id → failure description
    pub failures: BTreeMap<String, String>,
}

impl ApplyOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub source: TickSource,
    /// Sun position at `at`, when a location is configured
    pub sample: Option<SolarSample>,
    /// Computed brightness before per-monitor offsets
    pub target: Option<u8>,
    #[serde(flatten)]
    pub outcome: ApplyOutcome,
    pub skipped_reason: Option<String>,
}

impl TickReport {
    fn skipped(at: DateTime<Utc>, sample: Option<SolarSample>, reason: impl Into<String>) -> Self {
        Self {
            at,
            source: TickSource::Skipped,
            sample,
            target: None,
            outcome: ApplyOutcome::default(),
            skipped_reason: Some(reason.into()),
        }
    }
}

pub struct ControlLoop {
    store: Arc<ConfigStore>,
    registry: Arc<MonitorRegistry>,
    fullscreen: Arc<FullscreenOverride>,
    last_report: Mutex<Option<TickReport>>,
}

impl ControlLoop {
    pub fn new(
        store: Arc<ConfigStore>,
        registry: Arc<MonitorRegistry>,
        fullscreen: Arc<FullscreenOverride>,
    ) -> Self {
        Self {
            store,
            registry,
            fullscreen,
            last_report: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<MonitorRegistry> {
        &self.registry
    }

    pub fn fullscreen(&self) -> &Arc<FullscreenOverride> {
        &self.fullscreen
    }

    pub fn last_report(&self) -> Option<TickReport> {
        self.last_report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, report: TickReport) -> TickReport {
        *self.last_report.lock().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
        report
    }

    /// Sun position for the configured location.
    pub fn sample_at(&self, now: DateTime<Utc>) -> Option<SolarSample> {
        let config = self.store.get();
        let location = config.location()?;
        let curve = BrightnessCurve::from_config(&config).ok()?;
        let elevation = location.elevation_at(now);
        Some(SolarSample {
            elevation,
            phase: curve.phase(elevation),
        })
    }

    /// Run one control decision.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let config = self.store.get();

        if self.fullscreen_override_applies() && self.fullscreen.is_active() {
            return self.apply_fullscreen(now);
        }

        let sample = self.sample_at(now);
        if !config.auto_brightness_enabled {
            return self.record(TickReport::skipped(now, sample, "auto brightness disabled"));
        }
        let Some(sample) = sample else {
            return self.record(TickReport::skipped(now, None, "no location configured"));
        };

        match self.apply_for_elevation(sample.elevation, now) {
            Ok(report) => report,
            Err(e) => {
                log_warning!("Brightness curve unavailable: {e}");
                self.record(TickReport::skipped(now, Some(sample), e.to_string()))
            }
        }
    }

    /// Compute the curve value for an elevation and write it everywhere.
    pub fn apply_for_elevation(&self, elevation: f64, at: DateTime<Utc>) -> Result<TickReport> {
        let curve = BrightnessCurve::from_config(&self.store.get())?;
        let (target, phase) = curve.evaluate(elevation);
        let outcome = self.apply_to_all(target);

        Ok(self.record(TickReport {
            at,
            source: TickSource::Curve,
            sample: Some(SolarSample { elevation, phase }),
            target: Some(target),
            outcome,
            skipped_reason: None,
        }))
    }

    /// The override only stands in for the curve. Without a curve value there
    /// is nothing to restore when fullscreen ends, so it stays out of the way.
    pub fn fullscreen_override_applies(&self) -> bool {
        let config = self.store.get();
        config.fullscreen_brightness_enabled
            && config.auto_brightness_enabled
            && config.location().is_some()
    }

    /// Write the fullscreen override value everywhere.
    pub fn apply_fullscreen(&self, at: DateTime<Utc>) -> TickReport {
        let target = self.store.get().fullscreen_brightness;
        let outcome = self.apply_to_all(target);
        self.record(TickReport {
            at,
            source: TickSource::Fullscreen,
            sample: self.sample_at(at),
            target: Some(target),
            outcome,
            skipped_reason: None,
        })
    }

    /// Write `value` (plus each monitor's offset) to every live monitor.
    pub fn apply_to_all(&self, value: u8) -> ApplyOutcome {
        let snapshot = self.registry.snapshot();
        let live: Vec<&Monitor> = snapshot.live().collect();

        let results: Vec<(String, Result<u16>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = live
                .iter()
                .map(|monitor| {
                    let id = monitor.id().to_string();
                    (id, scope.spawn(move || self.write_brightness(monitor, value)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(id, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("brightness writer panicked")));
                    (id, result)
                })
                .collect()
        });

        let mut outcome = ApplyOutcome::default();
        for (id, result) in results {
            match result {
                Ok(written) => {
                    outcome.applied.insert(id, written);
                }
                Err(e) => {
                    log_warning!("Failed to set brightness on {id}: {e}");
                    outcome.failures.insert(id, e.to_string());
                }
            }
        }
        outcome
    }

    fn write_brightness(&self, monitor: &Monitor, value: u8) -> Result<u16> {
        let feature = monitor.brightness_feature().ok_or_else(|| {
            anyhow::Error::new(ControlError::HardwareUnavailable {
                monitor: monitor.id().to_string(),
                reason: "no continuous brightness control".to_string(),
            })
        })?;
        let effective = apply_offset(value, monitor.offset);
        self.registry
            .bus()
            .set_value(&monitor.handle, &feature, i64::from(effective))
    }

    /// Write a user-chosen value to one monitor or to all (`*`).
    ///
    /// Fails when the target is unknown or stale, when a single target's
    /// write fails, or when every monitor of an `*` write failed.
    pub fn apply_manual(&self, target: &str, value: u8) -> Result<ApplyOutcome> {
        if value > 100 {
            return Err(invalid_input!("brightness {value} is outside 0-100"));
        }

        let outcome = if target == ALL_MONITORS {
            let outcome = self.apply_to_all(value);
            if outcome.applied.is_empty()
                && let Some((monitor, reason)) = outcome.failures.iter().next()
            {
                return Err(ControlError::HardwareUnavailable {
                    monitor: monitor.clone(),
                    reason: reason.clone(),
                }
                .into());
            }
            outcome
        } else {
            let snapshot = self.registry.snapshot();
            let monitor = snapshot
                .get(target)
                .ok_or_else(|| invalid_input!("unknown monitor '{target}'"))?;
            if monitor.stale {
                return Err(ControlError::HardwareUnavailable {
                    monitor: target.to_string(),
                    reason: "monitor is disconnected".to_string(),
                }
                .into());
            }
            let written = self.write_brightness(monitor, value)?;
            ApplyOutcome {
                applied: BTreeMap::from([(target.to_string(), written)]),
                failures: BTreeMap::new(),
            }
        };

        let now = Utc::now();
        self.record(TickReport {
            at: now,
            source: TickSource::Manual,
            sample: self.sample_at(now),
            target: Some(value),
            outcome: outcome.clone(),
            skipped_reason: None,
        });
        Ok(outcome)
    }
}
