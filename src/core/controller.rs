//! Command surface served over the control socket.
//!
//! Every request is answered synchronously on the IPC server thread. Setting
//! changes are committed through the [`ConfigStore`](crate::config::ConfigStore)
//! and then wake the Core with `Reapply` so the new values reach the
//! monitors without waiting for the next scheduled tick.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use crate::common::error::ControlError;
use crate::config::Config;
use crate::core::control::ControlLoop;
use crate::core::status::{LocationInfo, MonitorInfo, StatusReport};
use crate::ddc::features::{feature_from_capability, known_feature};
use crate::ddc::{Feature, FeatureKind};
use crate::geo::{Geocoder, Location};
use crate::io::service::restart_service;
use crate::io::signals::SignalMessage;
use crate::ipc::{FeatureValue, IpcEvent, IpcNotifier, Reply, Request, RequestHandler};
use crate::monitors::Monitor;
use crate::preview::{ALL_MONITORS, PreviewThrottler};

pub struct Controller {
    control: Arc<ControlLoop>,
    preview: Arc<PreviewThrottler>,
    geocoder: Arc<dyn Geocoder>,
    notifier: IpcNotifier,
    wake: Sender<SignalMessage>,
}

impl Controller {
    pub fn new(
        control: Arc<ControlLoop>,
        preview: Arc<PreviewThrottler>,
        geocoder: Arc<dyn Geocoder>,
        notifier: IpcNotifier,
        wake: Sender<SignalMessage>,
    ) -> Self {
        Self {
            control,
            preview,
            geocoder,
            notifier,
            wake,
        }
    }

    pub fn handle(&self, request: Request) -> Result<Reply> {
        match request {
            Request::Status => Ok(Reply::Status(Box::new(StatusReport::collect(
                &self.control,
                Utc::now(),
            )))),
            Request::ListMonitors => Ok(Reply::Monitors {
                monitors: self
                    .control
                    .registry()
                    .snapshot()
                    .monitors
                    .iter()
                    .map(MonitorInfo::from)
                    .collect(),
            }),
            Request::RefreshMonitors => {
                let summary = self.control.registry().refresh();
                self.notifier
                    .send(IpcEvent::monitors_refreshed(summary.clone()));
                self.reapply();
                Ok(Reply::Refreshed(summary))
            }
            Request::DetectCapabilities { monitor } => {
                let monitor = self.control.registry().detect_capabilities(&monitor)?;
                Ok(Reply::Monitor(Box::new(MonitorInfo::from(&monitor))))
            }
            Request::GetFeature { monitor, code } => self.get_feature(&monitor, code),
            Request::SetFeature {
                monitor,
                code,
                value,
            } => self.set_feature(&monitor, code, value),
            Request::GetOffset { monitor } => {
                let offset = self.live_monitor(&monitor).map(|m| m.offset).or_else(|e| {
                    // Offsets of disconnected monitors are still readable
                    let config = self.control.store().get();
                    config
                        .monitor_offsets
                        .get(&monitor)
                        .copied()
                        .ok_or(e)
                })?;
                Ok(Reply::Offset { monitor, offset })
            }
            Request::ExportSettings { monitor } => Ok(Reply::Exported(
                self.control.registry().export_settings(&monitor)?,
            )),
            Request::ImportSettings { monitor, snapshot } => {
                let outcome = self
                    .control
                    .registry()
                    .import_settings(&monitor, &snapshot)?;
                Ok(Reply::Imported { monitor, outcome })
            }
            Request::SetOffset { monitor, offset } => {
                let offset = i32::try_from(offset)
                    .map_err(|_| invalid_input!("offset {offset} is out of range"))?;
                self.control.registry().set_offset(&monitor, offset)?;
                self.reapply();
                Ok(Reply::Offset { monitor, offset })
            }
            Request::SetAutoBrightness { enabled } => {
                self.update_settings(|c| c.auto_brightness_enabled = enabled)
            }
            Request::SetElevationScaling { enabled } => {
                self.update_settings(|c| c.use_elevation_scaling = enabled)
            }
            Request::SetBrightnessRange { min, max } => {
                let min = percent("min_brightness", min)?;
                let max = percent("max_brightness", max)?;
                self.update_settings(|c| {
                    c.min_brightness = min;
                    c.max_brightness = max;
                })
            }
            Request::SetFullscreen {
                enabled,
                brightness,
            } => {
                let brightness = brightness
                    .map(|b| percent("fullscreen_brightness", b))
                    .transpose()?;
                self.update_settings(|c| {
                    if let Some(enabled) = enabled {
                        c.fullscreen_brightness_enabled = enabled;
                    }
                    if let Some(brightness) = brightness {
                        c.fullscreen_brightness = brightness;
                    }
                })
            }
            Request::SetLocation {
                latitude,
                longitude,
            } => {
                let location = Location::new(latitude, longitude, true, None)?;
                self.set_location(location)
            }
            Request::LookupLocation { name } => {
                let found = self.geocoder.lookup(&name)?;
                let location =
                    Location::new(found.latitude, found.longitude, false, Some(found.display_name()))?;
                self.set_location(location)
            }
            Request::PreviewBrightness { value, monitor } => {
                let value = percent("brightness", value)?;
                let target = self.brightness_target(monitor)?;
                self.preview.submit(&target, value);
                Ok(Reply::PreviewQueued { target, value })
            }
            Request::CommitBrightness { value, monitor } => {
                let value = percent("brightness", value)?;
                let target = self.brightness_target(monitor)?;
                self.preview.commit(&target, value)?;

                let report = self.control.last_report();
                let outcome = report
                    .as_ref()
                    .map(|r| r.outcome.clone())
                    .unwrap_or_default();
                if let Some(report) = report {
                    self.notifier.send(IpcEvent::brightness_applied(report));
                }
                Ok(Reply::Committed {
                    target,
                    value,
                    outcome,
                })
            }
            Request::RestartService => {
                let service = self.control.store().get().service_name;
                restart_service(&service)?;
                Ok(Reply::Restarting { service })
            }
            // The server answers subscriptions itself
            Request::Subscribe => Ok(Reply::Subscribed),
        }
    }

    fn reapply(&self) {
        let _ = self.wake.send(SignalMessage::Reapply);
    }

    fn update_settings<F>(&self, change: F) -> Result<Reply>
    where
        F: FnOnce(&mut Config),
    {
        let config = self.control.store().update(change)?;
        self.reapply();
        Ok(Reply::Settings(Box::new(config)))
    }

    fn set_location(&self, location: Location) -> Result<Reply> {
        self.control
            .store()
            .update(|c| c.set_location(&location))?;
        log_decorated!("Location set to {location}");
        self.reapply();
        Ok(Reply::Location(LocationInfo::from(&location)))
    }

    /// Monitor by id, failing for unknown and disconnected monitors.
    fn live_monitor(&self, id: &str) -> Result<Monitor> {
        let snapshot = self.control.registry().snapshot();
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

    fn brightness_target(&self, monitor: Option<String>) -> Result<String> {
        match monitor {
            None => Ok(ALL_MONITORS.to_string()),
            Some(id) if id == ALL_MONITORS => Ok(id),
            Some(id) => {
                self.live_monitor(&id)?;
                Ok(id)
            }
        }
    }

    /// The feature a monitor exposes for `code`.
    ///
    /// Monitors whose capabilities could not be read accept any code, using
    /// the built-in model when there is one.
    fn resolve_feature(monitor: &Monitor, code: u8) -> Result<Feature> {
        if monitor.features.is_empty() {
            return Ok(known_feature(code).unwrap_or_else(|| feature_from_capability(code, None)));
        }
        monitor.feature(code).cloned().ok_or_else(|| {
            invalid_input!(
                "monitor '{}' does not support feature {code:02X}",
                monitor.id()
            )
        })
    }

    fn get_feature(&self, id: &str, code: u8) -> Result<Reply> {
        let monitor = self.live_monitor(id)?;
        let feature = Self::resolve_feature(&monitor, code)?;
        let reading = self.control.registry().bus().get_value(&monitor.handle, code)?;

        Ok(Reply::Feature(FeatureValue {
            monitor: id.to_string(),
            code,
            label: feature.value_label(reading.current).map(str::to_string),
            name: feature.name,
            current: reading.current,
            max: Some(reading.max),
        }))
    }

    fn set_feature(&self, id: &str, code: u8, value: i64) -> Result<Reply> {
        let monitor = self.live_monitor(id)?;
        let feature = Self::resolve_feature(&monitor, code)?;
        let written = self
            .control
            .registry()
            .bus()
            .set_value(&monitor.handle, &feature, value)?;

        Ok(Reply::Feature(FeatureValue {
            monitor: id.to_string(),
            code,
            label: feature.value_label(written).map(str::to_string),
            max: feature_max(&feature.kind),
            name: feature.name,
            current: written,
        }))
    }
}

impl RequestHandler for Controller {
    fn handle(&self, request: Request) -> Result<Reply> {
        Controller::handle(self, request)
    }
}

fn feature_max(kind: &FeatureKind) -> Option<u16> {
    match kind {
        FeatureKind::Continuous { max, .. }
        | FeatureKind::Incremental { max, .. }
        | FeatureKind::FreeNumeric { max, .. } => Some(*max),
        FeatureKind::Discrete { values } => values.keys().max().copied(),
        FeatureKind::ReadOnly => None,
    }
}

/// A user-supplied percentage, rejected outside 0-100.
fn percent(name: &str, value: i64) -> Result<u8> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| invalid_input!("{name} ({value}) must be between 0 and 100"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::control_error;
    use crate::config::ConfigStore;
    use crate::ddc::features::VCP_BRIGHTNESS;
    use crate::ddc::{HardwareBus, RetryPolicy};
    use crate::fullscreen::FullscreenOverride;
    use crate::geo::GeocodeMatch;
    use crate::monitors::MonitorRegistry;
    use crate::testing::FakeBus;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;

    struct FixedGeocoder;

    impl Geocoder for FixedGeocoder {
        fn lookup(&self, query: &str) -> Result<GeocodeMatch> {
            if query == "Oslo" {
                Ok(GeocodeMatch {
                    name: "Oslo".into(),
                    country: "NO".into(),
                    latitude: 59.91,
                    longitude: 10.75,
                })
            } else {
                Err(ControlError::LocationLookupFailure(format!("no match for '{query}'")).into())
            }
        }
    }

    struct Fixture {
        bus: Arc<FakeBus>,
        controller: Controller,
        wake: Receiver<SignalMessage>,
        events: Receiver<IpcEvent>,
    }

    fn fixture() -> Fixture {
        let bus = Arc::new(FakeBus::new());
        bus.add_monitor("left", 4);
        bus.add_monitor("right", 5);
        let store = Arc::new(ConfigStore::in_memory(Config::default()));
        let registry = Arc::new(MonitorRegistry::new(
            HardwareBus::new(bus.clone(), RetryPolicy::default()),
            store.clone(),
        ));
        registry.refresh();
        let control = Arc::new(ControlLoop::new(
            store,
            registry,
            Arc::new(FullscreenOverride::new()),
        ));

        let writer_control = control.clone();
        let preview = PreviewThrottler::start(
            Duration::from_millis(50),
            Box::new(move |target, value| writer_control.apply_manual(target, value).map(|_| ())),
        )
        .unwrap();

        let (notifier, events) = IpcNotifier::new();
        let (wake_tx, wake) = mpsc::channel();
        let controller = Controller::new(
            control,
            Arc::new(preview),
            Arc::new(FixedGeocoder),
            notifier,
            wake_tx,
        );
        Fixture {
            bus,
            controller,
            wake,
            events,
        }
    }

    fn kind(result: Result<Reply>) -> &'static str {
        let err = result.unwrap_err();
        control_error(&err).map_or("internal", |e| e.kind())
    }

    #[test]
    fn test_list_and_status() {
        let f = fixture();
        match f.controller.handle(Request::ListMonitors).unwrap() {
            Reply::Monitors { monitors } => assert_eq!(monitors.len(), 2),
            other => panic!("unexpected reply {other:?}"),
        }
        match f.controller.handle(Request::Status).unwrap() {
            Reply::Status(status) => {
                assert_eq!(status.monitors.len(), 2);
                assert!(status.location.is_none());
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_settings_wake_core() {
        let f = fixture();
        match f
            .controller
            .handle(Request::SetBrightnessRange { min: 20, max: 80 })
            .unwrap()
        {
            Reply::Settings(config) => {
                assert_eq!((config.min_brightness, config.max_brightness), (20, 80))
            }
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(f.wake.try_recv().unwrap(), SignalMessage::Reapply);
    }

    #[test]
    fn test_invalid_settings_keep_previous() {
        let f = fixture();
        assert_eq!(
            kind(f.controller.handle(Request::SetBrightnessRange { min: 80, max: 20 })),
            "invalid_input"
        );
        assert_eq!(
            kind(f.controller.handle(Request::SetBrightnessRange { min: -1, max: 20 })),
            "invalid_input"
        );
        assert_eq!(
            kind(f.controller.handle(Request::SetFullscreen {
                enabled: None,
                brightness: Some(101)
            })),
            "invalid_input"
        );
        assert_eq!(
            kind(f.controller.handle(Request::SetLocation {
                latitude: 95.0,
                longitude: 0.0
            })),
            "invalid_input"
        );

        let config = f.controller.control.store().get();
        assert_eq!(config.min_brightness, Config::default().min_brightness);
        assert!(config.latitude.is_none());
        assert!(f.wake.try_recv().is_err());
    }

    #[test]
    fn test_location_flags() {
        let f = fixture();
        f.controller
            .handle(Request::SetLocation {
                latitude: 48.85,
                longitude: 2.35,
            })
            .unwrap();
        let config = f.controller.control.store().get();
        assert!(config.location_override);
        assert!(config.location_name.is_none());

        match f
            .controller
            .handle(Request::LookupLocation {
                name: "Oslo".into(),
            })
            .unwrap()
        {
            Reply::Location(info) => {
                assert!(!info.manual);
                assert_eq!(info.name.as_deref(), Some("Oslo, NO"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
        let config = f.controller.control.store().get();
        assert!(!config.location_override);
        assert_eq!(config.latitude, Some(59.91));
    }

    #[test]
    fn test_failed_lookup_keeps_location() {
        let f = fixture();
        f.controller
            .handle(Request::SetLocation {
                latitude: 48.85,
                longitude: 2.35,
            })
            .unwrap();
        assert_eq!(
            kind(f.controller.handle(Request::LookupLocation {
                name: "Atlantis".into()
            })),
            "location_lookup_failure"
        );
        assert_eq!(f.controller.control.store().get().latitude, Some(48.85));
    }

    #[test]
    fn test_offsets() {
        let f = fixture();
        f.controller
            .handle(Request::SetOffset {
                monitor: "left".into(),
                offset: -10,
            })
            .unwrap();
        assert_eq!(
            f.controller
                .handle(Request::GetOffset {
                    monitor: "left".into()
                })
                .unwrap(),
            Reply::Offset {
                monitor: "left".into(),
                offset: -10
            }
        );
        assert_eq!(
            kind(f.controller.handle(Request::SetOffset {
                monitor: "left".into(),
                offset: 70
            })),
            "invalid_input"
        );
        assert_eq!(
            kind(f.controller.handle(Request::GetOffset {
                monitor: "nope".into()
            })),
            "invalid_input"
        );
    }

    #[test]
    fn test_features() {
        let f = fixture();
        match f
            .controller
            .handle(Request::SetFeature {
                monitor: "left".into(),
                code: VCP_BRIGHTNESS,
                value: 250,
            })
            .unwrap()
        {
            Reply::Feature(value) => assert_eq!(value.current, 100),
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(f.bus.value("left", VCP_BRIGHTNESS), Some(100));

        match f
            .controller
            .handle(Request::GetFeature {
                monitor: "left".into(),
                code: VCP_BRIGHTNESS,
            })
            .unwrap()
        {
            Reply::Feature(value) => assert_eq!(value.current, 100),
            other => panic!("unexpected reply {other:?}"),
        }

        // Not advertised by the fake capability string
        assert_eq!(
            kind(f.controller.handle(Request::SetFeature {
                monitor: "left".into(),
                code: 0x87,
                value: 15,
            })),
            "invalid_input"
        );
    }

    #[test]
    fn test_export_then_import_to_other_monitor() {
        let f = fixture();
        f.controller
            .handle(Request::SetFeature {
                monitor: "left".into(),
                code: VCP_BRIGHTNESS,
                value: 65,
            })
            .unwrap();

        let Reply::Exported(snapshot) = f
            .controller
            .handle(Request::ExportSettings {
                monitor: "left".into(),
            })
            .unwrap()
        else {
            panic!("expected export");
        };
        assert_eq!(snapshot.monitor, "left");
        assert!(snapshot.settings.iter().any(|s| s.code == VCP_BRIGHTNESS && s.value == 65));

        match f
            .controller
            .handle(Request::ImportSettings {
                monitor: "right".into(),
                snapshot,
            })
            .unwrap()
        {
            Reply::Imported { monitor, outcome } => {
                assert_eq!(monitor, "right");
                assert!(outcome.is_complete());
            }
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(f.bus.value("right", VCP_BRIGHTNESS), Some(65));

        assert_eq!(
            kind(f.controller.handle(Request::ExportSettings {
                monitor: "ghost".into()
            })),
            "invalid_input"
        );
    }

    #[test]
    fn test_commit_and_preview() {
        let f = fixture();
        match f
            .controller
            .handle(Request::CommitBrightness {
                value: 42,
                monitor: None,
            })
            .unwrap()
        {
            Reply::Committed { target, outcome, .. } => {
                assert_eq!(target, "*");
                assert_eq!(outcome.applied.len(), 2);
            }
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(f.bus.value("left", VCP_BRIGHTNESS), Some(42));
        assert!(matches!(
            f.events.try_recv().unwrap(),
            IpcEvent::BrightnessApplied { .. }
        ));

        assert_eq!(
            f.controller
                .handle(Request::PreviewBrightness {
                    value: 30,
                    monitor: Some("right".into()),
                })
                .unwrap(),
            Reply::PreviewQueued {
                target: "right".into(),
                value: 30
            }
        );
        assert_eq!(
            kind(f.controller.handle(Request::PreviewBrightness {
                value: 30,
                monitor: Some("ghost".into()),
            })),
            "invalid_input"
        );
        assert_eq!(
            kind(f.controller.handle(Request::PreviewBrightness {
                value: 130,
                monitor: None,
            })),
            "invalid_input"
        );
    }

    #[test]
    fn test_refresh_broadcasts() {
        let f = fixture();
        f.bus.add_monitor("third", 6);
        match f.controller.handle(Request::RefreshMonitors).unwrap() {
            Reply::Refreshed(summary) => assert_eq!(summary.added, vec!["third".to_string()]),
            other => panic!("unexpected reply {other:?}"),
        }
        assert!(matches!(
            f.events.try_recv().unwrap(),
            IpcEvent::MonitorsRefreshed { .. }
        ));
        assert_eq!(f.wake.try_recv().unwrap(), SignalMessage::Reapply);
    }
}
