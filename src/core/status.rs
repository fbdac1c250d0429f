//! Serializable snapshots of the daemon state for clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::brightness::Phase;
use crate::config::Config;
use crate::core::control::{ControlLoop, TickReport};
use crate::ddc::Feature;
use crate::fullscreen::FullscreenState;
use crate::geo::{self, Location};
use crate::monitors::Monitor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub id: String,
    pub label: String,
    pub bus: u32,
    pub model: Option<String>,
    pub mccs_version: Option<String>,
    pub offset: i32,
    pub stale: bool,
    /// VCP code used for brightness writes, if the monitor has one
    pub brightness_code: Option<u8>,
    pub features: Vec<Feature>,
}

impl From<&Monitor> for MonitorInfo {
    fn from(monitor: &Monitor) -> Self {
        Self {
            id: monitor.handle.id.clone(),
            label: monitor.handle.label.clone(),
            bus: monitor.handle.bus,
            model: monitor.model.clone(),
            mccs_version: monitor.mccs_version.clone(),
            offset: monitor.offset,
            stale: monitor.stale,
            brightness_code: monitor.brightness_feature().map(|f| f.code),
            features: monitor.features.values().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
    /// Entered as coordinates rather than looked up by name
    pub manual: bool,
    pub display: String,
}

impl From<&Location> for LocationInfo {
    fn from(location: &Location) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            name: location.name.clone(),
            manual: location.manual,
            display: location.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SunInfo {
    pub elevation: f64,
    pub phase: Phase,
    /// Curve value for the current elevation, before offsets
    pub curve_brightness: u8,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub solar_noon: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub version: String,
    pub pid: u32,
    pub auto_brightness_enabled: bool,
    pub use_elevation_scaling: bool,
    pub min_brightness: u8,
    pub max_brightness: u8,
    pub fullscreen_brightness_enabled: bool,
    pub fullscreen_brightness: u8,
    pub fullscreen_state: FullscreenState,
    pub location: Option<LocationInfo>,
    pub sun: Option<SunInfo>,
    pub last_tick: Option<TickReport>,
    pub monitors: Vec<MonitorInfo>,
}

impl StatusReport {
    pub fn collect(control: &ControlLoop, now: DateTime<Utc>) -> Self {
        let config = control.store().get();
        let location = config.location();

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            auto_brightness_enabled: config.auto_brightness_enabled,
            use_elevation_scaling: config.use_elevation_scaling,
            min_brightness: config.min_brightness,
            max_brightness: config.max_brightness,
            fullscreen_brightness_enabled: config.fullscreen_brightness_enabled,
            fullscreen_brightness: config.fullscreen_brightness,
            fullscreen_state: control.fullscreen().state(),
            sun: location.as_ref().and_then(|l| sun_info(&config, l, now)),
            location: location.as_ref().map(LocationInfo::from),
            last_tick: control.last_report(),
            monitors: control
                .registry()
                .snapshot()
                .monitors
                .iter()
                .map(MonitorInfo::from)
                .collect(),
        }
    }
}

fn sun_info(config: &Config, location: &Location, now: DateTime<Utc>) -> Option<SunInfo> {
    let curve = crate::brightness::BrightnessCurve::from_config(config).ok()?;
    let elevation = location.elevation_at(now);
    let (curve_brightness, phase) = curve.evaluate(elevation);
    let today = now.date_naive();
    let times = geo::sun_times(location.latitude, location.longitude, today);

    Some(SunInfo {
        elevation,
        phase,
        curve_brightness,
        sunrise: times.map(|(rise, _)| rise),
        sunset: times.map(|(_, set)| set),
        solar_noon: geo::solar_noon(location.longitude, today),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::ddc::{HardwareBus, RetryPolicy};
    use crate::fullscreen::FullscreenOverride;
    use crate::monitors::MonitorRegistry;
    use crate::testing::FakeBus;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[test]
    fn test_collect_status() {
        let bus = Arc::new(FakeBus::new());
        bus.add_monitor("mon", 4);
        let store = Arc::new(ConfigStore::in_memory(Config {
            latitude: Some(51.5),
            longitude: Some(-0.12),
            location_name: Some("London, GB".into()),
            ..Config::default()
        }));
        let registry = Arc::new(MonitorRegistry::new(
            HardwareBus::new(bus, RetryPolicy::default()),
            store.clone(),
        ));
        registry.refresh();
        let control = ControlLoop::new(store, registry, Arc::new(FullscreenOverride::new()));

        let noon = Utc.with_ymd_and_hms(2024, 6, 21, 12, 0, 0).unwrap();
        let status = StatusReport::collect(&control, noon);

        assert_eq!(status.monitors.len(), 1);
        assert_eq!(status.monitors[0].brightness_code, Some(0x10));
        assert_eq!(status.location.as_ref().and_then(|l| l.name.clone()).as_deref(), Some("London, GB"));
        let sun = status.sun.clone().unwrap();
        assert!(sun.elevation > 55.0);
        assert_eq!(sun.phase, Phase::Bright);
        assert!(sun.sunrise.unwrap() < noon && noon < sun.sunset.unwrap());
        assert!(status.last_tick.is_none());

        let json = serde_json::to_string(&status).unwrap();
        let parsed: StatusReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.monitors, status.monitors);
    }
}
