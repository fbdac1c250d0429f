//! Event data structures for the IPC system.
//!
//! Events are pushed to clients that sent `subscribe`, one JSON object per
//! line tagged by `event_type`.

use serde::{Deserialize, Serialize};

use crate::brightness::Phase;
use crate::config::Config;
use crate::core::control::TickReport;
use crate::monitors::RefreshSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum IpcEvent {
    /// A tick, override or manual write reached the monitors.
    BrightnessApplied {
        #[serde(flatten)]
        report: TickReport,
    },

    /// The sun moved into another phase band.
    PhaseChanged {
        from_phase: Option<Phase>,
        to_phase: Phase,
        elevation: f64,
    },

    FullscreenChanged { active: bool },

    MonitorsRefreshed {
        #[serde(flatten)]
        summary: RefreshSummary,
    },

    /// Settings changed through a client or a reload of the file.
    ConfigChanged { config: Box<Config> },
}

impl IpcEvent {
    pub fn brightness_applied(report: TickReport) -> Self {
        IpcEvent::BrightnessApplied { report }
    }

    pub fn phase_changed(from: Option<Phase>, to: Phase, elevation: f64) -> Self {
        IpcEvent::PhaseChanged {
            from_phase: from,
            to_phase: to,
            elevation,
        }
    }

    pub fn monitors_refreshed(summary: RefreshSummary) -> Self {
        IpcEvent::MonitorsRefreshed { summary }
    }

    pub fn config_changed(config: Config) -> Self {
        IpcEvent::ConfigChanged {
            config: Box::new(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::control::{ApplyOutcome, TickSource};
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[test]
    fn test_brightness_applied_serialization() {
        let report = TickReport {
            at: Utc::now(),
            source: TickSource::Curve,
            sample: None,
            target: Some(64),
            outcome: ApplyOutcome {
                applied: BTreeMap::from([("i2c-6".to_string(), 54)]),
                failures: BTreeMap::from([("i2c-7".to_string(), "timeout".to_string())]),
            },
            skipped_reason: None,
        };

        let json = serde_json::to_string(&IpcEvent::brightness_applied(report.clone())).unwrap();
        assert!(json.contains(r#""event_type":"brightness_applied""#));
        assert!(json.contains(r#""source":"curve""#));
        assert!(json.contains(r#""i2c-6":54"#));

        match serde_json::from_str(&json).unwrap() {
            IpcEvent::BrightnessApplied { report: parsed } => assert_eq!(parsed, report),
            other => panic!("Wrong event type deserialized: {other:?}"),
        }
    }

    #[test]
    fn test_phase_changed_serialization() {
        let event = IpcEvent::phase_changed(Some(Phase::Twilight), Phase::LowSun, 3.5);
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains(r#""event_type":"phase_changed""#));
        assert!(json.contains(r#""from_phase":"twilight""#));
        assert!(json.contains(r#""to_phase":"low_sun""#));
    }

    #[test]
    fn test_monitors_refreshed_serialization() {
        let event = IpcEvent::monitors_refreshed(RefreshSummary {
            live: 2,
            stale: 1,
            added: vec!["i2c-6".into()],
            lost: vec!["i2c-9".into()],
            incomplete: vec![],
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event_type":"monitors_refreshed""#));
        assert!(json.contains(r#""live":2"#));
        assert_eq!(serde_json::from_str::<IpcEvent>(&json).unwrap(), event);
    }
}
