//! Request/response messages exchanged over the control socket.
//!
//! Every message is one JSON object per line. Requests are tagged by
//! `command`, responses by `result`:
//!
//! ```text
//! → {"command":"set_offset","monitor":"i2c-6","offset":-10}
//! ← {"result":"ok","reply":{"type":"offset","monitor":"i2c-6","offset":-10}}
//! → {"command":"set_brightness_range","min":80,"max":20}
//! ← {"result":"error","kind":"invalid_input","message":"min_brightness (80) must be below max_brightness (20)"}
//! ```
//!
//! Numeric user input is carried as `i64` so out-of-range values reach the
//! controller and come back as `invalid_input` rather than parse errors.

use serde::{Deserialize, Serialize};

use crate::common::error::{ControlError, control_error};
use crate::config::Config;
use crate::core::control::ApplyOutcome;
use crate::core::status::{LocationInfo, MonitorInfo, StatusReport};
use crate::monitors::{ImportOutcome, MonitorSettings, RefreshSummary};

/// Error kind for failures outside the classified [`ControlError`] kinds.
pub const INTERNAL_ERROR_KIND: &str = "internal";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    Status,
    ListMonitors,
    RefreshMonitors,
    DetectCapabilities {
        monitor: String,
    },
    GetFeature {
        monitor: String,
        code: u8,
    },
    SetFeature {
        monitor: String,
        code: u8,
        value: i64,
    },
    GetOffset {
        monitor: String,
    },
    /// Read every writable setting of a monitor
    ExportSettings {
        monitor: String,
    },
    /// Write an exported snapshot back, to the same or another monitor
    ImportSettings {
        monitor: String,
        snapshot: MonitorSettings,
    },
    SetOffset {
        monitor: String,
        offset: i64,
    },
    SetAutoBrightness {
        enabled: bool,
    },
    SetElevationScaling {
        enabled: bool,
    },
    SetBrightnessRange {
        min: i64,
        max: i64,
    },
    SetFullscreen {
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        brightness: Option<i64>,
    },
    SetLocation {
        latitude: f64,
        longitude: f64,
    },
    LookupLocation {
        name: String,
    },
    PreviewBrightness {
        value: i64,
        /// Monitor id; all live monitors when absent
        #[serde(default)]
        monitor: Option<String>,
    },
    CommitBrightness {
        value: i64,
        #[serde(default)]
        monitor: Option<String>,
    },
    RestartService,
    /// Turn the connection into an event stream
    Subscribe,
}

/// Current and maximum value of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    pub monitor: String,
    pub code: u8,
    pub name: String,
    pub current: u16,
    pub max: Option<u16>,
    /// Name of the current value for discrete features
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Status(Box<StatusReport>),
    Monitors { monitors: Vec<MonitorInfo> },
    Refreshed(RefreshSummary),
    Monitor(Box<MonitorInfo>),
    Feature(FeatureValue),
    Offset { monitor: String, offset: i32 },
    Exported(MonitorSettings),
    Imported { monitor: String, outcome: ImportOutcome },
    Settings(Box<Config>),
    Location(LocationInfo),
    PreviewQueued { target: String, value: u8 },
    Committed { target: String, value: u8, outcome: ApplyOutcome },
    Restarting { service: String },
    Subscribed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Ok { reply: Reply },
    Error { kind: String, message: String },
}

impl Response {
    /// Build a response from a controller result, classifying the error.
    pub fn from_result(result: anyhow::Result<Reply>) -> Self {
        match result {
            Ok(reply) => Response::Ok { reply },
            Err(e) => match control_error(&e) {
                Some(kind) => Response::Error {
                    kind: kind.kind().to_string(),
                    message: kind.to_string(),
                },
                None => Response::Error {
                    kind: INTERNAL_ERROR_KIND.to_string(),
                    message: format!("{e:#}"),
                },
            },
        }
    }

    /// Turn a response back into a result on the client side.
    pub fn into_result(self) -> anyhow::Result<Reply> {
        match self {
            Response::Ok { reply } => Ok(reply),
            Response::Error { kind, message } => match ControlError::from_wire(&kind, &message) {
                Some(error) => Err(error.into()),
                None => Err(anyhow::anyhow!("{message}")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request: Request =
            serde_json::from_str(r#"{"command":"set_offset","monitor":"i2c-6","offset":-10}"#)
                .unwrap();
        assert_eq!(
            request,
            Request::SetOffset {
                monitor: "i2c-6".into(),
                offset: -10
            }
        );

        let request: Request =
            serde_json::from_str(r#"{"command":"preview_brightness","value":40}"#).unwrap();
        assert_eq!(
            request,
            Request::PreviewBrightness {
                value: 40,
                monitor: None
            }
        );

        let json = serde_json::to_string(&Request::Status).unwrap();
        assert_eq!(json, r#"{"command":"status"}"#);
        assert!(serde_json::from_str::<Request>(r#"{"command":"explode"}"#).is_err());
    }

    #[test]
    fn test_error_response_keeps_kind() {
        let response = Response::from_result(Err(invalid_input!("offset 70 out of range")));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""result":"error""#));
        assert!(json.contains(r#""kind":"invalid_input""#));

        let parsed: Response = serde_json::from_str(&json).unwrap();
        let err = parsed.into_result().unwrap_err();
        assert_eq!(control_error(&err).map(|e| e.kind()), Some("invalid_input"));
    }

    #[test]
    fn test_unclassified_errors_are_internal() {
        let response = Response::from_result(Err(anyhow::anyhow!("disk on fire")));
        assert_eq!(
            response,
            Response::Error {
                kind: "internal".into(),
                message: "disk on fire".into()
            }
        );
    }

    #[test]
    fn test_settings_snapshot_wire_format() {
        let json = r#"{"command":"import_settings","monitor":"i2c-7","snapshot":{"monitor":"i2c-6","settings":[{"code":16,"name":"Brightness","value":70}]}}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        let Request::ImportSettings { monitor, snapshot } = &request else {
            panic!("expected import request, got {request:?}");
        };
        assert_eq!(monitor, "i2c-7");
        assert_eq!(snapshot.monitor, "i2c-6");
        assert_eq!(snapshot.settings[0].value, 70);
        assert_eq!(serde_json::to_string(&request).unwrap(), json);

        let reply = Reply::Exported(snapshot.clone());
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.starts_with(r#"{"type":"exported","monitor":"i2c-6""#), "{json}");
        assert_eq!(serde_json::from_str::<Reply>(&json).unwrap(), reply);
    }

    #[test]
    fn test_reply_wire_format() {
        let response = Response::Ok {
            reply: Reply::Offset {
                monitor: "i2c-6".into(),
                offset: -10,
            },
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"result":"ok","reply":{"type":"offset","monitor":"i2c-6","offset":-10}}"#
        );
    }
}
