//! Error kinds shared by the control and hardware layers.
//!
//! Functions across the crate return `anyhow::Result`; when a failure belongs
//! to one of the kinds below it is raised as a [`ControlError`] inside the
//! `anyhow::Error`, so callers at the IPC boundary can recover the kind with
//! `downcast_ref` and report it to clients. None of these kinds stops the
//! daemon.

use std::fmt;

/// Classified failure of a control operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    /// Out-of-range coordinates, brightness bounds, offsets or feature values.
    /// The previous valid value is kept.
    InvalidInput(String),
    /// The bus failed for one monitor after the retry budget was exhausted.
    HardwareUnavailable { monitor: String, reason: String },
    /// Some entries of a capability string could not be parsed and were dropped.
    CapabilityParseIncomplete { monitor: String, skipped: usize },
    /// The geocoder could not resolve a location name.
    LocationLookupFailure(String),
}

impl ControlError {
    /// Stable snake_case name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlError::InvalidInput(_) => "invalid_input",
            ControlError::HardwareUnavailable { .. } => "hardware_unavailable",
            ControlError::CapabilityParseIncomplete { .. } => "capability_parse_incomplete",
            ControlError::LocationLookupFailure(_) => "location_lookup_failure",
        }
    }

    /// Rebuild an error from the kind and message reported by the daemon.
    pub fn from_wire(kind: &str, message: &str) -> Option<Self> {
        let message = message.to_string();
        match kind {
            "invalid_input" => Some(ControlError::InvalidInput(message)),
            "hardware_unavailable" => Some(ControlError::HardwareUnavailable {
                monitor: String::new(),
                reason: message,
            }),
            "capability_parse_incomplete" => Some(ControlError::CapabilityParseIncomplete {
                monitor: message,
                skipped: 0,
            }),
            "location_lookup_failure" => Some(ControlError::LocationLookupFailure(message)),
            _ => None,
        }
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::InvalidInput(message) => write!(f, "{message}"),
            ControlError::HardwareUnavailable { monitor, reason } if monitor.is_empty() => {
                write!(f, "{reason}")
            }
            ControlError::HardwareUnavailable { monitor, reason } => {
                write!(f, "monitor {monitor} unavailable: {reason}")
            }
            ControlError::CapabilityParseIncomplete { monitor, skipped } => write!(
                f,
                "capabilities of {monitor} parsed with {skipped} malformed entries skipped"
            ),
            ControlError::LocationLookupFailure(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ControlError {}

/// Find the [`ControlError`] carried by an `anyhow` error chain, if any.
pub fn control_error(error: &anyhow::Error) -> Option<&ControlError> {
    error.chain().find_map(|cause| cause.downcast_ref::<ControlError>())
}

/// Build an `anyhow::Error` of kind [`ControlError::InvalidInput`].
#[macro_export]
macro_rules! invalid_input {
    ($($arg:tt)+) => {
        ::anyhow::Error::from($crate::common::error::ControlError::InvalidInput(format!($($arg)+)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_kind_survives_context() {
        let err: anyhow::Result<()> = Err(invalid_input!("offset {} out of range", 70));
        let err = err.context("set_offset failed").unwrap_err();
        let found = control_error(&err).expect("kind should be preserved");
        assert_eq!(found.kind(), "invalid_input");
        assert_eq!(found.to_string(), "offset 70 out of range");
    }

    #[test]
    fn test_wire_round_trip_kinds() {
        for kind in [
            "invalid_input",
            "hardware_unavailable",
            "capability_parse_incomplete",
            "location_lookup_failure",
        ] {
            let err = ControlError::from_wire(kind, "msg").unwrap();
            assert_eq!(err.kind(), kind);
        }
        assert!(ControlError::from_wire("internal", "msg").is_none());
    }
}
