//! Typed VCP features and the table of codes solbright knows by name.
//!
//! A monitor's capability string only says which codes exist and, for some,
//! which values they accept. The table here adds names and value ranges for
//! the codes in common use so the controller can clamp requests before they
//! reach the bus.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::common::constants::FREE_NUMERIC_MAX;

pub const VCP_RESTORE_COLOR_DEFAULTS: u8 = 0x08;
pub const VCP_COLOR_TEMP_INCREMENT: u8 = 0x0B;
pub const VCP_COLOR_TEMP_REQUEST: u8 = 0x0C;
pub const VCP_BRIGHTNESS: u8 = 0x10;
pub const VCP_CONTRAST: u8 = 0x12;
pub const VCP_BACKLIGHT: u8 = 0x13;
pub const VCP_COLOR_PRESET: u8 = 0x14;
pub const VCP_RED_GAIN: u8 = 0x16;
pub const VCP_GREEN_GAIN: u8 = 0x18;
pub const VCP_BLUE_GAIN: u8 = 0x1A;
pub const VCP_INPUT_SOURCE: u8 = 0x60;
pub const VCP_POWER_MODE: u8 = 0xD6;

/// How a feature's value may be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureKind {
    /// Slider over an inclusive range
    Continuous { min: u16, max: u16 },
    /// Combo box; only the listed codes are accepted
    Discrete {
        #[serde(with = "value_list")]
        values: BTreeMap<u16, String>,
    },
    /// Stepper
    Incremental { min: u16, max: u16, step: u16 },
    /// Raw number for codes we have no model for
    FreeNumeric { min: u16, max: u16 },
    ReadOnly,
}

/// Discrete values travel as a list of `{value, label}` pairs. JSON object
/// keys are strings, and the buffering behind the internal `type` tag cannot
/// turn them back into integers.
mod value_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Entry<'a> {
        value: u16,
        label: &'a str,
    }

    #[derive(Deserialize)]
    struct OwnedEntry {
        value: u16,
        label: String,
    }

    pub fn serialize<S: Serializer>(
        values: &BTreeMap<u16, String>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|(value, label)| Entry {
            value: *value,
            label,
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<u16, String>, D::Error> {
        let entries = Vec::<OwnedEntry>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.value, e.label)).collect())
    }
}

/// One VCP feature supported by a monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub code: u8,
    pub name: String,
    pub kind: FeatureKind,
}

impl Feature {
    pub fn new(code: u8, name: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            code,
            name: name.into(),
            kind,
        }
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self.kind, FeatureKind::ReadOnly)
    }

    /// Bring a requested value inside the feature's bounds.
    ///
    /// Ranges clamp to their ends, steppers also round to the nearest step,
    /// and discrete features snap to the closest allowed code (the lower code
    /// wins a tie). Read-only features reject every write.
    pub fn clamp(&self, requested: i64) -> Result<u16> {
        match &self.kind {
            FeatureKind::Continuous { min, max } | FeatureKind::FreeNumeric { min, max } => {
                Ok(requested.clamp(i64::from(*min), i64::from(*max)) as u16)
            }
            FeatureKind::Incremental { min, max, step } => {
                let (min, max) = (i64::from(*min), i64::from(*max));
                let step = i64::from((*step).max(1));
                let clamped = requested.clamp(min, max);
                let snapped = min + ((clamped - min) as f64 / step as f64).round() as i64 * step;
                Ok(snapped.min(max) as u16)
            }
            FeatureKind::Discrete { values } => values
                .keys()
                .min_by_key(|code| (i64::from(**code) - requested).abs())
                .copied()
                .ok_or_else(|| {
                    invalid_input!("feature {:02X} ({}) has no allowed values", self.code, self.name)
                }),
            FeatureKind::ReadOnly => Err(invalid_input!(
                "feature {:02X} ({}) is read-only",
                self.code,
                self.name
            )),
        }
    }

    /// Label of a value for display, when the feature names its values.
    pub fn value_label(&self, value: u16) -> Option<&str> {
        match &self.kind {
            FeatureKind::Discrete { values } => values.get(&value).map(String::as_str),
            _ => None,
        }
    }
}

fn labels(pairs: &[(u16, &str)]) -> BTreeMap<u16, String> {
    pairs.iter().map(|(k, v)| (*k, (*v).to_string())).collect()
}

fn slider() -> FeatureKind {
    FeatureKind::Continuous { min: 0, max: 100 }
}

/// Name and kind for a code we know.
///
/// Returns `None` for codes outside the table.
pub fn known_feature(code: u8) -> Option<Feature> {
    let (name, kind) = match code {
        VCP_RESTORE_COLOR_DEFAULTS => (
            "Restore Color Defaults",
            FeatureKind::Discrete {
                values: labels(&[(1, "Restore")]),
            },
        ),
        VCP_COLOR_TEMP_INCREMENT => (
            "Color Temperature Increment",
            FeatureKind::Incremental {
                min: 0,
                max: 20,
                step: 1,
            },
        ),
        VCP_COLOR_TEMP_REQUEST => (
            "Color Temperature Request",
            FeatureKind::Discrete {
                values: labels(&[
                    (1, "3000K"),
                    (2, "4000K"),
                    (3, "5000K"),
                    (4, "6500K"),
                    (5, "7500K"),
                    (6, "9300K"),
                    (7, "10000K"),
                ]),
            },
        ),
        VCP_BRIGHTNESS => ("Brightness", slider()),
        VCP_CONTRAST => ("Contrast", slider()),
        VCP_BACKLIGHT => ("Backlight", slider()),
        VCP_COLOR_PRESET => (
            "Color Preset",
            FeatureKind::Discrete {
                values: labels(&[
                    (1, "sRGB"),
                    (2, "Adobe RGB"),
                    (3, "Wide Gamut"),
                    (4, "Native"),
                    (5, "User 1"),
                    (6, "User 2"),
                    (7, "User 3"),
                    (8, "6500K"),
                    (9, "7500K"),
                    (10, "9300K"),
                    (11, "Custom"),
                ]),
            },
        ),
        VCP_RED_GAIN => ("Red Gain", slider()),
        VCP_GREEN_GAIN => ("Green Gain", slider()),
        VCP_BLUE_GAIN => ("Blue Gain", slider()),
        0x6C => ("Red Black Level", FeatureKind::Incremental { min: 0, max: 100, step: 1 }),
        0x6E => ("Green Black Level", FeatureKind::Incremental { min: 0, max: 100, step: 1 }),
        0x70 => ("Blue Black Level", FeatureKind::Incremental { min: 0, max: 100, step: 1 }),
        0x87 => ("Sharpness", slider()),
        0x8A => ("Saturation", slider()),
        0x90 => ("Hue", slider()),
        VCP_INPUT_SOURCE => (
            "Input Source",
            FeatureKind::Discrete {
                values: labels(&[
                    (0x01, "VGA 1"),
                    (0x02, "VGA 2"),
                    (0x03, "DVI 1"),
                    (0x04, "DVI 2"),
                    (0x0F, "DisplayPort 1"),
                    (0x10, "DisplayPort 2"),
                    (0x11, "HDMI 1"),
                    (0x12, "HDMI 2"),
                    (0x13, "HDMI 3"),
                    (0x14, "HDMI 4"),
                    (0x1B, "USB-C"),
                ]),
            },
        ),
        VCP_POWER_MODE => (
            "Power Mode",
            FeatureKind::Discrete {
                values: labels(&[
                    (1, "On"),
                    (2, "Standby"),
                    (3, "Suspend"),
                    (4, "Off"),
                    (5, "Off (hard)"),
                ]),
            },
        ),
        0xAC => ("Horizontal Frequency", FeatureKind::ReadOnly),
        0xAE => ("Vertical Frequency", FeatureKind::ReadOnly),
        0xC0 => ("Display Usage Time", FeatureKind::ReadOnly),
        0xC6 => ("Application Enable Key", FeatureKind::ReadOnly),
        0xC8 => ("Display Controller Type", FeatureKind::ReadOnly),
        0xC9 => ("Firmware Level", FeatureKind::ReadOnly),
        0xDF => ("VCP Version", FeatureKind::ReadOnly),
        _ => return None,
    };
    Some(Feature::new(code, name, kind))
}

/// Build the feature for a code found in a capability string.
///
/// `advertised` holds the value codes listed next to the feature, if any.
/// For discrete features the advertised list narrows the known table; labels
/// the table lacks are shown as hex. Unknown codes with a value list become
/// discrete, without one they become free numeric 0-255.
pub fn feature_from_capability(code: u8, advertised: Option<&BTreeMap<u16, String>>) -> Feature {
    let known = known_feature(code);

    match (known, advertised) {
        (Some(mut feature), Some(advertised)) if !advertised.is_empty() => {
            if let FeatureKind::Discrete { values } = &feature.kind {
                let narrowed = advertised
                    .iter()
                    .map(|(value, label)| {
                        let label = values
                            .get(value)
                            .cloned()
                            .unwrap_or_else(|| fallback_label(*value, label));
                        (*value, label)
                    })
                    .collect();
                feature.kind = FeatureKind::Discrete { values: narrowed };
            }
            feature
        }
        (Some(feature), _) => feature,
        (None, Some(advertised)) if !advertised.is_empty() => Feature::new(
            code,
            format!("VCP {code:02X}"),
            FeatureKind::Discrete {
                values: advertised
                    .iter()
                    .map(|(value, label)| (*value, fallback_label(*value, label)))
                    .collect(),
            },
        ),
        (None, _) => Feature::new(
            code,
            format!("VCP {code:02X}"),
            FeatureKind::FreeNumeric {
                min: 0,
                max: FREE_NUMERIC_MAX,
            },
        ),
    }
}

fn fallback_label(value: u16, label: &str) -> String {
    if label.is_empty() {
        format!("0x{value:02X}")
    } else {
        label.to_string()
    }
}
