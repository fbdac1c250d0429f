//! Capability string parsing.
//!
//! Two layouts are accepted:
//!
//! - The raw MCCS string a monitor returns, for example
//!   `(prot(monitor)type(lcd)model(U2720Q)vcp(10 12 14(05 08) 60(0F 11))mccs_ver(2.1))`
//! - The report printed by `ddcutil capabilities`, with `Model:`,
//!   `MCCS version:` and one `Feature: XX (name)` line per code, optionally
//!   followed by a `Values:` block.
//!
//! Monitors are sloppy about this string. Entries that cannot be parsed are
//! dropped and listed in [`ParsedCapabilities::skipped`]; parsing itself never
//! fails.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::features::{Feature, feature_from_capability, known_feature};

static FEATURE_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*Feature:\s*(\S+)\s*(?:\((.*)\))?\s*$").ok());
static VALUE_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*([0-9A-Fa-f]{1,4}):\s*(.*?)\s*$").ok());

/// Result of parsing one monitor's capabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedCapabilities {
    pub model: Option<String>,
    pub mccs_version: Option<String>,
    pub features: BTreeMap<u8, Feature>,
    /// Entries that were dropped, as they appeared in the input
    pub skipped: Vec<String>,
}

impl ParsedCapabilities {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Parse either capability layout.
pub fn parse_capabilities(text: &str) -> ParsedCapabilities {
    let is_report = text
        .lines()
        .any(|line| line.trim_start().starts_with("Feature:"));

    if is_report {
        parse_report(text)
    } else {
        parse_raw(text)
    }
}

fn parse_hex_u8(token: &str) -> Option<u8> {
    let token = token.trim().trim_start_matches("0x");
    if token.is_empty() || token.len() > 2 {
        return None;
    }
    u8::from_str_radix(token, 16).ok()
}

fn parse_hex_u16(token: &str) -> Option<u16> {
    let token = token.trim().trim_start_matches("0x");
    if token.is_empty() || token.len() > 4 {
        return None;
    }
    u16::from_str_radix(token, 16).ok()
}

// ═══ Raw MCCS string ═══

/// Contents of the balanced group following `key(`, if present.
fn section<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("{key}(");
    let mut search_from = 0;

    while let Some(found) = text[search_from..].find(&needle) {
        let start = search_from + found;
        let preceded_by_word = text[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let open = start + needle.len();
        if preceded_by_word {
            search_from = open;
            continue;
        }

        let mut depth = 1usize;
        for (offset, c) in text[open..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&text[open..open + offset]);
                    }
                }
                _ => {}
            }
        }
        // Unbalanced: take the rest so the entries we can read survive
        return Some(&text[open..]);
    }
    None
}

fn parse_raw(text: &str) -> ParsedCapabilities {
    let mut parsed = ParsedCapabilities {
        model: section(text, "model").map(|s| s.trim().to_string()),
        mccs_version: section(text, "mccs_ver").map(|s| s.trim().to_string()),
        ..Default::default()
    };

    let Some(vcp) = section(text, "vcp") else {
        return parsed;
    };

    let chars: Vec<char> = vcp.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '(' && chars[i] != ')'
        {
            i += 1;
        }
        let token: String = chars[start..i].iter().collect();

        let mut group = None;
        if i < chars.len() && chars[i] == '(' {
            let open = i + 1;
            let mut depth = 1usize;
            i += 1;
            while i < chars.len() && depth > 0 {
                match chars[i] {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
                i += 1;
            }
            let close = if depth == 0 { i - 1 } else { i };
            group = Some((chars[open..close].iter().collect::<String>(), depth == 0));
        } else if token.is_empty() {
            // Stray closing parenthesis
            parsed.skipped.push(chars[i].to_string());
            i += 1;
            continue;
        }

        let entry = match &group {
            Some((values, _)) => format!("{token}({values})"),
            None => token.clone(),
        };

        let Some(code) = parse_hex_u8(&token) else {
            parsed.skipped.push(entry);
            continue;
        };

        let advertised = match group {
            Some((_, false)) => {
                parsed.skipped.push(entry);
                continue;
            }
            Some((values, true)) => {
                let mut map = BTreeMap::new();
                for value in values.split_whitespace() {
                    match parse_hex_u16(value) {
                        Some(v) => {
                            map.insert(v, String::new());
                        }
                        None => parsed.skipped.push(format!("{token}({value})")),
                    }
                }
                Some(map)
            }
            None => None,
        };

        parsed
            .features
            .insert(code, feature_from_capability(code, advertised.as_ref()));
    }

    parsed
}

// ═══ ddcutil report ═══

struct PendingFeature {
    code: u8,
    name: Option<String>,
    values: BTreeMap<u16, String>,
    in_values: bool,
}

fn finish(parsed: &mut ParsedCapabilities, pending: Option<PendingFeature>) {
    let Some(pending) = pending else {
        return;
    };
    let advertised = (!pending.values.is_empty()).then_some(&pending.values);
    let mut feature = feature_from_capability(pending.code, advertised);
    if known_feature(pending.code).is_none()
        && let Some(name) = pending.name.filter(|n| !n.is_empty())
    {
        feature.name = name;
    }
    parsed.features.insert(pending.code, feature);
}

fn parse_report(text: &str) -> ParsedCapabilities {
    let mut parsed = ParsedCapabilities::default();
    let (Some(feature_re), Some(value_re)) = (FEATURE_LINE.as_ref(), VALUE_LINE.as_ref()) else {
        return parsed;
    };

    let mut pending: Option<PendingFeature> = None;
    let mut in_feature_block = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(model) = trimmed.strip_prefix("Model:") {
            parsed.model = Some(model.trim().to_string());
            continue;
        }
        if let Some(version) = trimmed.strip_prefix("MCCS version:") {
            parsed.mccs_version = Some(version.trim().to_string());
            continue;
        }
        if trimmed.starts_with("VCP Features:") {
            in_feature_block = true;
            continue;
        }

        if let Some(caps) = feature_re.captures(line) {
            finish(&mut parsed, pending.take());
            in_feature_block = true;
            let raw = caps.get(1).map_or("", |m| m.as_str());
            match parse_hex_u8(raw) {
                Some(code) => {
                    pending = Some(PendingFeature {
                        code,
                        name: caps.get(2).map(|m| m.as_str().trim().to_string()),
                        values: BTreeMap::new(),
                        in_values: false,
                    })
                }
                None => parsed.skipped.push(trimmed.to_string()),
            }
            continue;
        }

        let Some(current) = pending.as_mut() else {
            if in_feature_block {
                parsed.skipped.push(trimmed.to_string());
            }
            continue;
        };

        if let Some(rest) = trimmed.strip_prefix("Values:") {
            current.in_values = true;
            // Inline form: "Values: 01 02 03 (interpretation unavailable)"
            let inline = rest.split('(').next().unwrap_or("");
            for token in inline.split_whitespace() {
                match parse_hex_u16(token) {
                    Some(v) => {
                        current.values.insert(v, String::new());
                    }
                    None => parsed.skipped.push(format!("{:02X}: {token}", current.code)),
                }
            }
            continue;
        }

        if current.in_values {
            match value_re.captures(line) {
                Some(caps) => {
                    let value = caps.get(1).and_then(|m| parse_hex_u16(m.as_str()));
                    let label = caps.get(2).map_or("", |m| m.as_str()).to_string();
                    match value {
                        Some(v) => {
                            current.values.insert(v, label);
                        }
                        None => parsed.skipped.push(trimmed.to_string()),
                    }
                }
                None => parsed.skipped.push(trimmed.to_string()),
            }
        }
    }
    finish(&mut parsed, pending);

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddc::features::{FeatureKind, VCP_BRIGHTNESS, VCP_COLOR_PRESET, VCP_INPUT_SOURCE};

    const RAW: &str = "(prot(monitor)type(lcd)model(U2720Q)cmds(01 02 03 07 0C E3 F3)\
vcp(02 04 05 08 10 12 14(05 08 0B) 16 18 1A 52 60(0F 11 1B) AC AE B2 B6 C6 C8 C9 D6(01 04) DF E2)\
mccs_ver(2.1))";

    const REPORT: &str = "\
Model: U2720Q
MCCS version: 2.1
Commands:
   Op Code: 01 (VCP Request)
VCP Features:
   Feature: 10 (Brightness)
   Feature: 12 (Contrast)
   Feature: 14 (Select color preset)
      Values:
         05: 6500 K
         08: 9300 K
   Feature: 60 (Input Source)
      Values:
         0f: DisplayPort-1
         11: HDMI-1
   Feature: D6 (Power mode)
      Values: 01 04 (interpretation unavailable)
   Feature: E2 (Manufacturer specific)
";

    #[test]
    fn test_parse_raw_string() {
        let parsed = parse_capabilities(RAW);
        assert_eq!(parsed.model.as_deref(), Some("U2720Q"));
        assert_eq!(parsed.mccs_version.as_deref(), Some("2.1"));
        assert!(parsed.is_complete());
        assert!(parsed.features.contains_key(&VCP_BRIGHTNESS));

        let FeatureKind::Discrete { values } = &parsed.features[&VCP_INPUT_SOURCE].kind else {
            panic!("input source should be discrete");
        };
        assert_eq!(values.keys().copied().collect::<Vec<_>>(), vec![0x0F, 0x11, 0x1B]);
        assert_eq!(parsed.features[&0xC9].kind, FeatureKind::ReadOnly);
    }

    #[test]
    fn test_parse_report_layout() {
        let parsed = parse_capabilities(REPORT);
        assert_eq!(parsed.model.as_deref(), Some("U2720Q"));
        assert_eq!(parsed.features.len(), 6);
        assert!(parsed.is_complete(), "skipped: {:?}", parsed.skipped);

        // Known labels win over the report's
        assert_eq!(parsed.features[&VCP_COLOR_PRESET].value_label(0x05), Some("User 1"));
        assert_eq!(parsed.features[&0xE2].name, "Manufacturer specific");

        let FeatureKind::Discrete { values } = &parsed.features[&0xD6].kind else {
            panic!("power mode should be discrete");
        };
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let parsed = parse_capabilities("(model(X)vcp(10 ZZ 12 14(05 QQ) 60(0F 11)");
        assert!(parsed.features.contains_key(&0x10));
        assert!(parsed.features.contains_key(&0x12));
        assert!(parsed.features.contains_key(&0x14));
        assert!(parsed.features.contains_key(&0x60));
        assert_eq!(parsed.skipped, vec!["ZZ".to_string(), "14(QQ)".to_string()]);
    }

    #[test]
    fn test_unterminated_group_is_skipped() {
        let parsed = parse_capabilities("(vcp(10 60(0F 11");
        assert!(parsed.features.contains_key(&0x10));
        assert!(!parsed.features.contains_key(&0x60));
        assert_eq!(parsed.skipped.len(), 1);
    }

    #[test]
    fn test_missing_vcp_section() {
        let parsed = parse_capabilities("(prot(monitor)model(Y))");
        assert!(parsed.features.is_empty());
        assert_eq!(parsed.model.as_deref(), Some("Y"));
    }

    #[test]
    fn test_vcpname_is_not_vcp() {
        let parsed = parse_capabilities("(vcpname(10(Light)) vcp(12))");
        assert_eq!(parsed.features.keys().copied().collect::<Vec<_>>(), vec![0x12]);
    }
}
