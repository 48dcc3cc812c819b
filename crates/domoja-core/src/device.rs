// ── Device domain type ──
//
// Converted from `domoja_api::DeviceRecord`. Timestamp-shaped strings are
// promoted to `DateTime<Utc>` anywhere in the record, including nested
// attribute objects.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use domoja_api::DeviceRecord;

/// Device state or attribute value with timestamps told apart from text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Timestamp(DateTime<Utc>),
    Text(String),
    List(Vec<DeviceValue>),
    Map(BTreeMap<String, DeviceValue>),
}

impl DeviceValue {
    /// Convert wire JSON, recognising ISO-8601 UTC timestamps at any depth.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => parse_timestamp(&s).map_or(Self::Text(s), Self::Timestamp),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Back to JSON. Timestamps render as RFC 3339 with milliseconds.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Timestamp(t) => Value::String(format_timestamp(t)),
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Timestamp(t) => f.write_str(&format_timestamp(t)),
            other => f.write_str(&crate::mapping::display_value(&other.to_json())),
        }
    }
}

/// A remote device, keyed by its path.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub path: String,
    pub state: DeviceValue,
    pub last_update: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub source: Option<String>,
    pub widget: Option<String>,
    tags: Option<String>,
    /// Remaining record fields, timestamps normalized.
    pub attributes: BTreeMap<String, DeviceValue>,
}

impl Device {
    /// Tag list, split on commas with blanks dropped.
    pub fn tags(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Current state as JSON, the form fed to the value transformer.
    pub fn state_json(&self) -> Value {
        self.state.to_json()
    }

    /// Apply a pushed state change. Only state and update date move.
    pub fn apply_state(&mut self, state: DeviceValue, at: DateTime<Utc>) {
        self.state = state;
        self.last_update = Some(at);
    }
}

impl From<DeviceRecord> for Device {
    fn from(record: DeviceRecord) -> Self {
        let mut attributes: BTreeMap<String, DeviceValue> = record
            .extra
            .into_iter()
            .map(|(k, v)| (k, DeviceValue::from_json(v)))
            .collect();
        if let Some(id) = record.id.filter(|id| *id != record.path) {
            attributes.insert("id".into(), DeviceValue::Text(id));
        }

        Self {
            state: DeviceValue::from_json(record.state),
            last_update: record.last_update_date.as_deref().and_then(parse_timestamp),
            name: record.name,
            kind: record.kind,
            source: record.source,
            widget: record.widget,
            tags: record.tags,
            attributes,
            path: record.path,
        }
    }
}

// ── Timestamps ───────────────────────────────────────────────────────

/// Parse `YYYY-MM-DDTHH:MM:SSZ` or `YYYY-MM-DDTHH:MM:SS.mmmZ`.
///
/// The whole string must have that shape; text merely containing a date
/// stays text.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if !has_timestamp_shape(s) {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn has_timestamp_shape(s: &str) -> bool {
    const SHAPE: &[u8] = b"dddd-dd-ddTdd:dd:dd";

    let bytes = s.as_bytes();
    let (head, tail) = match bytes.len() {
        20 | 24 => bytes.split_at(SHAPE.len()),
        _ => return false,
    };

    let head_ok = head.iter().zip(SHAPE).all(|(b, shape)| match shape {
        b'd' => b.is_ascii_digit(),
        other => b == other,
    });

    head_ok
        && match tail {
            [b'Z'] => true,
            [b'.', a, b, c, b'Z'] => a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit(),
            _ => false,
        }
}
