// Wire models for the Domoja server.
//
// These mirror the JSON the server sends, field for field. Conversion
// into domain types (timestamp detection, state tagging) lives in
// `domoja-core`.

use serde::{Deserialize, Serialize};

/// A device record as returned by `GET /devices`.
///
/// Uses `#[serde(flatten)]` to capture all fields beyond the core set,
/// so nothing from the server is silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Usually identical to `path`, e.g. `"piscine.filtration-duration"`.
    #[serde(default)]
    pub id: Option<String>,

    /// Stable unique key of the device.
    pub path: String,

    /// Current state: a string, a number, or an ISO-8601 timestamp string.
    #[serde(default)]
    pub state: serde_json::Value,

    /// ISO-8601 timestamp of the last state change.
    #[serde(default)]
    pub last_update_date: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// Device kind, e.g. `"variable"`, `"device"`, `"sensor"`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[serde(default)]
    pub source: Option<String>,

    /// UI widget hint, e.g. `"text!{value, number, .##}"`.
    #[serde(default)]
    pub widget: Option<String>,

    /// Comma-separated tag list, e.g. `" piscine, "`.
    #[serde(default)]
    pub tags: Option<String>,

    /// All remaining fields the server sends.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Result of a login round-trip that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The server set a session cookie. Holds the normalized `Cookie` header value.
    Session(String),
    /// The server answered without establishing a session.
    NoSession { status: u16 },
}

/// Payload of a `change` push event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Path of the device whose state changed.
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub old_value: serde_json::Value,

    #[serde(default)]
    pub new_value: serde_json::Value,

    /// ISO-8601 timestamp of the change, as sent by the server.
    #[serde(default)]
    pub date: Option<String>,
}
