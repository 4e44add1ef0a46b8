//! Normalization of raw telemetry payloads.
//!
//! Zigbee2MQTT and vendor registries disagree on attribute names and are
//! not strict about value types. Everything here is lenient: a value that
//! cannot be read as a finite number is treated as absent.

use serde_json::{Map, Value};
use time::OffsetDateTime;

use zigsight_types::MetricsSnapshot;

use crate::error::{Error, Result};

/// Attribute names carrying link quality, in lookup order.
pub const LINK_QUALITY_KEYS: [&str; 2] = ["linkquality", "link_quality"];

/// Attribute names carrying battery percentage, in lookup order.
pub const BATTERY_KEYS: [&str; 2] = ["battery", "battery_percent"];

/// Read a JSON value as a finite number.
///
/// Numbers and numeric strings are accepted; anything else yields `None`.
///
/// ```
/// use serde_json::json;
/// use zigsight_core::payload::as_number;
///
/// assert_eq!(as_number(&json!(87)), Some(87.0));
/// assert_eq!(as_number(&json!(" 42.5 ")), Some(42.5));
/// assert_eq!(as_number(&json!("n/a")), None);
/// assert_eq!(as_number(&json!(null)), None);
/// ```
pub fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// First numeric value among `keys`.
fn first_number(payload: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(as_number)
}

/// Build a metrics snapshot from a raw device payload received at `now`.
pub fn normalize_metrics(payload: &Map<String, Value>, now: OffsetDateTime) -> MetricsSnapshot {
    MetricsSnapshot {
        link_quality: first_number(payload, &LINK_QUALITY_KEYS),
        battery: first_number(payload, &BATTERY_KEYS),
        voltage: payload.get("voltage").and_then(as_number),
        last_seen: Some(now),
        last_message: payload.clone(),
    }
}

/// The friendly name a payload declares for its device, if any.
pub fn declared_friendly_name(payload: &Map<String, Value>) -> Option<&str> {
    payload
        .get("friendly_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
}

/// Parse a raw message body into a JSON object.
pub fn parse_object(bytes: &[u8]) -> Result<Map<String, Value>> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidData(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
