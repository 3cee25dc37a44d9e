//! Helpers shared by the resource services for turning JSON payloads into
//! records and enforcing the caller-side field rules.

use crate::ApplicationError;
use domain::{Record, RecordId};
use serde_json::{Map, Value};
use tracing::warn;

pub const CREATED_AT_FIELD: &str = "created_at";

/// Textual format of `created_at`, e.g. `2025-11-15 14:36:43.122189`.
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Fails with every required field that is absent, null or blank.
pub fn require_fields(
    payload: &Map<String, Value>,
    required: &[&str],
) -> Result<(), ApplicationError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|field| payload.get(**field).is_none_or(is_blank))
        .map(|field| field.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        warn!(?missing, "Payload is missing required fields");
        Err(ApplicationError::MissingFields(missing))
    }
}

/// Fails with every blocked field present in the payload.
pub fn reject_blocked(
    payload: &Map<String, Value>,
    blocked: &[&str],
) -> Result<(), ApplicationError> {
    let present: Vec<String> = blocked
        .iter()
        .filter(|field| payload.contains_key(**field))
        .map(|field| field.to_string())
        .collect();
    if present.is_empty() {
        Ok(())
    } else {
        warn!(blocked = ?present, "Payload touches blocked fields");
        Err(ApplicationError::BlockedFields(present))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

pub fn to_record(payload: &Map<String, Value>) -> Result<Record, ApplicationError> {
    Ok(Record::from_json_object(payload)?)
}

/// Current local time in the `created_at` format.
pub fn timestamp() -> String {
    chrono::Local::now().format(CREATED_AT_FORMAT).to_string()
}

/// Parses a foreign-key field; blank or non-numeric text yields `None`.
pub fn reference(record: &Record, field: &str) -> Option<RecordId> {
    record.get(field).and_then(|text| text.parse().ok())
}

/// JSON view of a record with the given fields left out.
pub fn view_without(record: &Record, hidden: &[&str]) -> Map<String, Value> {
    let mut view = record.to_json_object();
    for field in hidden {
        view.remove(*field);
    }
    view
}
