//! Conversion between local events and remote documents.
//!
//! Outgoing records lose their scheduler internals and get their dates turned
//! into timestamps. Incoming documents get their timestamps turned back into
//! native dates. A date that cannot be converted becomes null; it never fails
//! the whole record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::error;

use crate::error::{SyncError, SyncResult};
use crate::event::{
    DATE_FIELDS, EDITOR_STATUS_FIELD, FROM_REMOTE_MARKER, FieldValue, INTERNAL_PREFIX, LocalEvent,
};
use crate::wire::{Document, DocumentData, Timestamp, WireValue};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Build the payload written to the remote store for a local event.
///
/// Note that the echo marker is set here, on the data going out, and every
/// document in the collection therefore carries it.
pub fn serialize(event: &LocalEvent) -> DocumentData {
    let mut data: DocumentData = event
        .fields
        .iter()
        .filter(|(key, _)| is_persisted_field(key))
        .map(|(key, value)| (key.clone(), to_wire(value)))
        .collect();

    data.insert(FROM_REMOTE_MARKER.to_string(), WireValue::Json(Value::Bool(true)));
    data
}

/// Build a local event from a remote document, using the document id as event id.
pub fn deserialize(doc: &Document) -> LocalEvent {
    let mut event = LocalEvent::new(&doc.id);

    for (key, value) in &doc.data {
        if key == "id" {
            continue;
        }
        let field = if DATE_FIELDS.contains(&key.as_str()) {
            date_from_wire(&doc.id, key, value)
        } else {
            from_wire(value)
        };
        event.fields.insert(key.clone(), field);
    }

    event
}

/// Turn any date field still holding a loose value into a native date.
pub fn normalize_dates(event: &mut LocalEvent) {
    for field in DATE_FIELDS {
        let Some(FieldValue::Json(value)) = event.fields.get(field) else {
            continue;
        };
        if !FieldValue::Json(value.clone()).is_set() {
            continue;
        }
        let normalized = match parse_date_value(value) {
            Ok(dt) => FieldValue::DateTime(dt),
            Err(e) => {
                error!(id = %event.id, field, error = %e, "Error processing date field");
                FieldValue::null()
            }
        };
        event.fields.insert(field.to_string(), normalized);
    }
}

/// Parse a loose JSON value into a date.
///
/// Accepts RFC 3339 strings, naive `YYYY-MM-DD[ HH:MM[:SS]]` strings (read as
/// UTC), epoch milliseconds and `{seconds, nanoseconds}` objects.
pub fn parse_date_value(value: &Value) -> SyncResult<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .ok_or_else(|| SyncError::InvalidDate(n.to_string()))?;
            DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| SyncError::InvalidDate(n.to_string()))
        }
        Value::Object(_) => serde_json::from_value::<Timestamp>(value.clone())
            .map_err(|_| SyncError::InvalidDate(value.to_string()))?
            .to_datetime(),
        other => Err(SyncError::InvalidDate(other.to_string())),
    }
}

fn parse_date_str(s: &str) -> SyncResult<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SyncError::InvalidDate(s.to_string()))
}

fn is_persisted_field(key: &str) -> bool {
    !key.starts_with(INTERNAL_PREFIX) && key != "id" && key != EDITOR_STATUS_FIELD
}

fn to_wire(value: &FieldValue) -> WireValue {
    match value {
        FieldValue::DateTime(dt) => WireValue::Timestamp(Timestamp::from_datetime(dt)),
        FieldValue::Json(v) => WireValue::Json(v.clone()),
    }
}

fn from_wire(value: &WireValue) -> FieldValue {
    match value {
        WireValue::Timestamp(ts) => match ts.to_datetime() {
            Ok(dt) => FieldValue::DateTime(dt),
            Err(_) => FieldValue::Json(serde_json::json!({
                "seconds": ts.seconds,
                "nanoseconds": ts.nanoseconds,
            })),
        },
        WireValue::Json(v) => FieldValue::Json(v.clone()),
    }
}

fn date_from_wire(id: &str, field: &str, value: &WireValue) -> FieldValue {
    let converted = match value {
        WireValue::Timestamp(ts) => ts.to_datetime(),
        WireValue::Json(v) if !FieldValue::Json(v.clone()).is_set() => {
            return FieldValue::Json(v.clone());
        }
        WireValue::Json(v) => parse_date_value(v),
    };

    match converted {
        Ok(dt) => FieldValue::DateTime(dt),
        Err(e) => {
            error!(id, field, error = %e, "Error processing date field");
            FieldValue::null()
        }
    }
}
