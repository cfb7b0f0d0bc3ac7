//! Local event records.
//!
//! A `LocalEvent` is what the scheduler holds in memory: an id plus a bag of
//! fields. Three of those fields carry dates; everything else is opaque
//! payload that the bridge passes through untouched.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Fields holding instants in time. Native dates locally, timestamps remotely.
pub const DATE_FIELDS: [&str; 3] = ["start_date", "end_date", "original_start"];

/// Echo marker written on every outgoing payload.
pub const FROM_REMOTE_MARKER: &str = "_fromFirestore";

/// Fields starting with this prefix are scheduler internals and never leave the process.
pub const INTERNAL_PREFIX: char = '_';

/// Editor bookkeeping field set by the scheduler's data processor.
pub const EDITOR_STATUS_FIELD: &str = "!nativeeditor_status";

/// Points an occurrence marker at its recurring parent.
pub const RECURRENCE_PARENT_FIELD: &str = "event_pid";

/// Marker ids are `<parent id>#<occurrence>`.
pub const MARKER_ID_SEPARATOR: char = '#';

const RECURRENCE_FIELDS: [&str; 2] = ["rec_type", "rrule"];

/// A single field value on a local event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    DateTime(DateTime<Utc>),
    Json(Value),
}

impl FieldValue {
    pub fn null() -> Self {
        FieldValue::Json(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Json(Value::Null))
    }

    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            FieldValue::DateTime(dt) => Some(dt),
            FieldValue::Json(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Whether the value counts as set: not null, `false`, zero or an empty string.
    pub fn is_set(&self) -> bool {
        match self {
            FieldValue::DateTime(_) => true,
            FieldValue::Json(value) => match value {
                Value::Null => false,
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                Value::String(s) => !s.is_empty(),
                Value::Array(_) | Value::Object(_) => true,
            },
        }
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(dt: DateTime<Utc>) -> Self {
        FieldValue::DateTime(dt)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Json(Value::String(s.to_string()))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Json(Value::Bool(b))
    }
}

/// A calendar event as held by the local scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalEvent {
    pub id: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl LocalEvent {
    pub fn new(id: &str) -> Self {
        LocalEvent {
            id: id.to_string(),
            fields: BTreeMap::new(),
        }
    }

    /// Build an event from loose JSON, converting the date fields to native dates.
    ///
    /// An `id` key inside `map` is ignored; the explicit `id` wins.
    pub fn from_json(id: &str, map: serde_json::Map<String, Value>) -> Self {
        let mut event = LocalEvent::new(id);
        for (key, value) in map {
            if key == "id" {
                continue;
            }
            event.fields.insert(key, FieldValue::Json(value));
        }
        crate::codec::normalize_dates(&mut event);
        event
    }

    pub fn with(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<FieldValue>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    pub fn text(&self) -> Option<&str> {
        self.get("text").and_then(FieldValue::as_str)
    }

    /// True when the record carries the echo marker.
    pub fn is_from_remote(&self) -> bool {
        self.get(FROM_REMOTE_MARKER).is_some_and(FieldValue::is_set)
    }

    /// True when the record has a recurrence type or rule.
    pub fn is_recurring(&self) -> bool {
        RECURRENCE_FIELDS
            .iter()
            .any(|f| self.get(f).is_some_and(FieldValue::is_set))
    }

    /// Id of the recurring parent, if this record is an occurrence marker.
    pub fn recurrence_parent(&self) -> Option<String> {
        let value = self.get(RECURRENCE_PARENT_FIELD).filter(|v| v.is_set())?;
        match value {
            FieldValue::Json(Value::String(s)) => Some(s.clone()),
            FieldValue::Json(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Whether `self` is an occurrence marker derived from `parent_id`.
    pub fn is_marker_of(&self, parent_id: &str) -> bool {
        if self.id == parent_id {
            return false;
        }
        if self.recurrence_parent().as_deref() == Some(parent_id) {
            return true;
        }
        self.id
            .split_once(MARKER_ID_SEPARATOR)
            .is_some_and(|(prefix, _)| prefix == parent_id)
    }
}

impl fmt::Display for LocalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text() {
            Some(text) if !text.is_empty() => write!(f, "{}", text),
            _ => write!(f, "(untitled)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_is_set_follows_loose_truthiness() {
        assert!(!FieldValue::null().is_set());
        assert!(!FieldValue::from(false).is_set());
        assert!(!FieldValue::from("").is_set());
        assert!(!FieldValue::from(json!(0)).is_set());
        assert!(FieldValue::from("week").is_set());
        assert!(FieldValue::from(json!(12)).is_set());
        assert!(FieldValue::from(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()).is_set());
    }

    #[test]
    fn test_is_recurring() {
        let plain = LocalEvent::new("a").with("text", "Standup");
        assert!(!plain.is_recurring());

        let by_type = LocalEvent::new("b").with("rec_type", "week_1___1,3");
        assert!(by_type.is_recurring());

        let by_rule = LocalEvent::new("c").with("rrule", "FREQ=DAILY");
        assert!(by_rule.is_recurring());

        let empty_rule = LocalEvent::new("d").with("rec_type", "");
        assert!(!empty_rule.is_recurring());
    }

    #[test]
    fn test_recurrence_parent_accepts_strings_and_numbers() {
        let by_str = LocalEvent::new("m").with(RECURRENCE_PARENT_FIELD, "E2");
        assert_eq!(by_str.recurrence_parent().as_deref(), Some("E2"));

        let by_num = LocalEvent::new("m").with(RECURRENCE_PARENT_FIELD, json!(42));
        assert_eq!(by_num.recurrence_parent().as_deref(), Some("42"));

        let none = LocalEvent::new("m").with(RECURRENCE_PARENT_FIELD, json!(0));
        assert_eq!(none.recurrence_parent(), None);
    }

    #[test]
    fn test_is_marker_of() {
        assert!(LocalEvent::new("E2#1").is_marker_of("E2"));
        assert!(LocalEvent::new("x").with(RECURRENCE_PARENT_FIELD, "E2").is_marker_of("E2"));
        assert!(!LocalEvent::new("E2").is_marker_of("E2"));
        assert!(!LocalEvent::new("E20#1").is_marker_of("E2"));
    }

    #[test]
    fn test_from_json_ignores_embedded_id_and_parses_dates() {
        let map = json!({
            "id": "ignored",
            "text": "Lunch",
            "start_date": "2025-03-20T12:00:00Z",
        });
        let serde_json::Value::Object(map) = map else {
            unreachable!()
        };

        let event = LocalEvent::from_json("tmp1", map);

        assert_eq!(event.id, "tmp1");
        assert!(event.get("id").is_none());
        assert_eq!(event.text(), Some("Lunch"));
        assert_eq!(
            event.get("start_date").and_then(FieldValue::as_datetime),
            Some(&Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_display_falls_back_for_untitled() {
        assert_eq!(LocalEvent::new("a").to_string(), "(untitled)");
        assert_eq!(LocalEvent::new("a").with("text", "Review").to_string(), "Review");
    }
}
