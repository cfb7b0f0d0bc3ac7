//! Remote document representation.
//!
//! These types mirror what the document database stores: a document id plus a
//! map of values, where instants are stored as the database's own timestamp
//! type rather than as native dates.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};

const NANOS_PER_MICRO: u32 = 1_000;

/// Database-native point in time with microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl Timestamp {
    /// Convert a native date, truncating anything below a microsecond.
    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        let nanos = dt.timestamp_subsec_nanos();
        Timestamp {
            seconds: dt.timestamp(),
            nanoseconds: nanos - nanos % NANOS_PER_MICRO,
        }
    }

    pub fn to_datetime(&self) -> SyncResult<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanoseconds).ok_or(
            SyncError::InvalidTimestamp {
                seconds: self.seconds,
                nanoseconds: self.nanoseconds,
            },
        )
    }
}

/// A value stored in a remote document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    Timestamp(Timestamp),
    Json(Value),
}

impl WireValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

impl From<Value> for WireValue {
    fn from(value: Value) -> Self {
        WireValue::Json(value)
    }
}

impl From<Timestamp> for WireValue {
    fn from(ts: Timestamp) -> Self {
        WireValue::Timestamp(ts)
    }
}

/// Field map of a remote document.
pub type DocumentData = BTreeMap<String, WireValue>;

/// A remote document snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: DocumentData,
}

impl Document {
    pub fn new(id: &str, data: DocumentData) -> Self {
        Document {
            id: id.to_string(),
            data,
        }
    }

    pub fn get(&self, field: &str) -> Option<&WireValue> {
        self.data.get(field)
    }
}

/// Address of a document inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub collection: String,
    pub id: String,
}

impl DocumentRef {
    pub fn new(collection: &str, id: &str) -> Self {
        DocumentRef {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}
