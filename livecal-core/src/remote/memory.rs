//! In-memory document store.
//!
//! A shared backend with any number of client handles. Each handle sees its
//! own writes with `has_pending_writes` set, and everyone else's writes as
//! confirmed server changes.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use super::{Change, ChangeBatch, ChangeKind, Direction, DocumentStore, Query, Subscription};
use crate::error::{SyncError, SyncResult};
use crate::wire::{Document, DocumentData, DocumentRef, WireValue};

const AUTO_ID_LEN: usize = 20;

struct Subscriber {
    client: usize,
    query: Query,
    tx: mpsc::UnboundedSender<ChangeBatch>,
}

#[derive(Default)]
struct Backend {
    collections: HashMap<String, BTreeMap<String, DocumentData>>,
    subscribers: Vec<Subscriber>,
    next_client: usize,
    offline: bool,
    closed: bool,
}

/// Handle to a shared in-memory document database.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    backend: Arc<Mutex<Backend>>,
    client: usize,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        let backend = Backend {
            next_client: 1,
            ..Backend::default()
        };
        MemoryDocumentStore {
            backend: Arc::new(Mutex::new(backend)),
            client: 0,
        }
    }

    /// Another client connected to the same backend.
    pub fn client(&self) -> Self {
        let mut backend = self.lock();
        let client = backend.next_client;
        backend.next_client += 1;
        MemoryDocumentStore {
            backend: Arc::clone(&self.backend),
            client,
        }
    }

    /// While offline every write fails.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// End every subscription. Later subscriptions only get their initial batch.
    pub fn close(&self) {
        let mut backend = self.lock();
        backend.closed = true;
        backend.subscribers.clear();
    }

    pub fn get(&self, doc: &DocumentRef) -> Option<Document> {
        self.lock()
            .collections
            .get(&doc.collection)
            .and_then(|c| c.get(&doc.id))
            .map(|data| Document::new(&doc.id, data.clone()))
    }

    /// All documents of a collection, by id.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.lock()
            .collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, data)| Document::new(id, data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Create or replace a document under a caller-chosen id.
    pub fn set_document(&self, doc: &DocumentRef, data: DocumentData) -> SyncResult<()> {
        self.write(doc, Some(data))
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, doc: &DocumentRef, data: Option<DocumentData>) -> SyncResult<()> {
        let mut backend = self.lock();
        if backend.offline {
            return Err(SyncError::Remote(format!("store unavailable, cannot write {}", doc)));
        }

        let collection = backend.collections.entry(doc.collection.clone()).or_default();
        let old = match &data {
            Some(data) => collection.insert(doc.id.clone(), data.clone()),
            None => collection.remove(&doc.id),
        };

        let client = self.client;
        backend.subscribers.retain(|sub| {
            if sub.query.collection != doc.collection {
                return true;
            }
            let Some(change) = change_for(&sub.query, &doc.id, old.as_ref(), data.as_ref()) else {
                return true;
            };
            let change = Change {
                has_pending_writes: sub.client == client,
                ..change
            };
            trace!(doc = %doc, kind = ?change.kind, pending = change.has_pending_writes, "Delivering change");
            sub.tx.send(ChangeBatch::new(vec![change])).is_ok()
        });

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn subscribe(&self, query: &Query) -> SyncResult<Subscription> {
        let mut backend = self.lock();

        let mut visible: Vec<Document> = backend
            .collections
            .get(&query.collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, data)| data.contains_key(&query.order_by.field))
                    .map(|(id, data)| Document::new(id, data.clone()))
                    .collect()
            })
            .unwrap_or_default();
        visible.sort_by(|a, b| compare_documents(query, a, b));

        let initial = visible
            .into_iter()
            .map(|document| Change {
                kind: ChangeKind::Added,
                document,
                has_pending_writes: false,
            })
            .collect();

        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive, send cannot fail
        let _ = tx.send(ChangeBatch::new(initial));

        if !backend.closed {
            backend.subscribers.push(Subscriber {
                client: self.client,
                query: query.clone(),
                tx,
            });
        }

        debug!(collection = %query.collection, order_by = %query.order_by.field, "Subscribed");
        Ok(Subscription::new(rx))
    }

    async fn insert_document(&self, collection: &str, data: DocumentData) -> SyncResult<String> {
        let id: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(AUTO_ID_LEN)
            .collect();
        self.write(&DocumentRef::new(collection, &id), Some(data))?;
        Ok(id)
    }

    async fn update_document(&self, doc: &DocumentRef, data: DocumentData) -> SyncResult<()> {
        let mut merged = self
            .get(doc)
            .ok_or_else(|| SyncError::NotFound(doc.to_string()))?
            .data;
        merged.extend(data);
        self.write(doc, Some(merged))
    }

    async fn delete_document(&self, doc: &DocumentRef) -> SyncResult<()> {
        self.write(doc, None)
    }
}

/// Map a write to the change a query observes, if any.
fn change_for(
    query: &Query,
    id: &str,
    old: Option<&DocumentData>,
    new: Option<&DocumentData>,
) -> Option<Change> {
    let field = &query.order_by.field;
    let was_visible = old.is_some_and(|d| d.contains_key(field));
    let is_visible = new.is_some_and(|d| d.contains_key(field));

    let (kind, data) = match (was_visible, is_visible) {
        (false, true) => (ChangeKind::Added, new?),
        (true, true) => (ChangeKind::Modified, new?),
        (true, false) => (ChangeKind::Removed, old?),
        (false, false) => return None,
    };

    Some(Change {
        kind,
        document: Document::new(id, data.clone()),
        has_pending_writes: false,
    })
}

fn compare_documents(query: &Query, a: &Document, b: &Document) -> Ordering {
    let field = &query.order_by.field;
    let ordering = match (a.get(field), b.get(field)) {
        (Some(x), Some(y)) => compare_values(x, y),
        _ => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id));

    match query.order_by.direction {
        Direction::Ascending => ordering,
        Direction::Descending => ordering.reverse(),
    }
}

/// Cross-type ordering: null < bool < number < timestamp < string < anything else.
fn compare_values(a: &WireValue, b: &WireValue) -> Ordering {
    match (a, b) {
        (WireValue::Timestamp(x), WireValue::Timestamp(y)) => x.cmp(y),
        (WireValue::Json(x), WireValue::Json(y)) => match (x, y) {
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Number(x), Value::Number(y)) => {
                let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => type_rank(a)
                .cmp(&type_rank(b))
                .then_with(|| x.to_string().cmp(&y.to_string())),
        },
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &WireValue) -> u8 {
    match value {
        WireValue::Json(Value::Null) => 0,
        WireValue::Json(Value::Bool(_)) => 1,
        WireValue::Json(Value::Number(_)) => 2,
        WireValue::Timestamp(_) => 3,
        WireValue::Json(Value::String(_)) => 4,
        WireValue::Json(_) => 5,
    }
}
