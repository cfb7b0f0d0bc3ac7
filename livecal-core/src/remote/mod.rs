//! Remote document store (the database side of the bridge).

mod memory;

pub use memory::MemoryDocumentStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::SyncResult;
use crate::wire::{Document, DocumentData, DocumentRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// An ordered query over one collection.
///
/// Only documents that carry the order-by field are part of the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: String,
    pub order_by: OrderBy,
}

impl Query {
    pub fn new(collection: &str, field: &str, direction: Direction) -> Self {
        Query {
            collection: collection.to_string(),
            order_by: OrderBy {
                field: field.to_string(),
                direction,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One document change seen by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub kind: ChangeKind,
    pub document: Document,
    /// The change is a local write the server has not confirmed yet
    pub has_pending_writes: bool,
}

/// Changes delivered together in one server round-trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    pub changes: Vec<Change>,
}

impl ChangeBatch {
    pub fn new(changes: Vec<Change>) -> Self {
        ChangeBatch { changes }
    }
}

/// Live stream of change batches for a query.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ChangeBatch>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<ChangeBatch>) -> Self {
        Subscription { rx }
    }

    /// Wait for the next batch. `None` once the subscription has ended.
    pub async fn next_batch(&mut self) -> Option<ChangeBatch> {
        self.rx.recv().await
    }

    /// Take a batch that is already queued, without waiting.
    pub fn try_next_batch(&mut self) -> Option<ChangeBatch> {
        self.rx.try_recv().ok()
    }
}

/// Operations the bridge needs from the remote document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Start listening to `query`. The first batch holds the current result set.
    async fn subscribe(&self, query: &Query) -> SyncResult<Subscription>;

    /// Add a document with a store-assigned id and return that id.
    async fn insert_document(&self, collection: &str, data: DocumentData) -> SyncResult<String>;

    /// Write `data` over the fields of an existing document.
    async fn update_document(&self, doc: &DocumentRef, data: DocumentData) -> SyncResult<()>;

    async fn delete_document(&self, doc: &DocumentRef) -> SyncResult<()>;
}
