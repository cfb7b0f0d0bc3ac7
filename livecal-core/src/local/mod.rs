//! Local event store (the scheduler side of the bridge).
//!
//! The bridge only talks to the scheduler through `LocalStore`. Mutations the
//! scheduler makes on its own (user edits) leave through an `Outbox`, which
//! drops them while the shared forwarding gate is suppressed.

mod memory;

pub use memory::{EditSession, MemoryScheduler};

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::event::LocalEvent;
use crate::gate::ForwardingGate;

/// What happened to a local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

impl MutationAction {
    pub fn symbol(&self) -> &'static str {
        match self {
            MutationAction::Create => "+",
            MutationAction::Update => "~",
            MutationAction::Delete => "-",
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationAction::Create => write!(f, "create"),
            MutationAction::Update => write!(f, "update"),
            MutationAction::Delete => write!(f, "delete"),
        }
    }
}

/// A local mutation handed to the outbound intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMutation {
    pub action: MutationAction,
    pub id: String,
    pub record: LocalEvent,
}

impl LocalMutation {
    pub fn new(action: MutationAction, record: &LocalEvent) -> Self {
        LocalMutation {
            action,
            id: record.id.clone(),
            record: record.clone(),
        }
    }
}

/// Events the bridge raises towards the scheduler UI.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A remote change hit the record currently open in the editor.
    LiveUpdateCollision {
        id: String,
        action: MutationAction,
        record: LocalEvent,
    },
    /// Forwarding a local mutation to the remote store failed.
    OutboundFailed {
        id: String,
        action: MutationAction,
        message: String,
    },
}

/// Answer of a notification handler. Only `Abort` vetoes the pending operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyOutcome {
    #[default]
    Continue,
    Abort,
}

/// Operations the bridge needs from the local scheduler.
pub trait LocalStore {
    fn get(&self, id: &str) -> Option<&LocalEvent>;

    fn get_mut(&mut self, id: &str) -> Option<&mut LocalEvent>;

    /// Add a record, replacing any record with the same id.
    fn insert(&mut self, event: LocalEvent);

    /// Tell the store the record at `id` was changed in place.
    fn mark_changed(&mut self, id: &str);

    /// Remove a record. With `cascade`, a recurring record takes its markers along.
    fn delete(&mut self, id: &str, cascade: bool);

    /// Move a record to a new id.
    fn rekey(&mut self, old_id: &str, new_id: &str);

    /// Id of the record open in the editor, if any.
    fn current_edit_id(&self) -> Option<&str>;

    fn notify(&mut self, notification: Notification) -> NotifyOutcome;

    /// Undo an unfinished drag on `id`, restoring its original dates.
    fn roll_back_dates(&mut self, id: &str);

    /// Ids of the occurrence markers derived from the recurring record `id`.
    fn recurrence_markers(&self, id: &str) -> Vec<String>;

    /// Move the edit session on `event.id` to a placeholder new record, keeping
    /// `event` as its draft.
    fn stash_edit(&mut self, event: LocalEvent);

    /// Point a stashed edit session back at the existing record `id`.
    fn restore_edit(&mut self, id: &str);
}

pub type MutationReceiver = mpsc::UnboundedReceiver<LocalMutation>;

/// Sending half for local mutations, gated by a `ForwardingGate`.
#[derive(Debug, Clone)]
pub struct Outbox {
    gate: ForwardingGate,
    tx: mpsc::UnboundedSender<LocalMutation>,
}

impl Outbox {
    pub fn channel(gate: ForwardingGate) -> (Outbox, MutationReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbox { gate, tx }, rx)
    }

    pub fn emit(&self, mutation: LocalMutation) {
        if self.gate.is_suppressed() {
            trace!(id = %mutation.id, action = %mutation.action, "Forwarding suppressed");
            return;
        }
        if self.tx.send(mutation).is_err() {
            debug!("Outbound receiver closed, dropping local mutation");
        }
    }
}
