//! In-memory scheduler.
//!
//! Holds events the way a scheduling widget does and emits a mutation for
//! every insert, change and delete. Also carries the bits of UI state the
//! bridge cares about: the editor session and unfinished drags.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;
use uuid::Uuid;

use super::{LocalMutation, LocalStore, MutationAction, Notification, NotifyOutcome, Outbox};
use crate::event::{FROM_REMOTE_MARKER, FieldValue, LocalEvent, RECURRENCE_PARENT_FIELD};

type CollisionHandler = Box<dyn FnMut(&Notification) -> NotifyOutcome + Send>;

/// The record currently open in the editor.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    pub id: String,
    /// Saving the editor creates a new record instead of updating one
    pub is_new: bool,
    /// Content to save in place of the stored record
    pub draft: Option<LocalEvent>,
}

/// Dates of a record before a drag started.
#[derive(Debug, Clone)]
struct DragOrigin {
    start_date: Option<FieldValue>,
    end_date: Option<FieldValue>,
}

pub struct MemoryScheduler {
    events: BTreeMap<String, LocalEvent>,
    outbox: Outbox,
    editor: Option<EditSession>,
    drags: HashMap<String, DragOrigin>,
    collision_handler: Option<CollisionHandler>,
    notifications: Vec<Notification>,
}

impl MemoryScheduler {
    pub fn new(outbox: Outbox) -> Self {
        MemoryScheduler {
            events: BTreeMap::new(),
            outbox,
            editor: None,
            drags: HashMap::new(),
            collision_handler: None,
            notifications: Vec::new(),
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &LocalEvent> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn editor(&self) -> Option<&EditSession> {
        self.editor.as_ref()
    }

    /// Every notification raised so far, oldest first.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Decide how live-update collisions are resolved. Without a handler they continue.
    pub fn set_collision_handler(
        &mut self,
        handler: impl FnMut(&Notification) -> NotifyOutcome + Send + 'static,
    ) {
        self.collision_handler = Some(Box::new(handler));
    }

    // USER EDITS:

    /// Add an event as the user would. An empty id gets a temporary one.
    pub fn add_event(&mut self, mut event: LocalEvent) -> String {
        if event.id.is_empty() {
            event.id = temp_id();
        }
        let id = event.id.clone();
        self.insert(event);
        id
    }

    /// Apply field changes to an event as the user would.
    pub fn update_event(&mut self, id: &str, changes: BTreeMap<String, FieldValue>) -> bool {
        let Some(event) = self.events.get_mut(id) else {
            return false;
        };
        event.fields.extend(changes);
        self.mark_changed(id);
        true
    }

    pub fn delete_event(&mut self, id: &str) -> bool {
        if !self.events.contains_key(id) {
            return false;
        }
        self.delete(id, true);
        true
    }

    pub fn open_editor(&mut self, id: &str) -> bool {
        if !self.events.contains_key(id) {
            return false;
        }
        self.editor = Some(EditSession {
            id: id.to_string(),
            is_new: false,
            draft: None,
        });
        true
    }

    pub fn close_editor(&mut self) -> Option<EditSession> {
        self.editor.take()
    }

    /// Close the editor and save it. A stashed draft is added as a new event.
    ///
    /// Returns the id of the saved event, or `None` when there was nothing to save.
    pub fn save_editor(&mut self) -> Option<String> {
        let session = self.editor.take()?;
        match session.draft {
            Some(draft) if session.is_new => Some(self.add_event(draft)),
            _ if self.events.contains_key(&session.id) => {
                self.mark_changed(&session.id);
                Some(session.id)
            }
            _ => None,
        }
    }

    /// Remember the dates of `id` so an unfinished drag can be rolled back.
    pub fn begin_drag(&mut self, id: &str) -> bool {
        let Some(event) = self.events.get(id) else {
            return false;
        };
        let origin = DragOrigin {
            start_date: event.get("start_date").cloned(),
            end_date: event.get("end_date").cloned(),
        };
        self.drags.insert(id.to_string(), origin);
        true
    }

    /// Move a dragged event without committing the change.
    pub fn drag_to(&mut self, id: &str, start: FieldValue, end: FieldValue) -> bool {
        if !self.drags.contains_key(id) {
            return false;
        }
        let Some(event) = self.events.get_mut(id) else {
            return false;
        };
        event.set("start_date", start);
        event.set("end_date", end);
        true
    }

    /// Commit a drag.
    pub fn end_drag(&mut self, id: &str) -> bool {
        if self.drags.remove(id).is_none() {
            return false;
        }
        self.mark_changed(id);
        true
    }
}

impl LocalStore for MemoryScheduler {
    fn get(&self, id: &str) -> Option<&LocalEvent> {
        self.events.get(id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut LocalEvent> {
        self.events.get_mut(id)
    }

    fn insert(&mut self, event: LocalEvent) {
        let action = if self.events.contains_key(&event.id) {
            MutationAction::Update
        } else {
            MutationAction::Create
        };
        let mutation = LocalMutation::new(action, &event);
        self.events.insert(event.id.clone(), event);
        self.outbox.emit(mutation);
    }

    fn mark_changed(&mut self, id: &str) {
        if let Some(event) = self.events.get(id) {
            self.outbox
                .emit(LocalMutation::new(MutationAction::Update, event));
        }
    }

    fn delete(&mut self, id: &str, cascade: bool) {
        let Some(event) = self.events.remove(id) else {
            return;
        };
        self.drags.remove(id);

        if cascade && event.is_recurring() {
            self.events.retain(|_, e| !e.is_marker_of(id));
        }

        self.outbox
            .emit(LocalMutation::new(MutationAction::Delete, &event));
    }

    fn rekey(&mut self, old_id: &str, new_id: &str) {
        if old_id == new_id {
            return;
        }
        let Some(mut event) = self.events.remove(old_id) else {
            return;
        };
        event.id = new_id.to_string();
        self.events.insert(new_id.to_string(), event);

        for marker in self.events.values_mut() {
            if marker.recurrence_parent().as_deref() == Some(old_id) {
                marker.set(RECURRENCE_PARENT_FIELD, new_id);
            }
        }
        if let Some(origin) = self.drags.remove(old_id) {
            self.drags.insert(new_id.to_string(), origin);
        }
        if let Some(editor) = self.editor.as_mut().filter(|e| e.id == old_id) {
            editor.id = new_id.to_string();
        }

        debug!(old_id, new_id, "Re-keyed local event");
    }

    fn current_edit_id(&self) -> Option<&str> {
        self.editor.as_ref().map(|e| e.id.as_str())
    }

    fn notify(&mut self, notification: Notification) -> NotifyOutcome {
        let outcome = match (&notification, self.collision_handler.as_mut()) {
            (Notification::LiveUpdateCollision { .. }, Some(handler)) => handler(&notification),
            _ => NotifyOutcome::Continue,
        };
        self.notifications.push(notification);
        outcome
    }

    fn roll_back_dates(&mut self, id: &str) {
        let Some(origin) = self.drags.remove(id) else {
            return;
        };
        let Some(event) = self.events.get_mut(id) else {
            return;
        };
        for (field, value) in [("start_date", origin.start_date), ("end_date", origin.end_date)] {
            match value {
                Some(value) => event.set(field, value),
                None => {
                    event.remove(field);
                }
            }
        }
    }

    fn recurrence_markers(&self, id: &str) -> Vec<String> {
        self.events
            .values()
            .filter(|e| e.is_marker_of(id))
            .map(|e| e.id.clone())
            .collect()
    }

    fn stash_edit(&mut self, mut event: LocalEvent) {
        let Some(editor) = self.editor.as_mut().filter(|e| e.id == event.id) else {
            return;
        };
        let placeholder = temp_id();
        debug!(id = %event.id, placeholder = %placeholder, "Stashed edit session");

        // The draft is saved as a user edit, so it must be forwarded
        event.remove(FROM_REMOTE_MARKER);
        event.id = placeholder.clone();
        *editor = EditSession {
            id: placeholder,
            is_new: true,
            draft: Some(event),
        };
    }

    fn restore_edit(&mut self, id: &str) {
        if let Some(editor) = self.editor.as_mut().filter(|e| e.is_new) {
            *editor = EditSession {
                id: id.to_string(),
                is_new: false,
                draft: None,
            };
        }
    }
}

fn temp_id() -> String {
    format!("tmp-{}", Uuid::new_v4().simple())
}
