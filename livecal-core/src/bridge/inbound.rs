//! Remote to local: applying change batches.
//!
//! Every local mutation made here runs with forwarding suppressed, so the
//! scheduler does not send the change straight back upstream.

use tracing::{debug, info, trace, warn};

use super::{ApplyOutcome, SkipReason, SyncBridge};
use crate::codec;
use crate::event::{DATE_FIELDS, LocalEvent};
use crate::local::{LocalStore, MutationAction, Notification, NotifyOutcome};
use crate::remote::{Change, ChangeBatch, ChangeKind, DocumentStore};
use crate::stats::ApplyStats;

impl<L: LocalStore, R: DocumentStore> SyncBridge<L, R> {
    /// Apply a batch change by change, in delivery order.
    pub fn apply_batch(&mut self, batch: &ChangeBatch) -> ApplyStats {
        let mut stats = ApplyStats::default();
        for change in &batch.changes {
            let outcome = self.apply_change(change);
            stats.record(&outcome);
        }
        self.stats.add(&stats);
        stats
    }

    pub fn apply_change(&mut self, change: &Change) -> ApplyOutcome {
        if change.has_pending_writes {
            trace!(id = %change.document.id, "Skipping pending local write");
            return ApplyOutcome::Skipped(SkipReason::PendingWrite);
        }

        let event = codec::deserialize(&change.document);

        match change.kind {
            ChangeKind::Added => self.apply_added(event),
            ChangeKind::Modified => self.apply_modified(event),
            ChangeKind::Removed => self.apply_removed(event),
        }
    }

    fn apply_added(&mut self, mut event: LocalEvent) -> ApplyOutcome {
        if self.local.get(&event.id).is_some() {
            warn!(id = %event.id, "Event already exists, skipping add");
            return ApplyOutcome::Skipped(SkipReason::AlreadyExists);
        }

        codec::normalize_dates(&mut event);

        let _guard = self.gate.suppress();
        debug!(id = %event.id, "Adding remote event");
        self.local.insert(event);
        ApplyOutcome::Inserted
    }

    fn apply_modified(&mut self, event: LocalEvent) -> ApplyOutcome {
        let sid = event.id.clone();

        if self.local.get(&sid).is_none() {
            warn!(id = %sid, "Event does not exist, skipping update");
            return ApplyOutcome::Skipped(SkipReason::UnknownRecord);
        }

        let _guard = self.gate.suppress();

        if let Some(existing) = self.local.get_mut(&sid) {
            existing.fields.extend(event.fields.clone());
        }
        self.local.mark_changed(&sid);

        // Second pass over everything but dates, after the store has seen the change
        if let Some(existing) = self.local.get_mut(&sid) {
            for (key, value) in &event.fields {
                if !DATE_FIELDS.contains(&key.as_str()) {
                    existing.fields.insert(key.clone(), value.clone());
                }
            }
        }
        self.local.mark_changed(&sid);

        debug!(id = %sid, "Updated event from remote");
        ApplyOutcome::Updated
    }

    fn apply_removed(&mut self, event: LocalEvent) -> ApplyOutcome {
        let sid = event.id.clone();

        let Some(recurring) = self.local.get(&sid).map(LocalEvent::is_recurring) else {
            if event.recurrence_parent().is_some() {
                let _guard = self.gate.suppress();
                debug!(id = %sid, "Removed occurrence not held locally, adding it");
                self.local.insert(event);
                return ApplyOutcome::Inserted;
            }
            warn!(id = %sid, "Event does not exist, skipping delete");
            return ApplyOutcome::Skipped(SkipReason::UnknownRecord);
        };

        let _guard = self.gate.suppress();

        let mut markers = 0;
        if recurring {
            self.local.roll_back_dates(&sid);
            for marker_id in self.local.recurrence_markers(&sid) {
                if self.local.get(&marker_id).is_some() {
                    self.local.delete(&marker_id, true);
                    markers += 1;
                }
            }
        }

        if self.local.current_edit_id() == Some(sid.as_str()) {
            self.local.stash_edit(event.clone());
            let outcome = self.local.notify(Notification::LiveUpdateCollision {
                id: sid.clone(),
                action: MutationAction::Delete,
                record: event,
            });
            if outcome == NotifyOutcome::Abort {
                self.local.restore_edit(&sid);
                info!(id = %sid, "Deletion aborted, event is open in the editor");
                return ApplyOutcome::Aborted { markers };
            }
        }

        self.local.delete(&sid, true);
        debug!(id = %sid, markers, "Deleted event from remote");
        ApplyOutcome::Deleted { markers }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::bridge::tests::{TestBridge, bridge_with};
    use crate::config::SyncConfig;
    use crate::event::{FROM_REMOTE_MARKER, FieldValue, RECURRENCE_PARENT_FIELD};
    use crate::gate::ForwardingGate;
    use crate::local::{MemoryScheduler, MutationReceiver, Outbox};
    use crate::remote::MemoryDocumentStore;
    use crate::wire::{Document, DocumentData, Timestamp, WireValue};

    fn bridge() -> (TestBridge, MutationReceiver) {
        bridge_with(MemoryDocumentStore::new())
    }

    fn change(kind: ChangeKind, id: &str, fields: serde_json::Value) -> Change {
        let serde_json::Value::Object(map) = fields else {
            panic!("fields must be an object");
        };
        let data: DocumentData = map
            .into_iter()
            .map(|(k, v)| (k, WireValue::Json(v)))
            .collect();
        Change {
            kind,
            document: Document::new(id, data),
            has_pending_writes: false,
        }
    }

    fn seed(bridge: &mut TestBridge, rx: &mut MutationReceiver, event: LocalEvent) {
        bridge.local_mut().insert(event);
        while rx.try_recv().is_ok() {}
    }

    fn assert_no_outbound(rx: &mut MutationReceiver) {
        assert!(rx.try_recv().is_err(), "remote change leaked back outbound");
    }

    #[test]
    fn test_pending_writes_are_skipped_entirely() {
        let (mut bridge, mut rx) = bridge();
        let mut c = change(ChangeKind::Added, "E1", json!({"text": "Mine"}));
        c.has_pending_writes = true;

        assert_eq!(
            bridge.apply_change(&c),
            ApplyOutcome::Skipped(SkipReason::PendingWrite)
        );
        assert!(bridge.local().is_empty());
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn test_added_inserts_with_native_dates() {
        let (mut bridge, mut rx) = bridge();
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap();
        let mut c = change(ChangeKind::Added, "E1", json!({"text": "Standup"}));
        c.document.data.insert(
            "start_date".into(),
            WireValue::Timestamp(Timestamp::from_datetime(&start)),
        );
        c.document
            .data
            .insert("end_date".into(), WireValue::Json(json!("2025-03-20T09:15:00Z")));

        assert_eq!(bridge.apply_change(&c), ApplyOutcome::Inserted);

        let event = bridge.local().get("E1").unwrap();
        assert_eq!(event.get("start_date"), Some(&FieldValue::DateTime(start)));
        assert_eq!(
            event.get("end_date"),
            Some(&FieldValue::DateTime(
                Utc.with_ymd_and_hms(2025, 3, 20, 9, 15, 0).unwrap()
            ))
        );
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn test_added_for_existing_id_does_not_duplicate() {
        let (mut bridge, mut rx) = bridge();
        seed(&mut bridge, &mut rx, LocalEvent::new("E1").with("text", "Local"));

        let outcome = bridge.apply_change(&change(ChangeKind::Added, "E1", json!({"text": "Remote"})));

        assert_eq!(outcome, ApplyOutcome::Skipped(SkipReason::AlreadyExists));
        assert_eq!(bridge.local().len(), 1);
        assert_eq!(bridge.local().get("E1").unwrap().text(), Some("Local"));
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn test_modified_for_unknown_id_is_a_warning_only() {
        let (mut bridge, mut rx) = bridge();
        let mut c = change(ChangeKind::Modified, "E1", json!({"text": "Standup"}));
        c.document.data.insert(
            "start_date".into(),
            WireValue::Timestamp(Timestamp {
                seconds: 1_742_461_200,
                nanoseconds: 0,
            }),
        );

        let outcome = bridge.apply_change(&c);

        assert_eq!(outcome, ApplyOutcome::Skipped(SkipReason::UnknownRecord));
        assert!(bridge.local().is_empty());
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn test_modified_merges_into_existing_record() {
        let (mut bridge, mut rx) = bridge();
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap();
        seed(
            &mut bridge,
            &mut rx,
            LocalEvent::new("E1")
                .with("text", "Standup")
                .with("room", "4B")
                .with("start_date", start),
        );
        let mut c = change(ChangeKind::Modified, "E1", json!({"text": "Daily standup"}));
        let moved = start + chrono::Duration::hours(1);
        c.document.data.insert(
            "start_date".into(),
            WireValue::Timestamp(Timestamp::from_datetime(&moved)),
        );

        assert_eq!(bridge.apply_change(&c), ApplyOutcome::Updated);

        let event = bridge.local().get("E1").unwrap();
        assert_eq!(event.text(), Some("Daily standup"));
        assert_eq!(event.get("room"), Some(&FieldValue::from("4B")));
        assert_eq!(event.get("start_date"), Some(&FieldValue::DateTime(moved)));
        assert_eq!(bridge.local().len(), 1);
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn test_removed_deletes_plain_event() {
        let (mut bridge, mut rx) = bridge();
        seed(&mut bridge, &mut rx, LocalEvent::new("E1").with("text", "Gone"));

        let outcome = bridge.apply_change(&change(ChangeKind::Removed, "E1", json!({"text": "Gone"})));

        assert_eq!(outcome, ApplyOutcome::Deleted { markers: 0 });
        assert!(bridge.local().is_empty());
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn test_removed_recurring_event_takes_markers_along() {
        let (mut bridge, mut rx) = bridge();
        seed(&mut bridge, &mut rx, LocalEvent::new("E2").with("rec_type", "week"));
        seed(&mut bridge, &mut rx, LocalEvent::new("E2#1").with(RECURRENCE_PARENT_FIELD, "E2"));
        seed(&mut bridge, &mut rx, LocalEvent::new("E2#2").with(RECURRENCE_PARENT_FIELD, "E2"));

        let outcome = bridge.apply_change(&change(
            ChangeKind::Removed,
            "E2",
            json!({"text": "Weekly", "rec_type": "week"}),
        ));

        assert_eq!(outcome, ApplyOutcome::Deleted { markers: 2 });
        assert!(bridge.local().is_empty());
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn test_removed_recurring_event_rolls_back_drag() {
        let (mut bridge, mut rx) = bridge();
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap();
        seed(
            &mut bridge,
            &mut rx,
            LocalEvent::new("E2")
                .with("rec_type", "day")
                .with("start_date", start),
        );
        bridge.local_mut().open_editor("E2");
        bridge.local_mut().begin_drag("E2");
        bridge.local_mut().drag_to(
            "E2",
            (start + chrono::Duration::days(1)).into(),
            (start + chrono::Duration::days(1)).into(),
        );
        bridge
            .local_mut()
            .set_collision_handler(|_| NotifyOutcome::Abort);

        let outcome = bridge.apply_change(&change(ChangeKind::Removed, "E2", json!({"rec_type": "day"})));

        assert_eq!(outcome, ApplyOutcome::Aborted { markers: 0 });
        assert_eq!(
            bridge.local().get("E2").unwrap().get("start_date"),
            Some(&FieldValue::DateTime(start))
        );
    }

    #[test]
    fn test_removed_unknown_occurrence_is_inserted() {
        let (mut bridge, mut rx) = bridge();

        let outcome = bridge.apply_change(&change(
            ChangeKind::Removed,
            "E2#1",
            json!({"event_pid": "E2", "rec_type": "none"}),
        ));

        assert_eq!(outcome, ApplyOutcome::Inserted);
        assert!(bridge.local().get("E2#1").is_some());
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn test_removed_unknown_plain_event_is_skipped() {
        let (mut bridge, _rx) = bridge();

        let outcome = bridge.apply_change(&change(ChangeKind::Removed, "E9", json!({"text": "?"})));

        assert_eq!(outcome, ApplyOutcome::Skipped(SkipReason::UnknownRecord));
        assert!(bridge.local().is_empty());
    }

    #[test]
    fn test_removed_while_editing_notifies_then_deletes() {
        let (mut bridge, mut rx) = bridge();
        seed(&mut bridge, &mut rx, LocalEvent::new("E1").with("text", "Draft"));
        bridge.local_mut().open_editor("E1");

        let outcome = bridge.apply_change(&change(ChangeKind::Removed, "E1", json!({"text": "Draft"})));

        assert_eq!(outcome, ApplyOutcome::Deleted { markers: 0 });
        assert!(bridge.local().get("E1").is_none());
        let notifications = bridge.local().notifications();
        assert_eq!(notifications.len(), 1);
        assert!(matches!(
            &notifications[0],
            Notification::LiveUpdateCollision { id, action: MutationAction::Delete, .. } if id == "E1"
        ));
        // The editor keeps the content as a new event
        let editor = bridge.local().editor().unwrap();
        assert!(editor.is_new);
        assert_ne!(bridge.local().current_edit_id(), Some("E1"));
        assert_eq!(editor.draft.as_ref().unwrap().text(), Some("Draft"));
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn test_readded_event_is_not_tied_to_stashed_editor() {
        let (mut bridge, mut rx) = bridge();
        seed(&mut bridge, &mut rx, LocalEvent::new("E1").with("text", "Draft"));
        bridge.local_mut().open_editor("E1");
        bridge.apply_change(&change(ChangeKind::Removed, "E1", json!({"text": "Draft"})));

        bridge.apply_change(&change(ChangeKind::Added, "E1", json!({"text": "Back"})));
        let outcome = bridge.apply_change(&change(ChangeKind::Removed, "E1", json!({"text": "Back"})));

        assert_eq!(outcome, ApplyOutcome::Deleted { markers: 0 });
        assert_eq!(bridge.local().notifications().len(), 1);
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn test_saving_stashed_draft_forwards_a_create() {
        let (mut bridge, mut rx) = bridge();
        seed(&mut bridge, &mut rx, LocalEvent::new("E1").with("text", "Draft"));
        bridge.local_mut().open_editor("E1");
        bridge.apply_change(&change(
            ChangeKind::Removed,
            "E1",
            json!({"text": "Draft", FROM_REMOTE_MARKER: true}),
        ));

        let id = bridge.local_mut().save_editor().unwrap();

        let mutation = rx.try_recv().unwrap();
        assert_eq!(mutation.action, MutationAction::Create);
        assert_eq!(mutation.id, id);
        assert!(!mutation.record.is_from_remote());
    }

    /// Scheduler that journals notifications and deletes in call order.
    struct JournalScheduler {
        inner: MemoryScheduler,
        journal: Vec<String>,
    }

    impl LocalStore for JournalScheduler {
        fn get(&self, id: &str) -> Option<&LocalEvent> {
            self.inner.get(id)
        }

        fn get_mut(&mut self, id: &str) -> Option<&mut LocalEvent> {
            self.inner.get_mut(id)
        }

        fn insert(&mut self, event: LocalEvent) {
            self.inner.insert(event)
        }

        fn mark_changed(&mut self, id: &str) {
            self.inner.mark_changed(id)
        }

        fn delete(&mut self, id: &str, cascade: bool) {
            self.journal.push(format!("delete {}", id));
            self.inner.delete(id, cascade)
        }

        fn rekey(&mut self, old_id: &str, new_id: &str) {
            self.inner.rekey(old_id, new_id)
        }

        fn current_edit_id(&self) -> Option<&str> {
            self.inner.current_edit_id()
        }

        fn notify(&mut self, notification: Notification) -> NotifyOutcome {
            if let Notification::LiveUpdateCollision { id, .. } = &notification {
                let state = if self.inner.get(id).is_some() { "present" } else { "gone" };
                self.journal.push(format!("notify {} {}", id, state));
            }
            self.inner.notify(notification)
        }

        fn roll_back_dates(&mut self, id: &str) {
            self.inner.roll_back_dates(id)
        }

        fn recurrence_markers(&self, id: &str) -> Vec<String> {
            self.inner.recurrence_markers(id)
        }

        fn stash_edit(&mut self, event: LocalEvent) {
            self.inner.stash_edit(event)
        }

        fn restore_edit(&mut self, id: &str) {
            self.inner.restore_edit(id)
        }
    }

    #[test]
    fn test_collision_fires_before_record_is_deleted() {
        let gate = ForwardingGate::new();
        let (outbox, _rx) = Outbox::channel(gate.clone());
        let mut local = JournalScheduler {
            inner: MemoryScheduler::new(outbox),
            journal: Vec::new(),
        };
        local.insert(LocalEvent::new("E1").with("rec_type", "week"));
        local.insert(LocalEvent::new("E1#1").with(RECURRENCE_PARENT_FIELD, "E1"));
        local.inner.open_editor("E1");
        let mut bridge = SyncBridge::new(local, MemoryDocumentStore::new(), gate, SyncConfig::default());

        let outcome = bridge.apply_change(&change(ChangeKind::Removed, "E1", json!({"rec_type": "week"})));

        assert_eq!(outcome, ApplyOutcome::Deleted { markers: 1 });
        assert_eq!(
            bridge.local().journal,
            vec!["delete E1#1", "notify E1 present", "delete E1"]
        );
    }

    #[test]
    fn test_removed_while_editing_aborts_on_explicit_abort() {
        let (mut bridge, mut rx) = bridge();
        seed(&mut bridge, &mut rx, LocalEvent::new("E1").with("text", "Draft"));
        bridge.local_mut().open_editor("E1");
        bridge
            .local_mut()
            .set_collision_handler(|_| NotifyOutcome::Abort);

        let outcome = bridge.apply_change(&change(ChangeKind::Removed, "E1", json!({"text": "Draft"})));

        assert_eq!(outcome, ApplyOutcome::Aborted { markers: 0 });
        assert!(bridge.local().get("E1").is_some());
        assert_eq!(bridge.local().current_edit_id(), Some("E1"));
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn test_removed_other_event_does_not_notify_editor() {
        let (mut bridge, mut rx) = bridge();
        seed(&mut bridge, &mut rx, LocalEvent::new("E1"));
        seed(&mut bridge, &mut rx, LocalEvent::new("E2"));
        bridge.local_mut().open_editor("E1");

        bridge.apply_change(&change(ChangeKind::Removed, "E2", json!({})));

        assert!(bridge.local().notifications().is_empty());
    }

    #[test]
    fn test_apply_batch_in_order_and_accumulates_stats() {
        let (mut bridge, mut rx) = bridge();
        let batch = ChangeBatch::new(vec![
            change(ChangeKind::Added, "E1", json!({"text": "One"})),
            change(ChangeKind::Modified, "E1", json!({"text": "Uno"})),
            change(ChangeKind::Added, "E1", json!({"text": "Again"})),
            change(ChangeKind::Removed, "E1", json!({"text": "Uno"})),
        ]);

        let stats = bridge.apply_batch(&batch);

        assert_eq!(stats.created, 1);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(bridge.stats(), stats);
        assert!(bridge.local().is_empty());
        assert_no_outbound(&mut rx);
    }

    #[test]
    fn test_inbound_record_keeps_echo_marker_so_recreate_is_not_sent() {
        let (mut bridge, mut rx) = bridge();
        bridge.apply_change(&change(
            ChangeKind::Added,
            "E1",
            json!({"text": "Remote", FROM_REMOTE_MARKER: true}),
        ));
        assert!(bridge.local().get("E1").unwrap().is_from_remote());
        assert_no_outbound(&mut rx);
    }
}
