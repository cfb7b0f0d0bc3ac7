//! Local to remote: the data-processor intercept.

use tracing::{debug, info};

use super::{OutboundOutcome, SyncBridge};
use crate::codec;
use crate::error::SyncResult;
use crate::local::{LocalMutation, LocalStore, MutationAction};
use crate::remote::DocumentStore;

impl<L: LocalStore, R: DocumentStore> SyncBridge<L, R> {
    /// Forward one local mutation to the remote store.
    ///
    /// Returns `None` when nothing was sent. Remote failures are returned as-is
    /// and never retried.
    pub async fn process(&mut self, mutation: LocalMutation) -> SyncResult<Option<OutboundOutcome>> {
        let LocalMutation { action, id, record } = mutation;

        match action {
            MutationAction::Create => {
                if record.is_from_remote() {
                    debug!(id = %id, "Create came from remote, not sending");
                    return Ok(None);
                }

                let tid = self
                    .remote
                    .insert_document(&self.config.collection, codec::serialize(&record))
                    .await?;
                if tid.is_empty() {
                    return Ok(None);
                }

                self.gate.ignore(|| self.local.rekey(&id, &tid));
                self.reconciled.insert(id.clone(), tid.clone());
                info!(temp_id = %id, id = %tid, "Created remote event");

                Ok(Some(OutboundOutcome::Inserted { tid }))
            }
            MutationAction::Update => {
                let doc = self.doc_ref(&id);
                self.remote
                    .update_document(&doc, codec::serialize(&record))
                    .await?;
                debug!(doc = %doc, "Updated remote event");

                Ok(Some(OutboundOutcome::Updated))
            }
            MutationAction::Delete => {
                let doc = self.doc_ref(&id);
                self.remote.delete_document(&doc).await?;
                info!(doc = %doc, "Deleted remote event");

                Ok(Some(OutboundOutcome::Deleted))
            }
        }
    }
}
