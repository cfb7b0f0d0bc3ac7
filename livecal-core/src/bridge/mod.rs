//! The sync bridge.
//!
//! Owns the local scheduler and the remote store handle. Local mutations are
//! forwarded upstream by `process`; remote change batches are applied locally
//! by `apply_batch`. Both run on the caller's task, one at a time, so the two
//! directions never interleave.

mod inbound;
mod outbound;

use std::collections::HashMap;

use tracing::{error, info};

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::gate::ForwardingGate;
use crate::local::{LocalMutation, LocalStore, MutationReceiver, Notification};
use crate::remote::{DocumentStore, Subscription};
use crate::stats::ApplyStats;
use crate::wire::DocumentRef;

/// Result of applying one remote change to the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    Updated,
    /// The record was deleted along with `markers` occurrence markers
    Deleted { markers: usize },
    /// The editor's collision handler kept the record; `markers` were already removed
    Aborted { markers: usize },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Our own write, not yet confirmed by the server
    PendingWrite,
    /// Added for an id the local store already holds
    AlreadyExists,
    /// Modified or removed for an id the local store does not hold
    UnknownRecord,
}

/// Result of forwarding one local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundOutcome {
    /// Remote document created; the local temp id now maps to `tid`
    Inserted { tid: String },
    Updated,
    Deleted,
}

pub struct SyncBridge<L, R> {
    local: L,
    remote: R,
    gate: ForwardingGate,
    config: SyncConfig,
    stats: ApplyStats,
    /// Temp ids already reconciled with their remote ids
    reconciled: HashMap<String, String>,
}

impl<L: LocalStore, R: DocumentStore> SyncBridge<L, R> {
    /// `gate` must be the gate the local store's outbox was built with.
    pub fn new(local: L, remote: R, gate: ForwardingGate, config: SyncConfig) -> Self {
        SyncBridge {
            local,
            remote,
            gate,
            config,
            stats: ApplyStats::default(),
            reconciled: HashMap::new(),
        }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    /// Access to the local store for user edits. Mutations made here are forwarded.
    pub fn local_mut(&mut self) -> &mut L {
        &mut self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Totals over every batch applied so far.
    pub fn stats(&self) -> ApplyStats {
        self.stats
    }

    /// Open the live query described by the config.
    pub async fn subscribe(&self) -> SyncResult<Subscription> {
        self.remote.subscribe(&self.config.query()).await
    }

    /// Handle everything already queued on either side without waiting.
    ///
    /// Local mutations go first. Returns the stats of the batches applied.
    pub async fn pump(
        &mut self,
        subscription: &mut Subscription,
        mutations: &mut MutationReceiver,
    ) -> ApplyStats {
        let mut stats = ApplyStats::default();
        loop {
            let mut progressed = false;
            while let Ok(mutation) = mutations.try_recv() {
                self.forward(mutation).await;
                progressed = true;
            }
            while let Some(batch) = subscription.try_next_batch() {
                stats.add(&self.apply_batch(&batch));
                progressed = true;
            }
            if !progressed {
                return stats;
            }
        }
    }

    /// Serve both directions until the subscription ends.
    pub async fn run(&mut self, mut subscription: Subscription, mut mutations: MutationReceiver) {
        let mut mutations_open = true;

        loop {
            tokio::select! {
                biased;

                mutation = mutations.recv(), if mutations_open => match mutation {
                    Some(mutation) => self.forward(mutation).await,
                    None => mutations_open = false,
                },
                batch = subscription.next_batch() => match batch {
                    Some(batch) => {
                        self.apply_batch(&batch);
                    }
                    None => break,
                },
            }
        }

        while let Ok(mutation) = mutations.try_recv() {
            self.forward(mutation).await;
        }

        info!(
            created = self.stats.created,
            updated = self.stats.updated,
            deleted = self.stats.deleted,
            "Subscription ended"
        );
    }

    /// Forward a mutation, reporting failures to the local store.
    async fn forward(&mut self, mutation: LocalMutation) {
        let id = mutation.id.clone();
        let action = mutation.action;

        if let Err(e) = self.process(mutation).await {
            error!(id = %id, action = %action, error = %e, "Failed to forward local change");
            self.local.notify(Notification::OutboundFailed {
                id,
                action,
                message: e.to_string(),
            });
        }
    }

    /// The id `id` is known by upstream. Temp ids resolve once their create went through.
    pub fn resolve_id<'a>(&'a self, id: &'a str) -> &'a str {
        self.reconciled.get(id).map(String::as_str).unwrap_or(id)
    }

    fn doc_ref(&self, id: &str) -> DocumentRef {
        DocumentRef::new(&self.config.collection, self.resolve_id(id))
    }
}
