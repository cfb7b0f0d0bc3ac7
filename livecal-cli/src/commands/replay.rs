use std::path::Path;

use anyhow::{Result, bail};
use livecal_core::local::{MemoryScheduler, MutationReceiver, NotifyOutcome, Outbox};
use livecal_core::remote::{DocumentStore, MemoryDocumentStore, Subscription};
use livecal_core::wire::DocumentRef;
use livecal_core::{ApplyStats, ForwardingGate, LocalEvent, SyncBridge, SyncConfig};
use owo_colors::OwoColorize;

use crate::render::Render;
use crate::scenario::{Scenario, Step, document_data};

type Bridge = SyncBridge<MemoryScheduler, MemoryDocumentStore>;

/// A bridge wired to an in-memory store, plus a second client playing the peer.
struct Session {
    bridge: Bridge,
    peer: MemoryDocumentStore,
    subscription: Subscription,
    mutations: MutationReceiver,
    seen_notifications: usize,
}

impl Session {
    async fn start(config: SyncConfig) -> Result<Self> {
        let remote = MemoryDocumentStore::new();
        let peer = remote.client();
        let gate = ForwardingGate::new();
        let (outbox, mutations) = Outbox::channel(gate.clone());
        let bridge = SyncBridge::new(MemoryScheduler::new(outbox), remote, gate, config);
        let subscription = bridge.subscribe().await?;

        Ok(Session {
            bridge,
            peer,
            subscription,
            mutations,
            seen_notifications: 0,
        })
    }

    async fn pump(&mut self) -> ApplyStats {
        self.bridge
            .pump(&mut self.subscription, &mut self.mutations)
            .await
    }

    fn doc_ref(&self, id: &str) -> DocumentRef {
        DocumentRef::new(&self.bridge.config().collection, id)
    }

    async fn apply(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::PeerPut { id, data } => {
                self.peer.set_document(&self.doc_ref(id), document_data(data))?;
            }
            Step::PeerUpdate { id, data } => {
                self.peer
                    .update_document(&self.doc_ref(id), document_data(data))
                    .await?;
            }
            Step::PeerDelete { id } => {
                self.peer.delete_document(&self.doc_ref(id)).await?;
            }
            Step::LocalCreate { id, fields } => {
                let event = LocalEvent::from_json(id.as_deref().unwrap_or(""), fields.clone());
                let id = self.bridge.local_mut().add_event(event);
                println!("   {} {}", "created".dimmed(), id);
            }
            Step::LocalUpdate { id, fields } => {
                let id = self.bridge.resolve_id(id).to_string();
                let changes = LocalEvent::from_json(&id, fields.clone()).fields;
                if !self.bridge.local_mut().update_event(&id, changes) {
                    bail!("No local event '{}'", id);
                }
            }
            Step::LocalDelete { id } => {
                let id = self.bridge.resolve_id(id).to_string();
                if !self.bridge.local_mut().delete_event(&id) {
                    bail!("No local event '{}'", id);
                }
            }
            Step::OpenEditor { id } => {
                let id = self.bridge.resolve_id(id).to_string();
                if !self.bridge.local_mut().open_editor(&id) {
                    bail!("No local event '{}'", id);
                }
            }
            Step::CloseEditor => {
                self.bridge.local_mut().close_editor();
            }
            Step::SaveEditor => match self.bridge.local_mut().save_editor() {
                Some(id) => println!("   {} {}", "saved".dimmed(), id),
                None => bail!("Nothing to save"),
            },
            Step::RejectCollisions { enabled } => {
                let outcome = if *enabled {
                    NotifyOutcome::Abort
                } else {
                    NotifyOutcome::Continue
                };
                self.bridge
                    .local_mut()
                    .set_collision_handler(move |_| outcome);
            }
        }
        Ok(())
    }

    /// Print notifications raised since the last call.
    fn print_notifications(&mut self) {
        let notifications = self.bridge.local().notifications();
        for notification in &notifications[self.seen_notifications..] {
            println!("   {}", notification.render());
        }
        self.seen_notifications = notifications.len();
    }
}

pub async fn run(path: &Path, config: SyncConfig) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let mut session = Session::start(config).await?;

    if let Some(name) = &scenario.name {
        println!("{}\n", name.bold());
    }

    let initial = session.pump().await;
    println!("{} {}", "Initial snapshot:".dimmed(), initial.render());

    let mut totals = initial;
    for (i, step) in scenario.steps.iter().enumerate() {
        println!("{} {}", format!("[{}]", i + 1).dimmed(), step.describe());

        if let Err(e) = session.apply(step).await {
            println!("   {}", e.to_string().red());
        }

        let stats = session.pump().await;
        println!("   {}", stats.render());
        session.print_notifications();
        totals.add(&stats);
    }

    println!("\n{}", "Local events".bold());
    if session.bridge.local().is_empty() {
        println!("   {}", "(none)".dimmed());
    }
    for event in session.bridge.local().events() {
        println!("   {}", event.render());
    }

    let collection = session.bridge.config().collection.clone();
    let documents = session.bridge.remote().documents(&collection);
    println!("\n{}", "Remote documents".bold());
    if documents.is_empty() {
        println!("   {}", "(none)".dimmed());
    }
    for doc in &documents {
        println!("   {}", doc.render());
    }

    if totals.has_changes() {
        println!(
            "\nApplied: {} created, {} updated, {} deleted",
            totals.created, totals.updated, totals.deleted
        );
    }

    Ok(())
}
