//! Live sync between a local calendar scheduler and a remote document store.
//!
//! This crate provides the pieces used by livecal-cli:
//! - `SyncBridge`, which forwards local mutations upstream and applies remote
//!   change batches locally without echoing them back
//! - `LocalStore` and `DocumentStore`, the two sides of the bridge, with
//!   in-memory implementations
//! - `codec` for converting between local events and remote documents

pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod gate;
pub mod local;
pub mod remote;
pub mod stats;
pub mod wire;

pub use bridge::{ApplyOutcome, OutboundOutcome, SkipReason, SyncBridge};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use event::{FieldValue, LocalEvent};
pub use gate::ForwardingGate;
pub use stats::ApplyStats;
