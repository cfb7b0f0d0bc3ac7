//! Error types for livecal.

use thiserror::Error;

/// Errors that can occur while syncing events.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Timestamp out of range: {seconds}s {nanoseconds}ns")]
    InvalidTimestamp { seconds: i64, nanoseconds: u32 },

    #[error("Invalid date value: {0}")]
    InvalidDate(String),
}

/// Result type alias for livecal operations.
pub type SyncResult<T> = Result<T, SyncError>;
