//! Error types for the mailout-queue crate.

use thiserror::Error;

use crate::{BlobId, MessageKey};

/// Top-level queue error type.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The underlying database reported an error.
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No message exists for this key.
    #[error("Message not found: {0}")]
    MessageNotFound(MessageKey),

    /// No blob exists for this id.
    #[error("Blob not found: {0}")]
    BlobNotFound(BlobId),

    /// The message was already picked up, by this or another run.
    #[error("Message already picked up: {0}")]
    AlreadyPickedUp(MessageKey),

    /// A message can only be marked sent once it has been picked up.
    #[error("Message not picked up, or already sent: {0}")]
    NotPickedUp(MessageKey),

    /// A header row carries a kind outside the closed set.
    #[error("Header {header_id} has unknown kind {kind:?}")]
    UnknownHeaderKind { header_id: i64, kind: String },

    /// A header row lacks the payload column its kind needs.
    #[error("Header {header_id} of kind {kind} is missing its {field}")]
    MalformedHeader {
        header_id: i64,
        kind: &'static str,
        field: &'static str,
    },

    /// The store was closed.
    #[error("Queue store is closed")]
    Closed,

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized `Result` type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

impl<T> From<std::sync::PoisonError<T>> for QueueError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
