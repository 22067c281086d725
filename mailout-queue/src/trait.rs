use async_trait::async_trait;
use mailout_common::Domain;

use crate::{Blob, BlobId, Header, Message, MessageKey, Result};

/// Data access for the dispatcher.
///
/// Every state transition runs in its own transaction and is committed before
/// the call returns. The dispatcher relies on this: once `mark_picked_up`
/// returns, a crash can no longer cause the message to be selected again.
#[async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug {
    /// All domains this deployment may use in a From address.
    async fn authorized_domains(&self) -> Result<Vec<Domain>>;

    /// Up to `limit` eligible messages, oldest identifier first.
    async fn fetch_unsent(&self, limit: usize) -> Result<Vec<Message>>;

    /// The header rows of one message, by ascending header id.
    ///
    /// # Errors
    /// Fails with [`crate::QueueError::UnknownHeaderKind`] or
    /// [`crate::QueueError::MalformedHeader`] if any row cannot be decoded.
    async fn fetch_headers(&self, key: MessageKey) -> Result<Vec<Header>>;

    /// Stamp `picked_up_at` and commit.
    ///
    /// # Errors
    /// Fails with [`crate::QueueError::AlreadyPickedUp`] if the message is no
    /// longer eligible.
    async fn mark_picked_up(&self, key: MessageKey) -> Result<()>;

    /// Stamp `sent_at` and commit.
    ///
    /// # Errors
    /// Fails with [`crate::QueueError::NotPickedUp`] unless the message is in
    /// flight.
    async fn mark_sent(&self, key: MessageKey) -> Result<()>;

    /// Release the underlying connections.
    async fn close(&self) -> Result<()>;
}

/// Read access to message bodies and attachments.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    async fn blob(&self, id: BlobId) -> Result<Blob>;
}
