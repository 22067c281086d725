//! Typed error handling for dispatch runs.
//!
//! Failures fall into two groups:
//! - Fatal: the run cannot continue (setup, or the queue itself failing)
//! - Message: one message could not be sent; the run moves on to the next

use mailout_queue::{MessageKey, QueueError};
use thiserror::Error;

use crate::{tenant::TenantError, transport::TransportError};

/// Top-level dispatch error type.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The run was aborted.
    #[error("Run aborted: {0}")]
    Fatal(#[from] FatalError),

    /// A single message failed; never aborts a run.
    #[error("Message failed: {0}")]
    Message(#[from] MessageError),
}

/// Errors that end a dispatch run.
#[derive(Debug, Error)]
pub enum FatalError {
    /// The authorized sender domains could not be loaded.
    #[error("Could not load authorized domains: {0}")]
    AuthorizedDomains(#[source] QueueError),

    /// Fetching the next batch failed.
    #[error("Could not fetch unsent messages: {0}")]
    Fetch(#[source] QueueError),

    /// The pickup transition could not be committed.
    #[error("Could not mark {key} picked up: {source}")]
    PickUp {
        key: MessageKey,
        #[source]
        source: QueueError,
    },

    /// Data access could not be scoped to the message's company.
    #[error("Could not switch to company {company_id}: {source}")]
    Tenant {
        company_id: i64,
        #[source]
        source: TenantError,
    },

    /// Releasing the queue connection failed.
    #[error("Could not close the queue store: {0}")]
    Close(#[source] QueueError),

    /// The dispatcher was run before its capabilities were supplied.
    #[error("Dispatcher not initialized: {0}")]
    NotInitialized(&'static str),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors confined to a single message.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Only single-sender messages can be transmitted.
    #[error("Message declares {count} From addresses, exactly one is supported")]
    MultipleSenders { count: u32 },

    /// The body's MIME type does not carry a charset.
    #[error("Invalid MIME type {0:?}, expected \"<type>; charset=<charset>\"")]
    InvalidMimeType(String),

    /// Reading headers or blobs failed, including header rows of unknown kind.
    #[error("Queue error: {0}")]
    Store(#[from] QueueError),

    /// The message was sent but the sent transition could not be committed.
    #[error("Sent, but could not mark sent: {0}")]
    MarkSent(#[source] QueueError),

    /// The transport could not accept the message at all.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A required part of the outbound message was never set.
    #[error("Outbound message is missing its {0}")]
    Incomplete(&'static str),

    /// Processing panicked.
    #[error("Processing panicked: {0}")]
    Panicked(String),
}

impl DispatchError {
    /// Returns `true` if this error ended the run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Returns `true` if this error only affected one message.
    #[must_use]
    pub const fn is_message(&self) -> bool {
        matches!(self, Self::Message(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_is_fatal() {
        let error: DispatchError =
            FatalError::Fetch(QueueError::Internal("gone".to_string())).into();
        assert!(error.is_fatal());
        assert!(!error.is_message());
    }

    #[test]
    fn test_dispatch_error_is_message() {
        let error: DispatchError = MessageError::MultipleSenders { count: 2 }.into();
        assert!(error.is_message());
        assert!(!error.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let error: DispatchError = MessageError::MultipleSenders { count: 2 }.into();
        assert_eq!(
            error.to_string(),
            "Message failed: Message declares 2 From addresses, exactly one is supported"
        );

        let error: DispatchError = FatalError::PickUp {
            key: MessageKey::new(1, 7),
            source: QueueError::MessageNotFound(MessageKey::new(1, 7)),
        }
        .into();
        assert_eq!(
            error.to_string(),
            "Run aborted: Could not mark 1/7 picked up: Message not found: 1/7"
        );
    }

    #[test]
    fn test_queue_error_conversion() {
        let error: MessageError = QueueError::UnknownHeaderKind {
            header_id: 3,
            kind: "importance".to_string(),
        }
        .into();
        assert!(matches!(
            error,
            MessageError::Store(QueueError::UnknownHeaderKind { .. })
        ));
    }
}
