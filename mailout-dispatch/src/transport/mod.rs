//! Transport capability

pub mod smtp;

use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

pub use self::smtp::{SmtpConfig, SmtpMailer, SmtpSecurity};
use crate::render::OutboundMessage;

/// What the transport made of a message it was able to attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Not delivered, with the transport's diagnostic
    Rejected(String),
}

/// The message could not be attempted at all
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Invalid header {0:?}")]
    InvalidHeader(String),

    #[error("Could not build message: {0}")]
    Build(String),

    #[error("Transport misconfigured: {0}")]
    Configuration(String),
}

/// Hands rendered messages to whatever physically transmits them
#[async_trait]
pub trait Mailer: Send + Sync + Debug {
    /// Attempt delivery of `message` once.
    ///
    /// # Errors
    ///
    /// A [`TransportError`] means nothing was attempted. A failed attempt is
    /// [`SendOutcome::Rejected`].
    async fn send(&self, message: &OutboundMessage) -> Result<SendOutcome, TransportError>;
}
