//! Sender resolution

use std::{fmt::Debug, sync::Arc};

use mailout_common::{Mailbox, tracing::debug};
use mailout_queue::Message;
use serde::Deserialize;

use crate::{error::MessageError, policy::AuthorizedDomains};

/// Fail any message that does not declare exactly one From address.
///
/// # Errors
///
/// [`MessageError::MultipleSenders`] with the declared count.
pub fn ensure_single_sender(message: &Message) -> Result<(), MessageError> {
    match message.recipients.from {
        1 => Ok(()),
        count => Err(MessageError::MultipleSenders { count }),
    }
}

/// Produces the From identity for a message whose declared sender domain is
/// not authorized.
///
/// Implementations must never hand back the declared mailbox unchanged.
pub trait UnauthorizedSenderPolicy: Send + Sync + Debug {
    fn apply(&self, declared: &Mailbox) -> Mailbox;
}

/// Replace the From address with a fixed system address.
///
/// Without a configured `name`, the declared display name (or the declared
/// address if it had none) is kept as the display name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubstituteSender {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl SubstituteSender {
    #[must_use]
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }
}

impl UnauthorizedSenderPolicy for SubstituteSender {
    fn apply(&self, declared: &Mailbox) -> Mailbox {
        let name = self
            .name
            .clone()
            .or_else(|| declared.name.clone())
            .unwrap_or_else(|| declared.address.clone());

        Mailbox::new(self.address.clone(), Some(name))
    }
}

/// The From a message will actually be sent with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub from: Mailbox,
    /// The declared sender was unauthorized and `from` came from the fallback
    /// policy.
    pub substituted: bool,
}

/// Decides the effective sender of each message
#[derive(Debug, Clone)]
pub struct SenderResolver {
    fallback: Arc<dyn UnauthorizedSenderPolicy>,
}

impl SenderResolver {
    #[must_use]
    pub fn new(fallback: Arc<dyn UnauthorizedSenderPolicy>) -> Self {
        Self { fallback }
    }

    /// Keep the declared sender if its domain is authorized, otherwise ask the
    /// fallback policy.
    #[must_use]
    pub fn resolve(&self, message: &Message, authorized: &AuthorizedDomains) -> SenderIdentity {
        let declared = &message.from;
        if authorized.is_authorized(declared) {
            return SenderIdentity {
                from: declared.clone(),
                substituted: false,
            };
        }

        let from = self.fallback.apply(declared);
        debug!(
            company_id = message.key.company_id,
            message_id = message.key.message_id,
            declared = %declared,
            effective = %from,
            "Sender domain not authorized, substituting From"
        );

        SenderIdentity {
            from,
            substituted: true,
        }
    }
}
