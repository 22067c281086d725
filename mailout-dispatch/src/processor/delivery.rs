//! Per-message dispatch protocol

use std::{any::Any, panic::AssertUnwindSafe};

use futures_util::FutureExt;
use mailout_common::{
    outgoing,
    tracing::{error, info, warn},
};
use mailout_queue::{Message, QueueError};

use crate::{
    error::{FatalError, MessageError},
    policy::{AuthorizedDomains, ensure_single_sender},
    processor::Capabilities,
    render::MessageRenderer,
    transport::SendOutcome,
    types::MessageOutcome,
};

/// Take one fetched message through pickup, render, send and mark-sent.
///
/// The pickup is committed before anything else touches the message, so a
/// message is attempted at most once. Every failure after pickup, panics
/// included, is logged here and leaves the message picked up but unsent.
///
/// # Errors
///
/// Only the tenant switch and the pickup itself can fail the run.
pub(super) async fn dispatch_message(
    capabilities: &Capabilities,
    renderer: &MessageRenderer,
    authorized: &AuthorizedDomains,
    message: Message,
) -> Result<MessageOutcome, FatalError> {
    let key = message.key;

    capabilities
        .tenant
        .switch_to(key.company_id)
        .await
        .map_err(|source| FatalError::Tenant {
            company_id: key.company_id,
            source,
        })?;

    match capabilities.store.mark_picked_up(key).await {
        Ok(()) => {}
        Err(QueueError::AlreadyPickedUp(_)) => {
            warn!(
                company_id = key.company_id,
                message_id = key.message_id,
                "Message was picked up elsewhere, skipping"
            );
            return Ok(MessageOutcome::Skipped);
        }
        Err(source) => return Err(FatalError::PickUp { key, source }),
    }

    let result = AssertUnwindSafe(deliver(capabilities, renderer, authorized, &message))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(MessageError::Panicked(panic_message(panic.as_ref()))));

    Ok(match result {
        Ok(SendOutcome::Sent) => {
            info!(
                company_id = key.company_id,
                message_id = key.message_id,
                "Message sent"
            );
            MessageOutcome::Sent
        }
        Ok(SendOutcome::Rejected(diagnostic)) => {
            error!(
                company_id = key.company_id,
                message_id = key.message_id,
                diagnostic = %diagnostic,
                "Transport rejected message, leaving it picked up"
            );
            MessageOutcome::Rejected(diagnostic)
        }
        Err(e) => {
            error!(
                severity = "critical",
                company_id = key.company_id,
                message_id = key.message_id,
                error = %e,
                "Message failed, leaving it picked up"
            );
            MessageOutcome::Failed
        }
    })
}

async fn deliver(
    capabilities: &Capabilities,
    renderer: &MessageRenderer,
    authorized: &AuthorizedDomains,
    message: &Message,
) -> Result<SendOutcome, MessageError> {
    ensure_single_sender(message)?;

    let headers = capabilities.store.fetch_headers(message.key).await?;
    let outbound = renderer.render(message, headers, authorized).await?;

    outgoing!(
        level = DEBUG,
        company_id = message.key.company_id,
        message_id = message.key.message_id,
        from = %outbound.from,
        recipients = outbound.to.len() + outbound.cc.len() + outbound.bcc.len(),
        "Handing message to transport"
    );

    let outcome = capabilities.mailer.send(&outbound).await?;
    if outcome == SendOutcome::Sent {
        capabilities
            .store
            .mark_sent(message.key)
            .await
            .map_err(MessageError::MarkSent)?;
    }

    Ok(outcome)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
