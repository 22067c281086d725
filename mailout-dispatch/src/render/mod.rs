//! Rendering queued messages into outbound messages

pub mod headers;
pub mod outbound;

use std::{fmt::Display, sync::Arc};

use mailout_common::tracing::warn;
use mailout_queue::{BlobStore, Header, Message};

pub use self::{
    headers::HeaderAssembler,
    outbound::{Attachment, Body, BodyFormat, OutboundBuilder, OutboundMessage},
};
use crate::{
    error::MessageError,
    policy::{AuthorizedDomains, SenderResolver},
};

/// A body MIME type of the form `<type>; charset=<charset>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeType {
    /// The primary type, lower-cased
    pub essence: String,
    pub charset: String,
}

impl MimeType {
    /// Parse a MIME type that must carry a `charset` parameter.
    ///
    /// Other parameters are ignored. The charset may be quoted.
    ///
    /// # Errors
    ///
    /// [`MessageError::InvalidMimeType`] if the primary type is empty or no
    /// non-empty charset is present.
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let invalid = || MessageError::InvalidMimeType(raw.to_string());

        let mut parts = raw.split(';');
        let essence = parts
            .next()
            .map(str::trim)
            .filter(|essence| !essence.is_empty())
            .ok_or_else(invalid)?
            .to_ascii_lowercase();

        let charset = parts
            .filter_map(|param| param.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches('"').trim())
            .filter(|charset| !charset.is_empty())
            .ok_or_else(invalid)?
            .to_string();

        Ok(Self { essence, charset })
    }

    #[must_use]
    pub fn format(&self) -> BodyFormat {
        if self.essence == "text/html" {
            BodyFormat::Html
        } else {
            BodyFormat::Plain
        }
    }
}

impl Display for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}; charset={}", self.essence, self.charset)
    }
}

/// Builds one transmittable message from a queued message and its headers
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    blobs: Arc<dyn BlobStore>,
    senders: SenderResolver,
    headers: HeaderAssembler,
}

impl MessageRenderer {
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStore>, senders: SenderResolver) -> Self {
        Self {
            headers: HeaderAssembler::new(Arc::clone(&blobs)),
            blobs,
            senders,
        }
    }

    /// Render `message`. Nothing is transmitted.
    ///
    /// # Errors
    ///
    /// Fails if the body or an attachment cannot be read, or the body's MIME
    /// type carries no charset.
    pub async fn render(
        &self,
        message: &Message,
        headers: Vec<Header>,
        authorized: &AuthorizedDomains,
    ) -> Result<OutboundMessage, MessageError> {
        let mut builder = OutboundBuilder::new();
        builder.subject(message.subject.clone());

        let blob = self.blobs.blob(message.body).await?;
        let mime_type = MimeType::parse(&blob.mime_type)?;
        builder.body(Body {
            format: mime_type.format(),
            charset: mime_type.charset,
            content: blob.data,
        });

        let identity = self.senders.resolve(message, authorized);
        builder.from(identity.from);

        self.headers
            .assemble(headers, &mut builder, &message.from)
            .await?;

        check_declared_counts(message, &builder);

        builder.build()
    }
}

/// The header rows are authoritative; a mismatch with the declared counts is
/// only reported.
fn check_declared_counts(message: &Message, builder: &OutboundBuilder) {
    let declared = &message.recipients;
    let (to, cc, bcc) = builder.recipient_counts();

    let matches = [(declared.to, to), (declared.cc, cc), (declared.bcc, bcc)]
        .into_iter()
        .all(|(declared, assembled)| usize::try_from(declared).is_ok_and(|d| d == assembled));

    if !matches {
        warn!(
            company_id = message.key.company_id,
            message_id = message.key.message_id,
            declared_to = declared.to,
            declared_cc = declared.cc,
            declared_bcc = declared.bcc,
            to,
            cc,
            bcc,
            "Declared recipient counts do not match the header rows"
        );
    }
}
