//! Header assembly

use std::sync::Arc;

use mailout_common::{Mailbox, tracing::trace};
use mailout_queue::{BlobStore, Header, HeaderKind};

use crate::{
    error::MessageError,
    render::outbound::{Attachment, OutboundBuilder},
};

/// Applies a message's header rows to an [`OutboundBuilder`]
#[derive(Debug, Clone)]
pub struct HeaderAssembler {
    blobs: Arc<dyn BlobStore>,
}

impl HeaderAssembler {
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Apply `headers` in ascending id order.
    ///
    /// If no reply-to header was among them, `fallback_reply_to` becomes the
    /// only Reply-To entry.
    ///
    /// # Errors
    ///
    /// Fails if an attachment blob cannot be read. The builder may be
    /// partially populated in that case and should be discarded.
    pub async fn assemble(
        &self,
        mut headers: Vec<Header>,
        builder: &mut OutboundBuilder,
        fallback_reply_to: &Mailbox,
    ) -> Result<(), MessageError> {
        headers.sort_by_key(|header| header.id);

        for header in headers {
            trace!(header_id = header.id, kind = header.kind.as_str(), "Applying header");

            match header.kind {
                HeaderKind::Attachment(id) => {
                    let blob = self.blobs.blob(id).await?;
                    builder.attach(Attachment {
                        filename: blob
                            .filename
                            .unwrap_or_else(|| format!("attachment-{id}")),
                        content_type: blob.mime_type,
                        data: blob.data,
                    });
                }
                HeaderKind::Bcc(mailbox) => {
                    builder.bcc(mailbox);
                }
                HeaderKind::Cc(mailbox) => {
                    builder.cc(mailbox);
                }
                HeaderKind::ConfirmReadingTo(mailbox) => {
                    builder.read_receipt_to(mailbox);
                }
                HeaderKind::Custom(raw) => {
                    builder.custom_header(raw);
                }
                HeaderKind::MessageId(message_id) => {
                    builder.message_id(message_id);
                }
                HeaderKind::ReplyTo(mailbox) => {
                    builder.reply_to(mailbox);
                }
                HeaderKind::Sender(mailbox) => {
                    builder.sender(mailbox);
                }
                HeaderKind::To(mailbox) => {
                    builder.to(mailbox);
                }
            }
        }

        if !builder.has_reply_to() {
            builder.reply_to(fallback_reply_to.clone());
        }

        Ok(())
    }
}
