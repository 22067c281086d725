//! The transport-neutral outbound message and its builder

use mailout_common::Mailbox;

use crate::error::MessageError;

/// How the body is to be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Html,
    Plain,
}

impl BodyFormat {
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Plain => "text/plain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub format: BodyFormat,
    pub charset: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A fully rendered message, ready to hand to a [`crate::Mailer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub subject: String,
    pub from: Mailbox,
    /// Envelope Sender override, distinct from From
    pub sender: Option<Mailbox>,
    pub to: Vec<Mailbox>,
    pub cc: Vec<Mailbox>,
    pub bcc: Vec<Mailbox>,
    pub reply_to: Vec<Mailbox>,
    /// Read-receipt target
    pub read_receipt_to: Option<Mailbox>,
    /// Overrides the generated Message-ID
    pub message_id: Option<String>,
    /// Raw `Name: value` lines, in header order
    pub custom_headers: Vec<String>,
    pub body: Body,
    pub attachments: Vec<Attachment>,
}

/// Accumulates the parts of an [`OutboundMessage`]
///
/// Single-valued parts are overwritten by later calls; list parts accumulate
/// in call order.
#[derive(Debug, Clone, Default)]
pub struct OutboundBuilder {
    subject: Option<String>,
    from: Option<Mailbox>,
    sender: Option<Mailbox>,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    reply_to: Vec<Mailbox>,
    read_receipt_to: Option<Mailbox>,
    message_id: Option<String>,
    custom_headers: Vec<String>,
    body: Option<Body>,
    attachments: Vec<Attachment>,
}

impl OutboundBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn from(&mut self, from: Mailbox) -> &mut Self {
        self.from = Some(from);
        self
    }

    pub fn sender(&mut self, sender: Mailbox) -> &mut Self {
        self.sender = Some(sender);
        self
    }

    pub fn to(&mut self, mailbox: Mailbox) -> &mut Self {
        self.to.push(mailbox);
        self
    }

    pub fn cc(&mut self, mailbox: Mailbox) -> &mut Self {
        self.cc.push(mailbox);
        self
    }

    pub fn bcc(&mut self, mailbox: Mailbox) -> &mut Self {
        self.bcc.push(mailbox);
        self
    }

    pub fn reply_to(&mut self, mailbox: Mailbox) -> &mut Self {
        self.reply_to.push(mailbox);
        self
    }

    pub fn read_receipt_to(&mut self, mailbox: Mailbox) -> &mut Self {
        self.read_receipt_to = Some(mailbox);
        self
    }

    pub fn message_id(&mut self, message_id: impl Into<String>) -> &mut Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn custom_header(&mut self, raw: impl Into<String>) -> &mut Self {
        self.custom_headers.push(raw.into());
        self
    }

    pub fn body(&mut self, body: Body) -> &mut Self {
        self.body = Some(body);
        self
    }

    pub fn attach(&mut self, attachment: Attachment) -> &mut Self {
        self.attachments.push(attachment);
        self
    }

    #[must_use]
    pub fn has_reply_to(&self) -> bool {
        !self.reply_to.is_empty()
    }

    /// Number of To, Cc and Bcc entries accumulated so far
    #[must_use]
    pub fn recipient_counts(&self) -> (usize, usize, usize) {
        (self.to.len(), self.cc.len(), self.bcc.len())
    }

    /// # Errors
    ///
    /// [`MessageError::Incomplete`] naming the first of subject, From or body
    /// that was never set.
    pub fn build(self) -> Result<OutboundMessage, MessageError> {
        Ok(OutboundMessage {
            subject: self.subject.ok_or(MessageError::Incomplete("subject"))?,
            from: self.from.ok_or(MessageError::Incomplete("From address"))?,
            body: self.body.ok_or(MessageError::Incomplete("body"))?,
            sender: self.sender,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            reply_to: self.reply_to,
            read_receipt_to: self.read_receipt_to,
            message_id: self.message_id,
            custom_headers: self.custom_headers,
            attachments: self.attachments,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn body() -> Body {
        Body {
            format: BodyFormat::Plain,
            charset: "UTF-8".to_string(),
            content: b"Hi".to_vec(),
        }
    }

    #[test]
    fn test_build_requires_subject_from_and_body() {
        let err = OutboundBuilder::new().build().unwrap_err();
        assert!(matches!(err, MessageError::Incomplete("subject")));

        let mut builder = OutboundBuilder::new();
        builder.subject("Hi");
        let err = builder.build().unwrap_err();
        assert!(matches!(err, MessageError::Incomplete("From address")));

        let mut builder = OutboundBuilder::new();
        builder.subject("Hi").from(Mailbox::from("a@example.com"));
        let err = builder.build().unwrap_err();
        assert!(matches!(err, MessageError::Incomplete("body")));
    }

    #[test]
    fn test_lists_accumulate_in_order() {
        let mut builder = OutboundBuilder::new();
        builder
            .subject("Hi")
            .from(Mailbox::from("a@example.com"))
            .body(body())
            .to(Mailbox::from("one@example.com"))
            .to(Mailbox::from("two@example.com"))
            .cc(Mailbox::from("cc@example.com"))
            .message_id("<first@example.com>")
            .message_id("<second@example.com>");

        assert_eq!(builder.recipient_counts(), (2, 1, 0));
        assert!(!builder.has_reply_to());

        let message = builder.build().unwrap();
        assert_eq!(
            message.to,
            vec![
                Mailbox::from("one@example.com"),
                Mailbox::from("two@example.com")
            ]
        );
        assert_eq!(message.message_id.as_deref(), Some("<second@example.com>"));
    }

    #[test]
    fn test_body_content_type() {
        assert_eq!(BodyFormat::Html.content_type(), "text/html");
        assert_eq!(BodyFormat::Plain.content_type(), "text/plain");
    }
}
