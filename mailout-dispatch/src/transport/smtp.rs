//! SMTP transport backed by lettre

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{
        Attachment as LettreAttachment, Mailbox as LettreMailbox, MessageBuilder, MultiPart,
        SinglePart,
        header::{ContentType, HeaderName, HeaderValue},
    },
    transport::smtp::authentication::Credentials,
};
use mailout_common::{Mailbox, internal, tracing::debug};
use serde::Deserialize;

use crate::{
    render::{Body, OutboundMessage},
    transport::{Mailer, SendOutcome, TransportError},
};

const fn default_port() -> u16 {
    587
}

const fn default_timeout() -> u64 {
    30
}

/// How the connection to the relay is secured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS
    #[default]
    #[serde(alias = "starttls")]
    StartTls,
    /// Implicit TLS from the first byte
    #[serde(alias = "tls")]
    Tls,
    /// No encryption. Local relays only.
    #[serde(alias = "none")]
    Plain,
}

/// Relay connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub security: SmtpSecurity,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Per-command timeout, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: default_port(),
            security: SmtpSecurity::default(),
            username: None,
            password: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// [`Mailer`] that relays every message through one SMTP server
#[derive(Debug)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build the relay transport. No connection is opened until the first send.
    ///
    /// # Errors
    ///
    /// [`TransportError::Configuration`] if TLS parameters cannot be set up
    /// for `host`, or only one of username and password is given.
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let builder = match config.security {
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| TransportError::Configuration(e.to_string()))?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| TransportError::Configuration(e.to_string()))?,
            SmtpSecurity::Plain => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
        };

        let builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            (None, None) => builder,
            _ => {
                return Err(TransportError::Configuration(
                    "username and password must be given together".to_string(),
                ));
            }
        };

        internal!(
            level = INFO,
            "SMTP relay {}:{} ({:?})",
            config.host,
            config.port,
            config.security
        );

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &OutboundMessage) -> Result<SendOutcome, TransportError> {
        let email = to_lettre(message)?;

        match self.transport.send(email).await {
            Ok(response) => {
                debug!(code = %response.code(), "Relay accepted message");
                Ok(SendOutcome::Sent)
            }
            Err(e) => Ok(SendOutcome::Rejected(e.to_string())),
        }
    }
}

fn mailbox(mailbox: &Mailbox) -> Result<LettreMailbox, TransportError> {
    let address = mailbox
        .address
        .trim()
        .parse::<Address>()
        .map_err(|e| TransportError::InvalidAddress {
            address: mailbox.address.clone(),
            reason: e.to_string(),
        })?;

    Ok(LettreMailbox::new(mailbox.name.clone(), address))
}

/// Headers built from structured fields. lettre replaces a header on a
/// repeated name, so a custom row must never carry one of these.
const RESERVED_HEADERS: &[&str] = &[
    "bcc",
    "cc",
    "content-disposition",
    "content-transfer-encoding",
    "content-type",
    "date",
    "disposition-notification-to",
    "from",
    "message-id",
    "mime-version",
    "reply-to",
    "sender",
    "subject",
    "to",
];

/// Split a raw `Name: value` line.
fn custom_header(raw: &str) -> Result<HeaderValue, TransportError> {
    let invalid = || TransportError::InvalidHeader(raw.to_string());

    let (name, value) = raw.split_once(':').ok_or_else(invalid)?;
    let name = name.trim();
    if name.is_empty() || RESERVED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
        return Err(invalid());
    }
    let name = HeaderName::new_from_ascii(name.to_string()).map_err(|_| invalid())?;

    Ok(HeaderValue::new(name, value.trim().to_string()))
}

fn body_part(body: &Body) -> Result<SinglePart, TransportError> {
    let raw = format!("{}; charset={}", body.format.content_type(), body.charset);
    let content_type = ContentType::parse(&raw).map_err(|_| TransportError::InvalidHeader(raw))?;

    Ok(SinglePart::builder()
        .header(content_type)
        .body(body.content.clone()))
}

fn apply_addresses(
    mut builder: MessageBuilder,
    message: &OutboundMessage,
) -> Result<MessageBuilder, TransportError> {
    builder = builder.from(mailbox(&message.from)?);

    if let Some(sender) = &message.sender {
        builder = builder.sender(mailbox(sender)?);
    }
    for to in &message.to {
        builder = builder.to(mailbox(to)?);
    }
    for cc in &message.cc {
        builder = builder.cc(mailbox(cc)?);
    }
    for bcc in &message.bcc {
        builder = builder.bcc(mailbox(bcc)?);
    }
    for reply_to in &message.reply_to {
        builder = builder.reply_to(mailbox(reply_to)?);
    }

    Ok(builder)
}

/// Convert a rendered message into a lettre MIME message.
///
/// # Errors
///
/// Fails on addresses or header lines lettre cannot express, or a message
/// without any recipient.
pub(crate) fn to_lettre(message: &OutboundMessage) -> Result<lettre::Message, TransportError> {
    // `None` lets lettre generate a Message-ID
    let mut builder = apply_addresses(lettre::Message::builder(), message)?
        .subject(message.subject.clone())
        .message_id(message.message_id.clone());

    if let Some(target) = &message.read_receipt_to {
        builder = builder.raw_header(HeaderValue::new(
            HeaderName::new_from_ascii_str("Disposition-Notification-To"),
            mailbox(target)?.to_string(),
        ));
    }

    for raw in &message.custom_headers {
        builder = builder.raw_header(custom_header(raw)?);
    }

    let body = body_part(&message.body)?;
    let email = if message.attachments.is_empty() {
        builder.singlepart(body)
    } else {
        let mut parts = MultiPart::mixed().singlepart(body);
        for attachment in &message.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|_| TransportError::InvalidHeader(attachment.content_type.clone()))?;
            parts = parts.singlepart(
                LettreAttachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), content_type),
            );
        }
        builder.multipart(parts)
    };

    email.map_err(|e| TransportError::Build(e.to_string()))
}
