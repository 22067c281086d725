use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use mailout_common::Mailbox;
use serde::{Deserialize, Serialize};

use crate::{QueueError, Result};

/// Identity of a queued message: the owning company and its message id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageKey {
    pub company_id: i64,
    pub message_id: i64,
}

impl MessageKey {
    #[must_use]
    pub const fn new(company_id: i64, message_id: i64) -> Self {
        Self {
            company_id,
            message_id,
        }
    }
}

impl Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.company_id, self.message_id)
    }
}

/// Reference to a payload held by the blob store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(pub i64);

impl Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How many addresses of each role the producer declared for a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientCounts {
    pub to: u32,
    pub cc: u32,
    pub bcc: u32,
    pub from: u32,
}

/// A message waiting in, or moving through, the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: MessageKey,
    pub from: Mailbox,
    pub subject: String,
    pub recipients: RecipientCounts,
    pub body: BlobId,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Neither picked up nor sent: the only state the batch query selects.
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        self.picked_up_at.is_none() && self.sent_at.is_none()
    }

    /// Picked up but never marked sent. Either being processed right now, or
    /// abandoned by a failed or interrupted send.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.picked_up_at.is_some() && self.sent_at.is_none()
    }

    #[must_use]
    pub const fn is_sent(&self) -> bool {
        self.sent_at.is_some()
    }
}

/// Stored content: a message body or an attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub data: Vec<u8>,
    pub filename: Option<String>,
}

/// One header row of a message, decoded into its kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub id: i64,
    pub kind: HeaderKind,
}

/// The closed set of header kinds a producer may attach to a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderKind {
    Attachment(BlobId),
    Bcc(Mailbox),
    Cc(Mailbox),
    ConfirmReadingTo(Mailbox),
    Custom(String),
    MessageId(String),
    ReplyTo(Mailbox),
    Sender(Mailbox),
    To(Mailbox),
}

impl HeaderKind {
    pub const ATTACHMENT: &'static str = "attachment";
    pub const BCC: &'static str = "bcc";
    pub const CC: &'static str = "cc";
    pub const CONFIRM_READING_TO: &'static str = "confirm_reading_to";
    pub const CUSTOM: &'static str = "custom";
    pub const MESSAGE_ID: &'static str = "message_id";
    pub const REPLY_TO: &'static str = "reply_to";
    pub const SENDER: &'static str = "sender";
    pub const TO: &'static str = "to";

    /// The discriminant stored in the `kind` column
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Attachment(_) => Self::ATTACHMENT,
            Self::Bcc(_) => Self::BCC,
            Self::Cc(_) => Self::CC,
            Self::ConfirmReadingTo(_) => Self::CONFIRM_READING_TO,
            Self::Custom(_) => Self::CUSTOM,
            Self::MessageId(_) => Self::MESSAGE_ID,
            Self::ReplyTo(_) => Self::REPLY_TO,
            Self::Sender(_) => Self::SENDER,
            Self::To(_) => Self::TO,
        }
    }
}

/// A header exactly as persisted: a textual kind plus nullable payload columns
///
/// Rows are only turned into [`Header`]s when read, so that a kind outside the
/// closed set fails the one message that carries it rather than the whole
/// queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderRow {
    pub id: i64,
    pub kind: String,
    pub address: Option<String>,
    pub display_name: Option<String>,
    pub value: Option<String>,
    pub blob_id: Option<i64>,
}

impl HeaderRow {
    /// Build the row a producer would write for `kind`.
    #[must_use]
    pub fn from_kind(id: i64, kind: &HeaderKind) -> Self {
        let mut row = Self {
            id,
            kind: kind.as_str().to_string(),
            ..Default::default()
        };

        match kind {
            HeaderKind::Attachment(blob) => row.blob_id = Some(blob.0),
            HeaderKind::Bcc(mailbox)
            | HeaderKind::Cc(mailbox)
            | HeaderKind::ConfirmReadingTo(mailbox)
            | HeaderKind::ReplyTo(mailbox)
            | HeaderKind::Sender(mailbox)
            | HeaderKind::To(mailbox) => {
                row.address = Some(mailbox.address.clone());
                row.display_name.clone_from(&mailbox.name);
            }
            HeaderKind::Custom(value) | HeaderKind::MessageId(value) => {
                row.value = Some(value.clone());
            }
        }

        row
    }

    fn mailbox(&self, kind: &'static str) -> Result<Mailbox> {
        let address = self.address.clone().ok_or(QueueError::MalformedHeader {
            header_id: self.id,
            kind,
            field: "address",
        })?;
        Ok(Mailbox::new(address, self.display_name.clone()))
    }

    fn value(&self, kind: &'static str) -> Result<String> {
        self.value.clone().ok_or(QueueError::MalformedHeader {
            header_id: self.id,
            kind,
            field: "value",
        })
    }
}

impl TryFrom<HeaderRow> for Header {
    type Error = QueueError;

    fn try_from(row: HeaderRow) -> Result<Self> {
        let kind = match row.kind.to_ascii_lowercase().as_str() {
            HeaderKind::ATTACHMENT => HeaderKind::Attachment(BlobId(row.blob_id.ok_or(
                QueueError::MalformedHeader {
                    header_id: row.id,
                    kind: HeaderKind::ATTACHMENT,
                    field: "blob_id",
                },
            )?)),
            HeaderKind::BCC => HeaderKind::Bcc(row.mailbox(HeaderKind::BCC)?),
            HeaderKind::CC => HeaderKind::Cc(row.mailbox(HeaderKind::CC)?),
            HeaderKind::CONFIRM_READING_TO => {
                HeaderKind::ConfirmReadingTo(row.mailbox(HeaderKind::CONFIRM_READING_TO)?)
            }
            HeaderKind::CUSTOM => HeaderKind::Custom(row.value(HeaderKind::CUSTOM)?),
            HeaderKind::MESSAGE_ID => HeaderKind::MessageId(row.value(HeaderKind::MESSAGE_ID)?),
            HeaderKind::REPLY_TO => HeaderKind::ReplyTo(row.mailbox(HeaderKind::REPLY_TO)?),
            HeaderKind::SENDER => HeaderKind::Sender(row.mailbox(HeaderKind::SENDER)?),
            HeaderKind::TO => HeaderKind::To(row.mailbox(HeaderKind::TO)?),
            _ => {
                return Err(QueueError::UnknownHeaderKind {
                    header_id: row.id,
                    kind: row.kind,
                });
            }
        };

        Ok(Self { id: row.id, kind })
    }
}
