use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::Utc;
use mailout_common::Domain;

use crate::{
    Blob, BlobId, Header, HeaderKind, HeaderRow, Message, MessageKey, QueueError, Result,
    r#trait::{BlobStore, QueueStore},
};

#[derive(Debug, Default)]
struct State {
    /// Keyed by `(message_id, company_id)` so iteration is dispatch order
    messages: BTreeMap<(i64, i64), Message>,
    /// Keyed by header id so iteration is header order
    headers: BTreeMap<i64, (MessageKey, HeaderRow)>,
    blobs: HashMap<BlobId, Blob>,
    domains: Vec<String>,
    next_header_id: i64,
    next_blob_id: i64,
    closed: bool,
}

impl State {
    fn message_mut(&mut self, key: MessageKey) -> Result<&mut Message> {
        self.messages
            .get_mut(&(key.message_id, key.company_id))
            .ok_or(QueueError::MessageNotFound(key))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(QueueError::Closed)
        } else {
            Ok(())
        }
    }
}

/// In-memory queue and blob store
///
/// Holds messages, header rows and blobs behind an `RwLock`. Intended for
/// tests and dry runs; nothing survives the process.
///
/// The seeding methods stand in for the upstream producers that write to a
/// real queue.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    state: Arc<RwLock<State>>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a domain to the authorized set. Case and duplicates are kept as
    /// given; normalisation is the reader's job.
    pub fn authorize_domain(&self, domain: impl Into<String>) -> Result<()> {
        self.state.write()?.domains.push(domain.into());
        Ok(())
    }

    /// Store a blob and return its id.
    pub fn insert_blob(&self, blob: Blob) -> Result<BlobId> {
        let mut state = self.state.write()?;
        state.next_blob_id += 1;
        let id = BlobId(state.next_blob_id);
        state.blobs.insert(id, blob);
        Ok(id)
    }

    /// Enqueue a message, replacing any message with the same key.
    pub fn insert_message(&self, message: Message) -> Result<()> {
        let key = message.key;
        self.state
            .write()?
            .messages
            .insert((key.message_id, key.company_id), message);
        Ok(())
    }

    /// Attach a header to a message and return the header id.
    pub fn insert_header(&self, key: MessageKey, kind: &HeaderKind) -> Result<i64> {
        let mut state = self.state.write()?;
        state.next_header_id += 1;
        let id = state.next_header_id;
        state
            .headers
            .insert(id, (key, HeaderRow::from_kind(id, kind)));
        Ok(id)
    }

    /// Attach a raw header row, bypassing the typed kinds. The row's id is
    /// replaced with a freshly allocated one, which is returned.
    pub fn insert_header_row(&self, key: MessageKey, mut row: HeaderRow) -> Result<i64> {
        let mut state = self.state.write()?;
        state.next_header_id += 1;
        row.id = state.next_header_id;
        state.headers.insert(row.id, (key, row.clone()));
        Ok(row.id)
    }

    /// Snapshot of a single message.
    pub fn message(&self, key: MessageKey) -> Result<Message> {
        self.state
            .read()?
            .messages
            .get(&(key.message_id, key.company_id))
            .cloned()
            .ok_or(QueueError::MessageNotFound(key))
    }

    /// Snapshot of every message, in dispatch order.
    pub fn messages(&self) -> Result<Vec<Message>> {
        Ok(self.state.read()?.messages.values().cloned().collect())
    }

    /// Undo [`QueueStore::close`], the way a later run reconnects to a
    /// persistent store.
    pub fn reopen(&self) -> Result<()> {
        self.state.write()?.closed = false;
        Ok(())
    }

    /// Whether [`QueueStore::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .closed
    }
}

#[async_trait]
impl QueueStore for MemoryQueue {
    async fn authorized_domains(&self) -> Result<Vec<Domain>> {
        let state = self.state.read()?;
        state.ensure_open()?;
        Ok(state.domains.iter().map(Domain::new).collect())
    }

    async fn fetch_unsent(&self, limit: usize) -> Result<Vec<Message>> {
        let state = self.state.read()?;
        state.ensure_open()?;
        Ok(state
            .messages
            .values()
            .filter(|message| message.is_eligible())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_headers(&self, key: MessageKey) -> Result<Vec<Header>> {
        let state = self.state.read()?;
        state.ensure_open()?;
        state
            .headers
            .values()
            .filter(|(owner, _)| *owner == key)
            .map(|(_, row)| Header::try_from(row.clone()))
            .collect()
    }

    async fn mark_picked_up(&self, key: MessageKey) -> Result<()> {
        let mut state = self.state.write()?;
        state.ensure_open()?;
        let message = state.message_mut(key)?;
        if message.picked_up_at.is_some() {
            return Err(QueueError::AlreadyPickedUp(key));
        }
        message.picked_up_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_sent(&self, key: MessageKey) -> Result<()> {
        let mut state = self.state.write()?;
        state.ensure_open()?;
        let message = state.message_mut(key)?;
        match (message.picked_up_at, message.sent_at) {
            (Some(picked_up_at), None) => {
                message.sent_at = Some(Utc::now().max(picked_up_at));
                Ok(())
            }
            _ => Err(QueueError::NotPickedUp(key)),
        }
    }

    async fn close(&self) -> Result<()> {
        self.state.write()?.closed = true;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryQueue {
    async fn blob(&self, id: BlobId) -> Result<Blob> {
        let state = self.state.read()?;
        state.ensure_open()?;
        state
            .blobs
            .get(&id)
            .cloned()
            .ok_or(QueueError::BlobNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use mailout_common::Mailbox;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::RecipientCounts;

    fn message(company_id: i64, message_id: i64) -> Message {
        Message {
            key: MessageKey::new(company_id, message_id),
            from: Mailbox::from("sender@example.com"),
            subject: format!("message {message_id}"),
            recipients: RecipientCounts {
                to: 1,
                from: 1,
                ..Default::default()
            },
            body: BlobId(1),
            picked_up_at: None,
            sent_at: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_unsent_is_ordered_and_bounded() {
        let queue = MemoryQueue::new();
        for id in [5, 2, 9, 1] {
            queue.insert_message(message(1, id)).unwrap();
        }

        let fetched: Vec<_> = queue
            .fetch_unsent(3)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.key.message_id)
            .collect();
        assert_eq!(fetched, vec![1, 2, 5]);
    }

    #[tokio::test]
    async fn test_picked_up_message_is_never_fetched_again() {
        let queue = MemoryQueue::new();
        queue.insert_message(message(1, 1)).unwrap();
        queue.insert_message(message(1, 2)).unwrap();

        queue.mark_picked_up(MessageKey::new(1, 1)).await.unwrap();

        let fetched = queue.fetch_unsent(10).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].key, MessageKey::new(1, 2));

        let err = queue
            .mark_picked_up(MessageKey::new(1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::AlreadyPickedUp(_)));
    }

    #[tokio::test]
    async fn test_mark_sent_requires_pickup() {
        let queue = MemoryQueue::new();
        let key = MessageKey::new(1, 1);
        queue.insert_message(message(1, 1)).unwrap();

        assert!(matches!(
            queue.mark_sent(key).await.unwrap_err(),
            QueueError::NotPickedUp(_)
        ));

        queue.mark_picked_up(key).await.unwrap();
        queue.mark_sent(key).await.unwrap();

        let stored = queue.message(key).unwrap();
        assert!(stored.picked_up_at.unwrap() <= stored.sent_at.unwrap());

        assert!(matches!(
            queue.mark_sent(key).await.unwrap_err(),
            QueueError::NotPickedUp(_)
        ));
    }

    #[tokio::test]
    async fn test_headers_belong_to_their_message() {
        let queue = MemoryQueue::new();
        let first = MessageKey::new(1, 1);
        let second = MessageKey::new(2, 1);

        queue
            .insert_header(first, &HeaderKind::To(Mailbox::from("a@example.com")))
            .unwrap();
        queue
            .insert_header(second, &HeaderKind::To(Mailbox::from("b@example.com")))
            .unwrap();
        queue
            .insert_header(first, &HeaderKind::Cc(Mailbox::from("c@example.com")))
            .unwrap();

        let headers = queue.fetch_headers(first).await.unwrap();
        assert_eq!(
            headers,
            vec![
                Header {
                    id: 1,
                    kind: HeaderKind::To(Mailbox::from("a@example.com")),
                },
                Header {
                    id: 3,
                    kind: HeaderKind::Cc(Mailbox::from("c@example.com")),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_header_kind_fails_the_fetch() {
        let queue = MemoryQueue::new();
        let key = MessageKey::new(1, 1);
        queue
            .insert_header_row(
                key,
                HeaderRow {
                    kind: "priority".to_string(),
                    value: Some("high".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(matches!(
            queue.fetch_headers(key).await.unwrap_err(),
            QueueError::UnknownHeaderKind { .. }
        ));
    }

    #[tokio::test]
    async fn test_blob_lookup() {
        let queue = MemoryQueue::new();
        let id = queue
            .insert_blob(Blob {
                mime_type: "text/plain; charset=UTF-8".to_string(),
                data: b"hello".to_vec(),
                filename: None,
            })
            .unwrap();

        assert_eq!(queue.blob(id).await.unwrap().data, b"hello");
        assert!(matches!(
            queue.blob(BlobId(99)).await.unwrap_err(),
            QueueError::BlobNotFound(BlobId(99))
        ));
    }

    #[tokio::test]
    async fn test_closed_store_refuses_work() {
        let queue = MemoryQueue::new();
        queue.close().await.unwrap();
        assert!(queue.is_closed());
        assert!(matches!(
            queue.fetch_unsent(1).await.unwrap_err(),
            QueueError::Closed
        ));
    }
}
