//! Shared fixtures for dispatcher integration tests

#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use mailout_common::{Domain, Mailbox};
use mailout_dispatch::{
    Capabilities, Dispatcher, Mailer, OutboundMessage, SendOutcome, SingleTenant,
    SubstituteSender, TransportError,
};
use mailout_queue::{
    Blob, Header, HeaderKind, MemoryQueue, Message, MessageKey, QueueError, QueueStore,
    RecipientCounts,
};
use tokio_util::sync::CancellationToken;

pub const SYSTEM_SENDER: &str = "noreply@example.net";

/// Records every message it is handed.
///
/// Subjects starting with `reject` are rejected, `panic` panics, and
/// `broken` fails with a [`TransportError`].
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundMessage>>,
    cancel_after_first: Option<CancellationToken>,
}

impl RecordingMailer {
    pub fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel_after_first: Some(token),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|message| message.subject)
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &OutboundMessage) -> Result<SendOutcome, TransportError> {
        if message.subject.starts_with("panic") {
            panic!("transport exploded");
        }
        if message.subject.starts_with("broken") {
            return Err(TransportError::Configuration("no relay".to_string()));
        }

        self.sent.lock().unwrap().push(message.clone());

        if let Some(token) = &self.cancel_after_first {
            token.cancel();
        }

        if message.subject.starts_with("reject") {
            Ok(SendOutcome::Rejected("550 5.1.1 mailbox unavailable".to_string()))
        } else {
            Ok(SendOutcome::Sent)
        }
    }
}

/// A [`MemoryQueue`] whose operations can be made to fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    pub inner: MemoryQueue,
    pub fail_domains: AtomicBool,
    pub fail_fetch: AtomicBool,
    pub fail_pickup: AtomicBool,
}

impl FailingStore {
    fn check(flag: &AtomicBool) -> mailout_queue::Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(QueueError::Internal("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueStore for FailingStore {
    async fn authorized_domains(&self) -> mailout_queue::Result<Vec<Domain>> {
        Self::check(&self.fail_domains)?;
        self.inner.authorized_domains().await
    }

    async fn fetch_unsent(&self, limit: usize) -> mailout_queue::Result<Vec<Message>> {
        Self::check(&self.fail_fetch)?;
        self.inner.fetch_unsent(limit).await
    }

    async fn fetch_headers(&self, key: MessageKey) -> mailout_queue::Result<Vec<Header>> {
        self.inner.fetch_headers(key).await
    }

    async fn mark_picked_up(&self, key: MessageKey) -> mailout_queue::Result<()> {
        Self::check(&self.fail_pickup)?;
        self.inner.mark_picked_up(key).await
    }

    async fn mark_sent(&self, key: MessageKey) -> mailout_queue::Result<()> {
        self.inner.mark_sent(key).await
    }

    async fn close(&self) -> mailout_queue::Result<()> {
        self.inner.close().await
    }
}

/// Seed a message with an HTML body and a single To header.
pub fn enqueue(
    queue: &MemoryQueue,
    key: MessageKey,
    from: Mailbox,
    subject: &str,
    mime_type: &str,
) -> Message {
    let body = queue
        .insert_blob(Blob {
            mime_type: mime_type.to_string(),
            data: format!("<p>{subject}</p>").into_bytes(),
            filename: None,
        })
        .unwrap();

    let message = Message {
        key,
        from,
        subject: subject.to_string(),
        recipients: RecipientCounts {
            to: 1,
            from: 1,
            ..Default::default()
        },
        body,
        picked_up_at: None,
        sent_at: None,
    };
    queue.insert_message(message.clone()).unwrap();
    queue
        .insert_header(key, &HeaderKind::To(Mailbox::from("bob@example.org")))
        .unwrap();

    message
}

/// Seed `count` messages for company 1 from an authorized sender.
pub fn enqueue_many(queue: &MemoryQueue, count: i64) {
    for id in 1..=count {
        enqueue(
            queue,
            MessageKey::new(1, id),
            Mailbox::from("alice@example.com"),
            &format!("message {id}"),
            "text/html; charset=UTF-8",
        );
    }
}

pub fn queue() -> MemoryQueue {
    let queue = MemoryQueue::new();
    queue.authorize_domain("Example.com").unwrap();
    queue
}

pub fn dispatcher(
    store: Arc<dyn QueueStore>,
    queue: &MemoryQueue,
    mailer: Arc<dyn Mailer>,
    batch_size: usize,
) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(batch_size, SubstituteSender::new(SYSTEM_SENDER, None));
    dispatcher
        .init(Capabilities {
            store,
            blobs: Arc::new(queue.clone()),
            mailer,
            tenant: Arc::new(SingleTenant::new()),
        })
        .unwrap();
    dispatcher
}

/// Dispatcher over a plain [`MemoryQueue`].
pub fn memory_dispatcher(
    queue: &MemoryQueue,
    mailer: Arc<dyn Mailer>,
    batch_size: usize,
) -> Dispatcher {
    dispatcher(Arc::new(queue.clone()), queue, mailer, batch_size)
}
