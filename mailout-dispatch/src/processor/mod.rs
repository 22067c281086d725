//! Dispatch run orchestration

mod delivery;
mod process;

use std::sync::Arc;

use mailout_common::{internal, tracing::error};
use mailout_queue::{BlobStore, QueueStore};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{DispatchError, FatalError},
    policy::{SenderResolver, SubstituteSender, UnauthorizedSenderPolicy},
    render::MessageRenderer,
    tenant::TenantResolver,
    transport::Mailer,
    types::RunSummary,
};

const fn default_batch_size() -> usize {
    100
}

/// The collaborators a dispatcher drives
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub store: Arc<dyn QueueStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub mailer: Arc<dyn Mailer>,
    pub tenant: Arc<dyn TenantResolver>,
}

/// Drains the queue in batches, one message at a time
#[derive(Debug, Deserialize)]
pub struct Dispatcher {
    /// Maximum number of messages fetched per cycle
    ///
    /// A cycle that returns fewer than this ends the run.
    ///
    /// Default: 100
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// From address used when a message's sender domain is not authorized
    #[serde(default)]
    pub unauthorized_sender: Option<SubstituteSender>,

    /// Initialized in `init()`
    #[serde(skip)]
    capabilities: Option<Capabilities>,

    /// Initialized in `init()`
    #[serde(skip)]
    renderer: Option<MessageRenderer>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            unauthorized_sender: None,
            capabilities: None,
            renderer: None,
        }
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(batch_size: usize, unauthorized_sender: SubstituteSender) -> Self {
        Self {
            batch_size,
            unauthorized_sender: Some(unauthorized_sender),
            ..Default::default()
        }
    }

    /// Initialize with the configured `unauthorized_sender` as the fallback
    /// sender policy.
    ///
    /// # Errors
    ///
    /// [`FatalError::Configuration`] if no `unauthorized_sender` is configured
    /// or `batch_size` is zero.
    pub fn init(&mut self, capabilities: Capabilities) -> Result<(), FatalError> {
        let policy = self.unauthorized_sender.clone().ok_or_else(|| {
            FatalError::Configuration("no unauthorized_sender configured".to_string())
        })?;

        self.init_with_policy(capabilities, Arc::new(policy))
    }

    /// Initialize with a custom fallback sender policy.
    ///
    /// # Errors
    ///
    /// [`FatalError::Configuration`] if `batch_size` is zero.
    pub fn init_with_policy(
        &mut self,
        capabilities: Capabilities,
        policy: Arc<dyn UnauthorizedSenderPolicy>,
    ) -> Result<(), FatalError> {
        internal!("Initialising dispatcher ...");

        if self.batch_size == 0 {
            return Err(FatalError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }

        self.renderer = Some(MessageRenderer::new(
            Arc::clone(&capabilities.blobs),
            SenderResolver::new(policy),
        ));
        self.capabilities = Some(capabilities);

        internal!(batch_size = self.batch_size, "Dispatcher initialised");
        Ok(())
    }

    /// Run until the queue is drained or `cancel` fires.
    ///
    /// Cancellation is only observed between messages. The queue store is
    /// closed on every exit path.
    ///
    /// # Errors
    ///
    /// Only run-level failures are returned, always as
    /// [`DispatchError::Fatal`]. Failures of individual messages are logged
    /// and counted in the summary.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, DispatchError> {
        let (Some(capabilities), Some(renderer)) = (&self.capabilities, &self.renderer) else {
            return Err(FatalError::NotInitialized("call init() before run()").into());
        };

        internal!(
            level = INFO,
            batch_size = self.batch_size,
            "Dispatch run starting"
        );

        let result = process::drain(self.batch_size, capabilities, renderer, cancel).await;
        let closed = capabilities.store.close().await;

        match (result, closed) {
            (Ok(summary), Ok(())) => {
                internal!(level = INFO, "Dispatch run finished: {summary}");
                Ok(summary)
            }
            (Ok(_), Err(e)) => Err(FatalError::Close(e).into()),
            (Err(e), Ok(())) => Err(e.into()),
            (Err(e), Err(close)) => {
                error!(error = %close, "Could not close the queue store after an aborted run");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mailout_queue::MemoryQueue;

    use super::*;
    use crate::tenant::SingleTenant;

    #[derive(Debug)]
    struct NullMailer;

    #[async_trait::async_trait]
    impl Mailer for NullMailer {
        async fn send(
            &self,
            _: &crate::render::OutboundMessage,
        ) -> Result<crate::transport::SendOutcome, crate::transport::TransportError> {
            Ok(crate::transport::SendOutcome::Sent)
        }
    }

    fn capabilities() -> Capabilities {
        let queue = MemoryQueue::new();
        Capabilities {
            store: Arc::new(queue.clone()),
            blobs: Arc::new(queue),
            mailer: Arc::new(NullMailer),
            tenant: Arc::new(SingleTenant::new()),
        }
    }

    #[test]
    fn test_deserialize_defaults() {
        let parse = |raw: &str| -> Dispatcher {
            ron::Options::default()
                .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
                .from_str(raw)
                .unwrap()
        };

        let dispatcher = parse("()");
        assert_eq!(dispatcher.batch_size, 100);
        assert!(dispatcher.unauthorized_sender.is_none());

        let dispatcher =
            parse(r#"(batch_size: 25, unauthorized_sender: (address: "noreply@example.net"))"#);
        assert_eq!(dispatcher.batch_size, 25);
        assert_eq!(
            dispatcher.unauthorized_sender,
            Some(SubstituteSender::new("noreply@example.net", None))
        );
    }

    #[test]
    fn test_init_rejects_zero_batch_size() {
        let mut dispatcher = Dispatcher::new(0, SubstituteSender::new("noreply@example.net", None));
        assert!(matches!(
            dispatcher.init(capabilities()),
            Err(FatalError::Configuration(_))
        ));
    }

    #[test]
    fn test_init_requires_unauthorized_sender() {
        let mut dispatcher = Dispatcher::default();
        assert!(matches!(
            dispatcher.init(capabilities()),
            Err(FatalError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_run_before_init() {
        let dispatcher = Dispatcher::default();
        let err = dispatcher.run(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Fatal(FatalError::NotInitialized(_))
        ));
    }
}
