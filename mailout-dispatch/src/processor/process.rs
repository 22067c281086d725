//! The batch loop

use mailout_common::tracing::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::{
    error::FatalError,
    policy::AuthorizedDomains,
    processor::{Capabilities, delivery::dispatch_message},
    render::MessageRenderer,
    types::RunSummary,
};

/// Fetch and process batches until one comes back short or `cancel` fires.
///
/// Messages are processed one at a time, in the order the store returns them.
///
/// # Errors
///
/// Returns the first run-level failure. Per-message failures are contained in
/// [`dispatch_message`].
pub(super) async fn drain(
    batch_size: usize,
    capabilities: &Capabilities,
    renderer: &MessageRenderer,
    cancel: &CancellationToken,
) -> Result<RunSummary, FatalError> {
    let authorized = AuthorizedDomains::load(capabilities.store.as_ref()).await?;
    let mut summary = RunSummary::default();

    loop {
        if cancel.is_cancelled() {
            info!(batches = summary.batches, "Shutdown requested, stopping before next fetch");
            summary.cancelled = true;
            return Ok(summary);
        }

        let batch = capabilities
            .store
            .fetch_unsent(batch_size)
            .await
            .map_err(FatalError::Fetch)?;

        summary.batches += 1;
        summary.fetched += batch.len();
        let drained = batch.len() < batch_size;
        debug!(
            batch = summary.batches,
            size = batch.len(),
            "Fetched batch"
        );

        for message in batch {
            if cancel.is_cancelled() {
                info!(
                    batch = summary.batches,
                    "Shutdown requested, stopping at message boundary"
                );
                summary.cancelled = true;
                return Ok(summary);
            }

            let outcome = dispatch_message(capabilities, renderer, &authorized, message).await?;
            summary.record(&outcome);
        }

        if drained {
            return Ok(summary);
        }
    }
}
