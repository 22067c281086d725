//! Signal handling

use mailout_common::internal;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Cancel `cancel` on SIGINT or SIGTERM.
///
/// Returns early, without cancelling anything, if `cancel` fires first.
///
/// # Errors
///
/// Fails if the signal handlers cannot be installed.
pub async fn cancel_on_signal(cancel: CancellationToken) -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            internal!(level = INFO, "CTRL+C entered, stopping after the current message");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, stopping after the current message");
        }
        () = cancel.cancelled() => {
            return Ok(());
        }
    }

    cancel.cancel();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_once_cancelled_elsewhere() {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(cancel_on_signal(cancel.clone()));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
