//! Run bookkeeping

use std::fmt::{self, Display};

/// How one fetched message ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Transmitted and marked sent
    Sent,
    /// The transport reported a failure; the message stays picked up
    Rejected(String),
    /// Picked up by someone else between fetch and pickup
    Skipped,
    /// Failed before or during transmission; the message stays picked up
    Failed,
}

/// Totals for one dispatch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Fetch cycles, including the final short (possibly empty) one
    pub batches: usize,
    pub fetched: usize,
    pub sent: usize,
    pub rejected: usize,
    pub failed: usize,
    pub skipped: usize,
    /// The run stopped on a shutdown request rather than draining the queue
    pub cancelled: bool,
}

impl RunSummary {
    pub(crate) const fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Sent => self.sent += 1,
            MessageOutcome::Rejected(_) => self.rejected += 1,
            MessageOutcome::Skipped => self.skipped += 1,
            MessageOutcome::Failed => self.failed += 1,
        }
    }

    /// Messages fetched but never reached, because the run was cancelled
    #[must_use]
    pub const fn unprocessed(&self) -> usize {
        self.fetched
            .saturating_sub(self.sent + self.rejected + self.failed + self.skipped)
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batches, {} fetched: {} sent, {} rejected, {} failed, {} skipped",
            self.batches, self.fetched, self.sent, self.rejected, self.failed, self.skipped
        )?;

        if self.cancelled {
            write!(f, " (cancelled, {} unprocessed)", self.unprocessed())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_record_and_display() {
        let mut summary = RunSummary {
            batches: 1,
            fetched: 5,
            ..Default::default()
        };
        summary.record(&MessageOutcome::Sent);
        summary.record(&MessageOutcome::Sent);
        summary.record(&MessageOutcome::Rejected("550 no such user".to_string()));
        summary.record(&MessageOutcome::Failed);

        assert_eq!(
            summary.to_string(),
            "1 batches, 5 fetched: 2 sent, 1 rejected, 1 failed, 0 skipped"
        );

        summary.cancelled = true;
        assert_eq!(summary.unprocessed(), 1);
        assert!(summary.to_string().ends_with("(cancelled, 1 unprocessed)"));
    }
}
