//! Attempt announcement seam.

use crate::coordinator::CoordinationAttemptReport;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Delivery failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    /// Receiver is gone
    #[error("Notification channel closed")]
    Closed,

    /// Delivery backend refused the report
    #[error("Notification rejected: {reason}")]
    Rejected {
        /// Why
        reason: String,
    },
}

/// Announces finished attempts
#[async_trait]
pub trait AttemptNotifier: Send + Sync {
    /// Deliver the report
    ///
    /// # Errors
    ///
    /// Returns error if the report cannot be delivered
    async fn announce(&self, report: &CoordinationAttemptReport) -> Result<(), NotifyError>;
}

/// Logs every report
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl AttemptNotifier for TracingNotifier {
    async fn announce(&self, report: &CoordinationAttemptReport) -> Result<(), NotifyError> {
        tracing::info!(
            run_id = %report.run_id,
            correlation_id = %report.correlation_id,
            tenant = %report.tenant,
            candidate_id = %report.selection.chosen.id,
            decision = %report.selection.decision,
            accepted = report.accepted,
            "coordination attempt delivered"
        );
        Ok(())
    }
}

/// Forwards every report into a channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<CoordinationAttemptReport>,
}

impl ChannelNotifier {
    /// Create a notifier and its receiving end
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CoordinationAttemptReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AttemptNotifier for ChannelNotifier {
    async fn announce(&self, report: &CoordinationAttemptReport) -> Result<(), NotifyError> {
        self.tx.send(report.clone()).map_err(|_| NotifyError::Closed)
    }
}
