//! Live progress reporting for account pipelines.
//!
//! Sinks are shared by every concurrently running pipeline, so each
//! implementation must tolerate concurrent calls.

use tokio::sync::mpsc;
use tracing::info;

use crate::types::TaskStatus;

/// One progress event for one account.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub account_name: String,
    pub completed: usize,
    pub total: usize,
    pub status: TaskStatus,
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn on_progress(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Forwards updates over an unbounded channel. Updates sent after the
/// receiver is dropped are discarded.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, update: ProgressUpdate) {
        let _ = self.tx.send(update);
    }
}

/// Writes each update to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_progress(&self, update: ProgressUpdate) {
        info!(
            account = %update.account_name,
            completed = update.completed,
            total = update.total,
            status = %update.status,
            "Progress"
        );
    }
}

#[derive(Debug, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_progress(&self, _update: ProgressUpdate) {}
}
