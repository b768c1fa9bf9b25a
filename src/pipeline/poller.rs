//! Poll loop: fetch unread mail on a fixed interval and process it in order.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::processor::{MessageProcessor, NotifyOutcome, ProcessedMessage};
use crate::error::{CycleFailureKind, PipelineError};
use crate::mailbox::Mailbox;

/// Default sleep between polling cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Counters for one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub fetched: usize,
    pub replied: usize,
    pub fallback_replies: usize,
    pub notified: usize,
    pub notify_failures: usize,
    /// Previously replied messages that were only marked read this cycle.
    pub recovered: usize,
    /// Messages left unread because a reply to them can never be built.
    pub skipped: usize,
}

impl CycleSummary {
    fn record(&mut self, processed: &ProcessedMessage) {
        self.replied += 1;
        if processed.reply_source.is_fallback() {
            self.fallback_replies += 1;
        }
        match processed.notification {
            NotifyOutcome::Sent => self.notified += 1,
            NotifyOutcome::Failed(_) => self.notify_failures += 1,
            NotifyOutcome::Skipped => {}
        }
    }
}

/// Drives the fetch → process → sleep cycle.
pub struct Poller {
    mailbox: Arc<dyn Mailbox>,
    processor: MessageProcessor,
    interval: Duration,
    /// Messages already replied to whose mark-read failed.
    replied_unmarked: HashSet<String>,
    /// Messages whose reply failed permanently; left unread, not retried.
    undeliverable: HashSet<String>,
}

impl Poller {
    pub fn new(mailbox: Arc<dyn Mailbox>, processor: MessageProcessor, interval: Duration) -> Self {
        Self {
            mailbox,
            processor,
            interval,
            replied_unmarked: HashSet::new(),
            undeliverable: HashSet::new(),
        }
    }

    /// Ids replied to but not yet marked read.
    pub fn pending_mark_read(&self) -> &HashSet<String> {
        &self.replied_unmarked
    }

    /// Ids whose reply can never be sent.
    pub fn undeliverable(&self) -> &HashSet<String> {
        &self.undeliverable
    }

    /// Run a single polling cycle.
    ///
    /// Stops at the first transient send or mark-read failure; remaining
    /// messages are picked up by the next cycle. A message whose reply cannot
    /// be built at all is skipped and the cycle moves on.
    pub async fn poll_once(&mut self) -> Result<CycleSummary, PipelineError> {
        let mut messages = self
            .mailbox
            .fetch_unread()
            .await
            .map_err(PipelineError::Fetch)?;

        let mut summary = CycleSummary {
            fetched: messages.len(),
            ..CycleSummary::default()
        };

        // Forget ids that are no longer unread.
        let still_unread = |id: &String| messages.iter().any(|m| &m.id == id);
        self.replied_unmarked.retain(still_unread);
        self.undeliverable.retain(still_unread);

        if messages.is_empty() {
            info!(
                "Inbox is clean (checking again in {}s)",
                self.interval.as_secs()
            );
            return Ok(summary);
        }

        for message in &mut messages {
            if self.undeliverable.contains(&message.id) {
                debug!(id = %message.id, "Skipping message with an undeliverable reply");
                summary.skipped += 1;
                continue;
            }

            if self.replied_unmarked.contains(&message.id) {
                warn!(id = %message.id, "Already replied; retrying mark-as-read only");
                self.mailbox
                    .mark_read(&message.id)
                    .await
                    .map_err(|source| PipelineError::MarkRead {
                        id: message.id.clone(),
                        source,
                    })?;
                message.mark_read();
                self.replied_unmarked.remove(&message.id);
                summary.recovered += 1;
                continue;
            }

            match self.processor.process(message).await {
                Ok(processed) => summary.record(&processed),
                Err(PipelineError::Send { id, source }) if source.is_permanent() => {
                    warn!(id = %id, error = %source, "Reply cannot be sent; leaving message unread");
                    self.undeliverable.insert(id);
                    summary.skipped += 1;
                }
                Err(e) => {
                    if let PipelineError::MarkRead { ref id, .. } = e {
                        self.replied_unmarked.insert(id.clone());
                    }
                    return Err(e);
                }
            }
        }

        Ok(summary)
    }

    /// Poll until `shutdown` resolves. Errors never stop the loop.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            interval_secs = self.interval.as_secs(),
            mailbox = self.mailbox.name(),
            "Poller started"
        );

        loop {
            match self.poll_once().await {
                Ok(summary) if summary.fetched > 0 => {
                    info!(
                        fetched = summary.fetched,
                        replied = summary.replied,
                        fallback_replies = summary.fallback_replies,
                        notified = summary.notified,
                        notify_failures = summary.notify_failures,
                        recovered = summary.recovered,
                        skipped = summary.skipped,
                        "Polling cycle complete"
                    );
                }
                Ok(_) => {}
                Err(e) => log_cycle_failure(&e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    info!("Poller shutting down");
                    return;
                }
            }
        }
    }
}

fn log_cycle_failure(err: &PipelineError) {
    match err.kind() {
        CycleFailureKind::Credentials => {
            error!("System error: mailbox authentication failed; check the token file or credentials")
        }
        CycleFailureKind::Generic => {
            error!(error = %err, "Unexpected system error; waiting for the next polling cycle")
        }
    }
}
