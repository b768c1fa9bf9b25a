//! Message processor: drafts, sends and reports the reply for one message.
//!
//! Flow per message:
//! 1. Log a short preview with the WIB received time
//! 2. Ask the model for a reply body (fallback text on any failure)
//! 3. Send the threaded reply, then mark the original read
//! 4. Post a report to the notifier, if one is configured

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::format::{CONSOLE_PREVIEW_CHARS, display_received, display_time, preview};
use super::prompt::{EMPTY_REPLY_FALLBACK, UNAVAILABLE_REPLY_FALLBACK, build_reply_prompt};
use super::reply::ReplyDraft;
use super::report::NotificationReport;
use crate::error::{LlmFailureKind, NotifyFailureKind, PipelineError};
use crate::llm::provider::{CompletionRequest, LlmProvider};
use crate::mailbox::{InboundMessage, Mailbox};
use crate::notify::Notifier;

/// Temperature for reply drafting.
const REPLY_TEMPERATURE: f32 = 0.7;

/// Where the reply body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    /// Text generated by the model.
    Model,
    /// The model answered with nothing.
    EmptyFallback,
    /// The model call failed.
    ErrorFallback(LlmFailureKind),
}

impl ReplySource {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, Self::Model)
    }
}

/// What happened to the notification for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    /// No notifier configured.
    Skipped,
    Failed(NotifyFailureKind),
}

/// Result of handling one message.
#[derive(Debug, Clone)]
pub struct ProcessedMessage {
    pub draft: ReplyDraft,
    pub reply_source: ReplySource,
    pub notification: NotifyOutcome,
}

/// Handles one unread message end to end.
pub struct MessageProcessor {
    mailbox: Arc<dyn Mailbox>,
    llm: Arc<dyn LlmProvider>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl MessageProcessor {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        llm: Arc<dyn LlmProvider>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            mailbox,
            llm,
            notifier,
        }
    }

    /// Reply to `message`, mark it read and report it.
    ///
    /// Model and notification failures are absorbed. Send and mark-read
    /// failures are returned to the caller.
    pub async fn process(
        &self,
        message: &mut InboundMessage,
    ) -> Result<ProcessedMessage, PipelineError> {
        let received = display_received(&message.date);

        info!(
            id = %message.id,
            date = %received,
            from = %message.sender,
            subject = %message.subject,
            body = %preview(&message.body, CONSOLE_PREVIEW_CHARS),
            "New email detected"
        );

        let (reply_text, reply_source) = self.generate_reply(message, &received).await;
        let draft = ReplyDraft::for_message(message, reply_text);

        self.mailbox
            .send_reply(&draft)
            .await
            .map_err(|source| PipelineError::Send {
                id: message.id.clone(),
                source,
            })?;

        self.mailbox
            .mark_read(&message.id)
            .await
            .map_err(|source| PipelineError::MarkRead {
                id: message.id.clone(),
                source,
            })?;
        message.mark_read();
        info!(id = %message.id, "Email replied and marked as read");

        let notification = self.send_report(message, &draft, &received).await;

        Ok(ProcessedMessage {
            draft,
            reply_source,
            notification,
        })
    }

    /// Ask the model for a reply body. Never fails.
    async fn generate_reply(
        &self,
        message: &InboundMessage,
        received: &str,
    ) -> (String, ReplySource) {
        let prompt = build_reply_prompt(message, received);
        let request = CompletionRequest::new(prompt).with_temperature(REPLY_TEMPERATURE);

        debug!(model = self.llm.model_name(), "Requesting reply draft");

        match self.llm.complete(request).await {
            Ok(response) => {
                debug!(
                    id = %message.id,
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    finish_reason = ?response.finish_reason,
                    "Reply draft received"
                );
                let text = response.content.trim();
                if text.is_empty() {
                    warn!(id = %message.id, "Model returned an empty reply; using fallback text");
                    (EMPTY_REPLY_FALLBACK.to_string(), ReplySource::EmptyFallback)
                } else {
                    (text.to_string(), ReplySource::Model)
                }
            }
            Err(e) => {
                let kind = e.kind();
                match kind {
                    LlmFailureKind::Quota => {
                        error!("AI error: API quota exceeded or rate limited")
                    }
                    LlmFailureKind::Auth => error!("AI error: API key is invalid or expired"),
                    LlmFailureKind::Unknown => {
                        error!("AI error: failed to generate content due to an unknown API issue")
                    }
                }
                (
                    UNAVAILABLE_REPLY_FALLBACK.to_string(),
                    ReplySource::ErrorFallback(kind),
                )
            }
        }
    }

    async fn send_report(
        &self,
        message: &InboundMessage,
        draft: &ReplyDraft,
        received: &str,
    ) -> NotifyOutcome {
        let Some(ref notifier) = self.notifier else {
            warn!("Notification credentials are missing; skipping notification");
            return NotifyOutcome::Skipped;
        };

        let replied_at = display_time(Utc::now());
        let report = NotificationReport::new(message, draft, received, &replied_at);

        match notifier.notify(&report.render_markdown()).await {
            Ok(()) => {
                info!(channel = notifier.name(), "Notification sent");
                NotifyOutcome::Sent
            }
            Err(e) => {
                let kind = e.kind();
                match kind {
                    NotifyFailureKind::Connectivity => {
                        error!(channel = notifier.name(), "Network error: failed to connect")
                    }
                    NotifyFailureKind::Timeout => {
                        error!(channel = notifier.name(), "Timeout: no response from API")
                    }
                    NotifyFailureKind::Certificate => {
                        error!(channel = notifier.name(), "TLS error: certificate verification failed")
                    }
                    NotifyFailureKind::Rejected | NotifyFailureKind::Unknown => {
                        error!(channel = notifier.name(), error = %e, "Notification send failed")
                    }
                }
                NotifyOutcome::Failed(kind)
            }
        }
    }
}
