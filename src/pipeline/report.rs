//! Notification reports sent after a reply goes out.

use serde::{Deserialize, Serialize};

use super::format::{REPORT_PREVIEW_CHARS, preview};
use super::reply::ReplyDraft;
use crate::mailbox::InboundMessage;

/// Everything a report shows about one handled message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationReport {
    /// Display-zone received time (or the raw date when unparseable).
    pub received_at: String,
    pub sender: String,
    pub subject: String,
    /// Body cut to the report preview length.
    pub body_preview: String,
    pub reply_text: String,
    /// Display-zone time the reply was sent.
    pub replied_at: String,
}

impl NotificationReport {
    pub fn new(
        message: &InboundMessage,
        draft: &ReplyDraft,
        received_at: &str,
        replied_at: &str,
    ) -> Self {
        Self {
            received_at: received_at.to_string(),
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            body_preview: preview(&message.body, REPORT_PREVIEW_CHARS),
            reply_text: draft.body.clone(),
            replied_at: replied_at.to_string(),
        }
    }

    /// Render for Telegram's legacy Markdown parse mode.
    pub fn render_markdown(&self) -> String {
        format!(
            "🚨 *INBOX PILOT REPORT* 🚨\n\n\
🕒 *Received:* `{received}`\n\
👤 *From:* `{sender}`\n\
📌 *Subject:* {subject}\n\n\
💬 *Original Message:*\n{body}\n\n\
🤖 *AI Reply Sent:*\n{reply}\n\n\
⏱️ *Replied At:* `{replied}`",
            received = code_span(&self.received_at),
            sender = code_span(&self.sender),
            subject = escape_markdown(&self.subject),
            body = escape_markdown(&self.body_preview),
            reply = escape_markdown(&self.reply_text),
            replied = code_span(&self.replied_at),
        )
    }
}

/// Escape legacy-Markdown control characters in free text.
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Code spans cannot escape, so backticks are dropped.
fn code_span(text: &str) -> String {
    text.replace('`', "")
}
