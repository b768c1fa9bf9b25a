//! Reply drafts: subject normalization and threading headers.

use serde::{Deserialize, Serialize};

use crate::mailbox::InboundMessage;

/// Threading headers for a reply.
///
/// Both are `None` when the original carried no Message-ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadingHeaders {
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

impl ThreadingHeaders {
    /// Derive reply headers from the original's Message-ID and References chain.
    pub fn for_reply(message_id: Option<&str>, references: Option<&str>) -> Self {
        let Some(message_id) = message_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Self::default();
        };

        let references = match references.map(str::trim).filter(|r| !r.is_empty()) {
            Some(chain) => format!("{chain} {message_id}"),
            None => message_id.to_string(),
        };

        Self {
            in_reply_to: Some(message_id.to_string()),
            references: Some(references),
        }
    }
}

/// A reply ready to hand to the mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyDraft {
    /// Provider id of the message being answered.
    pub original_id: String,
    /// Provider thread the reply joins.
    pub thread_id: String,
    /// Recipient as shown in logs.
    pub to: String,
    /// Recipient display name, unquoted.
    #[serde(default)]
    pub to_name: Option<String>,
    /// Bare recipient address used for the `To` header.
    pub to_address: String,
    pub subject: String,
    pub body: String,
    pub threading: ThreadingHeaders,
}

impl ReplyDraft {
    pub fn for_message(original: &InboundMessage, body: impl Into<String>) -> Self {
        Self {
            original_id: original.id.clone(),
            thread_id: original.thread_id.clone(),
            to: original.sender.clone(),
            to_name: original.sender_name.clone(),
            to_address: original.sender_address.clone(),
            subject: reply_subject(&original.subject),
            body: body.into(),
            threading: ThreadingHeaders::for_reply(original.message_id(), original.references()),
        }
    }
}

/// Prefix a subject with `Re: ` unless it already starts with `Re:`.
pub fn reply_subject(subject: &str) -> String {
    if subject.starts_with("Re:") {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}
