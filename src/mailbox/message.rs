//! Inbound message model and raw RFC 5322 parsing.

use std::collections::HashMap;

use mail_parser::MessageParser;
use serde::{Deserialize, Serialize};

use crate::error::MailboxError;

/// Read state of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    Unread,
    Read,
}

/// Case-insensitive header map. Values are unfolded and trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMap(HashMap<String, String>);

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, keeping the first value seen for a repeated name.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| unfold(value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// An unread message pulled from the mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Provider message id (Gmail's id, not the Message-ID header).
    pub id: String,
    /// Provider thread id the reply must join.
    pub thread_id: String,
    /// Display form of the From address (`Name <addr>` or `addr`).
    pub sender: String,
    /// From display name, unquoted.
    pub sender_name: Option<String>,
    /// Bare From address; empty when the header had none.
    pub sender_address: String,
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Date header exactly as received.
    pub date: String,
    pub headers: HeaderMap,
    pub status: ReadStatus,
}

impl InboundMessage {
    /// The original `Message-ID` header, angle brackets included.
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get("Message-ID")
    }

    /// The original `References` chain.
    pub fn references(&self) -> Option<&str> {
        self.headers.get("References")
    }

    pub fn is_unread(&self) -> bool {
        self.status == ReadStatus::Unread
    }

    pub fn mark_read(&mut self) {
        self.status = ReadStatus::Read;
    }

    /// Parse a raw RFC 5322 message fetched from the provider.
    pub fn from_raw(id: &str, thread_id: &str, raw: &[u8]) -> Result<Self, MailboxError> {
        let parsed = MessageParser::default().parse(raw).ok_or_else(|| {
            MailboxError::MalformedMessage {
                id: id.to_string(),
                reason: "not a parseable RFC 5322 message".into(),
            }
        })?;

        let headers: HeaderMap = parsed.headers_raw().collect();

        let from = parsed.from().and_then(|f| f.first());
        let sender_name = from
            .and_then(|addr| addr.name())
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let sender_address = from
            .and_then(|addr| addr.address())
            .map(|address| address.trim().to_string())
            .unwrap_or_default();
        let sender = match (&sender_name, sender_address.as_str()) {
            (Some(name), "") => name.clone(),
            (Some(name), address) => format!("{name} <{address}>"),
            (None, "") => "unknown".to_string(),
            (None, address) => address.to_string(),
        };

        let subject = parsed.subject().unwrap_or_default().to_string();

        let body = if let Some(text) = parsed.body_text(0) {
            text.to_string()
        } else if let Some(html) = parsed.body_html(0) {
            strip_html(html.as_ref())
        } else {
            String::new()
        };

        let date = headers.get("Date").unwrap_or_default().to_string();

        Ok(Self {
            id: id.to_string(),
            thread_id: thread_id.to_string(),
            sender,
            sender_name,
            sender_address,
            subject,
            body,
            date,
            headers,
            status: ReadStatus::Unread,
        })
    }
}

/// Collapse folded header whitespace into single spaces.
fn unfold(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
