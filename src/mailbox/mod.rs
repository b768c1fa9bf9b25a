//! Mailbox abstraction: fetch unread mail, send threaded replies, mark read.

pub mod gmail;
pub mod message;
pub mod mime;
pub mod token;

pub use gmail::{GmailClient, GmailConfig};
pub use message::{HeaderMap, InboundMessage, ReadStatus};

use async_trait::async_trait;

use crate::error::MailboxError;
use crate::pipeline::reply::ReplyDraft;

/// A mailbox provider the poll loop talks to.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &str;

    /// Fetch every currently unread message, in provider order.
    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>, MailboxError>;

    /// Send a reply into the original message's thread.
    async fn send_reply(&self, draft: &ReplyDraft) -> Result<(), MailboxError>;

    /// Mark a message as read.
    async fn mark_read(&self, message_id: &str) -> Result<(), MailboxError>;
}
