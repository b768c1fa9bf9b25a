//! Inbox Pilot: answers unread mail with an LLM and reports each reply to chat.

pub mod config;
pub mod error;
pub mod llm;
pub mod mailbox;
pub mod notify;
pub mod pipeline;
