//! Unread-mail → reply pipeline.
//!
//! Every polling cycle:
//! 1. `Mailbox::fetch_unread()`: provider I/O
//! 2. `MessageProcessor::process()`: draft with the LLM, send, mark read
//! 3. `Notifier::notify()`: report to chat, best effort
//!
//! Messages are handled one at a time, in provider order.

pub mod format;
pub mod poller;
pub mod processor;
pub mod prompt;
pub mod reply;
pub mod report;

pub use poller::{CycleSummary, Poller};
pub use processor::{MessageProcessor, NotifyOutcome, ProcessedMessage, ReplySource};
pub use reply::{ReplyDraft, ThreadingHeaders};
pub use report::NotificationReport;
