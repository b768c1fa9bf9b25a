//! Outbound notifications about handled mail.

pub mod telegram;

pub use telegram::{TelegramConfig, TelegramNotifier};

use async_trait::async_trait;

use crate::error::NotifyError;

/// A chat channel that receives processing reports.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver an already-rendered report. Failures are never retried.
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}
