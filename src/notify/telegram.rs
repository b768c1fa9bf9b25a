//! Telegram notifier: posts reports through the Bot API `sendMessage`.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::Notifier;
use crate::error::NotifyError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram notification target.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub chat_id: String,
    pub api_base: String,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: SecretString::from(bot_token.into()),
            chat_id: chat_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

/// Sends reports to one Telegram chat.
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token.expose_secret()
        )
    }

    /// Send a single message chunk (≤4096 chars) with Markdown rendering.
    async fn send_message_chunk(&self, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::from_transport("telegram", e))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let description = resp.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), %description, "Telegram sendMessage refused");
            return Err(NotifyError::Rejected {
                channel: "telegram".into(),
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(&chunk).await?;
        }
        Ok(())
    }
}

/// Split a message into chunks of at most `max_len` characters, preferring
/// newline then space boundaries.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_len {
        let byte_limit = remaining
            .char_indices()
            .nth(max_len)
            .map_or(remaining.len(), |(i, _)| i);

        // Find a good split point
        let chunk = &remaining[..byte_limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(byte_limit);

        // Keep a Markdown escape with the character it escapes
        let mut split_at = split_at;
        while split_at > 0 && remaining[..split_at].ends_with('\\') {
            split_at -= 1;
        }

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { byte_limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_notifier_name() {
        let n = TelegramNotifier::new(TelegramConfig::new("t", "1"), reqwest::Client::new());
        assert_eq!(n.name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let n = TelegramNotifier::new(TelegramConfig::new("123:ABC", "1"), reqwest::Client::new());
        assert_eq!(
            n.api_url("sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
    }

    #[test]
    fn telegram_config_debug_hides_token() {
        let config = TelegramConfig::new("123:SECRET", "42");
        assert!(!format!("{config:?}").contains("SECRET"));
    }

    // ── Network error tests (expected to fail with no server) ───────

    #[tokio::test]
    async fn telegram_unreachable_is_classified_without_token() {
        let mut config = TelegramConfig::new("123:SECRET", "42");
        config.api_base = "http://127.0.0.1:9".into();
        let n = TelegramNotifier::new(config, reqwest::Client::new());

        let err = n.notify("hello").await.unwrap_err();
        assert!(!err.to_string().contains("SECRET"));
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_never_ends_chunk_on_escape() {
        let msg = format!("{}\\_{}", "a".repeat(4095), "b".repeat(10));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(4095));
        assert!(!chunks[0].ends_with('\\'));
        assert_eq!(chunks[1], format!("\\_{}", "b".repeat(10)));
    }

    #[test]
    fn split_message_counts_characters_not_bytes() {
        let msg = "é".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
    }
}
