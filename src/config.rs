//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::mailbox::GmailConfig;
use crate::mailbox::token::materialize_token_file;
use crate::notify::TelegramConfig;
use crate::pipeline::poller::DEFAULT_POLL_INTERVAL_SECS;

/// Default model used for reply drafting.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default location of the mailbox OAuth token file.
pub const DEFAULT_TOKEN_PATH: &str = "gmail_token.json";

/// Timeout applied to every outbound HTTP request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Process configuration.
#[derive(Debug, Clone)]
pub struct PilotConfig {
    /// Gemini API key.
    pub google_api_key: SecretString,
    pub model: String,
    /// Sleep between polling cycles.
    pub poll_interval: Duration,
    pub token_path: PathBuf,
    /// Token JSON supplied through the environment, if any.
    pub token_json: Option<String>,
    pub gmail: GmailConfig,
    /// `None` disables notifications.
    pub telegram: Option<TelegramConfig>,
}

impl PilotConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let google_api_key = get("GOOGLE_API_KEY")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("GOOGLE_API_KEY".to_string()))?;

        let model = get("INBOX_PILOT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let poll_interval_secs = match get("INBOX_PILOT_POLL_INTERVAL_SECS") {
            Some(raw) => parse_interval(&raw)?,
            None => DEFAULT_POLL_INTERVAL_SECS,
        };

        let token_path = get("GMAIL_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_PATH));

        let mut gmail = GmailConfig {
            request_timeout: HTTP_TIMEOUT,
            ..GmailConfig::default()
        };
        if let Some(query) = get("GMAIL_QUERY") {
            gmail.query = query;
        }

        let telegram = match (get("TELEGRAM_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig::new(token, chat_id)),
            _ => None,
        };

        Ok(Self {
            google_api_key,
            model,
            poll_interval: Duration::from_secs(poll_interval_secs),
            token_path,
            token_json: get("GMAIL_TOKEN"),
            gmail,
            telegram,
        })
    }

    /// Write the environment-supplied token to disk if no token file exists.
    pub fn materialize_token(&self) -> Result<bool, ConfigError> {
        materialize_token_file(&self.token_path, self.token_json.as_deref())
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }
}

fn parse_interval(raw: &str) -> Result<u64, ConfigError> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue {
            key: "INBOX_PILOT_POLL_INTERVAL_SECS".to_string(),
            message: format!("{e}"),
        })?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: "INBOX_PILOT_POLL_INTERVAL_SECS".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let err = PilotConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "GOOGLE_API_KEY"));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let err = PilotConfig::from_lookup(lookup(&[("GOOGLE_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn defaults_apply() {
        let config = PilotConfig::from_lookup(lookup(&[("GOOGLE_API_KEY", "k")])).unwrap();
        assert_eq!(config.google_api_key.expose_secret(), "k");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.token_path, PathBuf::from(DEFAULT_TOKEN_PATH));
        assert_eq!(config.gmail.query, "is:unread");
        assert_eq!(config.gmail.request_timeout, HTTP_TIMEOUT);
        assert!(config.telegram.is_none());
        assert!(config.token_json.is_none());
    }

    #[test]
    fn overrides_apply() {
        let config = PilotConfig::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "k"),
            ("INBOX_PILOT_MODEL", "gemini-2.0-pro"),
            ("INBOX_PILOT_POLL_INTERVAL_SECS", "5"),
            ("GMAIL_TOKEN_PATH", "/tmp/tok.json"),
            ("GMAIL_QUERY", "is:unread label:support"),
            ("GMAIL_TOKEN", "{}"),
        ]))
        .unwrap();
        assert_eq!(config.model, "gemini-2.0-pro");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.token_path, PathBuf::from("/tmp/tok.json"));
        assert_eq!(config.gmail.query, "is:unread label:support");
        assert_eq!(config.token_json.as_deref(), Some("{}"));
    }

    #[test]
    fn telegram_requires_both_values() {
        let only_token =
            PilotConfig::from_lookup(lookup(&[("GOOGLE_API_KEY", "k"), ("TELEGRAM_TOKEN", "t")]))
                .unwrap();
        assert!(only_token.telegram.is_none());

        let both = PilotConfig::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "k"),
            ("TELEGRAM_TOKEN", "t"),
            ("TELEGRAM_CHAT_ID", "42"),
        ]))
        .unwrap();
        assert_eq!(both.telegram.unwrap().chat_id, "42");
    }

    #[test]
    fn bad_interval_is_rejected() {
        for raw in ["abc", "0", "-3"] {
            let err = PilotConfig::from_lookup(lookup(&[
                ("GOOGLE_API_KEY", "k"),
                ("INBOX_PILOT_POLL_INTERVAL_SECS", raw),
            ]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }), "{raw}");
        }
    }

    #[test]
    fn materialize_writes_env_token_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let config = PilotConfig::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "k"),
            ("GMAIL_TOKEN_PATH", path.to_str().unwrap()),
            ("GMAIL_TOKEN", r#"{"token":"a"}"#),
        ]))
        .unwrap();

        assert!(config.materialize_token().unwrap());
        assert!(!config.materialize_token().unwrap());
        assert_eq!(
            std::fs::read_to_string(config.token_path()).unwrap(),
            r#"{"token":"a"}"#
        );
    }
}
