//! Error types for Inbox Pilot.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mailbox provider errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox credentials rejected: {reason}")]
    Unauthorized { reason: String },

    #[error("Mailbox token unavailable: {reason}")]
    Token { reason: String },

    #[error("Mailbox rate limited")]
    RateLimited,

    #[error("Mailbox API {operation} failed with status {status}")]
    Api { operation: String, status: u16 },

    #[error("Mailbox transport error during {operation}: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Malformed message {id}: {reason}")]
    MalformedMessage { id: String, reason: String },

    #[error("Failed to build reply: {0}")]
    Compose(String),
}

impl MailboxError {
    /// Whether the failure is about credentials (token missing, expired or rejected).
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Token { .. })
    }

    /// Whether retrying the same message can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Compose(_))
    }

    /// Wrap a reqwest error, dropping the request URL from it.
    pub(crate) fn transport(operation: &str, source: reqwest::Error) -> Self {
        Self::Transport {
            operation: operation.to_string(),
            source: source.without_url(),
        }
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse category of a language-model failure, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmFailureKind {
    /// Quota exhausted or rate limited.
    Quota,
    /// API key missing, invalid or expired.
    Auth,
    /// Anything else.
    Unknown,
}

impl LlmError {
    pub fn kind(&self) -> LlmFailureKind {
        match self {
            Self::RateLimited { .. } => LlmFailureKind::Quota,
            Self::AuthFailed { .. } => LlmFailureKind::Auth,
            _ => LlmFailureKind::Unknown,
        }
    }
}

/// Notification channel errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to connect to {channel}")]
    Connect { channel: String },

    #[error("{channel} did not respond in time")]
    Timeout { channel: String },

    #[error("TLS certificate verification failed for {channel}")]
    Certificate { channel: String },

    #[error("{channel} refused the message with status {status}")]
    Rejected { channel: String, status: u16 },

    #[error("{channel} send failed: {reason}")]
    Other { channel: String, reason: String },
}

/// Category of a notification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyFailureKind {
    Connectivity,
    Timeout,
    Certificate,
    Rejected,
    Unknown,
}

impl NotifyError {
    pub fn kind(&self) -> NotifyFailureKind {
        match self {
            Self::Connect { .. } => NotifyFailureKind::Connectivity,
            Self::Timeout { .. } => NotifyFailureKind::Timeout,
            Self::Certificate { .. } => NotifyFailureKind::Certificate,
            Self::Rejected { .. } => NotifyFailureKind::Rejected,
            Self::Other { .. } => NotifyFailureKind::Unknown,
        }
    }

    /// Classify a reqwest transport error without keeping its URL (the bot
    /// token is part of the Telegram URL).
    pub(crate) fn from_transport(channel: &str, err: reqwest::Error) -> Self {
        let channel = channel.to_string();
        if err.is_timeout() {
            return Self::Timeout { channel };
        }
        if has_certificate_cause(&err) {
            return Self::Certificate { channel };
        }
        if err.is_connect() {
            return Self::Connect { channel };
        }
        Self::Other {
            channel,
            reason: err.without_url().to_string(),
        }
    }
}

/// Walk the source chain looking for a TLS certificate failure.
fn has_certificate_cause(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = err.source();
    while let Some(cause) = current {
        if cause.to_string().to_lowercase().contains("certificate") {
            return true;
        }
        current = cause.source();
    }
    false
}

/// Pipeline-level errors that abort a polling cycle.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Fetching unread messages failed: {0}")]
    Fetch(#[source] MailboxError),

    #[error("Sending reply to message {id} failed: {source}")]
    Send {
        id: String,
        #[source]
        source: MailboxError,
    },

    #[error("Marking message {id} as read failed: {source}")]
    MarkRead {
        id: String,
        #[source]
        source: MailboxError,
    },
}

/// Coarse classification of a failed polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleFailureKind {
    /// Mailbox credentials are missing, expired or rejected.
    Credentials,
    /// Anything else.
    Generic,
}

impl PipelineError {
    pub fn mailbox_error(&self) -> &MailboxError {
        match self {
            Self::Fetch(e) => e,
            Self::Send { source, .. } | Self::MarkRead { source, .. } => source,
        }
    }

    pub fn kind(&self) -> CycleFailureKind {
        if self.mailbox_error().is_credential_failure() {
            CycleFailureKind::Credentials
        } else {
            CycleFailureKind::Generic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_error_kinds() {
        let quota = LlmError::RateLimited {
            provider: "gemini".into(),
            retry_after: None,
        };
        assert_eq!(quota.kind(), LlmFailureKind::Quota);

        let auth = LlmError::AuthFailed {
            provider: "gemini".into(),
        };
        assert_eq!(auth.kind(), LlmFailureKind::Auth);

        let other = LlmError::InvalidResponse {
            provider: "gemini".into(),
            reason: "no candidates".into(),
        };
        assert_eq!(other.kind(), LlmFailureKind::Unknown);
    }

    #[test]
    fn cycle_failure_credentials() {
        let err = PipelineError::Fetch(MailboxError::Unauthorized {
            reason: "401".into(),
        });
        assert_eq!(err.kind(), CycleFailureKind::Credentials);

        let err = PipelineError::Fetch(MailboxError::Token {
            reason: "no refresh token".into(),
        });
        assert_eq!(err.kind(), CycleFailureKind::Credentials);
    }

    #[test]
    fn cycle_failure_generic() {
        let err = PipelineError::MarkRead {
            id: "m1".into(),
            source: MailboxError::Api {
                operation: "modify".into(),
                status: 500,
            },
        };
        assert_eq!(err.kind(), CycleFailureKind::Generic);
    }

    #[test]
    fn notify_error_kinds() {
        let rejected = NotifyError::Rejected {
            channel: "telegram".into(),
            status: 400,
        };
        assert_eq!(rejected.kind(), NotifyFailureKind::Rejected);
        assert!(rejected.to_string().contains("400"));
    }

    #[derive(Debug)]
    struct ChainLink {
        message: &'static str,
        source: Option<Box<ChainLink>>,
    }

    impl std::fmt::Display for ChainLink {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.message)
        }
    }

    impl std::error::Error for ChainLink {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            self.source
                .as_deref()
                .map(|s| s as &(dyn std::error::Error + 'static))
        }
    }

    fn chain(messages: &[&'static str]) -> ChainLink {
        let mut link: Option<Box<ChainLink>> = None;
        for message in messages.iter().rev() {
            link = Some(Box::new(ChainLink {
                message: *message,
                source: link,
            }));
        }
        *link.expect("at least one link")
    }

    #[test]
    fn certificate_cause_found_deep_in_chain() {
        let err = chain(&[
            "error sending request",
            "client error (Connect)",
            "invalid peer certificate: UnknownIssuer",
        ]);
        assert!(has_certificate_cause(&err));
    }

    #[test]
    fn certificate_cause_ignores_top_level_and_unrelated_causes() {
        // Only causes are inspected, not the error itself.
        let top_only = chain(&["certificate pinned", "connection refused"]);
        assert!(!has_certificate_cause(&top_only));

        let unrelated = chain(&["error sending request", "dns error", "no such host"]);
        assert!(!has_certificate_cause(&unrelated));
    }

    #[test]
    fn only_compose_failures_are_permanent() {
        assert!(MailboxError::Compose("Invalid to address".into()).is_permanent());
        assert!(!MailboxError::RateLimited.is_permanent());
        assert!(
            !MailboxError::Api {
                operation: "messages.send".into(),
                status: 500
            }
            .is_permanent()
        );
    }
}
