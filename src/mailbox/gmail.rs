//! Gmail REST API mailbox.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::message::InboundMessage;
use super::mime::{encode_raw, render_reply};
use super::token::TokenFile;
use super::Mailbox;
use crate::error::MailboxError;
use crate::pipeline::reply::ReplyDraft;

const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail client configuration.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    /// Base URL up to and including `users/me`.
    pub api_base: String,
    /// Search query used to find messages to answer.
    pub query: String,
    /// Page size for `messages.list`.
    pub page_size: u32,
    pub request_timeout: Duration,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            query: "is:unread".to_string(),
            page_size: 100,
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    raw: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    email_address: String,
}

/// Error body returned by Google APIs.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

/// 403 reasons that mean "slow down" rather than "bad credentials".
const QUOTA_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "quotaExceeded",
    "dailyLimitExceeded",
];

/// Whether a 403 body reports a quota or rate limit.
fn is_quota_denial(body: &str) -> bool {
    serde_json::from_str::<ErrorEnvelope>(body)
        .unwrap_or_default()
        .error
        .errors
        .iter()
        .any(|detail| QUOTA_REASONS.contains(&detail.reason.as_str()))
}

/// Mailbox backed by the Gmail REST API.
pub struct GmailClient {
    config: GmailConfig,
    http: reqwest::Client,
    auth: Arc<TokenFile>,
    own_address: OnceCell<String>,
}

impl GmailClient {
    pub fn new(config: GmailConfig, http: reqwest::Client, auth: Arc<TokenFile>) -> Self {
        Self {
            config,
            http,
            auth,
            own_address: OnceCell::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_base.trim_end_matches('/'))
    }

    /// Attach auth and timeout, send, and map error statuses.
    async fn execute(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<Response, MailboxError> {
        let bearer = self.auth.bearer().await?;
        let resp = request
            .bearer_auth(bearer.expose_secret())
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| MailboxError::transport(operation, e))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        debug!(operation, status = status.as_u16(), "Gmail request failed");
        match status {
            StatusCode::FORBIDDEN => {
                let body = resp.text().await.unwrap_or_default();
                if is_quota_denial(&body) {
                    warn!(operation, "Gmail quota exceeded");
                    return Err(MailboxError::RateLimited);
                }
                self.auth.invalidate().await;
                Err(MailboxError::Unauthorized {
                    reason: format!("{operation} returned {status}"),
                })
            }
            StatusCode::UNAUTHORIZED => {
                self.auth.invalidate().await;
                Err(MailboxError::Unauthorized {
                    reason: format!("{operation} returned {status}"),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => Err(MailboxError::RateLimited),
            _ => Err(MailboxError::Api {
                operation: operation.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    /// Ids of all messages matching the configured query, following pages.
    async fn list_ids(&self) -> Result<Vec<String>, MailboxError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("q", self.config.query.clone()),
                ("maxResults", self.config.page_size.to_string()),
            ];
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.clone()));
            }

            let resp = self
                .execute("messages.list", self.http.get(self.url("messages")).query(&query))
                .await?;
            let page: ListMessagesResponse = resp
                .json()
                .await
                .map_err(|e| MailboxError::transport("messages.list", e))?;

            ids.extend(page.messages.into_iter().map(|m| m.id));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<InboundMessage, MailboxError> {
        let resp = self
            .execute(
                "messages.get",
                self.http
                    .get(self.url(&format!("messages/{id}")))
                    .query(&[("format", "raw")]),
            )
            .await?;
        let message: RawMessage = resp
            .json()
            .await
            .map_err(|e| MailboxError::transport("messages.get", e))?;

        let raw = message.raw.ok_or_else(|| MailboxError::MalformedMessage {
            id: message.id.clone(),
            reason: "response has no raw content".into(),
        })?;
        let bytes = decode_raw(&raw).ok_or_else(|| MailboxError::MalformedMessage {
            id: message.id.clone(),
            reason: "raw content is not base64url".into(),
        })?;

        InboundMessage::from_raw(&message.id, &message.thread_id, &bytes)
    }

    /// The authenticated account's address, fetched once.
    async fn own_address(&self) -> Result<&str, MailboxError> {
        let address = self
            .own_address
            .get_or_try_init(|| async {
                let resp = self
                    .execute("profile", self.http.get(self.url("profile")))
                    .await?;
                let profile: Profile = resp
                    .json()
                    .await
                    .map_err(|e| MailboxError::transport("profile", e))?;
                Ok::<_, MailboxError>(profile.email_address)
            })
            .await?;
        Ok(address.as_str())
    }
}

/// Gmail emits padded base64url; accept unpadded too.
fn decode_raw(raw: &str) -> Option<Vec<u8>> {
    URL_SAFE
        .decode(raw)
        .or_else(|_| URL_SAFE_NO_PAD.decode(raw.trim_end_matches('=')))
        .ok()
}

#[async_trait]
impl Mailbox for GmailClient {
    fn name(&self) -> &str {
        "gmail"
    }

    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>, MailboxError> {
        let ids = self.list_ids().await?;
        debug!(count = ids.len(), "Listed unread Gmail messages");

        let mut messages = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.get_message(id).await {
                Ok(message) => messages.push(message),
                Err(MailboxError::MalformedMessage { id, reason }) => {
                    warn!(id = %id, reason = %reason, "Skipping unparseable message");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(messages)
    }

    async fn send_reply(&self, draft: &ReplyDraft) -> Result<(), MailboxError> {
        let from = self.own_address().await?.to_string();
        let raw = render_reply(&from, draft)?;

        let mut body = json!({ "raw": encode_raw(&raw) });
        if !draft.thread_id.is_empty() {
            body["threadId"] = json!(draft.thread_id);
        }

        self.execute(
            "messages.send",
            self.http.post(self.url("messages/send")).json(&body),
        )
        .await?;

        info!(to = %draft.to, thread_id = %draft.thread_id, "Reply sent via Gmail");
        Ok(())
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), MailboxError> {
        self.execute(
            "messages.modify",
            self.http
                .post(self.url(&format!("messages/{message_id}/modify")))
                .json(&json!({
                    "removeLabelIds": ["UNREAD"],
                    "addLabelIds": []
                })),
        )
        .await?;
        Ok(())
    }
}
