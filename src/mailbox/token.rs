//! OAuth token file for the Gmail API.
//!
//! Reads the authorized-user JSON written by Google's client libraries
//! (`token`/`expiry`) or by oauth2client (`access_token`/`token_expiry`),
//! refreshes an expired access token with the stored refresh token, and
//! persists the refreshed token back with 0600 permissions.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, MailboxError};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// On-disk token document. Unknown fields are kept so rewriting the file
/// does not lose anything the issuing tool stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailToken {
    #[serde(alias = "token", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(alias = "token_expiry", default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GmailToken {
    pub fn parse(json: &str) -> Result<Self, MailboxError> {
        serde_json::from_str(json).map_err(|e| MailboxError::Token {
            reason: format!("failed to parse token file: {e}"),
        })
    }

    /// Parsed expiry. Accepts RFC 3339 and naive UTC timestamps.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.expiry.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|n| n.and_utc())
    }

    /// True when the access token is missing or past (or near) its expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.as_deref().is_none_or(str::is_empty) {
            return true;
        }
        match self.expires_at() {
            Some(expiry) => now + chrono::Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }
}

/// Write `contents` to `path` unless a file already exists there.
///
/// Returns `true` when the file was created.
pub fn materialize_token_file(path: &Path, contents: Option<&str>) -> Result<bool, ConfigError> {
    let Some(contents) = contents.filter(|c| !c.trim().is_empty()) else {
        return Ok(false);
    };
    if path.exists() {
        debug!(path = %path.display(), "Token file already present, leaving it untouched");
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    set_file_permissions_0600(path)?;
    info!(path = %path.display(), "Materialized mailbox token file from environment");
    Ok(true)
}

/// Token source backed by a file on disk.
pub struct TokenFile {
    path: PathBuf,
    http: reqwest::Client,
    token: Mutex<GmailToken>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenFile {
    /// Load the token file at `path`.
    pub fn load(path: impl Into<PathBuf>, http: reqwest::Client) -> Result<Self, MailboxError> {
        let path = path.into();
        let json = fs::read_to_string(&path).map_err(|e| MailboxError::Token {
            reason: format!("failed to read token file {}: {e}", path.display()),
        })?;
        let token = GmailToken::parse(&json)?;
        debug!(path = %path.display(), refreshable = token.can_refresh(), "Loaded mailbox token");
        Ok(Self {
            path,
            http,
            token: Mutex::new(token),
        })
    }

    /// A usable access token, refreshing it first when expired.
    pub async fn bearer(&self) -> Result<SecretString, MailboxError> {
        let mut token = self.token.lock().await;

        if token.needs_refresh(Utc::now()) {
            if token.can_refresh() {
                self.refresh(&mut token).await?;
            } else if token.access_token.as_deref().is_none_or(str::is_empty) {
                return Err(MailboxError::Token {
                    reason: "no access token and no refresh credentials".into(),
                });
            } else {
                warn!("Mailbox access token looks expired and cannot be refreshed");
            }
        }

        token
            .access_token
            .clone()
            .map(SecretString::from)
            .ok_or_else(|| MailboxError::Token {
                reason: "no access token".into(),
            })
    }

    /// Force a refresh before the next request (after a 401).
    pub async fn invalidate(&self) {
        let mut token = self.token.lock().await;
        if token.can_refresh() {
            token.expiry = Some(Utc::now().to_rfc3339());
        }
    }

    async fn refresh(&self, token: &mut GmailToken) -> Result<(), MailboxError> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            token.refresh_token.as_deref(),
            token.client_id.as_deref(),
            token.client_secret.as_deref(),
        ) else {
            return Err(MailboxError::Token {
                reason: "refresh credentials incomplete".into(),
            });
        };

        let resp = self
            .http
            .post(&token.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await
            .map_err(|e| MailboxError::transport("token refresh", e))?;

        let status = resp.status();
        if status.as_u16() == 400 || status.as_u16() == 401 {
            return Err(MailboxError::Unauthorized {
                reason: format!("token refresh rejected ({status})"),
            });
        }
        if !status.is_success() {
            return Err(MailboxError::Api {
                operation: "token refresh".into(),
                status: status.as_u16(),
            });
        }

        let body: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| MailboxError::transport("token refresh", e))?;

        token.access_token = Some(body.access_token);
        token.expiry = body
            .expires_in
            .map(|secs| (Utc::now() + chrono::Duration::seconds(secs)).to_rfc3339());
        if let Some(rotated) = body.refresh_token {
            token.refresh_token = Some(rotated);
        }

        if let Err(e) = self.persist(token) {
            warn!(error = %e, "Failed to persist refreshed mailbox token");
        }
        info!("Refreshed mailbox access token");
        Ok(())
    }

    fn persist(&self, token: &GmailToken) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(token).map_err(|e| ConfigError::InvalidValue {
            key: "token".into(),
            message: e.to_string(),
        })?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        set_file_permissions_0600(&tmp_path)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Set file permissions to 0600 (owner read/write only).
fn set_file_permissions_0600(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}
