//! Gemini provider: `models/{model}:generateContent`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use crate::error::LlmError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROVIDER: &str = "gemini";

/// Error reasons Google reports for a bad or expired key.
const KEY_ERROR_REASONS: &[&str] = &["API_KEY_INVALID", "API_KEY_EXPIRED", "API_KEY_SERVICE_BLOCKED"];

pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(http: reqwest::Client, api_key: SecretString, model: &str) -> Self {
        Self {
            http,
            api_key,
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<OutPart<'a>>,
}

#[derive(Serialize)]
struct OutPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<InPart>,
}

#[derive(Debug, Deserialize)]
struct InPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    retry_delay: Option<String>,
}

// ── Classification ──────────────────────────────────────────────────

/// Map a failed HTTP response onto an `LlmError` variant from its status
/// code and structured error body.
fn classify_failure(status: StatusCode, body: &str) -> LlmError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let rpc_status = envelope.error.status.as_deref().unwrap_or_default();

    let key_rejected = envelope.error.details.iter().any(|d| {
        d.reason
            .as_deref()
            .is_some_and(|r| KEY_ERROR_REASONS.contains(&r))
    });

    if key_rejected
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || rpc_status == "UNAUTHENTICATED"
        || rpc_status == "PERMISSION_DENIED"
    {
        return LlmError::AuthFailed {
            provider: PROVIDER.to_string(),
        };
    }

    if status == StatusCode::TOO_MANY_REQUESTS || rpc_status == "RESOURCE_EXHAUSTED" {
        let retry_after = envelope
            .error
            .details
            .iter()
            .find_map(|d| d.retry_delay.as_deref())
            .and_then(parse_retry_delay);
        return LlmError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after,
        };
    }

    LlmError::RequestFailed {
        provider: PROVIDER.to_string(),
        reason: if rpc_status.is_empty() {
            format!("status {}", status.as_u16())
        } else {
            format!("status {} ({rpc_status})", status.as_u16())
        },
    }
}

/// Parse Google's `"34s"` / `"1.5s"` duration strings.
fn parse_retry_delay(raw: &str) -> Option<Duration> {
    raw.strip_suffix('s')?
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

fn finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("STOP") | None => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT") => FinishReason::Safety,
        Some(_) => FinishReason::Other,
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let generation_config = request
            .temperature
            .map(|temperature| GenerationConfig { temperature });

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![OutPart {
                    text: &request.prompt,
                }],
            }],
            generation_config,
        };

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.without_url().to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Gemini request failed");
            return Err(classify_failure(status, &text));
        }

        let text = resp.text().await.map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: e.without_url().to_string(),
        })?;
        let parsed: GenerateContentResponse = serde_json::from_str(&text)?;

        let Some(candidate) = parsed.candidates.into_iter().next() else {
            let reason = parsed
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map(|r| format!("prompt blocked: {r}"))
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason,
            });
        };

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let (input_tokens, output_tokens) = parsed
            .usage_metadata
            .map(|u| (u.prompt_token_count, u.candidates_token_count))
            .unwrap_or((0, 0));

        Ok(CompletionResponse {
            content,
            input_tokens,
            output_tokens,
            finish_reason: finish_reason(candidate.finish_reason.as_deref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmFailureKind;

    #[test]
    fn endpoint_includes_model() {
        let provider = GeminiProvider::new(
            reqwest::Client::new(),
            SecretString::from("k"),
            "gemini-2.5-flash",
        )
        .with_base_url("http://localhost:9/v1beta/");
        assert_eq!(
            provider.endpoint(),
            "http://localhost:9/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn classify_invalid_key_on_400() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT",
            "details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"API_KEY_INVALID"}]}}"#;
        let err = classify_failure(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.kind(), LlmFailureKind::Auth);
    }

    #[test]
    fn classify_quota_with_retry_delay() {
        let body = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED",
            "details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"34s"}]}}"#;
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(err.kind(), LlmFailureKind::Quota);
        match err {
            LlmError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(34)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn classify_server_error_is_unknown() {
        let err = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "not json");
        assert_eq!(err.kind(), LlmFailureKind::Unknown);
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn retry_delay_parsing() {
        assert_eq!(parse_retry_delay("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_delay("abc"), None);
        assert_eq!(parse_retry_delay("10"), None);
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(finish_reason(Some("STOP")), FinishReason::Stop);
        assert_eq!(finish_reason(Some("MAX_TOKENS")), FinishReason::Length);
        assert_eq!(finish_reason(Some("SAFETY")), FinishReason::Safety);
        assert_eq!(finish_reason(Some("RECITATION")), FinishReason::Other);
    }
}
