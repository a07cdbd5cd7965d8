//! HTTP client for the LLM collaborator.
//!
//! Sends one non-streaming system + user exchange to the configured endpoint
//! and extracts the assistant's text from whatever shape the provider returns.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::config::{LlmSettings, Provider};
use super::errors::InferenceError;
use super::types::build_payload;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout.
///
/// Plan resolution waits on the full completion, and local models on modest
/// hardware can take tens of seconds for a short answer.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Header value required by the Anthropic Messages API.
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ─── LlmTransport ────────────────────────────────────────────────────────────

/// A single request/response exchange with a language model.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// Send `system` and `user` and return the reply text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, InferenceError>;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// [`LlmTransport`] over HTTP, configured from [`LlmSettings`].
pub struct InferenceClient {
    http: HttpClient,
    settings: LlmSettings,
}

impl InferenceClient {
    /// Create a client. Does NOT check connectivity; that happens on the
    /// first request.
    pub fn new(settings: LlmSettings) -> Result<Self, InferenceError> {
        settings.validate()?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: settings.api_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, settings })
    }

    #[cfg(test)]
    fn with_http(settings: LlmSettings, http: HttpClient) -> Self {
        Self { http, settings }
    }

    async fn send(&self, system: &str, user: &str) -> Result<String, InferenceError> {
        let url = self.settings.api_url.as_str();
        let body = build_payload(&self.settings, system, user);

        let mut request = self.http.post(url).json(&body);
        if let Some(key) = self.settings.api_key() {
            request = match self.settings.provider {
                Provider::Anthropic => request
                    .header("x-api-key", key)
                    .header("anthropic-version", ANTHROPIC_VERSION),
                _ => request.bearer_auth(key),
            };
        } else if self.settings.provider == Provider::Anthropic {
            request = request.header("anthropic-version", ANTHROPIC_VERSION);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: REQUEST_TIMEOUT.as_secs(),
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::InvalidResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_reply(self.settings.provider, &body_text)
    }
}

#[async_trait]
impl LlmTransport for InferenceClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, InferenceError> {
        let started = std::time::Instant::now();
        let result = self.send(system, user).await;
        match &result {
            Ok(reply) => tracing::debug!(
                provider = self.settings.provider.as_str(),
                model = %self.settings.model_name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                reply_len = reply.len(),
                "LLM reply received"
            ),
            Err(e) => tracing::warn!(
                provider = self.settings.provider.as_str(),
                model = %self.settings.model_name,
                error = %e,
                "LLM request failed"
            ),
        }
        result
    }
}

// ─── Reply Extraction ────────────────────────────────────────────────────────

/// Turn a raw response body into reply text.
///
/// Local and custom endpoints may answer with plain text; everything else
/// must be JSON.
pub fn parse_reply(provider: Provider, body: &str) -> Result<String, InferenceError> {
    let empty = || InferenceError::EmptyReply {
        provider: provider.as_str().to_string(),
    };

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(data) => extract_reply_text(provider, &data).ok_or_else(empty),
        Err(_) if matches!(provider, Provider::LocalFastApi | Provider::Custom) => {
            let text = body.trim();
            if text.is_empty() {
                Err(empty())
            } else {
                Ok(text.to_string())
            }
        }
        Err(e) => Err(InferenceError::InvalidResponse {
            reason: format!("response is not JSON: {e}"),
        }),
    }
}

/// Extract the assistant's text from a provider response.
pub fn extract_reply_text(provider: Provider, data: &serde_json::Value) -> Option<String> {
    let text = match provider {
        Provider::OpenAi => openai_text(data),
        Provider::Ollama => ollama_text(data),
        Provider::Anthropic => anthropic_text(data),
        Provider::LocalFastApi | Provider::Custom => return local_text(data),
    };
    non_blank(text)
}

/// First known shape that carries text, else the whole document. Local
/// endpoints may answer with the plan itself as the body.
fn local_text(data: &serde_json::Value) -> Option<String> {
    non_blank(openai_text(data))
        .or_else(|| non_blank(ollama_text(data)))
        .or_else(|| non_blank(anthropic_text(data)))
        .or_else(|| non_blank(string_at(data, "text")))
        .or_else(|| match data {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => non_blank(Some(s.clone())),
            other => Some(other.to_string()),
        })
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

fn string_at(data: &serde_json::Value, pointer: &str) -> Option<String> {
    let pointer = if pointer.starts_with('/') {
        pointer.to_string()
    } else {
        format!("/{pointer}")
    };
    data.pointer(&pointer)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// `choices[0].message.content`
fn openai_text(data: &serde_json::Value) -> Option<String> {
    string_at(data, "/choices/0/message/content")
}

/// `message.content`, or `response` from `/api/generate`.
fn ollama_text(data: &serde_json::Value) -> Option<String> {
    string_at(data, "/message/content").or_else(|| string_at(data, "response"))
}

/// `content` as a string, or the concatenated `text` of its blocks.
fn anthropic_text(data: &serde_json::Value) -> Option<String> {
    match data.get("content")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(blocks) => {
            let text: Vec<&str> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()).unwrap_or("text") == "text")
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect();
            (!text.is_empty()).then(|| text.join(""))
        }
        _ => None,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
