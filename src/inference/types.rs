//! Request payloads for the supported LLM providers.
//!
//! OpenAI, Ollama and most local wrappers accept a chat-completions shaped
//! body; Anthropic takes the system prompt as a top-level field and requires
//! `max_tokens`.

use serde::Serialize;

use super::config::{LlmSettings, Provider, DEFAULT_MAX_TOKENS};

// ─── Messages ────────────────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }
}

// ─── Request Bodies ──────────────────────────────────────────────────────────

/// Chat-completions style body (OpenAI, local FastAPI, custom).
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Ollama `/api/chat` body. Sampling parameters live under `options`.
#[derive(Debug, Clone, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OllamaOptions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// Anthropic Messages API body.
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Build the provider-specific request body for one system + user exchange.
pub fn build_payload(settings: &LlmSettings, system: &str, user: &str) -> serde_json::Value {
    let model = settings.model_name.clone();
    let result = match settings.provider {
        Provider::Anthropic => serde_json::to_value(AnthropicRequest {
            model,
            system: (!system.is_empty()).then(|| system.to_string()),
            messages: vec![ChatMessage::user(user)],
            max_tokens: settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            stream: false,
            temperature: settings.temperature,
        }),
        Provider::Ollama => {
            let options = (settings.temperature.is_some() || settings.max_tokens.is_some())
                .then_some(OllamaOptions {
                    temperature: settings.temperature,
                    num_predict: settings.max_tokens,
                });
            serde_json::to_value(OllamaChatRequest {
                model,
                messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
                stream: false,
                options,
            })
        }
        Provider::OpenAi | Provider::LocalFastApi | Provider::Custom => {
            serde_json::to_value(ChatCompletionRequest {
                model,
                messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
                stream: false,
                max_tokens: settings.max_tokens,
                temperature: settings.temperature,
            })
        }
    };
    // Plain structs of strings and numbers always serialize.
    result.unwrap_or(serde_json::Value::Null)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
