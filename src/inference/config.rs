//! LLM settings loading and validation.
//!
//! Reads `settings.json` from the data directory and resolves environment
//! variables. A missing file means no LLM is configured.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::InferenceError;

/// Settings file name inside the data directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// `max_tokens` sent to providers that require one.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

// ─── Public Types ────────────────────────────────────────────────────────────

/// Which HTTP dialect the endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI Chat Completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// Ollama `/api/chat`.
    Ollama,
    /// A local FastAPI wrapper; reply shape varies.
    #[serde(rename = "localfastapi")]
    LocalFastApi,
    /// Anthropic Messages API.
    Anthropic,
    /// Anything else; reply shape is probed.
    Custom,
}

impl Provider {
    /// Stable lowercase name, as written in `settings.json`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Ollama => "ollama",
            Provider::LocalFastApi => "localfastapi",
            Provider::Anthropic => "anthropic",
            Provider::Custom => "custom",
        }
    }
}

/// The user's LLM endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettings {
    pub provider: Provider,
    pub api_url: String,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl LlmSettings {
    /// Reject settings that cannot produce a request.
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.api_url.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "apiUrl is required".into(),
            });
        }
        if self.model_name.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "modelName is required".into(),
            });
        }
        Ok(())
    }

    /// The API key, if one is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// `settings.json` inside `data_dir`.
pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE)
}

/// Load settings with `${VAR}` / `${VAR:-default}` resolved in every string.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_settings(path: &Path) -> Result<Option<LlmSettings>, InferenceError> {
    let Some(mut value) = read_settings_value(path)? else {
        return Ok(None);
    };
    interpolate_value(&mut value);
    parse_settings(path, value).map(Some)
}

/// Load settings exactly as written, without interpolation.
///
/// This is what an editor should show, so saving it back does not bake in
/// resolved secrets.
pub fn load_settings_raw(path: &Path) -> Result<Option<LlmSettings>, InferenceError> {
    match read_settings_value(path)? {
        Some(value) => parse_settings(path, value).map(Some),
        None => Ok(None),
    }
}

/// Write settings as pretty JSON, creating the parent directory if needed.
pub fn save_settings(path: &Path, settings: &LlmSettings) -> Result<(), InferenceError> {
    settings.validate()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to create {}: {e}", dir.display()),
        })?;
    }
    let mut body =
        serde_json::to_string_pretty(settings).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to serialize settings: {e}"),
        })?;
    body.push('\n');

    std::fs::write(path, body).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to write {}: {e}", path.display()),
    })?;
    tracing::info!(path = %path.display(), provider = settings.provider.as_str(), "saved LLM settings");
    Ok(())
}

fn read_settings_value(path: &Path) -> Result<Option<serde_json::Value>, InferenceError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse {}: {e}", path.display()),
        })
}

fn parse_settings(path: &Path, value: serde_json::Value) -> Result<LlmSettings, InferenceError> {
    let settings: LlmSettings =
        serde_json::from_value(value).map_err(|e| InferenceError::ConfigError {
            reason: format!("invalid settings in {}: {e}", path.display()),
        })?;
    settings.validate()?;
    Ok(settings)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Interpolate every string inside a JSON value, in place.
fn interpolate_value(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            if s.contains("${") {
                *s = interpolate_env_vars(s);
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(interpolate_value),
        serde_json::Value::Object(map) => map.values_mut().for_each(interpolate_value),
        _ => {}
    }
}

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((var_name, default)) => {
            std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
        }
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(tmp: &TempDir, body: &str) -> PathBuf {
        let path = settings_path(tmp.path());
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__CHATTRON_TEST_UNSET__");
        let result = interpolate_env_vars("${__CHATTRON_TEST_UNSET__:-http://localhost:11434}");
        assert_eq!(result, "http://localhost:11434");
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__CHATTRON_TEST_KEY__", "sk-test");
        assert_eq!(interpolate_env_vars("${__CHATTRON_TEST_KEY__}"), "sk-test");
        std::env::remove_var("__CHATTRON_TEST_KEY__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with no variables";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/models");
        assert!(!result.starts_with('~'), "tilde should be expanded");
        assert!(result.ends_with("/models"));
    }

    #[test]
    fn test_missing_file_means_unconfigured() {
        let tmp = TempDir::new().unwrap();
        assert!(load_settings(&settings_path(tmp.path())).unwrap().is_none());
    }

    #[test]
    fn test_load_interpolates_but_raw_does_not() {
        let tmp = TempDir::new().unwrap();
        std::env::set_var("__CHATTRON_TEST_OPENAI__", "sk-from-env");
        let path = write(
            &tmp,
            r#"{
                "provider": "openai",
                "apiUrl": "https://api.openai.com/v1/chat/completions",
                "modelName": "gpt-4",
                "apiKey": "${__CHATTRON_TEST_OPENAI__}"
            }"#,
        );

        let settings = load_settings(&path).unwrap().unwrap();
        assert_eq!(settings.provider, Provider::OpenAi);
        assert_eq!(settings.api_key(), Some("sk-from-env"));

        let raw = load_settings_raw(&path).unwrap().unwrap();
        assert_eq!(raw.api_key.as_deref(), Some("${__CHATTRON_TEST_OPENAI__}"));
        std::env::remove_var("__CHATTRON_TEST_OPENAI__");
    }

    #[test]
    fn test_provider_names() {
        for (name, provider) in [
            ("openai", Provider::OpenAi),
            ("ollama", Provider::Ollama),
            ("localfastapi", Provider::LocalFastApi),
            ("anthropic", Provider::Anthropic),
            ("custom", Provider::Custom),
        ] {
            let parsed: Provider = serde_json::from_value(serde_json::json!(name)).unwrap();
            assert_eq!(parsed, provider);
            assert_eq!(provider.as_str(), name);
        }
        assert!(serde_json::from_value::<Provider>(serde_json::json!("gemini")).is_err());
    }

    #[test]
    fn test_blank_model_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            r#"{"provider":"ollama","apiUrl":"http://localhost:11434/api/chat","modelName":""}"#,
        );
        let err = load_settings(&path).unwrap_err();
        assert!(matches!(err, InferenceError::ConfigError { .. }));
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join(SETTINGS_FILE);
        let settings = LlmSettings {
            provider: Provider::Anthropic,
            api_url: "https://api.anthropic.com/v1/messages".into(),
            model_name: "claude-3-opus".into(),
            api_key: None,
            max_tokens: Some(2048),
            temperature: None,
        };
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), Some(settings));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""maxTokens": 2048"#));
        assert!(!raw.contains("apiKey"));
    }
}
