//! Language-model client abstraction and implementations.
//!
//! Defines the [`LanguageModel`] trait and concrete implementations:
//! - **[`DisabledModel`]**: always fails; used when no provider is configured.
//!   The chat orchestrator turns that failure into its fallback reply.
//! - **[`OpenAiCompatible`]**: calls any `/chat/completions` endpoint that
//!   speaks the OpenAI wire format (Groq, OpenAI, Ollama, LM Studio).
//!
//! Clients are built once at startup with [`create_model`] and handed to
//! the orchestrator explicitly.
//!
//! No retries are attempted: a failed completion is reported to the caller
//! as an [`LlmError`] and the caller decides what to show the user.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model provider is disabled")]
    Disabled,

    #[error("request failed: {0}")]
    Request(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One turn in the prompt sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling settings for a single completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A chat-completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model identifier (e.g. `"llama-3.1-8b-instant"`).
    fn model_name(&self) -> &str;

    /// Run one completion and return the trimmed text of the first choice.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<String, LlmError>;
}

// ============ Disabled ============

pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _params: CompletionParams,
    ) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

// ============ OpenAI-compatible ============

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// `reqwest::Client` pools connections internally; one instance serves the
/// whole process. The configured timeout bounds every request.
pub struct OpenAiCompatible {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiCompatible {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key environment variable named by
    /// `llm.api_key_env` is unset or the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;
        Self::with_key(config, api_key)
    }

    /// Build a client with an explicit key (tests, keyless local servers).
    pub fn with_key(config: &LlmConfig, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiCompatible {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<String, LlmError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        debug!(
            model = %self.model,
            turns = messages.len(),
            max_tokens = params.max_tokens,
            "sending completion request"
        );

        let mut req = self.client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parse_completion(parsed)
    }
}

fn parse_completion(parsed: CompletionResponse) -> Result<String, LlmError> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LlmError::InvalidResponse("empty or missing content".into()))
}

/// Create the configured [`LanguageModel`].
///
/// | Config Value | Client |
/// |-------------|--------|
/// | `"disabled"` | [`DisabledModel`] |
/// | `"openai"` | [`OpenAiCompatible`] |
pub fn create_model(config: &LlmConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" => Ok(Arc::new(OpenAiCompatible::new(config)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<String, LlmError> {
        parse_completion(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_parse_first_choice_trimmed() {
        let text = parse(
            r#"{"choices":[{"message":{"role":"assistant","content":"  Hello there.\n"}},
                           {"message":{"role":"assistant","content":"ignored"}}]}"#,
        )
        .unwrap();
        assert_eq!(text, "Hello there.");
    }

    #[test]
    fn test_parse_empty_content_is_error() {
        assert!(parse(r#"{"choices":[{"message":{"content":"   "}}]}"#).is_err());
        assert!(parse(r#"{"choices":[{"message":{"content":null}}]}"#).is_err());
        assert!(parse(r#"{"choices":[]}"#).is_err());
        assert!(parse(r#"{}"#).is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![ChatMessage::system("persona"), ChatMessage::user("hi")];
        let body = CompletionRequest {
            model: "llama-3.1-8b-instant",
            messages: &messages,
            max_tokens: 300,
            temperature: 0.5,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama-3.1-8b-instant");
        assert_eq!(json["max_tokens"], 300);
        assert_eq!(json["temperature"], 0.5);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = LlmConfig {
            provider: "openai".into(),
            base_url: "http://localhost:11434/v1/".into(),
            ..LlmConfig::default()
        };
        let client = OpenAiCompatible::with_key(&config, String::new()).unwrap();
        assert_eq!(client.endpoint, "http://localhost:11434/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_disabled_model_errors() {
        let err = DisabledModel
            .complete(&[ChatMessage::user("hi")], CompletionParams { max_tokens: 10, temperature: 0.0 })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Disabled));
    }
}
