//! OpenAI-compatible chat completion client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::config::AiConfig;
use screener_common::util::{sanitize_for_log, truncate_with_ellipsis};

/// Failure of a single completion call.
///
/// Display strings keep the HTTP status and the usual provider wording so
/// that message-based classification can place them in a category.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout after {0}s")]
    Timeout(u64),

    #[error("HTTP 401 unauthorized: {0}")]
    Auth(String),

    #[error("HTTP 429 rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Text completion capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete `prompt` using the settings bound in `config`.
    async fn complete(&self, config: &AiConfig, prompt: &str) -> Result<String, CompletionError>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// Client for `POST {base_url}/chat/completions`.
///
/// Holds only the connection pool; endpoint, key, model and timeout come
/// from the per-call config snapshot.
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("stock-screener/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    fn endpoint(config: &AiConfig) -> String {
        format!("{}/chat/completions", config.base_url.trim_end_matches('/'))
    }
}

impl Default for OpenAiCompatibleClient {
    fn default() -> Self {
        Self::new()
    }
}

fn transport_error(e: reqwest::Error, config: &AiConfig) -> CompletionError {
    if e.is_timeout() {
        CompletionError::Timeout(config.timeout.as_secs())
    } else if e.is_connect() {
        CompletionError::Network(format!("connection failed: {}", e))
    } else {
        CompletionError::Network(e.to_string())
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleClient {
    async fn complete(&self, config: &AiConfig, prompt: &str) -> Result<String, CompletionError> {
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return Err(CompletionError::Config(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        let body = ChatRequest {
            model: &config.model_name,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: config.temperature,
        };

        debug!(
            model = %config.model_name,
            prompt_chars = prompt.chars().count(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(Self::endpoint(config))
            .bearer_auth(&config.api_key)
            .timeout(config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, config))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = sanitize_for_log(&truncate_with_ellipsis(&text, 300));
            warn!(status = status.as_u16(), error = %message, "Completion API returned an error");
            return Err(match status.as_u16() {
                401 => CompletionError::Auth(message),
                429 => CompletionError::RateLimited(message),
                code => CompletionError::Api {
                    status: code,
                    message,
                },
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError::InvalidResponse("no choices in response".into()))
    }
}
