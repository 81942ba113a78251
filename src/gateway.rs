//! Model gateway — the uniform call boundary to LLM backends.
//!
//! The orchestration pipeline never talks HTTP directly; it goes through the
//! `ModelGateway` trait so tests can substitute scripted fakes. The shipped
//! implementation targets OpenRouter's chat-completions endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default OpenRouter chat-completions endpoint.
pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Environment variable holding the OpenRouter API key.
pub const ENV_OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";

/// Opaque backend identifier, e.g. `"openai/gpt-4o"`.
///
/// Equality is exact string match. The human-readable short form is the
/// segment after the last `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form: `"openai/gpt-4o"` → `"gpt-4o"`.
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Token accounting as reported by the backend.
///
/// `total_tokens` is propagated from the backend, never re-derived locally:
/// some providers bill cached or reasoning tokens outside the prompt +
/// completion sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build a usage record where the total is the local sum.
    pub fn from_counts(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// One successful backend reply.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub usage: TokenUsage,
    pub latency_seconds: f64,
}

/// Errors from gateway calls.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("API key not configured ({0})")]
    MissingApiKey(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("backend error ({status}): {body}")]
    BackendError { status: u16, body: String },

    #[error("response parse error: {0}")]
    ParseError(String),

    #[error("empty completion from {0}")]
    EmptyCompletion(ModelId),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Uniform call interface to a model backend.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Send one prompt to one model and return its reply.
    async fn send(&self, model: &ModelId, prompt: &str) -> GatewayResult<ModelReply>;
}

/// OpenRouter-backed gateway.
pub struct OpenRouterGateway {
    api_key: String,
    api_url: String,
    client: reqwest::Client,
}

impl OpenRouterGateway {
    /// Build a gateway with an explicit key.
    pub fn new(api_key: impl Into<String>) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::RequestFailed(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            api_url: OPENROUTER_API_URL.to_string(),
            client,
        })
    }

    /// Build a gateway from `OPENROUTER_API_KEY`.
    pub fn from_env() -> GatewayResult<Self> {
        let key = std::env::var(ENV_OPENROUTER_API_KEY)
            .map_err(|_| GatewayError::MissingApiKey(ENV_OPENROUTER_API_KEY.to_string()))?;
        Self::new(key)
    }

    /// Override the endpoint URL (tests, self-hosted proxies).
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[async_trait]
impl ModelGateway for OpenRouterGateway {
    async fn send(&self, model: &ModelId, prompt: &str) -> GatewayResult<ModelReply> {
        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
            #[serde(default)]
            usage: TokenUsage,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }

        #[derive(Deserialize)]
        struct ResponseMessage {
            content: Option<String>,
        }

        let request = ChatRequest {
            model: model.as_str(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::BackendError { status, body });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ParseError(e.to_string()))?;
        let latency = duration_secs(start.elapsed());

        let text = chat
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GatewayError::EmptyCompletion(model.clone()));
        }

        debug!(
            model = %model,
            tokens = chat.usage.total_tokens,
            latency_s = latency,
            "gateway reply"
        );

        Ok(ModelReply {
            text,
            usage: chat.usage,
            latency_seconds: latency,
        })
    }
}

/// Round elapsed time to centiseconds, the resolution the display layer shows.
pub(crate) fn duration_secs(d: Duration) -> f64 {
    (d.as_secs_f64() * 100.0).round() / 100.0
}
