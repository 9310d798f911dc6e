//! Provider Gateway
//!
//! One capability interface, [`LlmProvider::dispatch`], over interchangeable
//! backends.
//!
//! ## Architecture
//!
//! - **OpenAiProvider**: chat completions endpoint, bearer auth, JSON response mode
//! - **AnthropicProvider**: messages endpoint, `x-api-key` auth, first text block
//! - **MockProvider**: deterministic canned documents derived from the prompt's
//!   DATA block; no network, no credentials
//!
//! The provider is fixed once per pipeline. Credentials come in as an
//! [`ApiKey`] at construction and are never read from the environment here.
//!
//! ## Error taxonomy
//!
//! Every backend fails with a [`ProviderError`]. `Authentication` and
//! `Rejected` are fatal; `RateLimited`, `Transport` and `ProviderServer` are
//! transient and left to the retry controller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod anthropic;
mod mock;
mod openai;

pub use anthropic::AnthropicProvider;
pub use mock::{MockProvider, ScriptedFailure};
pub use openai::OpenAiProvider;

use crate::config::ProviderConfig;
use crate::error::{excerpt, AnalysisError};
use crate::prompt::Prompt;
use crate::types::TokenUsage;

/// Unified trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_id(&self) -> ProviderId;

    /// Send one prompt and return the raw text of the answer.
    async fn dispatch(&self, prompt: &Prompt, model: &ModelConfig) -> Result<ProviderReply, ProviderError>;
}

/// Raw answer text plus token accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply {
    pub text: String,
    pub usage: TokenUsage,
}

// ============================================================================
// Identity & credentials
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    #[default]
    Mock,
}

impl ProviderId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Mock => "mock",
        }
    }

    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Anthropic => "claude-3-5-sonnet-latest",
            Self::Mock => "mock-model",
        }
    }

    /// Environment variable the CLI reads the key from.
    pub const fn api_key_env(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Mock => None,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "mock" => Ok(Self::Mock),
            other => Err(format!(
                "unknown provider '{other}' (expected openai, anthropic or mock)"
            )),
        }
    }
}

/// Provider credential. Opaque: never printed, logged or serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Per-call model settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model_id: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Upper bound for a single HTTP exchange
    pub request_timeout: Duration,
}

impl ModelConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            temperature: crate::config::defaults::DEFAULT_TEMPERATURE,
            max_tokens: crate::config::defaults::DEFAULT_MAX_TOKENS,
            request_timeout: Duration::from_secs(crate::config::defaults::DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    #[error("rate limited{}: {message}", retry_hint(.retry_after))]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider server error (HTTP {status}): {message}")]
    ProviderServer { status: u16, message: String },

    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl ProviderError {
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Transport(_) | Self::ProviderServer { .. }
        )
    }

    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Convert a fatal error into the caller-facing taxonomy.
    pub(crate) fn into_fatal(self, provider: ProviderId) -> AnalysisError {
        let provider = provider.to_string();
        match self {
            Self::Authentication { message } => AnalysisError::Authentication { provider, message },
            Self::Rejected { status, message } => AnalysisError::ProviderRejected {
                provider,
                status,
                message,
            },
            transient => AnalysisError::ProviderRejected {
                provider,
                status: 0,
                message: transient.to_string(),
            },
        }
    }
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Map a non-success HTTP status to the error taxonomy.
///
/// Shared by both live providers so they classify identically.
pub fn classify_status(status: u16, retry_after: Option<Duration>, body: &str) -> ProviderError {
    let message = error_message(body);
    match status {
        401 | 403 => ProviderError::Authentication { message },
        429 => ProviderError::RateLimited {
            retry_after,
            message,
        },
        // Request timeout and the overloaded family are worth another try
        408 | 409 | 500..=599 => ProviderError::ProviderServer { status, message },
        _ => ProviderError::Rejected { status, message },
    }
}

/// Longest `Retry-After` hint taken from a response.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3_600);

/// `Retry-After` in whole seconds, clamped to [`MAX_RETRY_AFTER`].
/// HTTP-date values are ignored.
pub(crate) fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

/// Pull `error.message` out of a JSON error body, else an excerpt of the body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| excerpt(body.trim()))
}

/// Shared tail of a live dispatch: status check, envelope decode, text extraction.
pub(crate) async fn read_reply(
    resp: reqwest::Response,
    parse: fn(&Value) -> Result<ProviderReply, ProviderError>,
) -> Result<ProviderReply, ProviderError> {
    let status = resp.status();
    let retry_after = retry_after_header(resp.headers());
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(classify_status(status.as_u16(), retry_after, &body));
    }

    let envelope: Value = serde_json::from_str(&body).map_err(|e| ProviderError::ProviderServer {
        status: status.as_u16(),
        message: format!("malformed response envelope: {e}"),
    })?;
    parse(&envelope)
}

pub(crate) fn build_http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(ProviderError::from)
}

// ============================================================================
// Factory
// ============================================================================

/// Factory for creating providers from configuration
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create the configured provider.
    ///
    /// # Errors
    ///
    /// `Authentication` when a live provider has no key, `InvalidInput` when
    /// the HTTP client cannot be built.
    pub fn create(
        config: &ProviderConfig,
        api_key: Option<ApiKey>,
    ) -> Result<Arc<dyn LlmProvider>, AnalysisError> {
        let base_url = config.base_url.as_deref();
        let missing_key = || AnalysisError::Authentication {
            provider: config.id.to_string(),
            message: format!(
                "no API key configured (set {})",
                config.id.api_key_env().unwrap_or("a key")
            ),
        };
        let client_error = |e: ProviderError| AnalysisError::InvalidInput(e.to_string());

        let provider: Arc<dyn LlmProvider> = match config.id {
            ProviderId::Mock => Arc::new(MockProvider::new()),
            ProviderId::OpenAi => {
                let key = api_key.ok_or_else(missing_key)?;
                Arc::new(OpenAiProvider::new(key, base_url).map_err(client_error)?)
            }
            ProviderId::Anthropic => {
                let key = api_key.ok_or_else(missing_key)?;
                Arc::new(AnthropicProvider::new(key, base_url).map_err(client_error)?)
            }
        };

        tracing::info!(
            provider = %config.id,
            model = %config.model_id(),
            "Provider ready"
        );

        Ok(provider)
    }
}
