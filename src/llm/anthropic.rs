//! Anthropic messages backend

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{build_http_client, read_reply, ApiKey, LlmProvider, ModelConfig, ProviderError, ProviderId, ProviderReply};
use crate::prompt::Prompt;
use crate::types::TokenUsage;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: ApiKey,
}

impl AnthropicProvider {
    pub fn new(api_key: ApiKey, base_url: Option<&str>) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_http_client()?,
            base_url: base_url
                .unwrap_or(ANTHROPIC_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    pub(crate) fn request_body(prompt: &Prompt, model: &ModelConfig) -> Value {
        json!({
            "model": model.model_id,
            "messages": [{"role": "user", "content": prompt.text()}],
            "temperature": model.temperature,
            "max_tokens": model.max_tokens,
        })
    }

    /// Read the first `text` content block and the usage block.
    pub(crate) fn parse_reply(envelope: &Value) -> Result<ProviderReply, ProviderError> {
        let text = envelope
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b.get("type").and_then(Value::as_str).unwrap_or("text") == "text")
            })
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::ProviderServer {
                status: 200,
                message: "response has no text content block".to_string(),
            })?;

        let usage = TokenUsage {
            input_tokens: envelope
                .pointer("/usage/input_tokens")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
            output_tokens: envelope
                .pointer("/usage/output_tokens")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
        };

        Ok(ProviderReply {
            text: text.to_string(),
            usage,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn dispatch(&self, prompt: &Prompt, model: &ModelConfig) -> Result<ProviderReply, ProviderError> {
        debug!(
            model = %model.model_id,
            digest = %prompt.digest(),
            "Dispatching to Anthropic"
        );

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(model.request_timeout)
            .json(&Self::request_body(prompt, model))
            .send()
            .await?;

        read_reply(resp, Self::parse_reply).await
    }
}
