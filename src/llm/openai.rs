//! OpenAI chat completions backend

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{build_http_client, read_reply, ApiKey, LlmProvider, ModelConfig, ProviderError, ProviderId, ProviderReply};
use crate::prompt::Prompt;
use crate::types::TokenUsage;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: ApiKey,
}

impl OpenAiProvider {
    pub fn new(api_key: ApiKey, base_url: Option<&str>) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_http_client()?,
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    pub(crate) fn request_body(prompt: &Prompt, model: &ModelConfig) -> Value {
        json!({
            "model": model.model_id,
            "messages": [{"role": "user", "content": prompt.text()}],
            "temperature": model.temperature,
            "max_tokens": model.max_tokens,
            "response_format": {"type": "json_object"},
        })
    }

    /// Read `choices[0].message.content` and the usage block.
    pub(crate) fn parse_reply(envelope: &Value) -> Result<ProviderReply, ProviderError> {
        let text = envelope
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::ProviderServer {
                status: 200,
                message: "response has no choices[0].message.content".to_string(),
            })?;

        let usage = TokenUsage {
            input_tokens: envelope
                .pointer("/usage/prompt_tokens")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
            output_tokens: envelope
                .pointer("/usage/completion_tokens")
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
impl LlmProvider for OpenAiProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    async fn dispatch(&self, prompt: &Prompt, model: &ModelConfig) -> Result<ProviderReply, ProviderError> {
        debug!(
            model = %model.model_id,
            digest = %prompt.digest(),
            "Dispatching to OpenAI"
        );

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose())
            .timeout(model.request_timeout)
            .json(&Self::request_body(prompt, model))
            .send()
            .await?;

        read_reply(resp, Self::parse_reply).await
    }
}
