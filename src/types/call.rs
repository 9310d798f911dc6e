//! Provider call records

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Outcome of one dispatch attempt (and, on [`ProviderCall`], of the last one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    TransientFailure,
    FatalFailure,
}

/// Token accounting reported by the provider envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// One dispatch attempt inside a retried call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_number: u32,
    pub outcome: CallOutcome,
    pub latency: Duration,
    /// Provider error message for failed attempts
    pub error: Option<String>,
    /// Backoff slept after this attempt before the next one
    pub backoff: Option<Duration>,
}

/// Request/response pair for a successful provider call.
///
/// `outcome` mirrors the last attempt. A call with `outcome == Success`
/// always carries `raw_response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCall {
    pub call_id: Uuid,
    pub provider_id: String,
    pub model_id: String,
    pub prompt: String,
    pub raw_response: Option<String>,
    /// Wall time from first dispatch to final response, backoff included
    pub latency: Duration,
    pub attempt_number: u32,
    pub outcome: CallOutcome,
    pub usage: TokenUsage,
    pub attempts: Vec<AttemptRecord>,
}

impl ProviderCall {
    pub fn raw_text(&self) -> &str {
        self.raw_response.as_deref().unwrap_or_default()
    }

    /// Number of attempts that failed before the final one.
    pub fn retries(&self) -> u32 {
        self.attempt_number.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_saturates_on_absurd_counts() {
        let usage = TokenUsage {
            input_tokens: u64::MAX,
            output_tokens: 10,
        };
        assert_eq!(usage.total(), u64::MAX);

        let usage = TokenUsage {
            input_tokens: 1_200,
            output_tokens: 300,
        };
        assert_eq!(usage.total(), 1_500);
    }

    #[test]
    fn retries_count_failed_attempts_only() {
        let call = ProviderCall {
            call_id: Uuid::nil(),
            provider_id: "mock".to_string(),
            model_id: "mock-model".to_string(),
            prompt: String::new(),
            raw_response: None,
            latency: Duration::ZERO,
            attempt_number: 3,
            outcome: CallOutcome::Success,
            usage: TokenUsage::default(),
            attempts: Vec::new(),
        };
        assert_eq!(call.retries(), 2);
        assert_eq!(call.raw_text(), "");
    }
}
