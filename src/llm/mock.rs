//! Deterministic mock backend
//!
//! Answers with a canned document for the prompt's kind. Counts in
//! `key_metrics` are derived from the records in the prompt's DATA block, so
//! the mock exercises the same compose and validate path as a live provider.
//! Some optional keys are left out on purpose to exercise default filling.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use super::{LlmProvider, ModelConfig, ProviderError, ProviderId, ProviderReply};
use crate::prompt::Prompt;
use crate::types::{EntityKind, Record, TokenUsage};

/// One scripted dispatch outcome, consumed in order before canned answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Fail the dispatch with this error
    Fail(ProviderError),
    /// Answer with this raw text instead of the canned document
    Respond(String),
    /// Sleep, then answer normally
    Stall(Duration),
}

#[derive(Debug, Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<ScriptedFailure>>,
    dispatches: AtomicU32,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that plays `script` first, one step per dispatch.
    pub fn with_script(script: impl IntoIterator<Item = ScriptedFailure>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            dispatches: AtomicU32::new(0),
        }
    }

    /// Number of dispatch calls so far.
    pub fn dispatch_count(&self) -> u32 {
        self.dispatches.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Option<ScriptedFailure> {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Mock
    }

    async fn dispatch(&self, prompt: &Prompt, _model: &ModelConfig) -> Result<ProviderReply, ProviderError> {
        let call = self.dispatches.fetch_add(1, Ordering::SeqCst) + 1;

        let text = match self.next_step() {
            Some(ScriptedFailure::Fail(err)) => {
                debug!(call, error = %err, "Mock dispatch failing as scripted");
                return Err(err);
            }
            Some(ScriptedFailure::Respond(text)) => text,
            Some(ScriptedFailure::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                canned_text(prompt)
            }
            None => canned_text(prompt),
        };

        let usage = TokenUsage {
            input_tokens: approx_tokens(prompt.text()),
            output_tokens: approx_tokens(&text),
        };
        Ok(ProviderReply { text, usage })
    }
}

fn approx_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

fn canned_text(prompt: &Prompt) -> String {
    let records: Vec<Record> = prompt
        .data_block()
        .and_then(|data| serde_json::from_str(data).ok())
        .unwrap_or_default();

    let document = match prompt.kind() {
        EntityKind::Campaign => campaign_document(&records),
        EntityKind::Flow => flow_document(&records),
        EntityKind::List => list_document(&records),
        EntityKind::Unified => unified_document(&records),
    };

    serde_json::to_string_pretty(&document).unwrap_or_default()
}

// ============================================================================
// Canned documents
// ============================================================================

fn campaign_document(records: &[Record]) -> Value {
    let count = records.len();
    let rates: Vec<f64> = records
        .iter()
        .filter_map(|r| r.get("metrics")?.get("open_rate")?.as_f64())
        .collect();
    let avg_open_rate = if rates.is_empty() {
        24.6
    } else {
        rates.iter().sum::<f64>() / rates.len() as f64
    };

    json!({
        "summary": format!(
            "Analysis of {count} campaigns shows good overall performance with opportunities in subject lines and send timing."
        ),
        "key_metrics": {
            "avg_open_rate": avg_open_rate,
            "avg_click_rate": 3.2,
            "total_revenue": 12450.75,
            "campaign_count": count
        },
        "top_performing": [
            {"name": "Summer Sale Announcement", "metric": "open_rate", "value": 32.7,
             "reasons": ["Clear value proposition in subject", "Sent during optimal time window"]}
        ],
        "underperforming": [
            {"name": "Monthly Newsletter", "metric": "click_rate", "value": 1.4,
             "reasons": ["Too many competing CTAs", "Weak subject line"]}
        ],
        "trends": [
            {"trend": "Mid-week sends outperform weekend sends",
             "evidence": "20% higher open rates on Tuesday-Thursday", "impact": "High"}
        ],
        "subject_line_insights": [
            {"pattern": "Questions in subject lines", "effect": "+12% click rate on average",
             "examples": ["Ready to upgrade?"]}
        ],
        "timing_insights": [
            {"pattern": "Morning sends (8-10am) outperform evening", "effect": "+22% engagement"}
        ],
        "recommendations": [
            {"area": "Send Timing", "recommendation": "Shift sends to Tuesday-Thursday mornings",
             "expected_impact": "High"}
        ],
        "tag_recommendations": [
            {"current_state": "Tags are applied to few campaigns",
             "recommendation": "Tag every campaign with type:value and audience:value"}
        ]
    })
}

fn flow_document(records: &[Record]) -> Value {
    let count = records.len();
    let active = records
        .iter()
        .filter(|r| {
            r.get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| s.eq_ignore_ascii_case("active") || s.eq_ignore_ascii_case("live"))
        })
        .count();
    let steps: Vec<usize> = records
        .iter()
        .filter_map(|r| {
            r.get("actions")
                .and_then(Value::as_array)
                .map(Vec::len)
                .or_else(|| r.get("action_count")?.as_u64().map(|n| n as usize))
        })
        .collect();
    let avg_steps = if steps.is_empty() {
        0.0
    } else {
        steps.iter().sum::<usize>() as f64 / steps.len() as f64
    };

    json!({
        "summary": format!(
            "Analysis of {count} automation flows reveals a solid foundation; email dominates and SMS is underused."
        ),
        "key_metrics": {
            "total_flows": count,
            "active_flows": active,
            "avg_steps_per_flow": avg_steps
        },
        "trigger_analysis": [
            {"trigger_type": "Metric", "count": count, "percentage": 100.0,
             "effectiveness": "Effective for abandoned cart and browse abandonment"}
        ],
        "channel_usage": {
            "email_count": 42,
            "sms_count": 8,
            "email_percentage": 84.0,
            "sms_percentage": 16.0,
            "insights": "SMS is underutilized for time-sensitive notifications"
        },
        "complexity_analysis": [
            {"flow_name": "VIP Customer Journey", "steps": 12, "complexity": "High",
             "simplification": "Split into two or three targeted flows"}
        ],
        "staleness": [
            {"flow_name": "Customer Birthday", "days_since_update": 218,
             "recommendation": "Refresh creative and offers"}
        ],
        "organization_recommendations": [
            {"area": "Flow Naming", "recommendation": "Use [Trigger]-[Purpose]-[Audience]",
             "expected_impact": "Faster management"}
        ],
        "tag_recommendations": [
            {"current_state": "Minimal tag usage on flows",
             "recommendation": "Tag flows with purpose, audience and update status"}
        ]
    })
}

fn list_document(records: &[Record]) -> Value {
    let count = records.len();
    let total_profiles: u64 = records
        .iter()
        .filter_map(|r| r.get("profile_count")?.as_u64())
        .sum();
    let dynamic = records
        .iter()
        .filter(|r| {
            r.get("list_type")
                .or_else(|| r.get("type"))
                .and_then(Value::as_str)
                .is_some_and(|t| t.eq_ignore_ascii_case("dynamic") || t.eq_ignore_ascii_case("segment"))
        })
        .count();
    let (avg_size, dynamic_pct) = if count == 0 {
        (0.0, 0.0)
    } else {
        (
            total_profiles as f64 / count as f64,
            dynamic as f64 * 100.0 / count as f64,
        )
    };
    let empty = records
        .iter()
        .filter(|r| r.get("profile_count").and_then(Value::as_u64) == Some(0))
        .count();

    json!({
        "summary": format!(
            "Analysis of {count} lists shows a workable mix of static and dynamic lists with some consolidation opportunities."
        ),
        "key_metrics": {
            "total_lists": count,
            "total_profiles": total_profiles,
            "avg_list_size": avg_size,
            "static_lists_percentage": 100.0 - dynamic_pct,
            "dynamic_lists_percentage": dynamic_pct
        },
        "size_distribution": {
            "empty": empty,
            "insights": "Consider removing or consolidating empty lists"
        },
        "type_analysis": {
            "static_count": count - dynamic,
            "dynamic_count": dynamic,
            "recommendations": "Use dynamic lists for engagement and purchase behavior segmentation"
        },
        "segmentation_strategy": [
            {"observation": "Limited segmentation by engagement level",
             "recommendation": "Create dynamic lists for high, medium and low engagement"}
        ]
    })
}

fn unified_document(records: &[Record]) -> Value {
    let entities: Vec<String> = records
        .iter()
        .filter_map(|r| {
            let kind = r.get("entity")?.as_str()?;
            let count = r
                .get("record_count")
                .and_then(Value::as_u64)
                .map_or_else(|| "analyzed".to_string(), |n| n.to_string());
            Some(format!("{count} {kind}"))
        })
        .collect();

    json!({
        "summary": format!(
            "Cross-entity review covering {} shows strong campaign execution with gaps in tagging and journey coverage.",
            entities.join(", ")
        ),
        "account_health": {
            "score": 7,
            "strengths": ["Well-structured welcome and abandoned cart flows"],
            "areas_for_improvement": ["Inconsistent tagging across entities"],
            "critical_issues": ["Flows not updated in 6+ months"]
        },
        "tag_analysis": {
            "consistency_score": 0.4,
            "well_used_tags": ["promotion", "newsletter"],
            "inconsistent_tags": ["promo/promotion", "vip/loyalty"],
            "recommended_taxonomy": "category:value with purpose, audience, channel and product categories"
        },
        "cross_entity_correlations": [
            {"entities": ["Welcome Flow", "New Products List"],
             "relationship": "Disconnected messaging between related touchpoints",
             "performance_impact": "Lower conversion from new subscribers",
             "recommendation": "Coordinate messaging with progressive storytelling"}
        ],
        "strategic_recommendations": [
            {"area": "Customer Segmentation", "current_state": "Basic segmentation",
             "target_state": "Behavioral segmentation", "steps": ["Implement engagement scoring"],
             "expected_impact": "15-25% better retention", "priority": "High"}
        ]
    })
}
