//! Declared document shapes per entity kind

use super::{DocumentSchema, FieldSpec};
use crate::types::EntityKind;

const RECOMMENDATION_ITEM: &str =
    r#"{"area": "Area of improvement", "recommendation": "Specific recommendation", "expected_impact": "Expected impact"}"#;
const TAG_RECOMMENDATION_ITEM: &str =
    r#"{"current_state": "Current tag usage", "recommendation": "Recommendation for improvement"}"#;
const CLEANUP_ITEM: &str =
    r#"{"type": "cleanup category", "items": [{"name": "Entity name", "id": "entity_id", "reason": "Why", "action": "archive/delete/update"}]}"#;

// ============================================================================
// Campaigns
// ============================================================================

const CAMPAIGN_METRICS: &[FieldSpec] = &[
    FieldSpec::number("avg_open_rate", "Mean open rate across analyzed campaigns"),
    FieldSpec::number("avg_click_rate", "Mean click rate across analyzed campaigns"),
    FieldSpec::number("total_revenue", "Attributed revenue summed over campaigns"),
    FieldSpec::number("campaign_count", "Number of campaigns in the data"),
];

const CAMPAIGN_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("summary", "Brief overview of findings").required(),
    FieldSpec::record("key_metrics", CAMPAIGN_METRICS, "Headline metrics").required(),
    FieldSpec::list(
        "top_performing",
        r#"{"name": "Campaign Name", "metric": "open_rate", "value": 0.0, "reasons": ["reason1"]}"#,
        "Best campaigns and why they worked",
    ),
    FieldSpec::list(
        "underperforming",
        r#"{"name": "Campaign Name", "metric": "click_rate", "value": 0.0, "reasons": ["reason1"]}"#,
        "Weakest campaigns and likely causes",
    ),
    FieldSpec::list(
        "trends",
        r#"{"trend": "Description", "evidence": "Evidence", "impact": "Impact"}"#,
        "Patterns across campaigns over time",
    ),
    FieldSpec::list(
        "subject_line_insights",
        r#"{"pattern": "Pattern observed", "effect": "Effect on metrics", "examples": ["example1"]}"#,
        "Subject line patterns and their effect",
    ),
    FieldSpec::list(
        "timing_insights",
        r#"{"pattern": "Pattern observed", "effect": "Effect on metrics"}"#,
        "Send time and frequency patterns",
    ),
    FieldSpec::list("recommendations", RECOMMENDATION_ITEM, "Prioritized improvements"),
    FieldSpec::list(
        "experiments",
        r#"{"hypothesis": "Hypothesis", "test_design": "How to run the test", "metrics_to_track": ["metric1"]}"#,
        "Suggested A/B tests",
    ),
    FieldSpec::list("tag_recommendations", TAG_RECOMMENDATION_ITEM, "Tag usage advice"),
    FieldSpec::record(
        "naming_conventions",
        &[],
        "Naming formats, examples and rules for campaign names, tags, folders and subject lines",
    ),
    FieldSpec::list(
        "cleanup_recommendations",
        CLEANUP_ITEM,
        "Stale drafts, failed, duplicate, poor performing or outdated campaigns to act on",
    ),
];

pub static CAMPAIGN_SCHEMA: DocumentSchema = DocumentSchema {
    kind: EntityKind::Campaign,
    fields: CAMPAIGN_FIELDS,
};

// ============================================================================
// Flows
// ============================================================================

const FLOW_METRICS: &[FieldSpec] = &[
    FieldSpec::number("total_flows", "Number of flows in the data"),
    FieldSpec::number("active_flows", "Flows currently live"),
    FieldSpec::number("avg_steps_per_flow", "Mean number of actions per flow"),
];

const CHANNEL_USAGE: &[FieldSpec] = &[
    FieldSpec::number("email_count", "Email steps across flows"),
    FieldSpec::number("sms_count", "SMS steps across flows"),
    FieldSpec::number("email_percentage", "Share of email steps"),
    FieldSpec::number("sms_percentage", "Share of SMS steps"),
    FieldSpec::text("insights", "Insights about channel balance"),
];

const FLOW_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("summary", "Brief overview of findings").required(),
    FieldSpec::record("key_metrics", FLOW_METRICS, "Headline metrics").required(),
    FieldSpec::list(
        "trigger_analysis",
        r#"{"trigger_type": "Type", "count": 0, "percentage": 0.0, "effectiveness": "Assessment"}"#,
        "Trigger distribution and effectiveness",
    ),
    FieldSpec::record("channel_usage", CHANNEL_USAGE, "Email vs SMS usage"),
    FieldSpec::list(
        "complexity_analysis",
        r#"{"flow_name": "Flow Name", "steps": 0, "complexity": "High/Medium/Low", "simplification": "Suggestion"}"#,
        "Overly complex flows and how to simplify them",
    ),
    FieldSpec::list(
        "staleness",
        r#"{"flow_name": "Flow Name", "days_since_update": 0, "recommendation": "Update recommendation"}"#,
        "Flows that need maintenance",
    ),
    FieldSpec::record(
        "naming_conventions",
        &[],
        "Naming formats, examples and rules for flow, tag, folder, step and trigger names",
    ),
    FieldSpec::list("organization_recommendations", RECOMMENDATION_ITEM, "Structural improvements"),
    FieldSpec::list("tag_recommendations", TAG_RECOMMENDATION_ITEM, "Tag usage advice"),
    FieldSpec::list(
        "cleanup_recommendations",
        CLEANUP_ITEM,
        "Inactive, broken, duplicate, overly complex or outdated flows to act on",
    ),
];

pub static FLOW_SCHEMA: DocumentSchema = DocumentSchema {
    kind: EntityKind::Flow,
    fields: FLOW_FIELDS,
};

// ============================================================================
// Lists
// ============================================================================

const LIST_METRICS: &[FieldSpec] = &[
    FieldSpec::number("total_lists", "Number of lists in the data"),
    FieldSpec::number("total_profiles", "Profiles summed over lists"),
    FieldSpec::number("avg_list_size", "Mean profiles per list"),
    FieldSpec::number("static_lists_percentage", "Share of static lists"),
    FieldSpec::number("dynamic_lists_percentage", "Share of dynamic lists"),
];

const SIZE_DISTRIBUTION: &[FieldSpec] = &[
    FieldSpec::number("empty", "Lists with no profiles"),
    FieldSpec::number("small", "Small lists"),
    FieldSpec::number("medium", "Medium lists"),
    FieldSpec::number("large", "Large lists"),
    FieldSpec::text("insights", "Insights about size distribution"),
];

const TYPE_ANALYSIS: &[FieldSpec] = &[
    FieldSpec::number("static_count", "Static lists"),
    FieldSpec::number("dynamic_count", "Dynamic lists"),
    FieldSpec::text("recommendations", "Recommendations for list type usage"),
];

const LIST_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("summary", "Brief overview of findings").required(),
    FieldSpec::record("key_metrics", LIST_METRICS, "Headline metrics").required(),
    FieldSpec::record("size_distribution", SIZE_DISTRIBUTION, "List size buckets"),
    FieldSpec::record("type_analysis", TYPE_ANALYSIS, "Static vs dynamic usage"),
    FieldSpec::list(
        "freshness_analysis",
        r#"{"list_name": "List Name", "days_since_update": 0, "recommendation": "Recommendation"}"#,
        "Lists that need maintenance",
    ),
    FieldSpec::record(
        "naming_conventions",
        &[],
        "Naming formats, examples and rules for list, tag, folder, segment and condition names",
    ),
    FieldSpec::list("organization_recommendations", RECOMMENDATION_ITEM, "Structural improvements"),
    FieldSpec::list(
        "segmentation_strategy",
        r#"{"observation": "Observation", "recommendation": "Strategic recommendation"}"#,
        "Segmentation opportunities",
    ),
    FieldSpec::list("tag_recommendations", TAG_RECOMMENDATION_ITEM, "Tag usage advice"),
    FieldSpec::list(
        "cleanup_recommendations",
        CLEANUP_ITEM,
        "Empty, duplicate, outdated, badly named or mergeable lists to act on",
    ),
];

pub static LIST_SCHEMA: DocumentSchema = DocumentSchema {
    kind: EntityKind::List,
    fields: LIST_FIELDS,
};

// ============================================================================
// Unified
// ============================================================================

const ACCOUNT_HEALTH: &[FieldSpec] = &[
    FieldSpec::number("score", "Overall health on a 1-10 scale"),
    FieldSpec::list("strengths", r#""Strength with an example from the data""#, "Strengths"),
    FieldSpec::list(
        "areas_for_improvement",
        r#""Improvement area with a specific recommendation""#,
        "Improvement areas",
    ),
    FieldSpec::list(
        "critical_issues",
        r#""Critical issue with impact and remediation plan""#,
        "Critical issues",
    ),
];

const TAG_ANALYSIS: &[FieldSpec] = &[
    FieldSpec::number("consistency_score", "Tag consistency between 0 and 1"),
    FieldSpec::list("well_used_tags", r#""tag""#, "Tags used consistently"),
    FieldSpec::list("inconsistent_tags", r#""tag-a/tag-b""#, "Conflicting or duplicate tags"),
    FieldSpec::text("recommended_taxonomy", "Concrete taxonomy and migration plan"),
];

const RESOURCE_ALLOCATION: &[FieldSpec] = &[
    FieldSpec::text("current_allocation", "Where effort goes today"),
    FieldSpec::list("recommended_shifts", r#""Shift with effort share and timeline""#, "Shifts"),
    FieldSpec::text("expected_roi", "Projected return with methodology"),
];

const UNIFIED_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("summary", "Brief overview of cross-entity findings").required(),
    FieldSpec::record("account_health", ACCOUNT_HEALTH, "Account health assessment").required(),
    FieldSpec::record("tag_analysis", TAG_ANALYSIS, "Tag consistency across entities"),
    FieldSpec::list(
        "customer_journey",
        r#"{"journey_segment": "Segment", "entry_points": ["..."], "flow_through": "...", "exit_points": ["..."], "optimization_opportunities": ["..."]}"#,
        "Journey mapping per customer segment",
    ),
    FieldSpec::list(
        "cross_entity_correlations",
        r#"{"entities": ["Welcome Flow", "VIP List"], "relationship": "...", "performance_impact": "...", "recommendation": "..."}"#,
        "Relationships between campaigns, flows and lists",
    ),
    FieldSpec::list(
        "strategic_recommendations",
        r#"{"area": "Area", "current_state": "...", "target_state": "...", "steps": ["..."], "expected_impact": "...", "priority": "High"}"#,
        "Step-by-step strategic plans",
    ),
    FieldSpec::record("resource_allocation", RESOURCE_ALLOCATION, "Effort allocation"),
];

pub static UNIFIED_SCHEMA: DocumentSchema = DocumentSchema {
    kind: EntityKind::Unified,
    fields: UNIFIED_FIELDS,
};
