//! Built-in analytical briefs, one per entity kind

use super::Brief;
use crate::schema::{CAMPAIGN_SCHEMA, FLOW_SCHEMA, LIST_SCHEMA, UNIFIED_SCHEMA};
use crate::types::EntityKind;

pub(super) static CAMPAIGN_BRIEF: Brief = Brief {
    kind: EntityKind::Campaign,
    role: "You are analyzing email campaign data from a marketing automation platform.",
    task: "Your task is to analyze the performance and patterns of these email campaigns to provide actionable insights.",
    data_description: &[
        "Campaign metrics like open rates, click rates, and revenue",
        "Campaign metadata like send times, subject lines, and tags",
        "Status information (draft, sent, etc.)",
    ],
    objectives: &[
        "Key performance insights and trends",
        "Anomalies or underperforming campaigns",
        "Subject line effectiveness patterns",
        "Sending time and frequency patterns",
        "Specific recommendations for improvement",
        "Suggested A/B tests or experiments",
        "Tag usage and organization recommendations",
        "Naming convention recommendations for campaign names, tag names, folder organization and subject line patterns",
        "Cleanup recommendations for stale drafts (6+ months), failed campaigns, duplicates, consistently poor performers and outdated campaigns",
    ],
    guidance: &[
        "Open rates typically average 15-25% for most sectors",
        "Click rates typically average 2-5% for marketing emails",
        "Look for correlations between subject line length/content and open rates",
        "Check whether send time or day of week relates to performance",
        "Check if specific types of campaigns consistently outperform others",
        "Look for seasonal patterns in performance",
        "For cleanup, consider campaign age, duplicate content and missing data",
        "For naming, prefer descriptive, searchable names with consistent separators and dates where relevant",
    ],
    schema: &CAMPAIGN_SCHEMA,
};

pub(super) static FLOW_BRIEF: Brief = Brief {
    kind: EntityKind::Flow,
    role: "You are analyzing automation flow data from a marketing automation platform.",
    task: "Your task is to analyze these automation flows to provide actionable insights on their structure and effectiveness.",
    data_description: &[
        "Flow status and trigger types",
        "Flow components (emails, SMS, time delays)",
        "Performance metrics where available",
        "Tag information",
        "Creation and update timestamps",
    ],
    objectives: &[
        "Flow structure patterns and insights",
        "Flow trigger distribution and effectiveness",
        "Channel usage patterns (email vs SMS)",
        "Flow complexity and potential simplification opportunities",
        "Flow organization recommendations",
        "Maintenance and update needs",
        "Tag usage recommendations",
        "Naming convention recommendations for flow names, tag names, folders, steps and triggers",
        "Cleanup recommendations for inactive, broken, duplicate, overly complex and outdated flows",
    ],
    guidance: &[
        "Flows with more than 10 steps may be overly complex and confusing",
        "Abandoned cart flows typically perform best with 2-3 messages spaced 4-24 hours apart",
        "Welcome series typically perform best with 3-5 messages over 1-2 weeks",
        "Flows that haven't been updated in 6+ months should be reviewed for relevance",
        "SMS messages should be used strategically, not just duplicating email content",
        "Check for redundant flows that could be consolidated",
    ],
    schema: &FLOW_SCHEMA,
};

pub(super) static LIST_BRIEF: Brief = Brief {
    kind: EntityKind::List,
    role: "You are analyzing subscriber list data from a marketing automation platform.",
    task: "Your task is to analyze these lists to provide actionable insights on list organization and segmentation.",
    data_description: &[
        "List sizes and growth patterns",
        "Static vs dynamic list information",
        "List organization (folders, tags)",
        "Creation and update timestamps",
    ],
    objectives: &[
        "List size distribution and insights",
        "Static vs dynamic list usage patterns",
        "List freshness and maintenance needs",
        "List organization recommendations",
        "Segmentation strategy insights",
        "Tag usage recommendations",
        "Naming convention recommendations for list names, tag names, folders, segments and conditions",
        "Cleanup recommendations for empty, duplicate, outdated, badly named and mergeable lists",
    ],
    guidance: &[
        "Empty lists (0 subscribers) should typically be removed unless they're new",
        "Most accounts should have a mix of static and dynamic lists",
        "Dynamic lists suit ongoing behavioral segmentation; static lists suit one-time imports",
        "Lists that haven't been updated in 6+ months may need cleanup",
        "Look for opportunities to consolidate similar lists",
        "Consider if tags are used consistently across lists",
    ],
    schema: &LIST_SCHEMA,
};

pub(super) static UNIFIED_BRIEF: Brief = Brief {
    kind: EntityKind::Unified,
    role: "You are analyzing unified marketing account data across campaigns, flows, and lists.",
    task: "Your task is to provide a detailed strategic analysis with specific, actionable step-by-step guidance. Each DATA record is one entity kind, holding either its records or its prior analysis.",
    data_description: &[
        "Campaign performance and metadata",
        "Flow structures and triggers",
        "List sizes and types",
        "Tag usage across all entities",
        "Timestamps for creation and updates",
    ],
    objectives: &[
        "Account health assessment: score 1-10 with justification, strengths, improvement areas and critical issues with remediation plans",
        "Tag analysis: consistency score, well-used and inconsistent tags, and a concrete taxonomy with a migration plan",
        "Customer journey mapping: entry points, flow-through, exit points and optimization steps per segment",
        "Cross-entity correlations: relationships between campaigns, flows and lists with quantified impact",
        "Strategic recommendations: current state, target state, steps, timeline and expected impact per area",
        "Resource allocation: current allocation, recommended shifts and expected ROI",
    ],
    guidance: &[
        "Every recommendation should say who does what by when, with measurable outcomes",
        "Avoid generalities and vague recommendations",
        "Refer to entities by name when the data contains them",
    ],
    schema: &UNIFIED_SCHEMA,
};
