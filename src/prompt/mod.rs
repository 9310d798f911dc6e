//! Prompt Composer
//!
//! Renders a [`Snapshot`] plus a [`Brief`] into the single prompt string sent
//! to a provider.
//!
//! ## Layout
//!
//! ````text
//! role / task
//! The data includes: ...
//! Please provide the following analysis: 1. ... 2. ...
//! OUTPUT FORMAT (rendered from the DocumentSchema)
//! DATA ANALYSIS GUIDANCE: ...
//! Additional context and instructions: ...   (only when context is given)
//! DATA (...):
//! ```json
//! [records]
//! ```
//! ````
//!
//! Composition is pure: records serialize with sorted keys, context is a
//! `BTreeMap`, and nothing time-dependent is rendered. The composer never
//! truncates; an oversized snapshot is an error and the caller samples upstream.

mod briefs;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::debug;

use crate::config::defaults::DEFAULT_MAX_SNAPSHOT_CHARS;
use crate::error::AnalysisError;
use crate::schema::{DocumentSchema, FieldSpec, Shape};
use crate::types::{EntityKind, Snapshot};

/// Opens the data block. Providers that need the records back (the mock)
/// look for this marker.
pub(crate) const DATA_FENCE_OPEN: &str = "```json\n";
const DATA_FENCE_CLOSE: &str = "\n```";

const CLOSING_INSTRUCTION: &str =
    "Provide your analysis in JSON format as specified in the instructions above. Respond with the JSON object only.";

// ============================================================================
// Brief
// ============================================================================

/// Per-kind analytical brief: objectives plus the output schema to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Brief {
    pub kind: EntityKind,
    pub role: &'static str,
    pub task: &'static str,
    pub data_description: &'static [&'static str],
    /// Ordered analysis instructions
    pub objectives: &'static [&'static str],
    /// Domain rules of thumb
    pub guidance: &'static [&'static str],
    pub schema: &'static DocumentSchema,
}

impl Brief {
    pub fn for_kind(kind: EntityKind) -> &'static Brief {
        match kind {
            EntityKind::Campaign => &briefs::CAMPAIGN_BRIEF,
            EntityKind::Flow => &briefs::FLOW_BRIEF,
            EntityKind::List => &briefs::LIST_BRIEF,
            EntityKind::Unified => &briefs::UNIFIED_BRIEF,
        }
    }
}

// ============================================================================
// Prompt
// ============================================================================

/// Composed prompt text, tagged with the kind it was built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    kind: EntityKind,
    text: String,
}

impl Prompt {
    /// Wrap caller-written text, e.g. a stricter re-dispatch.
    pub fn new(kind: EntityKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// md5 hex digest of the text, used to identify prompts in logs.
    pub fn digest(&self) -> String {
        format!("{:x}", md5::compute(self.text.as_bytes()))
    }

    /// The JSON text of the DATA block, if the prompt has one.
    pub(crate) fn data_block(&self) -> Option<&str> {
        let start = self.text.rfind(DATA_FENCE_OPEN)? + DATA_FENCE_OPEN.len();
        let len = self.text[start..].find(DATA_FENCE_CLOSE)?;
        Some(&self.text[start..start + len])
    }
}

// ============================================================================
// Composer
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct PromptComposer {
    max_snapshot_chars: usize,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SNAPSHOT_CHARS)
    }
}

impl PromptComposer {
    pub fn new(max_snapshot_chars: usize) -> Self {
        Self { max_snapshot_chars }
    }

    pub fn compose(&self, snapshot: &Snapshot, brief: &Brief) -> Result<Prompt, AnalysisError> {
        self.compose_with_context(snapshot, brief, &BTreeMap::new())
    }

    /// Compose with extra caller notes rendered as an additional section.
    pub fn compose_with_context(
        &self,
        snapshot: &Snapshot,
        brief: &Brief,
        context: &BTreeMap<String, String>,
    ) -> Result<Prompt, AnalysisError> {
        if brief.kind != snapshot.kind() {
            return Err(AnalysisError::InvalidInput(format!(
                "{} brief cannot be used for a {} snapshot",
                brief.kind,
                snapshot.kind()
            )));
        }

        let data = serde_json::to_string(snapshot.records())
            .map_err(|e| AnalysisError::InvalidInput(format!("records are not serializable: {e}")))?;
        let size = data.chars().count();
        if size > self.max_snapshot_chars {
            return Err(AnalysisError::SnapshotTooLarge {
                kind: snapshot.kind(),
                size,
                budget: self.max_snapshot_chars,
            });
        }

        let mut text = String::with_capacity(data.len() + 4096);
        render_brief(&mut text, brief);

        if !context.is_empty() {
            text.push_str("\nAdditional context and instructions:\n");
            for (key, value) in context {
                let _ = writeln!(text, "- {key}: {value}");
            }
        }

        let _ = writeln!(text, "\nDATA ({}):", describe_data(snapshot));
        text.push_str(DATA_FENCE_OPEN);
        text.push_str(&data);
        text.push_str(DATA_FENCE_CLOSE);
        text.push_str("\n\n");
        text.push_str(CLOSING_INSTRUCTION);

        let prompt = Prompt::new(snapshot.kind(), text);
        debug!(
            kind = %prompt.kind(),
            digest = %prompt.digest(),
            chars = prompt.text().len(),
            records = snapshot.record_count(),
            "Composed prompt"
        );
        Ok(prompt)
    }
}

fn render_brief(out: &mut String, brief: &Brief) {
    let _ = writeln!(out, "{}\n\n{}\n", brief.role, brief.task);

    out.push_str("The data includes:\n");
    for line in brief.data_description {
        let _ = writeln!(out, "- {line}");
    }

    out.push_str("\nPlease provide the following analysis:\n");
    for (i, objective) in brief.objectives.iter().enumerate() {
        let _ = writeln!(out, "{}. {objective}", i + 1);
    }

    out.push_str("\nOUTPUT FORMAT\nReturn your analysis as a single JSON object with these keys:\n");
    render_fields(out, brief.schema.fields, 0);

    let required: Vec<_> = brief.schema.required_keys().collect();
    let _ = writeln!(
        out,
        "Keys marked required must always be present: {}. Use the declared types exactly.",
        required.join(", ")
    );

    if !brief.guidance.is_empty() {
        out.push_str("\nDATA ANALYSIS GUIDANCE:\n");
        for line in brief.guidance {
            let _ = writeln!(out, "- {line}");
        }
    }
}

fn render_fields(out: &mut String, fields: &[FieldSpec], depth: usize) {
    let indent = "  ".repeat(depth);
    for field in fields {
        let required = if field.required { ", required" } else { "" };
        let _ = writeln!(
            out,
            "{indent}- \"{}\" ({}{required}): {}",
            field.name,
            field.shape.type_name(),
            field.description
        );
        match field.shape {
            Shape::List { item } => {
                let _ = writeln!(out, "{indent}  items like: {item}");
            }
            Shape::Record { fields } if !fields.is_empty() => render_fields(out, fields, depth + 1),
            _ => {}
        }
    }
}

fn describe_data(snapshot: &Snapshot) -> String {
    let mut line = format!("{} {}", snapshot.record_count(), snapshot.kind().plural());
    if snapshot.sampled() {
        let _ = write!(line, ", sampled from {}", snapshot.source_count());
    }
    if !snapshot.constituents().is_empty() {
        let kinds: Vec<_> = snapshot.constituents().iter().map(|k| k.as_str()).collect();
        let _ = write!(line, ", covering {}", kinds.join(", "));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotBuilder;
    use crate::types::Record;
    use serde_json::json;

    fn campaign_snapshot(n: usize) -> Snapshot {
        let records: Vec<Record> = (0..n)
            .map(|i| {
                json!({"id": format!("c{i}"), "name": format!("Spring Sale {i}"), "status": "sent"})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect();
        SnapshotBuilder::default()
            .build(EntityKind::Campaign, records, false)
            .unwrap()
    }

    #[test]
    fn every_kind_has_a_matching_brief() {
        for kind in [
            EntityKind::Campaign,
            EntityKind::Flow,
            EntityKind::List,
            EntityKind::Unified,
        ] {
            let brief = Brief::for_kind(kind);
            assert_eq!(brief.kind, kind);
            assert_eq!(brief.schema.kind, kind);
            assert!(!brief.objectives.is_empty());
        }
    }

    #[test]
    fn prompt_contains_schema_objectives_and_data() {
        let snapshot = campaign_snapshot(3);
        let prompt = PromptComposer::default()
            .compose(&snapshot, Brief::for_kind(EntityKind::Campaign))
            .unwrap();
        let text = prompt.text();

        assert_eq!(prompt.kind(), EntityKind::Campaign);
        assert!(text.contains("1. Key performance insights and trends"));
        assert!(text.contains("- \"summary\" (string, required)"));
        assert!(text.contains("  - \"campaign_count\" (number)"));
        assert!(text.contains("DATA (3 campaigns):"));
        assert!(text.contains("Spring Sale 2"));
    }

    #[test]
    fn data_block_round_trips_the_records() {
        let snapshot = campaign_snapshot(2);
        let prompt = PromptComposer::default()
            .compose(&snapshot, Brief::for_kind(EntityKind::Campaign))
            .unwrap();
        let records: Vec<Record> = serde_json::from_str(prompt.data_block().unwrap()).unwrap();
        assert_eq!(records, snapshot.records());
    }

    #[test]
    fn context_is_rendered_in_key_order() {
        let snapshot = campaign_snapshot(1);
        let mut context = BTreeMap::new();
        context.insert("zeta".to_string(), "last".to_string());
        context.insert("alpha".to_string(), "first".to_string());
        let prompt = PromptComposer::default()
            .compose_with_context(&snapshot, Brief::for_kind(EntityKind::Campaign), &context)
            .unwrap();
        let text = prompt.text();
        let alpha = text.find("- alpha: first").unwrap();
        let zeta = text.find("- zeta: last").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn oversized_snapshot_is_rejected_not_truncated() {
        let snapshot = campaign_snapshot(20);
        let err = PromptComposer::new(100)
            .compose(&snapshot, Brief::for_kind(EntityKind::Campaign))
            .unwrap_err();
        match err {
            AnalysisError::SnapshotTooLarge { kind, size, budget } => {
                assert_eq!(kind, EntityKind::Campaign);
                assert!(size > budget);
                assert_eq!(budget, 100);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mismatched_brief_is_rejected() {
        let snapshot = campaign_snapshot(1);
        let err = PromptComposer::default()
            .compose(&snapshot, Brief::for_kind(EntityKind::Flow))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }

    #[test]
    fn digest_is_stable_hex() {
        let prompt = Prompt::new(EntityKind::List, "hello");
        assert_eq!(prompt.digest(), "5d41402abc4b2a76b9719d911017c592");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                ..ProptestConfig::default()
            })]

            /// Property: identical snapshot and brief give byte-identical prompts.
            #[test]
            fn compose_is_deterministic(
                names in prop::collection::vec("[A-Za-z0-9 _:-]{1,24}", 1..12),
                opens in prop::collection::vec(0u32..100, 1..12),
            ) {
                let records: Vec<Record> = names
                    .iter()
                    .zip(opens.iter().cycle())
                    .enumerate()
                    .map(|(i, (name, open))| {
                        json!({"id": i, "name": name, "metrics": {"open_rate": open}})
                            .as_object()
                            .cloned()
                            .unwrap()
                    })
                    .collect();
                let snapshot = SnapshotBuilder::default()
                    .build(EntityKind::Campaign, records, false)
                    .unwrap();
                let composer = PromptComposer::default();
                let brief = Brief::for_kind(EntityKind::Campaign);

                let first = composer.compose(&snapshot, brief).unwrap();
                let second = composer.compose(&snapshot.clone(), brief).unwrap();
                prop_assert_eq!(first.text(), second.text());
                prop_assert_eq!(first.digest(), second.digest());
            }
        }
    }
}
