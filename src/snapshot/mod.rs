//! Snapshot Builder
//!
//! Normalizes raw entity records into a bounded [`Snapshot`].
//!
//! ## Sampling rule
//!
//! With sampling enabled and more records than the cap, records are ordered by
//! the kind's recency field descending (`send_time` for campaigns, `updated`
//! for flows and lists; records without it go last), ties broken by `id`
//! ascending and then by input position, and the first `cap` are kept. The
//! rule has no randomness, so unchanged input always yields the same sample.
//!
//! ## Unified snapshots
//!
//! [`SnapshotBuilder::unified`] and [`SnapshotBuilder::from_analyses`] merge one
//! snapshot or analysis per constituent kind into a `unified` snapshot with
//! one record per constituent, ordered by kind.

use chrono::Utc;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::defaults::DEFAULT_SAMPLE_SIZE;
use crate::error::AnalysisError;
use crate::types::{AnalysisDocument, EntityKind, Record, Snapshot};

#[derive(Debug, Clone, Copy)]
pub struct SnapshotBuilder {
    sample_cap: usize,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_SIZE)
    }
}

impl SnapshotBuilder {
    /// A cap of zero is treated as one.
    pub fn new(sample_cap: usize) -> Self {
        Self {
            sample_cap: sample_cap.max(1),
        }
    }

    pub fn sample_cap(&self) -> usize {
        self.sample_cap
    }

    /// Build a per-kind snapshot from raw records.
    pub fn build(
        &self,
        kind: EntityKind,
        records: Vec<Record>,
        sample: bool,
    ) -> Result<Snapshot, AnalysisError> {
        if !kind.is_constituent() {
            return Err(AnalysisError::InvalidInput(
                "unified snapshots are merged from constituent snapshots, not built from records"
                    .to_string(),
            ));
        }
        if records.is_empty() {
            return Err(AnalysisError::EmptyInput { kind });
        }

        let source_count = records.len();
        let (records, sampled) = if sample && source_count > self.sample_cap {
            (self.sample(kind, records), true)
        } else {
            (records, false)
        };

        if sampled {
            info!(
                kind = %kind,
                source_count,
                kept = records.len(),
                "Sampled records for analysis"
            );
        }

        Ok(Snapshot::new(
            kind,
            Utc::now(),
            records,
            sampled,
            source_count,
            Vec::new(),
        ))
    }

    /// Merge per-kind raw snapshots into one unified snapshot.
    pub fn unified(
        &self,
        snapshots: BTreeMap<EntityKind, Snapshot>,
    ) -> Result<Snapshot, AnalysisError> {
        let constituents = check_constituents(snapshots.keys().copied())?;

        let mut sampled = false;
        let mut source_count = 0;
        let records: Vec<Record> = snapshots
            .into_iter()
            .map(|(kind, snapshot)| {
                sampled |= snapshot.sampled();
                source_count += snapshot.source_count();
                entity_record(
                    kind,
                    json!({
                        "entity": kind,
                        "record_count": snapshot.record_count(),
                        "sampled": snapshot.sampled(),
                        "records": snapshot.records(),
                    }),
                )
            })
            .collect();

        debug!(constituents = ?constituents, "Merged raw snapshots into unified snapshot");
        Ok(Snapshot::new(
            EntityKind::Unified,
            Utc::now(),
            records,
            sampled,
            source_count.max(constituents.len()),
            constituents,
        ))
    }

    /// Merge per-kind analyses into one unified snapshot.
    pub fn from_analyses(
        &self,
        analyses: BTreeMap<EntityKind, AnalysisDocument>,
    ) -> Result<Snapshot, AnalysisError> {
        let constituents = check_constituents(analyses.keys().copied())?;

        let records: Vec<Record> = analyses
            .into_iter()
            .map(|(kind, document)| {
                entity_record(
                    kind,
                    json!({
                        "entity": kind,
                        "analysis": document.into_content(),
                    }),
                )
            })
            .collect();

        debug!(constituents = ?constituents, "Merged analyses into unified snapshot");
        let count = records.len();
        Ok(Snapshot::new(
            EntityKind::Unified,
            Utc::now(),
            records,
            false,
            count,
            constituents,
        ))
    }

    fn sample(&self, kind: EntityKind, records: Vec<Record>) -> Vec<Record> {
        let field = kind.recency_field();
        let mut indexed: Vec<(usize, Record)> = records.into_iter().enumerate().collect();

        indexed.sort_by(|(pos_a, a), (pos_b, b)| {
            let by_recency = match field {
                Some(field) => compare_recency(a.get(field), b.get(field)),
                None => Ordering::Equal,
            };
            by_recency
                .then_with(|| compare_ids(a.get("id"), b.get("id")))
                .then_with(|| pos_a.cmp(pos_b))
        });

        indexed
            .into_iter()
            .take(self.sample_cap)
            .map(|(_, record)| record)
            .collect()
    }
}

fn check_constituents(
    kinds: impl Iterator<Item = EntityKind>,
) -> Result<Vec<EntityKind>, AnalysisError> {
    let supplied: Vec<EntityKind> = kinds.collect();
    if supplied.iter().any(|k| !k.is_constituent()) {
        return Err(AnalysisError::InvalidInput(
            "a unified pass cannot take a unified input".to_string(),
        ));
    }
    if supplied.len() < 2 {
        return Err(AnalysisError::IncompleteUnifiedInput { supplied });
    }
    Ok(supplied)
}

fn entity_record(kind: EntityKind, value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Record::new();
            map.insert("entity".to_string(), json!(kind));
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Most recent first; missing or null values sort last.
///
/// Timestamps are ISO-8601 strings in practice, which order correctly as text.
/// Numeric values (epoch seconds) are compared numerically.
fn compare_recency(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (Some(a), Some(b)) => compare_values(b, a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_ids(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::ResponseValidator;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn campaigns(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                record(json!({
                    "id": format!("c{i:03}"),
                    "name": format!("Campaign {i}"),
                    "send_time": format!("2024-01-{:02}T09:00:00Z", (i % 28) + 1),
                }))
            })
            .collect()
    }

    #[test]
    fn empty_records_fail() {
        let err = SnapshotBuilder::default()
            .build(EntityKind::Flow, Vec::new(), false)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyInput { kind: EntityKind::Flow }));
    }

    #[test]
    fn unified_kind_cannot_be_built_from_records() {
        let err = SnapshotBuilder::default()
            .build(EntityKind::Unified, campaigns(2), false)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }

    #[test]
    fn no_sampling_keeps_input_order() {
        let snapshot = SnapshotBuilder::new(2)
            .build(EntityKind::Campaign, campaigns(5), false)
            .unwrap();
        assert!(!snapshot.sampled());
        assert_eq!(snapshot.record_count(), 5);
        assert_eq!(snapshot.records()[0]["id"], "c000");
    }

    #[test]
    fn sampling_is_bounded_and_prefers_recent_records() {
        let snapshot = SnapshotBuilder::new(3)
            .build(EntityKind::Campaign, campaigns(10), true)
            .unwrap();
        assert!(snapshot.sampled());
        assert_eq!(snapshot.source_count(), 10);
        assert_eq!(snapshot.record_count(), 3);
        let ids: Vec<_> = snapshot.records().iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("c009"), json!("c008"), json!("c007")]);
    }

    #[test]
    fn sampling_is_reproducible() {
        let builder = SnapshotBuilder::new(4);
        let a = builder.build(EntityKind::Campaign, campaigns(30), true).unwrap();
        let b = builder.build(EntityKind::Campaign, campaigns(30), true).unwrap();
        assert_eq!(a.records(), b.records());
    }

    #[test]
    fn records_without_recency_go_last_and_ties_break_by_id() {
        let records = vec![
            record(json!({"id": "l3"})),
            record(json!({"id": "l2", "updated": "2024-02-01T00:00:00Z"})),
            record(json!({"id": "l1", "updated": "2024-02-01T00:00:00Z"})),
            record(json!({"id": "l0", "updated": null})),
        ];
        let snapshot = SnapshotBuilder::new(3)
            .build(EntityKind::List, records, true)
            .unwrap();
        let ids: Vec<_> = snapshot.records().iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("l1"), json!("l2"), json!("l0")]);
    }

    #[test]
    fn small_inputs_are_not_marked_sampled() {
        let snapshot = SnapshotBuilder::new(50)
            .build(EntityKind::Campaign, campaigns(3), true)
            .unwrap();
        assert!(!snapshot.sampled());
    }

    #[test]
    fn unified_needs_two_constituents() {
        let builder = SnapshotBuilder::default();
        let mut snapshots = BTreeMap::new();
        snapshots.insert(
            EntityKind::Campaign,
            builder.build(EntityKind::Campaign, campaigns(2), false).unwrap(),
        );
        let err = builder.unified(snapshots).unwrap_err();
        match err {
            AnalysisError::IncompleteUnifiedInput { supplied } => {
                assert_eq!(supplied, vec![EntityKind::Campaign]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unified_merges_one_record_per_kind_in_kind_order() {
        let builder = SnapshotBuilder::default();
        let mut snapshots = BTreeMap::new();
        snapshots.insert(
            EntityKind::List,
            builder
                .build(EntityKind::List, vec![record(json!({"id": "l1"}))], false)
                .unwrap(),
        );
        snapshots.insert(
            EntityKind::Campaign,
            builder.build(EntityKind::Campaign, campaigns(2), false).unwrap(),
        );

        let unified = builder.unified(snapshots).unwrap();
        assert_eq!(unified.kind(), EntityKind::Unified);
        assert_eq!(unified.constituents(), &[EntityKind::Campaign, EntityKind::List]);
        assert_eq!(unified.record_count(), 2);
        assert_eq!(unified.records()[0]["entity"], "campaign");
        assert_eq!(unified.records()[0]["record_count"], 2);
        assert_eq!(unified.records()[1]["entity"], "list");
    }

    #[test]
    fn analyses_are_embedded_under_their_kind() {
        let validator = ResponseValidator::new();
        let mut analyses = BTreeMap::new();
        for kind in [EntityKind::Campaign, EntityKind::Flow] {
            let doc = validator
                .validate(r#"{"summary": "ok", "key_metrics": {}}"#, kind)
                .unwrap();
            analyses.insert(kind, doc);
        }
        let unified = SnapshotBuilder::default().from_analyses(analyses).unwrap();
        assert_eq!(unified.records()[1]["entity"], "flow");
        assert_eq!(unified.records()[1]["analysis"]["summary"], "ok");
    }
}
