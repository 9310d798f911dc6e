//! Snapshot: immutable, bounded view of entity records prepared for prompting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityKind, Record};

/// Immutable snapshot of entity records.
///
/// Built once per analysis request by [`crate::snapshot::SnapshotBuilder`].
/// `record_count` always equals `records.len()`; deserialization rejects
/// payloads that break this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotRepr")]
pub struct Snapshot {
    kind: EntityKind,
    captured_at: DateTime<Utc>,
    record_count: usize,
    sampled: bool,
    /// Number of records supplied before sampling
    source_count: usize,
    /// Kinds merged into a unified snapshot (empty for per-kind snapshots)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    constituents: Vec<EntityKind>,
    records: Vec<Record>,
}

impl Snapshot {
    pub(crate) fn new(
        kind: EntityKind,
        captured_at: DateTime<Utc>,
        records: Vec<Record>,
        sampled: bool,
        source_count: usize,
        constituents: Vec<EntityKind>,
    ) -> Self {
        Self {
            kind,
            captured_at,
            record_count: records.len(),
            sampled,
            source_count,
            constituents,
            records,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn sampled(&self) -> bool {
        self.sampled
    }

    pub fn source_count(&self) -> usize {
        self.source_count
    }

    pub fn constituents(&self) -> &[EntityKind] {
        &self.constituents
    }
}

/// Wire shape of a snapshot, checked before it becomes a [`Snapshot`].
#[derive(Deserialize)]
struct SnapshotRepr {
    kind: EntityKind,
    captured_at: DateTime<Utc>,
    record_count: usize,
    sampled: bool,
    source_count: usize,
    #[serde(default)]
    constituents: Vec<EntityKind>,
    records: Vec<Record>,
}

impl TryFrom<SnapshotRepr> for Snapshot {
    type Error = String;

    fn try_from(repr: SnapshotRepr) -> Result<Self, Self::Error> {
        if repr.record_count != repr.records.len() {
            return Err(format!(
                "record_count {} does not match {} records",
                repr.record_count,
                repr.records.len()
            ));
        }
        if repr.source_count < repr.record_count {
            return Err(format!(
                "source_count {} is smaller than record_count {}",
                repr.source_count, repr.record_count
            ));
        }
        if repr.kind == EntityKind::Unified && repr.constituents.len() < 2 {
            return Err("unified snapshot needs at least two constituents".to_string());
        }
        Ok(Self {
            kind: repr.kind,
            captured_at: repr.captured_at,
            record_count: repr.record_count,
            sampled: repr.sampled,
            source_count: repr.source_count,
            constituents: repr.constituents,
            records: repr.records,
        })
    }
}
