//! Export / Import Codec
//!
//! Self-describing JSON bundles holding either a snapshot (export now,
//! analyze later) or a finished analysis.
//!
//! ## Format
//!
//! ```json
//! {
//!   "created_at": "2024-05-01T10:00:00Z",
//!   "kind": "campaign",
//!   "payload": {"data": {...}, "type": "snapshot"},
//!   "schema_version": 1
//! }
//! ```
//!
//! Keys are written sorted and pretty-printed, so decoding and re-encoding a
//! bundle reproduces the same bytes. Decoding re-checks every invariant the
//! in-memory types carry: snapshot record counts and analysis schemas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::AnalysisError;
use crate::types::{AnalysisDocument, EntityKind, Snapshot};

/// Highest bundle format this build reads and the one it writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BundlePayload {
    Snapshot(Snapshot),
    Analysis(AnalysisDocument),
}

impl BundlePayload {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Snapshot(s) => s.kind(),
            Self::Analysis(d) => d.kind(),
        }
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Analysis(_) => "analysis",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedBundle {
    pub schema_version: u32,
    pub kind: EntityKind,
    pub payload: BundlePayload,
    pub created_at: DateTime<Utc>,
}

impl ExportedBundle {
    pub fn snapshot(snapshot: Snapshot) -> Self {
        Self::new(BundlePayload::Snapshot(snapshot))
    }

    pub fn analysis(document: AnalysisDocument) -> Self {
        Self::new(BundlePayload::Analysis(document))
    }

    fn new(payload: BundlePayload) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            kind: payload.kind(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Serialize a bundle as pretty JSON with sorted keys.
pub fn encode(bundle: &ExportedBundle) -> Result<Vec<u8>, AnalysisError> {
    let value = serde_json::to_value(bundle)
        .map_err(|e| AnalysisError::corrupt(format!("bundle is not serializable: {e}")))?;
    let mut bytes = serde_json::to_vec_pretty(&value)
        .map_err(|e| AnalysisError::corrupt(format!("bundle is not serializable: {e}")))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Reconstruct a bundle, checking version first and then every invariant.
pub fn decode(bytes: &[u8]) -> Result<ExportedBundle, AnalysisError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| AnalysisError::corrupt(format!("not valid JSON: {e}")))?;

    let version = value
        .get("schema_version")
        .ok_or_else(|| AnalysisError::corrupt("missing schema_version"))?
        .as_u64()
        .ok_or_else(|| AnalysisError::corrupt("schema_version is not a non-negative integer"))?;
    if version == 0 {
        return Err(AnalysisError::corrupt("schema_version 0 is not a valid version"));
    }
    if version > u64::from(CURRENT_SCHEMA_VERSION) {
        return Err(AnalysisError::UnsupportedSchemaVersion {
            found: u32::try_from(version).unwrap_or(u32::MAX),
            supported: CURRENT_SCHEMA_VERSION,
        });
    }

    let bundle: ExportedBundle =
        serde_json::from_value(value).map_err(|e| AnalysisError::corrupt(e.to_string()))?;

    if bundle.kind != bundle.payload.kind() {
        return Err(AnalysisError::corrupt(format!(
            "bundle kind {} does not match {} payload of kind {}",
            bundle.kind,
            bundle.payload.type_name(),
            bundle.payload.kind()
        )));
    }

    debug!(
        kind = %bundle.kind,
        payload = bundle.payload.type_name(),
        version,
        "Decoded bundle"
    );
    Ok(bundle)
}

// ============================================================================
// File helpers
// ============================================================================

/// `{kind}_{snapshot|analysis}_{YYYYMMDD_HHMMSS}.json`
pub fn bundle_file_name(bundle: &ExportedBundle) -> String {
    format!(
        "{}_{}_{}.json",
        bundle.kind,
        bundle.payload.type_name(),
        bundle.created_at.format("%Y%m%d_%H%M%S")
    )
}

/// Write a bundle into `dir`, creating it if needed. Never overwrites: a
/// name already taken gets a numeric suffix.
pub fn write_bundle(dir: &Path, bundle: &ExportedBundle) -> Result<PathBuf, AnalysisError> {
    fs::create_dir_all(dir).map_err(|source| AnalysisError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let bytes = encode(bundle)?;
    let name = bundle_file_name(bundle);
    let stem = name.trim_end_matches(".json");
    let mut path = dir.join(&name);
    let mut n = 1u32;

    // create_new claims the name atomically, so concurrent writers never share one
    let mut file = loop {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => break file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                path = dir.join(format!("{stem}_{n}.json"));
                n += 1;
            }
            Err(source) => return Err(AnalysisError::Io { path, source }),
        }
    };
    file.write_all(&bytes).map_err(|source| AnalysisError::Io {
        path: path.clone(),
        source,
    })?;

    info!(
        path = %path.display(),
        kind = %bundle.kind,
        payload = bundle.payload.type_name(),
        bytes = bytes.len(),
        "Bundle written"
    );
    Ok(path)
}

pub fn read_bundle(path: &Path) -> Result<ExportedBundle, AnalysisError> {
    let bytes = fs::read(path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotBuilder;
    use crate::types::Record;
    use crate::validate::ResponseValidator;
    use serde_json::json;

    fn snapshot() -> Snapshot {
        let records: Vec<Record> = vec![
            json!({"id": "c1", "name": "Spring Sale", "metrics": {"open_rate": 0.25}})
                .as_object()
                .cloned()
                .unwrap(),
            json!({"id": "c2", "name": "Welcome", "tags": ["type:welcome"]})
                .as_object()
                .cloned()
                .unwrap(),
        ];
        SnapshotBuilder::default()
            .build(EntityKind::Campaign, records, false)
            .unwrap()
    }

    fn analysis() -> AnalysisDocument {
        ResponseValidator::new()
            .validate(r#"{"summary": "fine", "key_metrics": {"total_lists": 4}}"#, EntityKind::List)
            .unwrap()
    }

    #[test]
    fn snapshot_bundle_round_trips_byte_for_byte() {
        let bundle = ExportedBundle::snapshot(snapshot());
        let bytes = encode(&bundle).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, bundle);
        assert_eq!(encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn analysis_bundle_round_trips() {
        let bundle = ExportedBundle::analysis(analysis());
        let decoded = decode(&encode(&bundle).unwrap()).unwrap();
        assert_eq!(decoded, bundle);
        assert_eq!(decoded.kind, EntityKind::List);
    }

    #[test]
    fn encoding_is_self_describing() {
        let bytes = encode(&ExportedBundle::analysis(analysis())).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["kind"], "list");
        assert_eq!(value["payload"]["type"], "analysis");
    }

    #[test]
    fn newer_version_is_unsupported() {
        let mut value = serde_json::to_value(ExportedBundle::snapshot(snapshot())).unwrap();
        value["schema_version"] = json!(7);
        let err = decode(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::UnsupportedSchemaVersion {
                found: 7,
                supported: CURRENT_SCHEMA_VERSION
            }
        ));
    }

    #[test]
    fn malformed_bytes_are_corrupt() {
        let inputs: [&[u8]; 4] = [b"not json", b"{}", b"[1, 2]", br#"{"schema_version": 1}"#];
        for bytes in inputs {
            let err = decode(bytes).unwrap_err();
            assert!(matches!(err, AnalysisError::CorruptBundle { .. }), "{err}");
        }
    }

    #[test]
    fn record_count_mismatch_is_corrupt() {
        let mut value = serde_json::to_value(ExportedBundle::snapshot(snapshot())).unwrap();
        value["payload"]["data"]["record_count"] = json!(5);
        let err = decode(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(err.to_string().contains("record_count 5"), "{err}");
    }

    #[test]
    fn analysis_failing_schema_is_corrupt() {
        let mut value = serde_json::to_value(ExportedBundle::analysis(analysis())).unwrap();
        value["payload"]["data"]["content"]
            .as_object_mut()
            .unwrap()
            .remove("summary");
        let err = decode(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, AnalysisError::CorruptBundle { .. }));
        assert!(err.to_string().contains("summary"), "{err}");
    }

    #[test]
    fn kind_mismatch_is_corrupt() {
        let mut value = serde_json::to_value(ExportedBundle::analysis(analysis())).unwrap();
        value["kind"] = json!("flow");
        let err = decode(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(err.to_string().contains("does not match"), "{err}");
    }

    #[test]
    fn file_name_embeds_kind_payload_and_timestamp() {
        let mut bundle = ExportedBundle::snapshot(snapshot());
        bundle.created_at = "2024-05-01T10:11:12Z".parse().unwrap();
        assert_eq!(
            bundle_file_name(&bundle),
            "campaign_snapshot_20240501_101112.json"
        );
    }

    #[test]
    fn write_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("exports");
        let bundle = ExportedBundle::snapshot(snapshot());

        let first = write_bundle(&dir, &bundle).unwrap();
        let second = write_bundle(&dir, &bundle).unwrap();
        assert_ne!(first, second);

        assert_eq!(read_bundle(&first).unwrap(), bundle);
        assert_eq!(read_bundle(&second).unwrap(), bundle);
    }

    #[test]
    fn concurrent_writers_never_share_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let bundle = ExportedBundle::snapshot(snapshot());
        let (dir, shared) = (tmp.path(), &bundle);

        let paths: Vec<PathBuf> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(move || write_bundle(dir, shared).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let distinct: std::collections::BTreeSet<_> = paths.iter().collect();
        assert_eq!(distinct.len(), 8);
        for path in &paths {
            assert_eq!(read_bundle(path).unwrap(), bundle);
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_bundle(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                ..ProptestConfig::default()
            })]

            /// Property: decode(encode(b)) == b and re-encoding is byte-identical.
            #[test]
            fn snapshot_bundles_round_trip(
                names in prop::collection::vec("\\PC{0,16}", 1..8),
                sizes in prop::collection::vec(any::<u32>(), 1..8),
                rate in 0.0f64..1.0,
                sample in any::<bool>(),
            ) {
                let records: Vec<Record> = names
                    .iter()
                    .zip(sizes.iter().cycle())
                    .enumerate()
                    .map(|(i, (name, size))| {
                        json!({"id": format!("l{i}"), "name": name, "profile_count": size, "rate": rate})
                            .as_object()
                            .cloned()
                            .unwrap()
                    })
                    .collect();
                let snapshot = SnapshotBuilder::new(3)
                    .build(EntityKind::List, records, sample)
                    .unwrap();
                let bundle = ExportedBundle::snapshot(snapshot);

                let bytes = encode(&bundle).unwrap();
                let decoded = decode(&bytes).unwrap();
                prop_assert_eq!(&decoded, &bundle);
                prop_assert_eq!(encode(&decoded).unwrap(), bytes);
            }
        }
    }
}
