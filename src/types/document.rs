//! AnalysisDocument: validated, schema-conformant output of one analysis pass

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::EntityKind;

/// Validated analysis output.
///
/// Only [`crate::validate::ResponseValidator`] creates these, and
/// deserialization runs the same schema check, so a document in hand always
/// has exactly the declared top-level keys for its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DocumentRepr")]
pub struct AnalysisDocument {
    kind: EntityKind,
    content: Map<String, Value>,
}

/// Output of the unified cross-entity pass.
pub type UnifiedAnalysisDocument = AnalysisDocument;

impl AnalysisDocument {
    pub(crate) fn new(kind: EntityKind, content: Map<String, Value>) -> Self {
        Self { kind, content }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn content(&self) -> &Map<String, Value> {
        &self.content
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    /// Look up a nested value with a dotted path, e.g. `key_metrics.campaign_count`.
    pub fn pointer(&self, dotted: &str) -> Option<&Value> {
        let mut parts = dotted.split('.');
        let first = self.content.get(parts.next()?)?;
        parts.try_fold(first, |value, part| value.get(part))
    }

    pub fn summary(&self) -> &str {
        self.content
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.content.keys().map(String::as_str)
    }

    pub fn into_content(self) -> Map<String, Value> {
        self.content
    }
}

#[derive(Deserialize)]
struct DocumentRepr {
    kind: EntityKind,
    content: Map<String, Value>,
}

impl TryFrom<DocumentRepr> for AnalysisDocument {
    type Error = String;

    fn try_from(repr: DocumentRepr) -> Result<Self, Self::Error> {
        crate::validate::ResponseValidator::new()
            .validate_value(Value::Object(repr.content), repr.kind)
            .map_err(|e| e.to_string())
    }
}
