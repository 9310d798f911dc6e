//! Output schemas for analysis documents
//!
//! One [`DocumentSchema`] per [`EntityKind`]. The schema is the single source
//! of truth for both sides of the provider round trip: the prompt composer
//! renders it into the output-format section of the prompt, and the response
//! validator enforces it on whatever text comes back.
//!
//! Shapes are checked strictly (a string where a list is declared is a
//! violation); content is not judged.

mod catalog;

pub use catalog::{CAMPAIGN_SCHEMA, FLOW_SCHEMA, LIST_SCHEMA, UNIFIED_SCHEMA};

use serde_json::{Map, Value};

use crate::types::EntityKind;

/// Declared shape of a document value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Text,
    Number,
    /// Array of items; `item` is an example rendered into the prompt
    List { item: &'static str },
    /// Object with declared members. An empty member list means free-form.
    Record { fields: &'static [FieldSpec] },
}

impl Shape {
    /// JSON type name used in prompts and violation messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Shape::Text => "string",
            Shape::Number => "number",
            Shape::List { .. } => "array",
            Shape::Record { .. } => "object",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Shape::Text, Value::String(_))
                | (Shape::Number, Value::Number(_))
                | (Shape::List { .. }, Value::Array(_))
                | (Shape::Record { .. }, Value::Object(_))
        )
    }

    /// Value filled in when an optional key is missing.
    pub fn default_value(&self) -> Value {
        match self {
            Shape::Text => Value::String(String::new()),
            Shape::Number => Value::from(0),
            Shape::List { .. } => Value::Array(Vec::new()),
            Shape::Record { fields } => Value::Object(
                fields
                    .iter()
                    .map(|f| (f.name.to_string(), f.shape.default_value()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

/// JSON type name of an actual value.
pub const fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A named member of a document or of a nested record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub shape: Shape,
    pub required: bool,
    pub description: &'static str,
}

impl FieldSpec {
    pub const fn text(name: &'static str, description: &'static str) -> Self {
        Self::optional(name, Shape::Text, description)
    }

    pub const fn number(name: &'static str, description: &'static str) -> Self {
        Self::optional(name, Shape::Number, description)
    }

    pub const fn list(name: &'static str, item: &'static str, description: &'static str) -> Self {
        Self::optional(name, Shape::List { item }, description)
    }

    pub const fn record(
        name: &'static str,
        fields: &'static [FieldSpec],
        description: &'static str,
    ) -> Self {
        Self::optional(name, Shape::Record { fields }, description)
    }

    pub const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    const fn optional(name: &'static str, shape: Shape, description: &'static str) -> Self {
        Self {
            name,
            shape,
            required: false,
            description,
        }
    }
}

/// Top-level schema of an analysis document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentSchema {
    pub kind: EntityKind,
    pub fields: &'static [FieldSpec],
}

impl DocumentSchema {
    pub fn for_kind(kind: EntityKind) -> &'static DocumentSchema {
        match kind {
            EntityKind::Campaign => &CAMPAIGN_SCHEMA,
            EntityKind::Flow => &FLOW_SCHEMA,
            EntityKind::List => &LIST_SCHEMA,
            EntityKind::Unified => &UNIFIED_SCHEMA,
        }
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|f| f.name)
    }

    pub fn required_keys(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().filter(|f| f.required).map(|f| f.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn every_kind_requires_a_summary() {
        for kind in [
            EntityKind::Campaign,
            EntityKind::Flow,
            EntityKind::List,
            EntityKind::Unified,
        ] {
            let schema = DocumentSchema::for_kind(kind);
            assert_eq!(schema.kind, kind);
            assert!(schema.required_keys().any(|k| k == "summary"), "{kind}");
        }
    }

    #[test]
    fn keys_are_unique_per_schema() {
        for schema in [&CAMPAIGN_SCHEMA, &FLOW_SCHEMA, &LIST_SCHEMA, &UNIFIED_SCHEMA] {
            let unique: HashSet<_> = schema.keys().collect();
            assert_eq!(unique.len(), schema.fields.len(), "{}", schema.kind);
        }
    }

    #[test]
    fn record_default_contains_declared_members() {
        let field = CAMPAIGN_SCHEMA.field("key_metrics").unwrap();
        let default = field.shape.default_value();
        assert_eq!(default["campaign_count"], json!(0));
        assert_eq!(default["avg_open_rate"], json!(0));
    }

    #[test]
    fn campaign_schema_covers_the_documented_sections() {
        let keys: Vec<_> = CAMPAIGN_SCHEMA.keys().collect();
        for expected in [
            "summary",
            "key_metrics",
            "top_performing",
            "underperforming",
            "trends",
            "subject_line_insights",
            "timing_insights",
            "recommendations",
            "experiments",
            "tag_recommendations",
        ] {
            assert!(keys.contains(&expected), "missing {expected}");
        }
    }
}
