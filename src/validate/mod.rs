//! Response Validator
//!
//! Turns free provider text into an [`AnalysisDocument`].
//!
//! ## Steps
//!
//! 1. Strict JSON parse of the trimmed text
//! 2. One bounded repair pass: strip `<think>` blocks and markdown fences,
//!    then take the largest balanced `{...}` fragment that parses
//! 3. Schema check against [`DocumentSchema::for_kind`]: required keys present,
//!    shapes match, declared record members checked recursively
//! 4. Missing or `null` optional keys get their declared default; undeclared
//!    top-level keys are dropped
//!
//! Reject-only: a document either passes every step or the caller gets an
//! error naming the first offending key.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{excerpt, AnalysisError, Violation};
use crate::schema::{value_type_name, DocumentSchema, FieldSpec, Shape};
use crate::types::{AnalysisDocument, EntityKind};

/// Longest text the repair pass will scan.
pub const MAX_REPAIR_CHARS: usize = 512 * 1024;

/// Bytes of brace scanning allowed per byte of input, restarts included.
const REPAIR_WORK_FACTOR: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct ResponseValidator {
    max_repair_chars: usize,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseValidator {
    pub const fn new() -> Self {
        Self {
            max_repair_chars: MAX_REPAIR_CHARS,
        }
    }

    pub const fn with_repair_limit(max_repair_chars: usize) -> Self {
        Self { max_repair_chars }
    }

    /// Parse, repair if needed, and schema-check raw provider text.
    pub fn validate(&self, raw: &str, kind: EntityKind) -> Result<AnalysisDocument, AnalysisError> {
        let value = match parse_object(raw) {
            Some(value) => value,
            None => {
                let repaired = self.repair(raw).ok_or_else(|| AnalysisError::UnparsableResponse {
                    kind,
                    raw_excerpt: excerpt(raw),
                })?;
                warn!(
                    kind = %kind,
                    raw_len = raw.len(),
                    "Provider response was not strict JSON, recovered embedded object"
                );
                repaired
            }
        };

        self.validate_value(value, kind)
    }

    /// Schema-check an already parsed value and fill defaults.
    pub fn validate_value(&self, value: Value, kind: EntityKind) -> Result<AnalysisDocument, AnalysisError> {
        let mut object = match value {
            Value::Object(map) => map,
            other => {
                return Err(AnalysisError::SchemaViolation {
                    kind,
                    key: "$".to_string(),
                    violation: Violation::WrongShape {
                        expected: "object",
                        found: value_type_name(&other),
                    },
                })
            }
        };

        let schema = DocumentSchema::for_kind(kind);
        let mut content = Map::new();
        for field in schema.fields {
            let checked = check_field(kind, field, object.remove(field.name), "")?;
            content.insert(field.name.to_string(), checked);
        }

        for key in object.keys() {
            debug!(kind = %kind, key = %key, "Dropping undeclared top-level key");
        }

        Ok(AnalysisDocument::new(kind, content))
    }

    /// Single bounded repair pass. `None` when nothing usable is found.
    fn repair(&self, raw: &str) -> Option<Value> {
        if raw.len() > self.max_repair_chars {
            debug!(
                raw_len = raw.len(),
                limit = self.max_repair_chars,
                "Response too long for repair"
            );
            return None;
        }

        let cleaned = strip_code_fences(&strip_think_tags(raw));
        if let Some(value) = parse_object(&cleaned) {
            return Some(value);
        }

        extract_object(&cleaned)
    }
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn check_field(
    kind: EntityKind,
    field: &FieldSpec,
    value: Option<Value>,
    prefix: &str,
) -> Result<Value, AnalysisError> {
    let key = if prefix.is_empty() {
        field.name.to_string()
    } else {
        format!("{prefix}.{}", field.name)
    };

    match value {
        None | Some(Value::Null) if !field.required => Ok(field.shape.default_value()),
        None => Err(AnalysisError::SchemaViolation {
            kind,
            key,
            violation: Violation::MissingKey,
        }),
        Some(value) if !field.shape.matches(&value) => Err(AnalysisError::SchemaViolation {
            kind,
            key,
            violation: Violation::WrongShape {
                expected: field.shape.type_name(),
                found: value_type_name(&value),
            },
        }),
        Some(Value::Object(mut nested)) => {
            if let Shape::Record { fields } = field.shape {
                for member in fields {
                    let checked = check_field(kind, member, nested.remove(member.name), &key)?;
                    nested.insert(member.name.to_string(), checked);
                }
            }
            Ok(Value::Object(nested))
        }
        Some(value) => Ok(value),
    }
}

// ============================================================================
// Repair helpers
// ============================================================================

/// Remove reasoning blocks some models emit before the answer.
///
/// Complete `<think>...</think>` blocks are cut out. An unclosed `<think>`
/// only loses its tag so a JSON object after it can still be found.
fn strip_think_tags(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let text = text.trim();
    // ASCII lowercasing keeps byte offsets aligned with `text`
    let lower = text.to_ascii_lowercase();
    let last_close = lower.rfind(CLOSE);
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    while let Some(rel) = lower[pos..].find(OPEN) {
        let start = pos + rel;
        out.push_str(&text[pos..start]);
        let after_open = start + OPEN.len();
        pos = match last_close {
            Some(last) if last >= after_open => lower[after_open..]
                .find(CLOSE)
                .map_or(after_open, |rel_end| after_open + rel_end + CLOSE.len()),
            _ => after_open,
        };
    }
    out.push_str(&text[pos..]);

    // Opening tag swallowed by the chat template
    if let Some(end) = out.to_ascii_lowercase().rfind(CLOSE) {
        out = out[end + CLOSE.len()..].to_string();
    }

    out.trim().to_string()
}

fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Largest balanced `{...}` span that parses as an object.
///
/// A scan starts at an opening brace and runs once to the end of the text.
/// When nothing it finds parses, the next brace is tried as a start, since a
/// stray quote in prose can flip string tracking for the rest of a scan.
/// Restarts stop once the scans have covered `REPAIR_WORK_FACTOR` times the
/// text length.
fn extract_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let budget = bytes.len().saturating_mul(REPAIR_WORK_FACTOR);
    let mut spent = 0usize;

    for start in brace_positions(bytes) {
        // one pass over the tail plus parsing disjoint spans of it
        spent = spent.saturating_add(2 * (bytes.len() - start));
        if spent > budget {
            debug!(len = bytes.len(), start, "Repair scan budget spent");
            return None;
        }

        let mut spans = balanced_spans(bytes, start);
        // Largest first; stable sort keeps the earliest of equal-length spans
        spans.sort_by(|a, b| (b.1 - b.0).cmp(&(a.1 - a.0)));
        if let Some(value) = spans.into_iter().find_map(|(s, e)| parse_object(&text[s..=e])) {
            return Some(value);
        }
    }

    None
}

fn brace_positions(bytes: &[u8]) -> impl Iterator<Item = usize> + '_ {
    bytes
        .iter()
        .enumerate()
        .filter_map(|(i, &b)| (b == b'{').then_some(i))
}

/// Outermost balanced `{...}` spans from `start` on, as inclusive byte ranges.
///
/// Single pass with a stack of open positions. Quotes only open strings
/// inside a brace, so prose between objects cannot flip the string state.
/// Unclosed braces are left on the stack and never rescanned.
fn balanced_spans(bytes: &[u8], start: usize) -> Vec<(usize, usize)> {
    let mut open: Vec<usize> = Vec::new();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(start + offset),
            b'}' => {
                if let Some(opened) = open.pop() {
                    // spans closed earlier inside this one are no longer outermost
                    while spans.last().is_some_and(|&(inner, _)| inner > opened) {
                        spans.pop();
                    }
                    spans.push((opened, start + offset));
                }
            }
            _ => {}
        }
    }

    spans
}
