//! Error taxonomy for the analysis core
//!
//! Every variant carries enough context (kind, attempt count, offending key or
//! text) to act on without re-running in verbose mode.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::EntityKind;

/// Maximum characters of raw provider text kept inside an error value.
pub const RAW_EXCERPT_CHARS: usize = 400;

/// Broad error classes, used by callers to decide what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller-fixable, never retried
    Input,
    /// Transient provider trouble that outlived the retry budget
    TransientProvider,
    /// Provider refused the request outright
    FatalProvider,
    /// Provider answered but the text is not a usable document
    ResponseShape,
    /// Deadline or cancellation
    Interrupted,
    Codec,
    Io,
}

/// What was wrong with a key during schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    MissingKey,
    WrongShape {
        expected: &'static str,
        found: &'static str,
    },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::MissingKey => write!(f, "required key is missing"),
            Violation::WrongShape { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
        }
    }
}

/// Errors surfaced by the analysis core.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // --- input errors ---
    #[error("no {kind} records supplied")]
    EmptyInput { kind: EntityKind },

    #[error("unified analysis needs at least two constituent kinds, got {}", format_kinds(.supplied))]
    IncompleteUnifiedInput { supplied: Vec<EntityKind> },

    #[error("serialized {kind} snapshot is {size} chars, over the {budget} char budget (enable sampling)")]
    SnapshotTooLarge {
        kind: EntityKind,
        size: usize,
        budget: usize,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // --- provider errors ---
    #[error("{provider} rejected the credentials: {message}")]
    Authentication { provider: String, message: String },

    #[error("{provider} rejected the request (HTTP {status}): {message}")]
    ProviderRejected {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{kind} analysis gave up after {attempts} attempt(s) in {elapsed_ms} ms: {last_error}")]
    RetryBudgetExhausted {
        kind: EntityKind,
        attempts: u32,
        elapsed_ms: u128,
        last_error: String,
    },

    #[error("{kind} analysis passed its deadline after {attempts} attempt(s)")]
    DeadlineExceeded { kind: EntityKind, attempts: u32 },

    #[error("{kind} analysis was cancelled after {attempts} attempt(s)")]
    Cancelled { kind: EntityKind, attempts: u32 },

    // --- response-shape errors ---
    #[error("{kind} response is not parseable JSON even after repair: {raw_excerpt:?}")]
    UnparsableResponse { kind: EntityKind, raw_excerpt: String },

    #[error("{kind} response violates schema at '{key}': {violation}")]
    SchemaViolation {
        kind: EntityKind,
        key: String,
        violation: Violation,
    },

    // --- codec errors ---
    #[error("bundle schema version {found} is newer than supported version {supported}")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    #[error("corrupt bundle: {reason}")]
    CorruptBundle { reason: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AnalysisError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::EmptyInput { .. }
            | Self::IncompleteUnifiedInput { .. }
            | Self::SnapshotTooLarge { .. }
            | Self::InvalidInput(_) => ErrorClass::Input,
            Self::RetryBudgetExhausted { .. } => ErrorClass::TransientProvider,
            Self::Authentication { .. } | Self::ProviderRejected { .. } => {
                ErrorClass::FatalProvider
            }
            Self::DeadlineExceeded { .. } | Self::Cancelled { .. } => ErrorClass::Interrupted,
            Self::UnparsableResponse { .. } | Self::SchemaViolation { .. } => {
                ErrorClass::ResponseShape
            }
            Self::UnsupportedSchemaVersion { .. } | Self::CorruptBundle { .. } => {
                ErrorClass::Codec
            }
            Self::Io { .. } => ErrorClass::Io,
        }
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptBundle {
            reason: reason.into(),
        }
    }
}

/// Cut raw provider text down to [`RAW_EXCERPT_CHARS`] on a char boundary.
pub(crate) fn excerpt(raw: &str) -> String {
    match raw.char_indices().nth(RAW_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw.to_string(),
    }
}

fn format_kinds(kinds: &[EntityKind]) -> String {
    if kinds.is_empty() {
        return "none".to_string();
    }
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
