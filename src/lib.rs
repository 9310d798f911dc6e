//! Inbox Insight: AI analysis orchestration for email marketing accounts
//!
//! Turns raw campaign, flow and list records into validated analysis
//! documents, and correlates several of those into one account strategy.
//!
//! ## Architecture
//!
//! - **Snapshot Builder**: bounded, optionally sampled input per entity kind
//! - **Prompt Composer**: per-kind brief + schema + data, rendered deterministically
//! - **Provider Gateway**: OpenAI, Anthropic and a mock behind one trait
//! - **Retry Controller**: backoff with jitter, deadline and cancellation aware
//! - **Response Validator**: repair of chatty output, schema enforcement
//! - **Codec**: versioned bundles for export now, analyze later
//! - **Unified Correlator**: the same pipeline applied to per-kind analyses
//! - **Tag Audit**: deterministic tag statistics fed to the unified pass

pub mod codec;
pub mod config;
pub mod correlate;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod schema;
pub mod snapshot;
pub mod tags;
pub mod types;
pub mod validate;

// Re-export configuration
pub use config::InsightConfig;

// Re-export commonly used types
pub use error::{AnalysisError, ErrorClass};
pub use types::{AnalysisDocument, EntityKind, ProviderCall, Record, Snapshot};

// Re-export pipeline components
pub use correlate::{UnifiedAnalysis, UnifiedCorrelator};
pub use llm::{ApiKey, LlmProvider, ProviderFactory, ProviderId};
pub use pipeline::{AccountAnalysis, AnalysisPipeline, AnalysisReport, AnalysisSettings};
pub use retry::{CallContext, RetryPolicy};

// Re-export codec
pub use codec::{BundlePayload, ExportedBundle};
