//! Analysis Pipeline
//!
//! ## Flow
//!
//! ```text
//! records ─► SnapshotBuilder ─► PromptComposer ─► RetryController(LlmProvider)
//!                                                        │
//!                             AnalysisReport ◄─ ResponseValidator
//! ```
//!
//! One pipeline serves every kind, the unified one included: the unified pass
//! is the same flow applied to a snapshot of per-kind analyses (see
//! [`crate::correlate`]).
//!
//! ## Concurrency
//!
//! [`AnalysisPipeline::analyze_many`] runs one task per kind on a `JoinSet`.
//! Snapshots move into their task and are never shared mutably; the provider
//! sits behind an `Arc` and the settings are immutable after construction.
//! [`AnalysisPipeline::analyze_account`] waits for every per-kind task before
//! the unified pass starts.
//!
//! Response-shape errors are returned as-is. The same prompt would most likely
//! reproduce the same malformed text, so re-dispatching is the caller's call.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::InsightConfig;
use crate::correlate::{UnifiedAnalysis, UnifiedCorrelator};
use crate::error::AnalysisError;
use crate::llm::{LlmProvider, ModelConfig, ProviderId};
use crate::prompt::{Brief, PromptComposer};
use crate::retry::{CallContext, RetryController, RetryPolicy};
use crate::snapshot::SnapshotBuilder;
use crate::tags::TagAudit;
use crate::types::{AnalysisDocument, EntityKind, ProviderCall, Record, Snapshot};
use crate::validate::ResponseValidator;

// ============================================================================
// Settings
// ============================================================================

/// Everything a pipeline needs besides the provider.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub builder: SnapshotBuilder,
    pub composer: PromptComposer,
    pub validator: ResponseValidator,
    pub retry: RetryPolicy,
    pub model: ModelConfig,
    /// Default for [`AnalysisPipeline::snapshot`]
    pub sample: bool,
}

impl AnalysisSettings {
    pub fn from_config(config: &InsightConfig) -> Self {
        Self {
            builder: SnapshotBuilder::new(config.analysis.sample_size),
            composer: PromptComposer::new(config.analysis.max_snapshot_chars),
            validator: ResponseValidator::new(),
            retry: config.retry.policy(),
            model: config.provider.model_config(),
            sample: config.analysis.sample,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self::from_config(&InsightConfig::default())
    }
}

// ============================================================================
// Results
// ============================================================================

/// A validated document together with the call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub document: AnalysisDocument,
    pub call: ProviderCall,
}

impl AnalysisReport {
    pub fn kind(&self) -> EntityKind {
        self.document.kind()
    }
}

/// Outcome of a whole-account run: one result per kind plus the unified pass.
#[derive(Debug)]
pub struct AccountAnalysis {
    pub per_kind: BTreeMap<EntityKind, Result<AnalysisReport, AnalysisError>>,
    /// `None` when fewer than two kinds succeeded
    pub unified: Option<Result<UnifiedAnalysis, AnalysisError>>,
}

impl AccountAnalysis {
    /// Documents of the kinds that succeeded.
    pub fn documents(&self) -> BTreeMap<EntityKind, &AnalysisDocument> {
        self.per_kind
            .iter()
            .filter_map(|(kind, result)| result.as_ref().ok().map(|r| (*kind, &r.document)))
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (EntityKind, &AnalysisError)> {
        self.per_kind
            .iter()
            .filter_map(|(kind, result)| result.as_ref().err().map(|e| (*kind, e)))
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Snapshot in, validated document out. Cheap to clone.
#[derive(Clone)]
pub struct AnalysisPipeline {
    provider: Arc<dyn LlmProvider>,
    settings: Arc<AnalysisSettings>,
}

impl AnalysisPipeline {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: AnalysisSettings) -> Self {
        Self {
            provider,
            settings: Arc::new(settings),
        }
    }

    pub fn provider_id(&self) -> ProviderId {
        self.provider.provider_id()
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Build a snapshot with the configured sampling default.
    pub fn snapshot(&self, kind: EntityKind, records: Vec<Record>) -> Result<Snapshot, AnalysisError> {
        self.settings.builder.build(kind, records, self.settings.sample)
    }

    pub async fn analyze(&self, snapshot: &Snapshot, ctx: &CallContext) -> Result<AnalysisReport, AnalysisError> {
        self.analyze_with_context(snapshot, &BTreeMap::new(), ctx).await
    }

    /// Analyze with extra caller notes added to the prompt.
    pub async fn analyze_with_context(
        &self,
        snapshot: &Snapshot,
        context: &BTreeMap<String, String>,
        ctx: &CallContext,
    ) -> Result<AnalysisReport, AnalysisError> {
        let kind = snapshot.kind();
        let prompt = self
            .settings
            .composer
            .compose_with_context(snapshot, Brief::for_kind(kind), context)?;

        info!(
            kind = %kind,
            provider = %self.provider.provider_id(),
            records = snapshot.record_count(),
            sampled = snapshot.sampled(),
            digest = %prompt.digest(),
            "Starting analysis"
        );

        let retry = RetryController::new(self.settings.retry);
        let call = retry
            .call_with_retry(self.provider.as_ref(), &prompt, &self.settings.model, ctx)
            .await?;

        let document = self
            .settings
            .validator
            .validate(call.raw_text(), kind)
            .inspect_err(|e| warn!(kind = %kind, error = %e, "Provider answer rejected"))?;

        info!(
            kind = %kind,
            attempts = call.attempt_number,
            latency_ms = u64::try_from(call.latency.as_millis()).unwrap_or(u64::MAX),
            tokens = call.usage.total(),
            "Analysis complete"
        );

        Ok(AnalysisReport { document, call })
    }

    /// Build the snapshot and analyze it in one step.
    pub async fn analyze_records(
        &self,
        kind: EntityKind,
        records: Vec<Record>,
        sample: bool,
        ctx: &CallContext,
    ) -> Result<AnalysisReport, AnalysisError> {
        let snapshot = self.settings.builder.build(kind, records, sample)?;
        self.analyze(&snapshot, ctx).await
    }

    /// Analyze several kinds concurrently, one task per snapshot.
    ///
    /// Every kind gets a result; one failing does not stop the others.
    pub async fn analyze_many(
        &self,
        snapshots: BTreeMap<EntityKind, Snapshot>,
        ctx: &CallContext,
    ) -> BTreeMap<EntityKind, Result<AnalysisReport, AnalysisError>> {
        let mut pending: BTreeSet<EntityKind> = snapshots.keys().copied().collect();
        let mut tasks = JoinSet::new();

        for (kind, snapshot) in snapshots {
            let pipeline = self.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move { (kind, pipeline.analyze(&snapshot, &ctx).await) });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((kind, result)) => {
                    pending.remove(&kind);
                    results.insert(kind, result);
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => warn!(error = %e, "Analysis task ended without a result"),
            }
        }

        for kind in pending {
            results.insert(kind, Err(AnalysisError::Cancelled { kind, attempts: 0 }));
        }
        results
    }

    /// Per-kind passes, then the unified pass over whatever succeeded.
    ///
    /// The unified prompt carries the tag audit of the raw snapshots as
    /// additional context.
    pub async fn analyze_account(
        &self,
        snapshots: BTreeMap<EntityKind, Snapshot>,
        ctx: &CallContext,
    ) -> AccountAnalysis {
        let audit = TagAudit::from_snapshots(&snapshots.values().collect::<Vec<_>>());
        let per_kind = self.analyze_many(snapshots, ctx).await;

        let analyses: BTreeMap<EntityKind, AnalysisDocument> = per_kind
            .iter()
            .filter_map(|(kind, result)| result.as_ref().ok().map(|r| (*kind, r.document.clone())))
            .collect();

        let unified = if analyses.len() >= 2 {
            let correlator = UnifiedCorrelator::new(self.clone());
            Some(
                correlator
                    .correlate_with_context(analyses, &audit.context_notes(), ctx)
                    .await,
            )
        } else {
            warn!(
                succeeded = analyses.len(),
                "Skipping unified pass, fewer than two kinds succeeded"
            );
            None
        };

        AccountAnalysis { per_kind, unified }
    }
}
