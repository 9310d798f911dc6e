//! Unified Correlator
//!
//! Cross-entity pass over two or more per-kind results. The constituents are
//! merged into a `unified` snapshot and run through the ordinary
//! [`AnalysisPipeline`], so the unified document goes through the same
//! composer, retry controller and validator as every other kind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::error::AnalysisError;
use crate::pipeline::{AnalysisPipeline, AnalysisReport};
use crate::retry::CallContext;
use crate::tags::TagAudit;
use crate::types::{AnalysisDocument, EntityKind, Snapshot};

/// Result of the unified pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAnalysis {
    /// Kinds the pass was built from, in kind order
    pub constituents: Vec<EntityKind>,
    pub report: AnalysisReport,
}

impl UnifiedAnalysis {
    pub fn document(&self) -> &AnalysisDocument {
        &self.report.document
    }
}

#[derive(Clone)]
pub struct UnifiedCorrelator {
    pipeline: AnalysisPipeline,
}

impl UnifiedCorrelator {
    pub fn new(pipeline: AnalysisPipeline) -> Self {
        Self { pipeline }
    }

    /// Correlate validated per-kind analyses.
    pub async fn correlate(
        &self,
        analyses: BTreeMap<EntityKind, AnalysisDocument>,
        ctx: &CallContext,
    ) -> Result<UnifiedAnalysis, AnalysisError> {
        self.correlate_with_context(analyses, &BTreeMap::new(), ctx).await
    }

    /// Correlate analyses with extra notes (tag audit, account facts).
    pub async fn correlate_with_context(
        &self,
        analyses: BTreeMap<EntityKind, AnalysisDocument>,
        context: &BTreeMap<String, String>,
        ctx: &CallContext,
    ) -> Result<UnifiedAnalysis, AnalysisError> {
        let snapshot = self.pipeline.settings().builder.from_analyses(analyses)?;
        self.run(snapshot, context, ctx).await
    }

    /// Correlate raw per-kind snapshots in one pass, skipping per-kind analyses.
    ///
    /// The tag audit of the snapshots is added to the prompt.
    pub async fn correlate_snapshots(
        &self,
        snapshots: BTreeMap<EntityKind, Snapshot>,
        ctx: &CallContext,
    ) -> Result<UnifiedAnalysis, AnalysisError> {
        let notes = TagAudit::from_snapshots(&snapshots.values().collect::<Vec<_>>()).context_notes();
        let snapshot = self.pipeline.settings().builder.unified(snapshots)?;
        self.run(snapshot, &notes, ctx).await
    }

    async fn run(
        &self,
        snapshot: Snapshot,
        context: &BTreeMap<String, String>,
        ctx: &CallContext,
    ) -> Result<UnifiedAnalysis, AnalysisError> {
        let constituents = snapshot.constituents().to_vec();
        info!(constituents = ?constituents, "Starting unified pass");

        let report = self.pipeline.analyze_with_context(&snapshot, context, ctx).await?;
        Ok(UnifiedAnalysis {
            constituents,
            report,
        })
    }
}
