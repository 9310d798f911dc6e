//! inbox-insight - AI analysis of email marketing accounts
//!
//! Analyzes campaign, flow and list exports with an LLM provider and
//! correlates the results into one account-level strategy.
//!
//! # Usage
//!
//! ```bash
//! # Analyze one kind with the offline mock provider
//! inbox-insight analyze --kind campaign --input campaigns.json
//!
//! # Export now, analyze later (possibly elsewhere)
//! inbox-insight export --kind flow --input flows.json --sample
//! inbox-insight --provider anthropic analyze-exported exports/flow_snapshot_20240301_101500.json
//!
//! # Per-kind passes plus the unified pass
//! inbox-insight --provider openai unified --campaigns c.json --flows f.json --lists l.json
//! ```
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`: provider credentials (`.env` is read)
//! - `INBOX_INSIGHT_CONFIG`: path to a TOML config file
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use inbox_insight::codec::{self, BundlePayload, ExportedBundle};
use inbox_insight::llm::{ApiKey, ProviderFactory, ProviderId};
use inbox_insight::tags::TagAudit;
use inbox_insight::{AnalysisPipeline, AnalysisSettings, CallContext, EntityKind, InsightConfig, Record, Snapshot};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "inbox-insight")]
#[command(about = "AI analysis of campaigns, flows and subscriber lists")]
#[command(version)]
struct CliArgs {
    /// TOML config file (skips the INBOX_INSIGHT_CONFIG / ./inbox_insight.toml search)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Provider override: openai, anthropic or mock
    #[arg(long, global = true)]
    provider: Option<ProviderId>,

    /// Model override (defaults to the provider's default model)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Abandon provider calls still running after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    deadline_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one entity kind from a JSON export
    Analyze {
        #[arg(long)]
        kind: EntityKind,
        /// JSON array of records (or an object with a `data` array)
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        /// Keep only the most recent records
        #[arg(long)]
        sample: bool,
        /// Write the document here instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Write a snapshot bundle for later analysis
    Export {
        #[arg(long)]
        kind: EntityKind,
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        #[arg(long)]
        sample: bool,
        /// Output directory (default: export.dir from config)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Analyze a previously exported snapshot bundle
    AnalyzeExported {
        bundle: PathBuf,
        /// Also write the analysis as a bundle into the export directory
        #[arg(long)]
        save: bool,
    },

    /// Decode a bundle and print it
    Show { bundle: PathBuf },

    /// Analyze every supplied kind, then correlate them
    Unified {
        #[command(flatten)]
        inputs: KindInputs,
        #[arg(long)]
        sample: bool,
    },

    /// Tag usage and naming audit, no provider involved
    Tags {
        #[command(flatten)]
        inputs: KindInputs,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
struct KindInputs {
    #[arg(long, value_name = "FILE")]
    campaigns: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    flows: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    lists: Option<PathBuf>,
}

impl KindInputs {
    fn paths(&self) -> impl Iterator<Item = (EntityKind, &Path)> {
        [
            (EntityKind::Campaign, self.campaigns.as_deref()),
            (EntityKind::Flow, self.flows.as_deref()),
            (EntityKind::List, self.lists.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, path)| path.map(|p| (kind, p)))
    }
}

// ============================================================================
// Setup
// ============================================================================

fn init_tracing(json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Config file, then CLI overrides on top.
fn effective_config(args: &CliArgs) -> Result<InsightConfig> {
    let mut config = match &args.config {
        Some(path) => InsightConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => InsightConfig::load(),
    };

    if let Some(provider) = args.provider {
        if provider != config.provider.id {
            // A model chosen for another provider would not exist here
            config.provider.model = None;
        }
        config.provider.id = provider;
    }
    if let Some(model) = &args.model {
        config.provider.model = Some(model.clone());
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_pipeline(config: &InsightConfig) -> Result<AnalysisPipeline> {
    let id = config.provider.id;
    let api_key = id
        .api_key_env()
        .and_then(|var| std::env::var(var).ok())
        .filter(|key| !key.trim().is_empty())
        .map(ApiKey::new);

    let provider = ProviderFactory::create(&config.provider, api_key)
        .with_context(|| format!("Failed to set up the {id} provider"))?;
    Ok(AnalysisPipeline::new(provider, AnalysisSettings::from_config(config)))
}

/// Call context with the optional deadline and a Ctrl+C cancellation token.
fn call_context(deadline_secs: Option<u64>) -> CallContext {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("Received Ctrl+C, cancelling in-flight calls");
        shutdown.cancel();
    });

    deadline_secs
        .map_or_else(CallContext::new, |secs| CallContext::with_timeout(Duration::from_secs(secs)))
        .with_cancel(cancel)
}

// ============================================================================
// Input / Output
// ============================================================================

/// Records from a JSON export: a bare array, or an API page with `data`.
fn read_records(path: &Path) -> Result<Vec<Record>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut page) => match page.remove("data") {
            Some(Value::Array(items)) => items,
            _ => bail!("{} is an object without a `data` array", path.display()),
        },
        _ => bail!("{} must hold a JSON array of records", path.display()),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            other => bail!("{}: element {i} is not an object ({other})", path.display()),
        })
        .collect()
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

async fn run_analyze(
    config: &InsightConfig,
    ctx: &CallContext,
    kind: EntityKind,
    input: &Path,
    sample: bool,
    output: Option<&Path>,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let records = read_records(input)?;
    let report = pipeline
        .analyze_records(kind, records, sample || config.analysis.sample, ctx)
        .await
        .with_context(|| format!("{kind} analysis failed"))?;

    match output {
        Some(path) => {
            let text = serde_json::to_string_pretty(report.document.content())?;
            std::fs::write(path, text + "\n").with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Analysis written");
        }
        None => print_json(report.document.content())?,
    }
    Ok(())
}

fn run_export(config: &InsightConfig, kind: EntityKind, input: &Path, sample: bool, dir: Option<&Path>) -> Result<()> {
    let settings = AnalysisSettings::from_config(config);
    let snapshot = settings
        .builder
        .build(kind, read_records(input)?, sample || config.analysis.sample)?;
    let dir = dir.unwrap_or(config.export.dir.as_path());
    let path = codec::write_bundle(dir, &ExportedBundle::snapshot(snapshot))?;
    println!("{}", path.display());
    Ok(())
}

async fn run_analyze_exported(config: &InsightConfig, ctx: &CallContext, bundle: &Path, save: bool) -> Result<()> {
    let bundle = codec::read_bundle(bundle)?;
    let BundlePayload::Snapshot(snapshot) = bundle.payload else {
        bail!("{} already holds an analysis; use `show` to print it", bundle.kind);
    };

    info!(
        kind = %snapshot.kind(),
        records = snapshot.record_count(),
        exported_at = %bundle.created_at,
        "Analyzing exported snapshot"
    );
    let pipeline = build_pipeline(config)?;
    let report = pipeline
        .analyze(&snapshot, ctx)
        .await
        .with_context(|| format!("{} analysis failed", snapshot.kind()))?;

    if save {
        let path = codec::write_bundle(&config.export.dir, &ExportedBundle::analysis(report.document.clone()))?;
        info!(path = %path.display(), "Analysis bundle written");
    }
    print_json(report.document.content())
}

fn run_show(bundle: &Path) -> Result<()> {
    let bundle = codec::read_bundle(bundle)?;
    info!(
        kind = %bundle.kind,
        payload = bundle.payload.type_name(),
        schema_version = bundle.schema_version,
        created_at = %bundle.created_at,
        "Decoded bundle"
    );
    print_json(&bundle)
}

fn read_snapshots(config: &InsightConfig, inputs: &KindInputs, sample: bool) -> Result<BTreeMap<EntityKind, Snapshot>> {
    let settings = AnalysisSettings::from_config(config);
    inputs
        .paths()
        .map(|(kind, path)| {
            let snapshot = settings.builder.build(kind, read_records(path)?, sample)?;
            Ok::<_, anyhow::Error>((kind, snapshot))
        })
        .collect()
}

async fn run_unified(config: &InsightConfig, ctx: &CallContext, inputs: &KindInputs, sample: bool) -> Result<()> {
    let snapshots = read_snapshots(config, inputs, sample || config.analysis.sample)?;
    if snapshots.len() < 2 {
        bail!("unified analysis needs at least two of --campaigns, --flows, --lists");
    }

    let pipeline = build_pipeline(config)?;
    let account = pipeline.analyze_account(snapshots, ctx).await;

    let mut output = serde_json::Map::new();
    for (kind, result) in &account.per_kind {
        match result {
            Ok(report) => {
                output.insert(kind.to_string(), Value::Object(report.document.content().clone()));
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Constituent analysis failed");
                output.insert(kind.to_string(), json!({"error": e.to_string()}));
            }
        }
    }

    let unified = account
        .unified
        .context("unified pass skipped: fewer than two kinds were analyzed")?
        .context("unified analysis failed")?;
    output.insert(
        EntityKind::Unified.to_string(),
        Value::Object(unified.document().content().clone()),
    );
    print_json(&output)
}

fn run_tags(config: &InsightConfig, inputs: &KindInputs) -> Result<()> {
    let snapshots = read_snapshots(config, inputs, false)?;
    if snapshots.is_empty() {
        bail!("supply at least one of --campaigns, --flows, --lists");
    }
    let audit = TagAudit::from_snapshots(&snapshots.values().collect::<Vec<_>>());
    print_json(&json!({
        "audit": audit,
        "recommendations": audit.recommendations(),
    }))
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    init_tracing(args.json_logs);

    let config = effective_config(&args)?;
    info!(
        provider = %config.provider.id,
        model = %config.provider.model_id(),
        "inbox-insight starting"
    );

    match &args.command {
        Command::Analyze {
            kind,
            input,
            sample,
            output,
        } => {
            let ctx = call_context(args.deadline_secs);
            run_analyze(&config, &ctx, *kind, input, *sample, output.as_deref()).await
        }
        Command::Export {
            kind,
            input,
            sample,
            dir,
        } => run_export(&config, *kind, input, *sample, dir.as_deref()),
        Command::AnalyzeExported { bundle, save } => {
            let ctx = call_context(args.deadline_secs);
            run_analyze_exported(&config, &ctx, bundle, *save).await
        }
        Command::Show { bundle } => run_show(bundle),
        Command::Unified { inputs, sample } => {
            let ctx = call_context(args.deadline_secs);
            run_unified(&config, &ctx, inputs, *sample).await
        }
        Command::Tags { inputs } => run_tags(&config, inputs),
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
