//! Configuration Module
//!
//! Provider, analysis, retry and export settings loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `INBOX_INSIGHT_CONFIG` environment variable (path to TOML file)
//! 2. `inbox_insight.toml` in the current working directory
//! 3. Built-in defaults (`config::defaults`)
//!
//! The binary's `--config` flag bypasses the search. There is no global
//! instance: the loaded value is handed to whatever needs it.
//!
//! ```ignore
//! let config = InsightConfig::load();
//! let pipeline = AnalysisPipeline::new(provider, AnalysisSettings::from_config(&config));
//! ```

mod insight_config;
pub mod defaults;
pub mod validation;

pub use insight_config::*;
