//! Insight Configuration - provider, analysis, retry and export settings
//!
//! Every field has a serde default matching `config::defaults`, so a partial
//! TOML file (or none at all) resolves to a complete configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults::*;
use crate::llm::{ModelConfig, ProviderId};
use crate::retry::RetryPolicy;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for the analysis core.
///
/// Load with `InsightConfig::load()` which searches:
/// 1. `$INBOX_INSIGHT_CONFIG` env var
/// 2. `./inbox_insight.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightConfig {
    /// Which backend answers prompts, and how
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Snapshot sampling and prompt budget
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Backoff and timeout policy for provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Where bundles are written
    #[serde(default)]
    pub export: ExportConfig,
}

impl InsightConfig {
    /// Load configuration using the standard search order:
    /// 1. `$INBOX_INSIGHT_CONFIG` environment variable
    /// 2. `./inbox_insight.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), provider = %config.provider.id, "Loaded config from {CONFIG_ENV_VAR}");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV_VAR}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(provider = %config.provider.id, "Loaded config from ./{LOCAL_CONFIG_FILE}");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        info!("No {LOCAL_CONFIG_FILE} found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate TOML text. Unknown keys are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: e,
        })?;
        config.validate()?;
        for w in super::validation::suspicious_values(&config) {
            warn!(field = %w.field, "{}", w);
        }
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check every section for values the pipeline cannot run with.
    ///
    /// All problems are collected before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let p = &self.provider;
        if !p.temperature.is_finite() || !(0.0..=2.0).contains(&p.temperature) {
            errors.push(format!(
                "provider.temperature = {} must be within [0, 2]",
                p.temperature
            ));
        }
        if p.max_tokens == 0 {
            errors.push("provider.max_tokens must be > 0".to_string());
        }
        if p.request_timeout_secs == 0 {
            errors.push("provider.request_timeout_secs must be > 0".to_string());
        }
        if matches!(p.model.as_deref(), Some(m) if m.trim().is_empty()) {
            errors.push("provider.model must not be empty when set".to_string());
        }
        if let Some(url) = &p.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(format!(
                    "provider.base_url = '{url}' must start with http:// or https://"
                ));
            }
        }

        let a = &self.analysis;
        if a.sample_size == 0 {
            errors.push("analysis.sample_size must be >= 1".to_string());
        }
        if a.max_snapshot_chars == 0 {
            errors.push("analysis.max_snapshot_chars must be > 0".to_string());
        }

        let r = &self.retry;
        if r.max_attempts == 0 {
            errors.push("retry.max_attempts must be >= 1".to_string());
        }
        if r.base_delay_ms > r.max_delay_ms {
            errors.push(format!(
                "retry.base_delay_ms ({}) must be <= retry.max_delay_ms ({})",
                r.base_delay_ms, r.max_delay_ms
            ));
        }
        if r.timeout_ceiling_secs == 0 {
            errors.push("retry.timeout_ceiling_secs must be > 0".to_string());
        }

        if self.export.dir.as_os_str().is_empty() {
            errors.push("export.dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config parse error ({}): {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Provider
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// `openai`, `anthropic` or `mock`
    pub id: ProviderId,
    /// Model identifier; the provider's default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Alternate endpoint root (proxies, compatible gateways)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: ProviderId::default(),
            model: None,
            base_url: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ProviderConfig {
    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or(self.id.default_model())
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model_id: self.model_id().to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Cap each kind at `sample_size` most recent records
    pub sample: bool,
    pub sample_size: usize,
    pub max_snapshot_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample: false,
            sample_size: DEFAULT_SAMPLE_SIZE,
            max_snapshot_chars: DEFAULT_MAX_SNAPSHOT_CHARS,
        }
    }
}

// ============================================================================
// Retry
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_ceiling_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            timeout_ceiling_secs: DEFAULT_TIMEOUT_CEILING_SECS,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            timeout_ceiling: Duration::from_secs(self.timeout_ceiling_secs),
        }
    }
}

// ============================================================================
// Export
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_EXPORT_DIR),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = InsightConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider.id, ProviderId::Mock);
        assert_eq!(config.provider.model_id(), "mock-model");
        assert_eq!(config.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
[provider]
id = "anthropic"

[retry]
max_attempts = 5
"#;
        let config = InsightConfig::from_toml_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.provider.id, ProviderId::Anthropic);
        assert_eq!(config.provider.model_id(), "claude-3-5-sonnet-latest");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, DEFAULT_BASE_DELAY_MS);
        assert_eq!(config.analysis.sample_size, DEFAULT_SAMPLE_SIZE);
    }

    #[test]
    fn test_explicit_model_wins() {
        let config = InsightConfig::from_toml_str(
            "[provider]\nid = \"openai\"\nmodel = \"gpt-4o-mini\"\ntemperature = 0.0\n",
        )
        .unwrap();
        let model = config.provider.model_config();
        assert_eq!(model.model_id, "gpt-4o-mini");
        assert_eq!(model.temperature, 0.0);
        assert_eq!(model.request_timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let mut config = InsightConfig::default();
        config.retry.max_attempts = 0;
        config.analysis.sample_size = 0;
        config.provider.temperature = 3.5;
        config.retry.base_delay_ms = 10_000;

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("max_attempts")));
        assert!(errors.iter().any(|e| e.contains("sample_size")));
        assert!(errors.iter().any(|e| e.contains("temperature")));
        assert!(errors.iter().any(|e| e.contains("base_delay_ms")));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut config = InsightConfig::default();
        config.provider.base_url = Some("localhost:8080".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_unknown_provider_is_a_parse_error() {
        let result = InsightConfig::from_toml_str("[provider]\nid = \"gemini\"\n");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut original = InsightConfig::default();
        original.provider.base_url = Some("http://localhost:4000".to_string());
        original.analysis.sample = true;
        let toml_str = original.to_toml().expect("serialization should work");
        let roundtripped: InsightConfig = toml::from_str(&toml_str).expect("deserialization should work");
        assert_eq!(original, roundtripped);
    }

    #[test]
    fn test_load_from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox_insight.toml");
        std::fs::write(&path, "[retry\nmax_attempts = 2").unwrap();
        let err = InsightConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("inbox_insight.toml"));

        let missing = InsightConfig::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
