//! Config Validation Tests
//!
//! Typo detection on raw TOML and value checks on the parsed config,
//! exercised through the public config API only.

use inbox_insight::config::validation::{
    known_config_keys, suggest_correction, suspicious_values, validate_unknown_keys,
};
use inbox_insight::config::{ConfigError, InsightConfig};
use inbox_insight::llm::ProviderId;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_retry_section_warns_with_suggestion() {
    let toml_str = r#"
[retry]
base_dealy_ms = 250
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("base_dealy_ms"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("retry.base_delay_ms"));
}

#[test]
fn typo_in_provider_section_warns() {
    let toml_str = r#"
[provider]
modle = "gpt-4o"
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].suggestion.as_deref(), Some("provider.model"));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[provider]
id = "anthropic"
model = "claude-3-5-sonnet-latest"
base_url = "https://api.anthropic.com"
temperature = 0.2
max_tokens = 3000
request_timeout_secs = 45

[analysis]
sample = true
sample_size = 25
max_snapshot_chars = 150000

[retry]
max_attempts = 4
base_delay_ms = 250
max_delay_ms = 4000
timeout_ceiling_secs = 90

[export]
dir = "bundles"
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "Expected 0 warnings, got: {warnings:?}");

    let config = InsightConfig::from_toml_str(toml_str).expect("valid config should load");
    assert_eq!(config.provider.id, ProviderId::Anthropic);
    assert_eq!(config.analysis.sample_size, 25);
    assert_eq!(config.export.dir.to_str(), Some("bundles"));
}

#[test]
fn unknown_section_warns() {
    let warnings = validate_unknown_keys("[metrics]\nenabled = true\n");
    assert!(warnings.iter().any(|w| w.field == "metrics"));
    assert!(warnings.iter().any(|w| w.field == "metrics.enabled"));
}

#[test]
fn unknown_keys_do_not_block_loading() {
    let config = InsightConfig::from_toml_str("[retry]\nmax_atempts = 9\nmax_attempts = 2\n")
        .expect("typos only warn");
    assert_eq!(config.retry.max_attempts, 2);
}

#[test]
fn empty_toml_produces_zero_warnings_and_defaults() {
    assert!(validate_unknown_keys("").is_empty());
    assert_eq!(InsightConfig::from_toml_str("").unwrap(), InsightConfig::default());
}

#[test]
fn known_keys_cover_every_section() {
    let known = known_config_keys();
    for section in ["provider", "analysis", "retry", "export"] {
        assert!(known.contains(section), "missing section {section}");
    }
    assert!(known.contains("retry.timeout_ceiling_secs"));
    assert!(known.contains("analysis.max_snapshot_chars"));
}

#[test]
fn suggest_correction_returns_none_for_garbage() {
    let known = known_config_keys();
    assert!(suggest_correction("zzzzzzzzzzzzzzzzzz", &known).is_none());
}

// ============================================================================
// Value Checks
// ============================================================================

#[test]
fn zero_attempts_is_error() {
    let err = InsightConfig::from_toml_str("[retry]\nmax_attempts = 0\n").unwrap_err();
    let ConfigError::Validation(errors) = err else {
        panic!("expected validation error, got {err}");
    };
    assert!(errors.iter().any(|e| e.contains("max_attempts")));
}

#[test]
fn temperature_out_of_range_is_error() {
    let result = InsightConfig::from_toml_str("[provider]\ntemperature = 2.5\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn inverted_delays_are_error() {
    let result = InsightConfig::from_toml_str("[retry]\nbase_delay_ms = 9000\nmax_delay_ms = 1000\n");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn hot_temperature_is_only_a_warning() {
    let config = InsightConfig::from_toml_str("[provider]\ntemperature = 1.5\n").expect("legal value");
    let warnings = suspicious_values(&config);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field, "provider.temperature");
}

#[test]
fn all_defaults_pass_validation() {
    let config = InsightConfig::default();
    assert!(config.validate().is_ok());
    assert!(suspicious_values(&config).is_empty());
}
