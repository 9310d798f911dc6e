//! Config validation: unknown-key detection with Levenshtein suggestions
//! and suspicious-value warnings.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::InsightConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `InsightConfig`.
///
/// Must list every field of the section structs in insight_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [provider]
        "provider",
        "provider.id",
        "provider.model",
        "provider.base_url",
        "provider.temperature",
        "provider.max_tokens",
        "provider.request_timeout_secs",
        // [analysis]
        "analysis",
        "analysis.sample",
        "analysis.sample_size",
        "analysis.max_snapshot_chars",
        // [retry]
        "retry",
        "retry.max_attempts",
        "retry.base_delay_ms",
        "retry.max_delay_ms",
        "retry.timeout_ceiling_secs",
        // [export]
        "export",
        "export.dir",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties go to the alphabetically first key so the suggestion is stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys; it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Suspicious Values
// ============================================================================

/// Values that are legal but probably not what the operator meant.
pub fn suspicious_values(config: &InsightConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |field: &str, message: String| {
        warnings.push(ValidationWarning {
            field: field.to_string(),
            message,
            suggestion: None,
        });
    };

    if config.provider.temperature > 1.0 {
        warn(
            "provider.temperature",
            format!(
                "provider.temperature = {} makes answers less repeatable",
                config.provider.temperature
            ),
        );
    }

    if config.retry.timeout_ceiling_secs < config.provider.request_timeout_secs {
        warn(
            "retry.timeout_ceiling_secs",
            format!(
                "retry.timeout_ceiling_secs ({}) is below provider.request_timeout_secs ({}); slow dispatches end at the ceiling",
                config.retry.timeout_ceiling_secs, config.provider.request_timeout_secs
            ),
        );
    }

    if config.analysis.sample && config.analysis.sample_size > 500 {
        warn(
            "analysis.sample_size",
            format!(
                "analysis.sample_size = {} will rarely fit the snapshot budget",
                config.analysis.sample_size
            ),
        );
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("max_atempts", "max_attempts"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [retry]
            max_attempts = 4
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert_eq!(keys, vec!["retry".to_string(), "retry.max_attempts".to_string()]);
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys("[retry]\nmax_atempts = 4\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "retry.max_atempts");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("retry.max_attempts"));
        assert!(warnings[0].to_string().contains("did you mean 'retry.max_attempts'"));
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_defaults_are_not_suspicious() {
        assert!(suspicious_values(&InsightConfig::default()).is_empty());
    }

    #[test]
    fn test_short_ceiling_is_suspicious() {
        let mut config = InsightConfig::default();
        config.retry.timeout_ceiling_secs = 10;
        let warnings = suspicious_values(&config);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "retry.timeout_ceiling_secs");
    }
}
