//! Default constants for every tunable in `InsightConfig`.
//!
//! Grouped by config section so a missing TOML key and an absent config
//! file resolve to the same values.

// ============================================================================
// Provider
// ============================================================================

/// Sampling temperature. Low, so the same snapshot yields stable answers.
pub const DEFAULT_TEMPERATURE: f64 = 0.3;

/// Upper bound on tokens the provider may generate per answer.
pub const DEFAULT_MAX_TOKENS: u32 = 4_000;

/// Timeout for a single HTTP exchange with a provider (seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Analysis
// ============================================================================

/// Records kept per kind when sampling is enabled.
pub const DEFAULT_SAMPLE_SIZE: usize = 50;

/// Budget for the serialized records block of one prompt (characters).
///
/// Roughly 50k tokens, well inside every supported context window.
pub const DEFAULT_MAX_SNAPSHOT_CHARS: usize = 200_000;

// ============================================================================
// Retry
// ============================================================================

/// Dispatch attempts per call, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Backoff after the first failed attempt (milliseconds).
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Cap on a single backoff sleep (milliseconds).
pub const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

/// Total wall time one call may take, backoff included (seconds).
pub const DEFAULT_TIMEOUT_CEILING_SECS: u64 = 120;

// ============================================================================
// Export
// ============================================================================

/// Directory bundles are written to when none is given.
pub const DEFAULT_EXPORT_DIR: &str = "exports";

// ============================================================================
// Loading
// ============================================================================

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "INBOX_INSIGHT_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "inbox_insight.toml";
