//! Configuration management for the trendcast pipeline
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Every knob the pipeline honors lives here:
//! conflict-resolution policy, cadence, gap-fill method, trend/volatility
//! window sizes, cache TTL, concurrency limits. Nothing is hardcoded in the
//! pipeline stages.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::combine::ConflictPolicy;
use crate::models::GapFill;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Series combination configuration
    pub combine: CombineConfig,

    /// Feature derivation configuration
    pub features: FeatureConfig,

    /// Predictor configuration
    pub predictor: PredictorConfig,

    /// Result cache configuration
    pub cache: CacheConfig,

    /// Pipeline orchestration configuration
    pub pipeline: PipelineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Conflict-resolution configuration for the combiner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    /// Conflict policy: "sum", "priority_list", or "average"
    pub policy: String,

    /// Source priority order, highest first (used by "priority_list")
    pub priority: Vec<String>,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            policy: String::from("sum"),
            priority: Vec::new(),
        }
    }
}

impl CombineConfig {
    /// Resolve the configured policy into its typed form
    pub fn conflict_policy(&self) -> Result<ConflictPolicy> {
        match self.policy.as_str() {
            "sum" => Ok(ConflictPolicy::Sum),
            "average" => Ok(ConflictPolicy::Average),
            "priority_list" => {
                if self.priority.is_empty() {
                    anyhow::bail!("policy \"priority_list\" requires a non-empty priority list");
                }
                Ok(ConflictPolicy::PriorityList(self.priority.clone()))
            }
            other => anyhow::bail!(
                "unknown conflict policy {other:?} (expected sum, priority_list, or average)"
            ),
        }
    }
}

/// Feature derivation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Target cadence between regularized points, in seconds
    pub cadence_secs: i64,

    /// Gap-fill method: "carry_forward" or "linear_interpolation"
    pub gap_fill: String,

    /// Window size (in cadence steps) for the trend linear fit
    pub trend_window: usize,

    /// Trailing window size (in cadence steps) for volatility
    pub volatility_window: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            cadence_secs: 3600,
            gap_fill: String::from("carry_forward"),
            trend_window: 12,
            volatility_window: 12,
        }
    }
}

impl FeatureConfig {
    /// Resolve the configured gap-fill method into its typed form
    pub fn gap_fill_method(&self) -> Result<GapFill> {
        match self.gap_fill.as_str() {
            "carry_forward" => Ok(GapFill::CarryForward),
            "linear_interpolation" => Ok(GapFill::LinearInterpolation),
            other => anyhow::bail!(
                "unknown gap-fill method {other:?} (expected carry_forward or linear_interpolation)"
            ),
        }
    }
}

/// Predictor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Default horizon length in cadence steps
    pub horizon: usize,

    /// Confidence level for the prediction interval (e.g., 0.95)
    pub confidence_level: f64,

    /// Seasonal period in cadence steps (e.g., 24 for daily cycles on an
    /// hourly cadence); 0 disables seasonal adjustment
    pub seasonal_period: usize,

    /// Minimum full seasonal cycles of history before the seasonal term
    /// is applied
    pub seasonal_min_cycles: usize,

    /// Bound half-width multiplier (relative to the last observed value)
    /// used for degenerate low-confidence forecasts
    pub max_uncertainty_multiplier: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            horizon: 24,
            confidence_level: 0.95,
            seasonal_period: 24,
            seasonal_min_cycles: 2,
            max_uncertainty_multiplier: 1.0,
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry TTL in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CacheConfig {
    /// Get TTL as Duration
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Pipeline orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of entity pipelines running in parallel
    pub max_concurrent_entities: usize,

    /// Per-entity deadline in seconds (query + fit); on expiry the entity
    /// surfaces as unavailable instead of blocking the batch
    pub entity_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_entities: 8,
            entity_timeout_secs: 30,
        }
    }
}

impl PipelineConfig {
    /// Get per-entity timeout as Duration
    #[must_use]
    pub fn entity_timeout(&self) -> Duration {
        Duration::from_secs(self.entity_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(policy) = std::env::var("TRENDCAST_CONFLICT_POLICY") {
            config.combine.policy = policy;
        }
        if let Ok(priority) = std::env::var("TRENDCAST_SOURCE_PRIORITY") {
            config.combine.priority = priority
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(cadence) = env_parse::<i64>("TRENDCAST_CADENCE_SECS") {
            config.features.cadence_secs = cadence;
        }
        if let Ok(gap_fill) = std::env::var("TRENDCAST_GAP_FILL") {
            config.features.gap_fill = gap_fill;
        }
        if let Some(window) = env_parse::<usize>("TRENDCAST_TREND_WINDOW") {
            config.features.trend_window = window;
        }
        if let Some(window) = env_parse::<usize>("TRENDCAST_VOLATILITY_WINDOW") {
            config.features.volatility_window = window;
        }

        if let Some(horizon) = env_parse::<usize>("TRENDCAST_HORIZON") {
            config.predictor.horizon = horizon;
        }
        if let Some(level) = env_parse::<f64>("TRENDCAST_CONFIDENCE_LEVEL") {
            config.predictor.confidence_level = level;
        }
        if let Some(period) = env_parse::<usize>("TRENDCAST_SEASONAL_PERIOD") {
            config.predictor.seasonal_period = period;
        }

        if let Some(ttl) = env_parse::<u64>("TRENDCAST_CACHE_TTL") {
            config.cache.ttl_secs = ttl;
        }

        if let Some(max) = env_parse::<usize>("TRENDCAST_MAX_CONCURRENT_ENTITIES") {
            config.pipeline.max_concurrent_entities = max;
        }
        if let Some(timeout) = env_parse::<u64>("TRENDCAST_ENTITY_TIMEOUT") {
            config.pipeline.entity_timeout_secs = timeout;
        }

        if let Ok(level) = std::env::var("TRENDCAST_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("TRENDCAST_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.combine.conflict_policy()?;
        self.features.gap_fill_method()?;

        if self.features.cadence_secs <= 0 {
            anyhow::bail!("cadence_secs must be positive");
        }

        if self.features.trend_window < 2 {
            anyhow::bail!("trend_window must be at least 2");
        }

        if self.features.volatility_window < 2 {
            anyhow::bail!("volatility_window must be at least 2");
        }

        if self.predictor.horizon == 0 {
            anyhow::bail!("horizon must be greater than 0");
        }

        if !(0.0..1.0).contains(&self.predictor.confidence_level)
            || self.predictor.confidence_level <= 0.0
        {
            anyhow::bail!("confidence_level must be in (0, 1)");
        }

        if self.pipeline.max_concurrent_entities == 0 {
            anyhow::bail!("max_concurrent_entities must be greater than 0");
        }

        if self.pipeline.entity_timeout_secs == 0 {
            anyhow::bail!("entity_timeout_secs must be greater than 0");
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("unknown log level {other:?}"),
        }
        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("unknown log format {other:?} (expected text or json)"),
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
