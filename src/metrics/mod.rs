//! Prometheus metrics for the forecasting pipeline
//!
//! This module tracks:
//! - Normalization: records skipped per source
//! - Cache: hits, misses, in-flight coalescing
//! - Pipeline: entities ready / unavailable, run duration
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all pipeline metrics
struct PipelineMetrics {
    records_skipped: CounterVec,
    cache_hits: Counter,
    cache_misses: Counter,
    entities_ready: Counter,
    entities_unavailable: Counter,
    run_duration: Histogram,
}

/// Global storage for pipeline metrics
static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
///
/// # Returns
///
/// `Ok(())` if all metrics were registered successfully,
/// `Err` with description if any registration failed.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = trendcast::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
///     // Application can continue without metrics
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PipelineMetrics {
        records_skipped: register_counter_vec!(
            "trendcast_records_skipped_total",
            "Total malformed records skipped during normalization",
            &["source"]
        )?,
        cache_hits: register_counter!(
            "trendcast_cache_hits_total",
            "Total prediction cache hits (fresh or coalesced in-flight)"
        )?,
        cache_misses: register_counter!(
            "trendcast_cache_misses_total",
            "Total prediction cache misses"
        )?,
        entities_ready: register_counter!(
            "trendcast_entities_ready_total",
            "Total entities computed successfully"
        )?,
        entities_unavailable: register_counter!(
            "trendcast_entities_unavailable_total",
            "Total entities surfaced as unavailable"
        )?,
        run_duration: register_histogram!(
            "trendcast_run_duration_seconds",
            "Pipeline run duration in seconds",
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        )?,
    };

    PIPELINE_METRICS
        .set(metrics)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    PIPELINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a malformed record skipped during normalization
pub fn record_skipped(source: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.records_skipped.with_label_values(&[source]).inc();
    }
}

/// Record a prediction cache hit
pub fn cache_hit() {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.cache_hits.inc();
    }
}

/// Record a prediction cache miss
pub fn cache_miss() {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.cache_misses.inc();
    }
}

/// Record an entity computed successfully
pub fn entity_ready() {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.entities_ready.inc();
    }
}

/// Record an entity surfaced as unavailable
pub fn entity_unavailable() {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.entities_unavailable.inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a pipeline run timer (returns a timer handle)
pub fn start_run_timer() -> MetricsTimer {
    match PIPELINE_METRICS.get() {
        Some(m) => MetricsTimer::new(m.run_duration.start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
