//! Request-driven pipeline orchestration
//!
//! Each dashboard request names a set of entities and a time window. The
//! pipeline runs one task per entity, bounded by a semaphore, with the
//! stages inside one entity strictly sequential:
//!
//! ```text
//! sources ──▶ normalize ──▶ combine ──▶ features ──▶ predict
//!                                          │
//!                                    ResultCache (single-flight)
//! ```
//!
//! Per-entity failures degrade to an explicit unavailable marker; they
//! never abort the batch. Every entity's work is bounded by a deadline so
//! a slow upstream surfaces as "unavailable" instead of blocking the
//! whole request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::cache::{CacheKey, ResultCache};
use crate::combine::{series_content_hash, DataCombiner};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::features::FeatureBuilder;
use crate::models::{EntityOutcome, MentionRecord, Window};
use crate::normalize::RecordNormalizer;
use crate::predict::Predictor;
use crate::source::RecordSource;

/// Errors produced while running an entity pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Upstream query for entity {entity_id} exceeded {timeout_secs}s deadline")]
    UpstreamTimeout { entity_id: String, timeout_secs: u64 },

    #[error("All sources failed for entity {entity_id}")]
    AllSourcesFailed { entity_id: String },

    #[error("Worker task for entity {entity_id} aborted")]
    TaskAborted { entity_id: String },
}

impl PipelineError {
    /// All pipeline errors degrade a single entity, never the batch
    #[must_use]
    pub fn is_entity_scoped(&self) -> bool {
        true
    }
}

/// One dashboard request
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Entities to compute
    pub entities: Vec<String>,

    /// History window to combine over
    pub window: Window,

    /// Forecast horizon in cadence steps; None uses the configured default
    pub horizon: Option<usize>,
}

/// Run statistics (thread-safe)
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Entities computed successfully
    pub ready_count: AtomicU64,

    /// Entities surfaced as unavailable
    pub unavailable_count: AtomicU64,

    /// Records surviving normalization
    pub records_normalized: AtomicU64,

    /// Malformed records skipped during normalization
    pub records_skipped: AtomicU64,
}

impl PipelineStats {
    /// Create new stats counter
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ready_count: self.ready_count.load(Ordering::Relaxed),
            unavailable_count: self.unavailable_count.load(Ordering::Relaxed),
            records_normalized: self.records_normalized.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of run statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ready_count: u64,
    pub unavailable_count: u64,
    pub records_normalized: u64,
    pub records_skipped: u64,
}

/// Result of a pipeline run: one outcome per requested entity, in request
/// order, plus run statistics
#[derive(Debug)]
pub struct PipelineReport {
    pub outcomes: Vec<EntityOutcome>,
    pub stats: StatsSnapshot,
}

/// Multi-entity mention forecasting pipeline
#[derive(Debug)]
pub struct Pipeline {
    combiner: DataCombiner,
    feature_builder: FeatureBuilder,
    predictor: Predictor,
    default_horizon: usize,
    entity_timeout: Duration,
    max_concurrent: usize,
    cache: Arc<ResultCache>,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    /// Build a pipeline from validated configuration with an injected
    /// cache
    pub fn new(config: &Config, cache: Arc<ResultCache>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::config(e.to_string()))?;

        let policy = config
            .combine
            .conflict_policy()
            .map_err(|e| Error::config(e.to_string()))?;
        let combiner = DataCombiner::new(policy)?;
        let feature_builder = FeatureBuilder::new(
            config.features.cadence_secs,
            config
                .features
                .gap_fill_method()
                .map_err(|e| Error::config(e.to_string()))?,
            config.features.trend_window,
            config.features.volatility_window,
        )?;
        let predictor = Predictor::new(
            config.predictor.confidence_level,
            config.predictor.seasonal_period,
            config.predictor.seasonal_min_cycles,
            config.predictor.max_uncertainty_multiplier,
        )?;

        Ok(Self {
            combiner,
            feature_builder,
            predictor,
            default_horizon: config.predictor.horizon,
            entity_timeout: config.pipeline.entity_timeout(),
            max_concurrent: config.pipeline.max_concurrent_entities,
            cache,
            stats: PipelineStats::new(),
        })
    }

    /// Get current statistics
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run the pipeline for every entity in the request.
    ///
    /// Outcomes come back in request order. The report always covers every
    /// requested entity: computed or explicitly unavailable, never a
    /// silent omission.
    pub async fn run(
        &self,
        request: PipelineRequest,
        sources: &[Arc<dyn RecordSource>],
    ) -> PipelineReport {
        let _run_timer = crate::metrics::start_run_timer();
        let horizon = request.horizon.unwrap_or(self.default_horizon);

        tracing::info!(
            entities = request.entities.len(),
            sources = sources.len(),
            horizon,
            max_concurrent = self.max_concurrent,
            "Starting pipeline run"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(request.entities.len());

        for entity_id in &request.entities {
            let entity_id = entity_id.clone();
            let sources: Vec<_> = sources.to_vec();
            let semaphore = Arc::clone(&semaphore);
            let combiner = self.combiner.clone();
            let feature_builder = self.feature_builder.clone();
            let predictor = self.predictor.clone();
            let cache = Arc::clone(&self.cache);
            let stats = Arc::clone(&self.stats);
            let window = request.window;
            let timeout = self.entity_timeout;

            handles.push(tokio::spawn(async move {
                // A closed semaphore never happens here; treat it like a
                // deadline miss if it ever does
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return unavailable(
                            &stats,
                            &entity_id,
                            &PipelineError::TaskAborted {
                                entity_id: entity_id.clone(),
                            }
                            .to_string(),
                        )
                    }
                };

                let work = run_entity(
                    entity_id.clone(),
                    window,
                    horizon,
                    sources,
                    combiner,
                    feature_builder,
                    predictor,
                    cache,
                    Arc::clone(&stats),
                );

                match tokio::time::timeout(timeout, work).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        let err = PipelineError::UpstreamTimeout {
                            entity_id: entity_id.clone(),
                            timeout_secs: timeout.as_secs(),
                        };
                        tracing::warn!(entity = %entity_id, error = %err, "Entity timed out");
                        unavailable(&stats, &entity_id, &err.to_string())
                    }
                }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (handle, entity_id) in handles.into_iter().zip(&request.entities) {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!(entity = %entity_id, error = %e, "Entity task aborted");
                    let err = PipelineError::TaskAborted {
                        entity_id: entity_id.clone(),
                    };
                    outcomes.push(unavailable(&self.stats, entity_id, &err.to_string()));
                }
            }
        }

        let stats = self.stats.snapshot();
        tracing::info!(
            ready = stats.ready_count,
            unavailable = stats.unavailable_count,
            normalized = stats.records_normalized,
            skipped = stats.records_skipped,
            "Pipeline run completed"
        );

        PipelineReport { outcomes, stats }
    }
}

/// Record an unavailable outcome
fn unavailable(stats: &PipelineStats, entity_id: &str, reason: &str) -> EntityOutcome {
    stats.unavailable_count.fetch_add(1, Ordering::Relaxed);
    crate::metrics::entity_unavailable();
    EntityOutcome::Unavailable {
        entity_id: entity_id.to_string(),
        reason: reason.to_string(),
    }
}

/// Sequential stage run for one entity
#[allow(clippy::too_many_arguments)]
async fn run_entity(
    entity_id: String,
    window: Window,
    horizon: usize,
    sources: Vec<Arc<dyn RecordSource>>,
    combiner: DataCombiner,
    feature_builder: FeatureBuilder,
    predictor: Predictor,
    cache: Arc<ResultCache>,
    stats: Arc<PipelineStats>,
) -> EntityOutcome {
    let records = match fetch_and_normalize(&entity_id, window, &sources, &stats).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(entity = %entity_id, error = %e, "Entity unavailable");
            return unavailable(&stats, &entity_id, &e.to_string());
        }
    };

    // Zero records is insufficient data, not a fault: the combiner yields
    // an empty series and the predictor degrades
    let series = combiner.combine(&entity_id, &records);
    let content_hash = series_content_hash(&series);
    let features = feature_builder.build(&series, Some(window));

    let key = CacheKey::new(entity_id.clone(), window, content_hash);
    let predict_horizon = horizon;
    let result = cache
        .get_or_compute(key, move || async move {
            Ok::<_, std::convert::Infallible>(predictor.predict(&features, predict_horizon))
        })
        .await;

    match result {
        Ok(prediction) => {
            stats.ready_count.fetch_add(1, Ordering::Relaxed);
            crate::metrics::entity_ready();
            EntityOutcome::Ready {
                series,
                prediction: (*prediction).clone(),
            }
        }
        Err(e) => {
            tracing::warn!(entity = %entity_id, error = %e, "Cached computation failed");
            unavailable(&stats, &entity_id, &e.to_string())
        }
    }
}

/// Query every source and normalize the rows it returns.
///
/// Individual source failures are logged and tolerated; the entity only
/// becomes unavailable when every source fails.
async fn fetch_and_normalize(
    entity_id: &str,
    window: Window,
    sources: &[Arc<dyn RecordSource>],
    stats: &PipelineStats,
) -> std::result::Result<Vec<MentionRecord>, PipelineError> {
    let mut records = Vec::new();
    let mut failed = 0usize;

    for source in sources {
        match source.fetch_raw(entity_id, window).await {
            Ok(rows) => {
                let normalizer = RecordNormalizer::new(source.mapping().clone());
                let outcome = normalizer.normalize_batch(&rows);
                stats
                    .records_normalized
                    .fetch_add(outcome.records.len() as u64, Ordering::Relaxed);
                stats
                    .records_skipped
                    .fetch_add(outcome.skipped as u64, Ordering::Relaxed);
                records.extend(outcome.records);
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(
                    entity = %entity_id,
                    source = %source.source_id(),
                    error = %e,
                    "Source query failed"
                );
            }
        }
    }

    if !sources.is_empty() && failed == sources.len() {
        return Err(PipelineError::AllSourcesFailed {
            entity_id: entity_id.to_string(),
        });
    }

    Ok(records)
}
