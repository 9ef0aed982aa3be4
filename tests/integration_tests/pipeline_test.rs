//! End-to-end pipeline integration tests
//!
//! Tests the complete workflow:
//! 1. Source queries
//! 2. Normalization
//! 3. Multi-source combination
//! 4. Feature derivation
//! 5. Forecasting with cached results

use std::sync::Arc;
use std::time::Duration;

use trendcast::cache::ResultCache;
use trendcast::models::EntityOutcome;
use trendcast::pipeline::{Pipeline, PipelineRequest};
use trendcast::source::RecordSource;

use super::fixtures::{as_source, count_source, overlapping_source, test_config, test_window};

// ============================================================================
// Complete Pipeline Tests
// ============================================================================

fn build_pipeline() -> Pipeline {
    let cache = Arc::new(ResultCache::new(Duration::from_secs(300)));
    Pipeline::new(&test_config(), cache).unwrap()
}

#[tokio::test]
async fn test_pipeline_multiple_entities() {
    let pipeline = build_pipeline();
    let sources = vec![as_source(count_source())];

    let request = PipelineRequest {
        entities: vec!["rust".to_string(), "go".to_string()],
        window: test_window(5),
        horizon: None,
    };

    let report = pipeline.run(request, &sources).await;
    assert_eq!(report.outcomes.len(), 2);

    for outcome in &report.outcomes {
        match outcome {
            EntityOutcome::Ready { series, prediction } => {
                assert_eq!(series.len(), 6);
                assert_eq!(prediction.horizon_len(), 4);
                assert!(prediction.is_consistent());
            }
            other => panic!("expected ready outcome, got {other:?}"),
        }
    }
    assert_eq!(report.stats.ready_count, 2);
}

#[tokio::test]
async fn test_rising_series_forecasts_upward() {
    let pipeline = build_pipeline();
    let sources = vec![as_source(count_source())];

    let request = PipelineRequest {
        entities: vec!["rust".to_string()],
        window: test_window(5),
        horizon: Some(2),
    };

    let report = pipeline.run(request, &sources).await;
    match &report.outcomes[0] {
        EntityOutcome::Ready { series, prediction } => {
            // Counts rise 1..=6, so the forecast continues above the last
            // observation
            let last = series.last().unwrap().magnitude;
            assert!(prediction.predicted_magnitude[0] > last - 1e-9);
            assert!(prediction.predicted_magnitude[1] > prediction.predicted_magnitude[0]);
        }
        other => panic!("expected ready outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sum_policy_merges_overlapping_sources() {
    let pipeline = build_pipeline();
    let sources: Vec<Arc<dyn RecordSource>> =
        vec![as_source(count_source()), as_source(overlapping_source())];

    let request = PipelineRequest {
        entities: vec!["rust".to_string()],
        window: test_window(5),
        horizon: None,
    };

    let report = pipeline.run(request, &sources).await;
    match &report.outcomes[0] {
        EntityOutcome::Ready { series, .. } => {
            // Default sum policy: bucket 0 holds 1.0 (bluesky) + 10.0
            // (archive)
            assert!((series.points[0].magnitude - 11.0).abs() < 1e-9);
        }
        other => panic!("expected ready outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn test_priority_policy_prefers_listed_source() {
    let mut config = test_config();
    config.combine.policy = "priority_list".to_string();
    config.combine.priority = vec!["archive".to_string(), "bluesky".to_string()];

    let cache = Arc::new(ResultCache::new(Duration::from_secs(300)));
    let pipeline = Pipeline::new(&config, cache).unwrap();

    let sources: Vec<Arc<dyn RecordSource>> =
        vec![as_source(count_source()), as_source(overlapping_source())];
    let request = PipelineRequest {
        entities: vec!["rust".to_string()],
        window: test_window(5),
        horizon: None,
    };

    let report = pipeline.run(request, &sources).await;
    match &report.outcomes[0] {
        EntityOutcome::Ready { series, .. } => {
            // archive outranks bluesky, so its value wins every bucket
            assert!(series.points.iter().all(|p| (p.magnitude - 10.0).abs() < 1e-9));
        }
        other => panic!("expected ready outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn test_second_run_hits_cache() {
    let pipeline = build_pipeline();
    let sources = vec![as_source(count_source())];
    let request = PipelineRequest {
        entities: vec!["rust".to_string()],
        window: test_window(5),
        horizon: None,
    };

    let first = pipeline.run(request.clone(), &sources).await;
    let second = pipeline.run(request, &sources).await;

    match (&first.outcomes[0], &second.outcomes[0]) {
        (
            EntityOutcome::Ready { prediction: a, .. },
            EntityOutcome::Ready { prediction: b, .. },
        ) => assert_eq!(a, b),
        other => panic!("expected two ready outcomes, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bounded_concurrency_completes_all_entities() {
    let mut config = test_config();
    config.pipeline.max_concurrent_entities = 2;

    let cache = Arc::new(ResultCache::new(Duration::from_secs(300)));
    let pipeline = Pipeline::new(&config, cache).unwrap();

    let entities: Vec<String> = (0..10).map(|i| format!("entity-{i}")).collect();
    let request = PipelineRequest {
        entities: entities.clone(),
        window: test_window(5),
        horizon: None,
    };

    let report = pipeline.run(request, &[as_source(count_source())]).await;
    assert_eq!(report.outcomes.len(), entities.len());
    let ids: Vec<_> = report.outcomes.iter().map(|o| o.entity_id()).collect();
    assert_eq!(ids, entities);
}
