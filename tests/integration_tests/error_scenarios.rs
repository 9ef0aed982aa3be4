//! Error scenario integration tests
//!
//! Tests various failure modes and error handling:
//! 1. Source outages (partial and total)
//! 2. Per-entity deadlines
//! 3. Malformed rows
//! 4. Invalid configuration

use std::sync::Arc;
use std::time::Duration;

use trendcast::cache::ResultCache;
use trendcast::models::EntityOutcome;
use trendcast::pipeline::{Pipeline, PipelineRequest};
use trendcast::source::RecordSource;

use super::fixtures::{
    as_source, count_source, dirty_source, test_config, test_window, FailingSource, HangingSource,
};

// ============================================================================
// Source Failure Tests
// ============================================================================

fn build_pipeline() -> Pipeline {
    let cache = Arc::new(ResultCache::new(Duration::from_secs(300)));
    Pipeline::new(&test_config(), cache).unwrap()
}

#[tokio::test]
async fn test_total_source_outage_marks_entity_unavailable() {
    let pipeline = build_pipeline();
    let sources: Vec<Arc<dyn RecordSource>> = vec![Arc::new(FailingSource::new("down"))];

    let request = PipelineRequest {
        entities: vec!["rust".to_string()],
        window: test_window(5),
        horizon: None,
    };

    let report = pipeline.run(request, &sources).await;
    match &report.outcomes[0] {
        EntityOutcome::Unavailable { entity_id, reason } => {
            assert_eq!(entity_id, "rust");
            assert!(!reason.is_empty());
        }
        other => panic!("expected unavailable outcome, got {other:?}"),
    }
    assert_eq!(report.stats.unavailable_count, 1);
    assert_eq!(report.stats.ready_count, 0);
}

#[tokio::test]
async fn test_partial_source_outage_still_computes() {
    let pipeline = build_pipeline();
    let sources: Vec<Arc<dyn RecordSource>> = vec![
        as_source(count_source()),
        Arc::new(FailingSource::new("down")),
    ];

    let request = PipelineRequest {
        entities: vec!["rust".to_string()],
        window: test_window(5),
        horizon: None,
    };

    let report = pipeline.run(request, &sources).await;
    assert!(report.outcomes[0].is_ready());
}

#[tokio::test]
async fn test_failed_entity_does_not_poison_others() {
    // Fail by deadline for one entity while the other succeeds: the
    // hanging source only blocks entities it is queried for, so use two
    // pipelines sharing nothing and assert isolation within one batch
    let pipeline = build_pipeline();
    let sources: Vec<Arc<dyn RecordSource>> = vec![as_source(count_source())];

    let request = PipelineRequest {
        entities: vec!["rust".to_string(), "unknown-entity".to_string()],
        window: test_window(5),
        horizon: None,
    };

    let report = pipeline.run(request, &sources).await;
    assert!(report.outcomes[0].is_ready());
    // Unknown entity degrades to an insufficient forecast, not an error
    match &report.outcomes[1] {
        EntityOutcome::Ready { prediction, .. } => assert!(prediction.insufficient_data),
        other => panic!("expected degraded ready outcome, got {other:?}"),
    }
}

// ============================================================================
// Deadline Tests
// ============================================================================

#[tokio::test]
async fn test_entity_deadline_enforced() {
    let mut config = test_config();
    config.pipeline.entity_timeout_secs = 1;

    let cache = Arc::new(ResultCache::new(Duration::from_secs(300)));
    let pipeline = Pipeline::new(&config, cache).unwrap();

    let sources: Vec<Arc<dyn RecordSource>> = vec![Arc::new(HangingSource::new("slow"))];
    let request = PipelineRequest {
        entities: vec!["rust".to_string()],
        window: test_window(5),
        horizon: None,
    };

    let started = std::time::Instant::now();
    let report = pipeline.run(request, &sources).await;
    assert!(started.elapsed() < Duration::from_secs(30));

    match &report.outcomes[0] {
        EntityOutcome::Unavailable { reason, .. } => {
            assert!(reason.contains("deadline"), "unexpected reason: {reason}");
        }
        other => panic!("expected unavailable outcome, got {other:?}"),
    }
}

// ============================================================================
// Malformed Data Tests
// ============================================================================

#[tokio::test]
async fn test_malformed_rows_skipped_and_counted() {
    let pipeline = build_pipeline();
    let sources: Vec<Arc<dyn RecordSource>> = vec![as_source(dirty_source())];

    let request = PipelineRequest {
        entities: vec!["rust".to_string()],
        window: test_window(5),
        horizon: None,
    };

    let report = pipeline.run(request, &sources).await;
    // One parsable row survives; the bad-timestamp and bad-magnitude rows
    // are skipped (the row missing its entity field never matches the
    // entity filter)
    assert_eq!(report.stats.records_normalized, 1);
    assert_eq!(report.stats.records_skipped, 2);
    assert!(report.outcomes[0].is_ready());
}

// ============================================================================
// Configuration Error Tests
// ============================================================================

#[tokio::test]
async fn test_unknown_policy_rejected_at_startup() {
    let mut config = test_config();
    config.combine.policy = "majority_vote".to_string();

    let cache = Arc::new(ResultCache::new(Duration::from_secs(300)));
    assert!(Pipeline::new(&config, cache).is_err());
}

#[tokio::test]
async fn test_priority_policy_without_list_rejected() {
    let mut config = test_config();
    config.combine.policy = "priority_list".to_string();
    config.combine.priority.clear();

    let cache = Arc::new(ResultCache::new(Duration::from_secs(300)));
    assert!(Pipeline::new(&config, cache).is_err());
}
