//! Cache behavior integration tests
//!
//! Exercises the single-flight cache through its public API and through
//! the pipeline: coalescing, content-hash invalidation, and stats.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use trendcast::cache::{CacheKey, ResultCache};
use trendcast::models::{Prediction, Window};
use trendcast::pipeline::{Pipeline, PipelineRequest};

use super::fixtures::{as_source, count_source, test_config, test_window};

fn key_window() -> Window {
    Window::new(
        Utc.timestamp_opt(0, 0).unwrap(),
        Utc.timestamp_opt(3600, 0).unwrap(),
    )
}

fn sample_prediction(value: f64) -> Prediction {
    Prediction {
        entity_id: "e1".to_string(),
        horizon_timestamps: vec![Utc.timestamp_opt(7200, 0).unwrap()],
        predicted_magnitude: vec![value],
        lower_bound: vec![value - 1.0],
        upper_bound: vec![value + 1.0],
        insufficient_data: false,
    }
}

#[tokio::test]
async fn test_concurrent_callers_share_one_computation() {
    let cache = Arc::new(ResultCache::new(Duration::from_secs(60)));
    let key = CacheKey::new("e1", key_window(), "hash1");
    let computations = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        let key = key.clone();
        let computations = Arc::clone(&computations);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute(key, move || async move {
                    computations.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok::<_, std::io::Error>(sample_prediction(3.0))
                })
                .await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.predicted_magnitude[0], 3.0);
    }
    assert_eq!(computations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stats_track_hits_and_misses() {
    let cache = ResultCache::new(Duration::from_secs(60));
    let key = CacheKey::new("e1", key_window(), "hash1");

    for _ in 0..4 {
        cache
            .get_or_compute(key.clone(), || async {
                Ok::<_, std::io::Error>(sample_prediction(1.0))
            })
            .await
            .unwrap();
    }

    assert_eq!(cache.stats().misses(), 1);
    assert_eq!(cache.stats().hits(), 3);
    assert!((cache.stats().hit_rate() - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn test_new_data_invalidates_through_pipeline() {
    // Same entity and window, but more rows: the content hash changes, so
    // the pipeline must recompute instead of serving the stale entry
    let cache = Arc::new(ResultCache::new(Duration::from_secs(300)));
    let pipeline = Pipeline::new(&test_config(), Arc::clone(&cache)).unwrap();

    let request = PipelineRequest {
        entities: vec!["rust".to_string()],
        window: test_window(5),
        horizon: None,
    };

    pipeline
        .run(request.clone(), &[as_source(count_source())])
        .await;
    let misses_before = cache.stats().misses();

    // A second source shifts every bucket value, changing the series hash
    pipeline
        .run(
            request,
            &[
                as_source(count_source()),
                as_source(super::fixtures::overlapping_source()),
            ],
        )
        .await;

    assert_eq!(cache.stats().misses(), misses_before + 1);
    // The retired stale entry does not linger next to the new one
    assert_eq!(cache.len(), 1);
}
