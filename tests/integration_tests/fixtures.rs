//! Shared fixtures for integration tests

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use trendcast::config::Config;
use trendcast::models::Window;
use trendcast::normalize::SourceMapping;
use trendcast::source::{MemorySource, RecordSource, SourceError, SourceResult};

/// One hour in seconds, the default test cadence
pub const HOUR: i64 = 3600;

/// Test configuration with windows small enough for short histories
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.features.cadence_secs = HOUR;
    config.features.trend_window = 3;
    config.features.volatility_window = 3;
    config.predictor.horizon = 4;
    config.predictor.seasonal_period = 0;
    config
}

/// Window covering the first `hours` hourly buckets from the epoch
pub fn test_window(hours: i64) -> Window {
    Window::new(
        Utc.timestamp_opt(0, 0).unwrap(),
        Utc.timestamp_opt(hours * HOUR, 0).unwrap(),
    )
}

/// Mention-count source: hourly counts for "rust" and "go"
pub fn count_source() -> MemorySource {
    let mapping = SourceMapping::new("bluesky", "keyword", "observed_at", Some("count".to_string()));
    let mut rows = Vec::new();
    for hour in 0..6 {
        rows.push(json!({
            "keyword": "rust",
            "observed_at": hour * HOUR,
            "count": (hour + 1) as f64,
        }));
        rows.push(json!({
            "keyword": "go",
            "observed_at": hour * HOUR,
            "count": 2.0,
        }));
    }
    MemorySource::new(mapping, rows)
}

/// Second source reporting overlapping hours for "rust", to exercise
/// conflict resolution
pub fn overlapping_source() -> MemorySource {
    let mapping = SourceMapping::new("archive", "keyword", "observed_at", Some("count".to_string()));
    let rows = (0..6)
        .map(|hour| {
            json!({
                "keyword": "rust",
                "observed_at": hour * HOUR,
                "count": 10.0,
            })
        })
        .collect();
    MemorySource::new(mapping, rows)
}

/// Source with malformed rows mixed in
pub fn dirty_source() -> MemorySource {
    let mapping = SourceMapping::new("feed", "keyword", "observed_at", Some("count".to_string()));
    MemorySource::new(
        mapping,
        vec![
            json!({ "keyword": "rust", "observed_at": 0, "count": 3.0 }),
            json!({ "keyword": "rust", "observed_at": "not-a-time", "count": 1.0 }),
            json!({ "keyword": "rust", "observed_at": HOUR, "count": "many" }),
            json!({ "observed_at": 2 * HOUR, "count": 5.0 }),
        ],
    )
}

/// Box a memory source as a trait object
pub fn as_source(source: MemorySource) -> Arc<dyn RecordSource> {
    Arc::new(source)
}

/// Source that always fails its queries
pub struct FailingSource {
    mapping: SourceMapping,
}

impl FailingSource {
    pub fn new(source_id: &str) -> Self {
        Self {
            mapping: SourceMapping::new(source_id, "keyword", "observed_at", None),
        }
    }
}

#[async_trait]
impl RecordSource for FailingSource {
    fn source_id(&self) -> &str {
        &self.mapping.source_id
    }

    fn mapping(&self) -> &SourceMapping {
        &self.mapping
    }

    async fn fetch_raw(&self, _entity_id: &str, _window: Window) -> SourceResult<Vec<Value>> {
        Err(SourceError::Unavailable {
            source_id: self.mapping.source_id.clone(),
            reason: "connection refused".to_string(),
        })
    }
}

/// Source that never answers within any reasonable deadline
pub struct HangingSource {
    mapping: SourceMapping,
}

impl HangingSource {
    pub fn new(source_id: &str) -> Self {
        Self {
            mapping: SourceMapping::new(source_id, "keyword", "observed_at", None),
        }
    }
}

#[async_trait]
impl RecordSource for HangingSource {
    fn source_id(&self) -> &str {
        &self.mapping.source_id
    }

    fn mapping(&self) -> &SourceMapping {
        &self.mapping
    }

    async fn fetch_raw(&self, _entity_id: &str, _window: Window) -> SourceResult<Vec<Value>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}
