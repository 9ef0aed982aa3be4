//! Cross-source series combination
//!
//! Merges normalized records from all sources into a single per-entity
//! time series. When multiple sources report a value for the same
//! `(entity, timestamp)`, the configured [`ConflictPolicy`] decides the
//! surviving magnitude. The rule is total and deterministic: output never
//! depends on input order.
//!
//! The policy materially changes downstream predictions, so it is part of
//! the combiner's contract and travels through configuration, never as
//! implicit first-wins behavior.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::models::{CombinedSeries, MentionRecord, SeriesPoint};

/// Errors that can occur during combination
#[derive(Debug, Error)]
pub enum CombineError {
    #[error("Conflict policy priority_list requires a non-empty priority list")]
    EmptyPriorityList,
}

/// Result type for combination operations
pub type CombineResult<T> = Result<T, CombineError>;

/// Rule for resolving conflicting observations at one timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "priority", rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Additive combination: sources report disjoint counts, sum them
    Sum,

    /// First non-missing source in the configured order wins. Sources
    /// absent from the list fall back behind listed ones, ordered by
    /// source id for determinism.
    PriorityList(Vec<String>),

    /// Arithmetic mean across reporting sources (the right choice when
    /// magnitudes are scores rather than counts)
    Average,
}

impl ConflictPolicy {
    /// Short name for logging and outputs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::PriorityList(_) => "priority_list",
            Self::Average => "average",
        }
    }
}

/// Merges normalized records into conflict-resolved per-entity series
#[derive(Debug, Clone)]
pub struct DataCombiner {
    policy: ConflictPolicy,
}

impl DataCombiner {
    /// Create a combiner with the given conflict policy
    pub fn new(policy: ConflictPolicy) -> CombineResult<Self> {
        if let ConflictPolicy::PriorityList(priority) = &policy {
            if priority.is_empty() {
                return Err(CombineError::EmptyPriorityList);
            }
        }
        Ok(Self { policy })
    }

    /// Active conflict policy
    #[must_use]
    pub fn policy(&self) -> &ConflictPolicy {
        &self.policy
    }

    /// Combine records for one entity into an ordered series.
    ///
    /// Records for other entities are ignored. Zero surviving records
    /// yield an empty series, not an error; downstream stages treat that
    /// as insufficient data.
    pub fn combine(&self, entity_id: &str, records: &[MentionRecord]) -> CombinedSeries {
        // BTreeMap gives ascending timestamps for free
        let mut buckets: BTreeMap<DateTime<Utc>, Vec<&MentionRecord>> = BTreeMap::new();

        for record in records.iter().filter(|r| r.entity_id == entity_id) {
            buckets.entry(record.timestamp).or_default().push(record);
        }

        let points = buckets
            .into_iter()
            .map(|(timestamp, colliding)| SeriesPoint {
                timestamp,
                magnitude: self.resolve(colliding),
            })
            .collect();

        CombinedSeries {
            entity_id: entity_id.to_string(),
            points,
        }
    }

    /// Combine a mixed batch into one series per entity
    #[must_use]
    pub fn combine_all(&self, records: &[MentionRecord]) -> HashMap<String, CombinedSeries> {
        let mut by_entity: HashMap<String, Vec<MentionRecord>> = HashMap::new();
        for record in records {
            by_entity
                .entry(record.entity_id.clone())
                .or_default()
                .push(record.clone());
        }

        by_entity
            .into_iter()
            .map(|(entity_id, entity_records)| {
                let series = self.combine(&entity_id, &entity_records);
                (entity_id, series)
            })
            .collect()
    }

    /// Resolve all observations at one timestamp into a single magnitude
    fn resolve(&self, mut colliding: Vec<&MentionRecord>) -> f64 {
        // Stable source order so the result is independent of input order
        colliding.sort_by(|a, b| a.source_id.cmp(&b.source_id));

        match &self.policy {
            ConflictPolicy::Sum => colliding.iter().map(|r| r.magnitude).sum(),
            ConflictPolicy::Average => {
                let sum: f64 = colliding.iter().map(|r| r.magnitude).sum();
                sum / colliding.len() as f64
            }
            ConflictPolicy::PriorityList(priority) => {
                for source in priority {
                    if let Some(record) = colliding.iter().find(|r| &r.source_id == source) {
                        return record.magnitude;
                    }
                }
                // No listed source reported; sorted order makes this pick
                // deterministic
                colliding[0].magnitude
            }
        }
    }
}

/// SHA256 content hash of a combined series.
///
/// Cache keys carry this hash so that any change in the underlying data
/// invalidates derived predictions. Magnitudes hash by their exact bit
/// pattern; two series hash equal iff their points are identical.
#[must_use]
pub fn series_content_hash(series: &CombinedSeries) -> String {
    let mut hasher = Sha256::new();
    hasher.update(series.entity_id.as_bytes());
    for point in &series.points {
        hasher.update(point.timestamp.timestamp_millis().to_le_bytes());
        hasher.update(point.magnitude.to_bits().to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}
