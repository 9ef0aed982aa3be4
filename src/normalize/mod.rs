//! Record normalization from heterogeneous source rows
//!
//! Upstream sources return rows in their own shapes; this module maps them
//! onto the canonical [`MentionRecord`] using a per-source field mapping.
//! Malformed rows (missing or unparsable entity/timestamp) are skipped and
//! counted, never fatal to the batch.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::MentionRecord;

/// Errors that can occur while normalizing a single row
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Missing required field {field:?} in record from source {source_id}")]
    MissingField { field: String, source_id: String },

    #[error("Unparsable timestamp {value:?} in record from source {source_id}")]
    UnparsableTimestamp { value: String, source_id: String },

    #[error("Non-numeric magnitude {value:?} in record from source {source_id}")]
    InvalidMagnitude { value: String, source_id: String },
}

/// Result type for normalization operations
pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// Field mapping from one source's row shape to the canonical record.
///
/// `magnitude_field` is optional: sources that report bare occurrences
/// (one row per mention) normalize with magnitude 1.0. Pointing it at a
/// sentiment field instead of a count field is how sentiment series are
/// built; the rest of the pipeline is agnostic to which metric flows
/// through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMapping {
    /// Canonical source tag stamped onto every normalized record
    pub source_id: String,

    /// Row field holding the entity identifier
    pub entity_field: String,

    /// Row field holding the observation timestamp (RFC 3339 string or
    /// unix epoch seconds)
    pub timestamp_field: String,

    /// Row field holding the count or score; absent means 1.0 per row
    #[serde(default)]
    pub magnitude_field: Option<String>,
}

impl SourceMapping {
    /// Create a mapping with an explicit magnitude field
    #[must_use]
    pub fn new(
        source_id: impl Into<String>,
        entity_field: impl Into<String>,
        timestamp_field: impl Into<String>,
        magnitude_field: Option<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            entity_field: entity_field.into(),
            timestamp_field: timestamp_field.into(),
            magnitude_field,
        }
    }
}

/// Outcome of normalizing one source batch
#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    /// Successfully normalized records
    pub records: Vec<MentionRecord>,

    /// Rows skipped as malformed
    pub skipped: usize,
}

/// Converts raw per-source rows into canonical mention records
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    mapping: SourceMapping,
}

impl RecordNormalizer {
    /// Create a normalizer for one source mapping
    #[must_use]
    pub fn new(mapping: SourceMapping) -> Self {
        Self { mapping }
    }

    /// Source this normalizer handles
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.mapping.source_id
    }

    /// Normalize a batch of raw rows.
    ///
    /// Malformed rows are logged, counted, and skipped; the returned
    /// outcome carries both the surviving records and the skip count. No
    /// side effects beyond the returned outcome.
    pub fn normalize_batch(&self, rows: &[Value]) -> NormalizeOutcome {
        let mut outcome = NormalizeOutcome::default();

        for row in rows {
            match self.normalize_row(row) {
                Ok(record) => outcome.records.push(record),
                Err(e) => {
                    tracing::debug!(
                        source = %self.mapping.source_id,
                        error = %e,
                        "Skipping malformed record"
                    );
                    crate::metrics::record_skipped(&self.mapping.source_id);
                    outcome.skipped += 1;
                }
            }
        }

        if outcome.skipped > 0 {
            tracing::warn!(
                source = %self.mapping.source_id,
                skipped = outcome.skipped,
                kept = outcome.records.len(),
                "Batch contained malformed records"
            );
        }

        outcome
    }

    /// Normalize a single raw row
    pub fn normalize_row(&self, row: &Value) -> NormalizeResult<MentionRecord> {
        let entity_id = row
            .get(&self.mapping.entity_field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| NormalizeError::MissingField {
                field: self.mapping.entity_field.clone(),
                source_id: self.mapping.source_id.clone(),
            })?
            .trim()
            .to_string();

        let ts_value = row.get(&self.mapping.timestamp_field).ok_or_else(|| {
            NormalizeError::MissingField {
                field: self.mapping.timestamp_field.clone(),
                source_id: self.mapping.source_id.clone(),
            }
        })?;
        let timestamp = self.parse_timestamp(ts_value)?;

        let magnitude = match &self.mapping.magnitude_field {
            Some(field) => match row.get(field) {
                Some(v) => v.as_f64().ok_or_else(|| NormalizeError::InvalidMagnitude {
                    value: v.to_string(),
                    source_id: self.mapping.source_id.clone(),
                })?,
                // A mapped-but-absent magnitude still counts as one mention
                None => 1.0,
            },
            None => 1.0,
        };

        Ok(MentionRecord::new(
            entity_id,
            timestamp,
            magnitude,
            self.mapping.source_id.clone(),
        ))
    }

    fn parse_timestamp(&self, value: &Value) -> NormalizeResult<DateTime<Utc>> {
        match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| NormalizeError::UnparsableTimestamp {
                    value: s.clone(),
                    source_id: self.mapping.source_id.clone(),
                }),
            Value::Number(n) => {
                let secs = n.as_i64().ok_or_else(|| NormalizeError::UnparsableTimestamp {
                    value: n.to_string(),
                    source_id: self.mapping.source_id.clone(),
                })?;
                Utc.timestamp_opt(secs, 0)
                    .single()
                    .ok_or_else(|| NormalizeError::UnparsableTimestamp {
                        value: n.to_string(),
                        source_id: self.mapping.source_id.clone(),
                    })
            }
            other => Err(NormalizeError::UnparsableTimestamp {
                value: other.to_string(),
                source_id: self.mapping.source_id.clone(),
            }),
        }
    }
}
