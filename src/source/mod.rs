//! Query-layer boundary
//!
//! The pipeline does not issue queries against upstream stores itself; it
//! consumes raw rows through the [`RecordSource`] trait and leaves the
//! retrieval mechanics (object stores, feeds, databases) to the
//! implementation behind it. Each source carries the field mapping the
//! normalizer needs to turn its rows into canonical records.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

use crate::models::Window;
use crate::normalize::SourceMapping;

/// Errors surfaced by the query layer
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source {source_id} unavailable: {reason}")]
    Unavailable { source_id: String, reason: String },

    #[error("Failed to load source file {path}: {reason}")]
    LoadFailed { path: String, reason: String },
}

impl SourceError {
    /// Whether this failure degrades a single entity rather than the
    /// whole request
    #[must_use]
    pub fn is_entity_scoped(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::LoadFailed { .. } => false,
        }
    }
}

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// One upstream source of raw mention rows.
///
/// Implementations must be cheap to query repeatedly; the pipeline applies
/// its own per-entity deadline around these calls, so a slow upstream
/// surfaces as an unavailable entity instead of blocking the batch.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Canonical source tag
    fn source_id(&self) -> &str;

    /// Field mapping for this source's row shape
    fn mapping(&self) -> &SourceMapping;

    /// Fetch raw rows for one entity inside a time window.
    ///
    /// Rows whose timestamps cannot be pre-filtered may be returned
    /// anyway; the normalizer and combiner tolerate them.
    async fn fetch_raw(&self, entity_id: &str, window: Window) -> SourceResult<Vec<Value>>;
}

/// In-memory source backed by a fixed set of rows.
///
/// Used by the CLI (rows loaded from a JSON batch file) and by tests.
#[derive(Debug, Clone)]
pub struct MemorySource {
    mapping: SourceMapping,
    rows: Vec<Value>,
}

impl MemorySource {
    /// Create a source from a mapping and its raw rows
    #[must_use]
    pub fn new(mapping: SourceMapping, rows: Vec<Value>) -> Self {
        Self { mapping, rows }
    }

    /// All raw rows, unfiltered
    #[must_use]
    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    /// Number of rows held
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the source holds no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    fn source_id(&self) -> &str {
        &self.mapping.source_id
    }

    fn mapping(&self) -> &SourceMapping {
        &self.mapping
    }

    async fn fetch_raw(&self, entity_id: &str, window: Window) -> SourceResult<Vec<Value>> {
        let rows = self
            .rows
            .iter()
            .filter(|row| {
                row.get(&self.mapping.entity_field)
                    .and_then(Value::as_str)
                    .map(|e| e.trim() == entity_id)
                    .unwrap_or(false)
            })
            .filter(|row| {
                // Best-effort window pre-filter; unparsable timestamps
                // pass through for the normalizer to count and skip
                match row.get(&self.mapping.timestamp_field) {
                    Some(Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
                        .map(|dt| window.contains(dt.with_timezone(&chrono::Utc)))
                        .unwrap_or(true),
                    Some(Value::Number(n)) => n
                        .as_i64()
                        .and_then(|secs| {
                            chrono::TimeZone::timestamp_opt(&chrono::Utc, secs, 0).single()
                        })
                        .map(|ts| window.contains(ts))
                        .unwrap_or(true),
                    _ => true,
                }
            })
            .cloned()
            .collect();

        Ok(rows)
    }
}

/// One source batch as it appears in a JSON input file
#[derive(Debug, Clone, Deserialize)]
pub struct SourceBatch {
    /// Field mapping for the rows
    pub mapping: SourceMapping,

    /// Raw rows in the source's own shape
    pub rows: Vec<Value>,
}

/// Load in-memory sources from a JSON file holding an array of
/// [`SourceBatch`] objects
pub async fn load_sources(path: &Path) -> SourceResult<Vec<MemorySource>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SourceError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let batches: Vec<SourceBatch> =
        serde_json::from_str(&content).map_err(|e| SourceError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    tracing::info!(
        path = %path.display(),
        sources = batches.len(),
        "Loaded source batches"
    );

    Ok(batches
        .into_iter()
        .map(|batch| MemorySource::new(batch.mapping, batch.rows))
        .collect())
}
