//! Core data structures for the trendcast pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single normalized mention observation.
///
/// Multiple records may share `(entity_id, timestamp)` across different
/// sources; the combiner resolves those per its conflict policy. Records
/// are immutable once normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionRecord {
    /// Canonical entity identifier (e.g., a tracked keyword or person)
    pub entity_id: String,

    /// When the mention was observed
    pub timestamp: DateTime<Utc>,

    /// Count or score reported by the source
    pub magnitude: f64,

    /// Which upstream source produced this record
    pub source_id: String,
}

impl MentionRecord {
    /// Create a new record
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        magnitude: f64,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            timestamp,
            magnitude,
            source_id: source_id.into(),
        }
    }
}

/// One point of a combined per-entity series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub magnitude: f64,
}

/// Conflict-resolved time series for one entity.
///
/// Timestamps are strictly increasing with no duplicates; an entity with
/// zero surviving records yields an empty series, which downstream stages
/// treat as "insufficient data" rather than a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedSeries {
    /// Entity this series belongs to
    pub entity_id: String,

    /// Ordered observations
    pub points: Vec<SeriesPoint>,
}

impl CombinedSeries {
    /// Create an empty series for an entity
    #[must_use]
    pub fn empty(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            points: Vec::new(),
        }
    }

    /// Number of observations
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the series has no observations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Last observation, if any
    #[must_use]
    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }
}

/// A derived scalar that may be unavailable for short series.
///
/// Short histories never produce fabricated numbers; the predictor
/// special-cases `Insufficient` instead of extrapolating from noise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    /// A computed value
    Value(f64),

    /// Too few points inside the required window
    Insufficient,
}

impl Scalar {
    /// Get the numeric value if present
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Insufficient => None,
        }
    }

    /// Check whether the scalar could be computed
    #[must_use]
    pub fn is_insufficient(&self) -> bool {
        matches!(self, Self::Insufficient)
    }
}

/// Gap-fill method applied during cadence regularization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapFill {
    /// Carry the last known value forward (default)
    CarryForward,

    /// Linear interpolation between surrounding observations
    LinearInterpolation,
}

impl Default for GapFill {
    fn default() -> Self {
        Self::CarryForward
    }
}

/// Regularized feature series plus derived scalars for one entity.
///
/// The cadence series is uniform; gaps are filled by the recorded
/// `gap_fill` method, never silently dropped. The method travels with the
/// output so consumers and assertions can account for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Entity this feature set belongs to
    pub entity_id: String,

    /// Fixed-cadence, gap-filled series
    pub series: Vec<SeriesPoint>,

    /// Cadence between consecutive points
    pub cadence_secs: i64,

    /// Gap-fill method that produced `series`
    pub gap_fill: GapFill,

    /// Slope of a fixed-window linear fit over recent points
    pub trend_slope: Scalar,

    /// Mean magnitude over the trailing trend window
    pub recent_average: Scalar,

    /// Standard deviation over the trailing volatility window
    pub volatility: Scalar,
}

impl FeatureSet {
    /// Whether any derived scalar is marked insufficient
    #[must_use]
    pub fn is_insufficient(&self) -> bool {
        self.trend_slope.is_insufficient()
            || self.recent_average.is_insufficient()
            || self.volatility.is_insufficient()
    }

    /// Last point of the regularized series, if any
    #[must_use]
    pub fn last_point(&self) -> Option<&SeriesPoint> {
        self.series.last()
    }
}

/// Forward forecast for one entity.
///
/// The three value arrays always have the same length as
/// `horizon_timestamps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Entity this prediction belongs to
    pub entity_id: String,

    /// Future timestamps, one cadence step apart
    pub horizon_timestamps: Vec<DateTime<Utc>>,

    /// Point forecast per horizon step
    pub predicted_magnitude: Vec<f64>,

    /// Lower confidence bound per horizon step
    pub lower_bound: Vec<f64>,

    /// Upper confidence bound per horizon step
    pub upper_bound: Vec<f64>,

    /// True when produced from an insufficient feature set; consumers
    /// should render such forecasts as low-confidence
    pub insufficient_data: bool,
}

impl Prediction {
    /// Horizon length
    #[must_use]
    pub fn horizon_len(&self) -> usize {
        self.horizon_timestamps.len()
    }

    /// Verify the array-length invariant
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let n = self.horizon_timestamps.len();
        self.predicted_magnitude.len() == n
            && self.lower_bound.len() == n
            && self.upper_bound.len() == n
    }
}

/// Requested time window for a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// Start of the window (inclusive)
    pub start: DateTime<Utc>,

    /// End of the window (inclusive)
    pub end: DateTime<Utc>,
}

impl Window {
    /// Create a window, normalizing inverted endpoints
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// Check whether a timestamp falls inside the window
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Per-entity result delivered to the presentation layer.
///
/// An entity is either fully computed or explicitly unavailable; the
/// presentation layer never has to infer a silent omission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityOutcome {
    /// History plus forecast, both plain structured data
    Ready {
        series: CombinedSeries,
        prediction: Prediction,
    },

    /// This entity could not be computed; the rest of the batch is
    /// unaffected
    Unavailable { entity_id: String, reason: String },
}

impl EntityOutcome {
    /// Entity this outcome belongs to
    #[must_use]
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Ready { series, .. } => &series.entity_id,
            Self::Unavailable { entity_id, .. } => entity_id,
        }
    }

    /// Check whether the entity was computed
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}
