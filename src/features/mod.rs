//! Feature derivation over combined series
//!
//! Regularizes an irregular combined series onto a fixed cadence and
//! derives the scalars the predictor consumes: trend slope from a
//! fixed-window linear fit, recent average, and volatility as the standard
//! deviation over a trailing window.
//!
//! Gap filling is explicit and travels with the output: either the last
//! known value is carried forward (default) or gaps are linearly
//! interpolated between surrounding observations. Grid points before the
//! first observation back-fill from it; points past the last observation
//! extend it. Gaps are never silently dropped.

use chrono::Duration;
use thiserror::Error;

use crate::models::{CombinedSeries, FeatureSet, GapFill, Scalar, SeriesPoint, Window};

/// Errors that can occur while building features
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Cadence must be positive, got {0} seconds")]
    InvalidCadence(i64),

    #[error("Window size must be at least 2, got {0}")]
    InvalidWindow(usize),
}

/// Result type for feature operations
pub type FeatureResult<T> = Result<T, FeatureError>;

/// Derives regularized series and summary scalars from combined series.
///
/// Pure and `Sync`: safe to call from multiple entity pipelines at once.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    cadence_secs: i64,
    gap_fill: GapFill,
    trend_window: usize,
    volatility_window: usize,
}

impl FeatureBuilder {
    /// Create a feature builder.
    ///
    /// # Arguments
    /// * `cadence_secs` - Fixed interval between regularized points
    /// * `gap_fill` - Fill method recorded alongside every output
    /// * `trend_window` - Points used for the trend fit and recent average
    /// * `volatility_window` - Trailing points used for volatility
    pub fn new(
        cadence_secs: i64,
        gap_fill: GapFill,
        trend_window: usize,
        volatility_window: usize,
    ) -> FeatureResult<Self> {
        if cadence_secs <= 0 {
            return Err(FeatureError::InvalidCadence(cadence_secs));
        }
        if trend_window < 2 {
            return Err(FeatureError::InvalidWindow(trend_window));
        }
        if volatility_window < 2 {
            return Err(FeatureError::InvalidWindow(volatility_window));
        }

        Ok(Self {
            cadence_secs,
            gap_fill,
            trend_window,
            volatility_window,
        })
    }

    /// Cadence in seconds
    #[must_use]
    pub fn cadence_secs(&self) -> i64 {
        self.cadence_secs
    }

    /// Build a feature set from a combined series.
    ///
    /// The regularized grid spans the series' own extent, or the given
    /// window when one is provided (the grid is anchored at the window
    /// start and runs through its end). An empty input series yields a
    /// feature set with an empty grid and all scalars insufficient.
    #[must_use]
    pub fn build(&self, series: &CombinedSeries, window: Option<Window>) -> FeatureSet {
        let grid = self.regularize(series, window);

        let trend_slope = self.trend_slope(&grid);
        let recent_average = self.recent_average(&grid);
        let volatility = self.volatility(&grid);

        tracing::debug!(
            entity = %series.entity_id,
            observations = series.len(),
            grid_points = grid.len(),
            gap_fill = ?self.gap_fill,
            insufficient = trend_slope.is_insufficient(),
            "Built feature set"
        );

        FeatureSet {
            entity_id: series.entity_id.clone(),
            series: grid,
            cadence_secs: self.cadence_secs,
            gap_fill: self.gap_fill,
            trend_slope,
            recent_average,
            volatility,
        }
    }

    /// Sample the series onto the fixed cadence grid
    fn regularize(&self, series: &CombinedSeries, window: Option<Window>) -> Vec<SeriesPoint> {
        if series.is_empty() {
            return Vec::new();
        }

        let obs = &series.points;
        let (start, end) = match window {
            Some(w) => (w.start, w.end),
            None => (obs[0].timestamp, obs[obs.len() - 1].timestamp),
        };
        if start > end {
            return Vec::new();
        }

        let cadence = Duration::seconds(self.cadence_secs);
        let mut grid = Vec::new();
        let mut t = start;
        while t <= end {
            grid.push(SeriesPoint {
                timestamp: t,
                magnitude: self.value_at(obs, t),
            });
            t += cadence;
        }
        grid
    }

    /// Value of the filled series at one grid timestamp
    fn value_at(&self, obs: &[SeriesPoint], t: chrono::DateTime<chrono::Utc>) -> f64 {
        // Index of the first observation strictly after t
        let after = obs.partition_point(|p| p.timestamp <= t);

        match self.gap_fill {
            GapFill::CarryForward => {
                if after == 0 {
                    // Before the first observation there is nothing to
                    // carry; back-fill from it
                    obs[0].magnitude
                } else {
                    obs[after - 1].magnitude
                }
            }
            GapFill::LinearInterpolation => {
                if after == 0 {
                    obs[0].magnitude
                } else if after == obs.len() {
                    obs[obs.len() - 1].magnitude
                } else {
                    let prev = &obs[after - 1];
                    let next = &obs[after];
                    let span = (next.timestamp - prev.timestamp).num_milliseconds() as f64;
                    if span <= 0.0 {
                        return prev.magnitude;
                    }
                    let frac = (t - prev.timestamp).num_milliseconds() as f64 / span;
                    prev.magnitude + frac * (next.magnitude - prev.magnitude)
                }
            }
        }
    }

    /// Least-squares slope over the trailing trend window, per cadence step
    fn trend_slope(&self, grid: &[SeriesPoint]) -> Scalar {
        if grid.len() < self.trend_window {
            return Scalar::Insufficient;
        }

        let recent = &grid[grid.len() - self.trend_window..];
        let n = recent.len() as f64;

        let sum_x: f64 = (0..recent.len()).map(|i| i as f64).sum();
        let sum_y: f64 = recent.iter().map(|p| p.magnitude).sum();
        let sum_xy: f64 = recent
            .iter()
            .enumerate()
            .map(|(i, p)| i as f64 * p.magnitude)
            .sum();
        let sum_x2: f64 = (0..recent.len()).map(|i| (i as f64).powi(2)).sum();

        let denom = n * sum_x2 - sum_x * sum_x;
        if denom == 0.0 {
            return Scalar::Insufficient;
        }

        Scalar::Value((n * sum_xy - sum_x * sum_y) / denom)
    }

    /// Mean magnitude over the trailing trend window
    fn recent_average(&self, grid: &[SeriesPoint]) -> Scalar {
        if grid.len() < self.trend_window {
            return Scalar::Insufficient;
        }

        let recent = &grid[grid.len() - self.trend_window..];
        let sum: f64 = recent.iter().map(|p| p.magnitude).sum();
        Scalar::Value(sum / recent.len() as f64)
    }

    /// Standard deviation over the trailing volatility window
    fn volatility(&self, grid: &[SeriesPoint]) -> Scalar {
        if grid.len() < self.volatility_window {
            return Scalar::Insufficient;
        }

        let recent = &grid[grid.len() - self.volatility_window..];
        let n = recent.len() as f64;
        let mean = recent.iter().map(|p| p.magnitude).sum::<f64>() / n;
        let variance = recent
            .iter()
            .map(|p| (p.magnitude - mean).powi(2))
            .sum::<f64>()
            / n;

        Scalar::Value(variance.sqrt())
    }
}
