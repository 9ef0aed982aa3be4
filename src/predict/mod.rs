//! Forecasting over derived feature sets
//!
//! Extrapolates the trend component of a feature set over a forward
//! horizon, optionally adjusted by an additive seasonal index when the
//! history covers enough full cycles. Confidence bounds derive from the
//! volatility scalar and widen with horizon distance (sqrt-of-steps), so
//! bound width is non-decreasing in the horizon index by construction.
//!
//! The predictor never fails on thin data: insufficient feature sets
//! degrade to a flat extrapolation of the last value with maximal
//! uncertainty bounds, so the dashboard always receives a renderable
//! result.

use chrono::Duration;
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use crate::models::{FeatureSet, Prediction};

/// Errors that can occur while constructing a predictor
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Confidence level must be in (0, 1), got {0}")]
    InvalidConfidenceLevel(f64),

    #[error("Seasonal adjustment requires at least one full cycle, got {0}")]
    InvalidSeasonalCycles(usize),
}

/// Result type for predictor operations
pub type PredictResult<T> = Result<T, PredictError>;

/// Trend-plus-seasonal forecaster.
///
/// Pure and `Sync`; the model is closed-form with no randomness, so
/// identical inputs always produce bit-identical predictions.
#[derive(Debug, Clone)]
pub struct Predictor {
    /// Two-sided quantile for the configured confidence level
    z_score: f64,
    seasonal_period: usize,
    seasonal_min_cycles: usize,
    max_uncertainty_multiplier: f64,
}

impl Predictor {
    /// Create a predictor.
    ///
    /// # Arguments
    /// * `confidence_level` - Interval coverage, e.g. 0.95
    /// * `seasonal_period` - Cycle length in cadence steps; 0 disables
    ///   seasonal adjustment
    /// * `seasonal_min_cycles` - Full cycles of history required before
    ///   the seasonal term is applied
    /// * `max_uncertainty_multiplier` - Half-width factor (relative to the
    ///   last value) for degenerate low-confidence forecasts
    pub fn new(
        confidence_level: f64,
        seasonal_period: usize,
        seasonal_min_cycles: usize,
        max_uncertainty_multiplier: f64,
    ) -> PredictResult<Self> {
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(PredictError::InvalidConfidenceLevel(confidence_level));
        }
        if seasonal_period > 0 && seasonal_min_cycles == 0 {
            return Err(PredictError::InvalidSeasonalCycles(seasonal_min_cycles));
        }

        let normal = Normal::new(0.0, 1.0)
            .map_err(|_| PredictError::InvalidConfidenceLevel(confidence_level))?;
        let z_score = normal.inverse_cdf(0.5 + confidence_level / 2.0);

        Ok(Self {
            z_score,
            seasonal_period,
            seasonal_min_cycles,
            max_uncertainty_multiplier,
        })
    }

    /// Produce a forecast over `horizon` cadence steps.
    ///
    /// Feature sets with insufficient scalars (or an empty grid) yield a
    /// degenerate prediction instead of an error.
    #[must_use]
    pub fn predict(&self, features: &FeatureSet, horizon: usize) -> Prediction {
        let Some(last) = features.last_point() else {
            // Nothing observed at all: an explicitly-insufficient empty
            // forecast keeps the output deterministic
            return Prediction {
                entity_id: features.entity_id.clone(),
                horizon_timestamps: Vec::new(),
                predicted_magnitude: Vec::new(),
                lower_bound: Vec::new(),
                upper_bound: Vec::new(),
                insufficient_data: true,
            };
        };

        let cadence = Duration::seconds(features.cadence_secs);
        let horizon_timestamps: Vec<_> = (0..horizon)
            .map(|h| last.timestamp + cadence * (h as i32 + 1))
            .collect();

        if features.is_insufficient() {
            return self.degenerate(features, last.magnitude, horizon_timestamps);
        }

        // Scalars are all present past this point
        let slope = features.trend_slope.value().unwrap_or(0.0);
        let volatility = features.volatility.value().unwrap_or(0.0);

        let seasonal = self.seasonal_indices(features);
        let last_phase_adjust = seasonal
            .as_ref()
            .map(|s| s[(features.series.len() - 1) % s.len()])
            .unwrap_or(0.0);
        let base = last.magnitude - last_phase_adjust;

        let mut predicted = Vec::with_capacity(horizon);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);

        for h in 0..horizon {
            let seasonal_term = seasonal
                .as_ref()
                .map(|s| s[(features.series.len() + h) % s.len()])
                .unwrap_or(0.0);
            let point = base + slope * (h as f64 + 1.0) + seasonal_term;

            // Widening is monotone in h because sqrt is
            let half_width = self.z_score * volatility * ((h as f64) + 1.0).sqrt();

            predicted.push(point);
            lower.push(point - half_width);
            upper.push(point + half_width);
        }

        tracing::debug!(
            entity = %features.entity_id,
            horizon,
            slope,
            volatility,
            seasonal = seasonal.is_some(),
            "Produced forecast"
        );

        Prediction {
            entity_id: features.entity_id.clone(),
            horizon_timestamps,
            predicted_magnitude: predicted,
            lower_bound: lower,
            upper_bound: upper,
            insufficient_data: false,
        }
    }

    /// Flat extrapolation with maximal bounds for thin histories
    fn degenerate(
        &self,
        features: &FeatureSet,
        last_value: f64,
        horizon_timestamps: Vec<chrono::DateTime<chrono::Utc>>,
    ) -> Prediction {
        let n = horizon_timestamps.len();
        let half_width = self.max_uncertainty_multiplier * last_value.abs().max(1.0);

        tracing::debug!(
            entity = %features.entity_id,
            horizon = n,
            "Insufficient features, emitting degenerate forecast"
        );

        Prediction {
            entity_id: features.entity_id.clone(),
            horizon_timestamps,
            predicted_magnitude: vec![last_value; n],
            lower_bound: vec![last_value - half_width; n],
            upper_bound: vec![last_value + half_width; n],
            insufficient_data: true,
        }
    }

    /// Additive seasonal index per phase position, or None when history
    /// does not cover enough full cycles
    fn seasonal_indices(&self, features: &FeatureSet) -> Option<Vec<f64>> {
        let period = self.seasonal_period;
        if period == 0 || features.series.len() < period * self.seasonal_min_cycles {
            return None;
        }

        let n = features.series.len() as f64;
        let mean = features.series.iter().map(|p| p.magnitude).sum::<f64>() / n;

        let mut sums = vec![0.0; period];
        let mut counts = vec![0usize; period];
        for (i, point) in features.series.iter().enumerate() {
            sums[i % period] += point.magnitude - mean;
            counts[i % period] += 1;
        }

        Some(
            sums.iter()
                .zip(&counts)
                .map(|(sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
                .collect(),
        )
    }
}
