//! trendcast - Entity Mention Forecasting Pipeline
//!
//! Turns raw mention rows from heterogeneous sources into per-entity time
//! series, derived features, and bounded short-horizon forecasts, with a
//! single-flight result cache in front of the model.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`source`] - Query-layer boundary over upstream stores
//! - [`normalize`] - Raw row to canonical record conversion
//! - [`combine`] - Multi-source series merging with conflict policies
//! - [`features`] - Cadence regularization and summary scalars
//! - [`predict`] - Trend/seasonality forecasts with confidence bounds
//! - [`cache`] - Single-flight prediction cache
//! - [`pipeline`] - Per-entity orchestration with failure isolation
//!
//! # Example
//!
//! ```no_run
//! use trendcast::config::Config;
//! use trendcast::cache::ResultCache;
//! use trendcast::pipeline::Pipeline;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let cache = Arc::new(ResultCache::new(config.cache.ttl()));
//!     let pipeline = Pipeline::new(&config, cache)?;
//!     // pipeline.run(request, &sources).await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod combine;
pub mod config;
pub mod error;
pub mod features;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod predict;
pub mod source;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{CacheKey, ResultCache};
    pub use crate::combine::{ConflictPolicy, DataCombiner};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result, TrendcastErrorTrait};
    pub use crate::features::FeatureBuilder;
    pub use crate::models::{
        CombinedSeries, EntityOutcome, FeatureSet, GapFill, MentionRecord, Prediction, Window,
    };
    pub use crate::pipeline::{Pipeline, PipelineRequest};
    pub use crate::predict::Predictor;
    pub use crate::source::RecordSource;
}

// Direct re-exports for convenience
pub use models::{CombinedSeries, EntityOutcome, MentionRecord, Prediction, Window};
