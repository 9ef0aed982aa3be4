//! Unified error handling for the trendcast crate
//!
//! Each pipeline stage defines its own error enum; this module wraps them
//! into a single [`Error`] that can cross module boundaries without losing
//! detail, plus a classification used to decide whether a failure degrades
//! a single entity or aborts the whole batch.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::cache::CacheError;
pub use crate::combine::CombineError;
pub use crate::features::FeatureError;
pub use crate::normalize::NormalizeError;
pub use crate::pipeline::PipelineError;
pub use crate::predict::PredictError;
pub use crate::source::SourceError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Per-record errors, skipped and counted
    Record,
    /// Per-entity errors, degrade to an unavailable marker
    Entity,
    /// Upstream query-layer errors (timeouts, unreachable sources)
    Upstream,
    /// Cache computation and coordination errors
    Cache,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Common trait for trendcast error types
pub trait TrendcastErrorTrait: std::error::Error {
    /// Check if this error is scoped to a single entity (the batch
    /// continues) rather than the whole request
    fn is_entity_scoped(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Unified error type for the trendcast crate
#[derive(Error, Debug)]
pub enum Error {
    /// Record normalization errors
    #[error("Normalize error: {0}")]
    Normalize(#[from] NormalizeError),

    /// Series combination errors
    #[error("Combine error: {0}")]
    Combine(#[from] CombineError),

    /// Feature derivation errors
    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    /// Predictor construction errors
    #[error("Predict error: {0}")]
    Predict(#[from] PredictError),

    /// Query-layer errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Cache errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Pipeline orchestration errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TrendcastErrorTrait for Error {
    fn is_entity_scoped(&self) -> bool {
        match self {
            Self::Normalize(_) => true,
            Self::Combine(_) | Self::Feature(_) | Self::Predict(_) => true,
            Self::Source(e) => e.is_entity_scoped(),
            Self::Cache(e) => e.is_entity_scoped(),
            Self::Pipeline(e) => e.is_entity_scoped(),
            Self::Io(_) | Self::Json(_) | Self::Config(_) | Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Normalize(_) => ErrorCategory::Record,
            Self::Combine(_) | Self::Feature(_) | Self::Predict(_) => ErrorCategory::Entity,
            Self::Source(_) => ErrorCategory::Upstream,
            Self::Cache(_) => ErrorCategory::Cache,
            Self::Pipeline(e) => match e {
                PipelineError::UpstreamTimeout { .. } => ErrorCategory::Upstream,
                _ => ErrorCategory::Entity,
            },
            Self::Json(_) => ErrorCategory::Record,
            Self::Config(_) => ErrorCategory::Config,
            Self::Io(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
