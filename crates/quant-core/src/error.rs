//! Error types for analytics operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Analytics engine errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Malformed input rejected before any work starts
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream market data retrieval failed
    #[error("Data not available for {symbol}: {reason}")]
    DataSource { symbol: String, reason: String },

    /// Not enough observations to run a calculation
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Numeric parameters that make a model undefined
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// CPU-bound work failed on the compute pool
    #[error("Computation failed: {0}")]
    Computation(String),

    /// Per-symbol analysis exceeded its deadline
    #[error("Analysis of {symbol} timed out after {elapsed:?}")]
    Timeout { symbol: String, elapsed: Duration },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for analytics operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    /// Shorthand for a data source failure
    pub fn data_source(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataSource {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable error kind
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::DataSource { .. } => "data_source",
            Self::InsufficientData(_) => "insufficient_data",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::Computation(_) => "computation",
            Self::Timeout { .. } => "timeout",
            Self::Config(_) => "config",
            Self::Json(_) => "json",
        }
    }

    /// Convert into the structured error reported to batch callers
    pub fn to_error_object(&self, ticker: impl Into<String>) -> ErrorObject {
        let mut details = serde_json::Map::new();
        details.insert("kind".to_string(), self.code().into());
        match self {
            Self::DataSource { reason, .. } => {
                details.insert("reason".to_string(), reason.clone().into());
            }
            Self::Timeout { elapsed, .. } => {
                details.insert("timeout_ms".to_string(), (elapsed.as_millis() as u64).into());
            }
            _ => {}
        }

        ErrorObject {
            message: self.to_string(),
            ticker: ticker.into(),
            timestamp: Utc::now(),
            details,
        }
    }
}

impl From<quant_utils::EnvError> for AnalysisError {
    fn from(err: quant_utils::EnvError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Structured error returned in place of an `AnalysisResult`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub message: String,
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Map<String, serde_json::Value>,
}
