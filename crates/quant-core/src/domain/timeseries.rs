use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::stats::simple_returns;
use crate::error::{AnalysisError, Result};

/// One daily observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub volume: u64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, close: f64, volume: u64) -> Self {
        Self {
            timestamp,
            close,
            volume,
        }
    }
}

/// Price/volume history ordered by strictly increasing timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PricePoint>", into = "Vec<PricePoint>")]
pub struct TimeSeries {
    points: Vec<PricePoint>,
}

impl TimeSeries {
    /// Build a series, rejecting out-of-order timestamps and unusable closes.
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        for (index, point) in points.iter().enumerate() {
            if !point.close.is_finite() || point.close <= 0.0 {
                return Err(AnalysisError::Validation(format!(
                    "close price at index {index} must be positive and finite, got {}",
                    point.close
                )));
            }
        }

        if let Some(index) = points
            .windows(2)
            .position(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(AnalysisError::Validation(format!(
                "timestamps must be strictly increasing (violation at index {})",
                index + 1
            )));
        }

        Ok(Self { points })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    /// Simple close-to-close returns, one shorter than the series.
    pub fn daily_returns(&self) -> Vec<f64> {
        simple_returns(&self.closes())
    }
}

impl TryFrom<Vec<PricePoint>> for TimeSeries {
    type Error = AnalysisError;

    fn try_from(points: Vec<PricePoint>) -> Result<Self> {
        Self::new(points)
    }
}

impl From<TimeSeries> for Vec<PricePoint> {
    fn from(series: TimeSeries) -> Self {
        series.points
    }
}
