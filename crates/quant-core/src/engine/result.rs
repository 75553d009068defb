//! Analysis result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analytics::{RiskProfile, TechnicalSection, ValuationSection};
use crate::domain::TimeSeries;
use crate::error::ErrorObject;

/// Report sections that can be individually unavailable
pub mod section {
    pub const VALUATION: &str = "valuation";
    pub const RISK: &str = "risk";
}

/// Market snapshot plus the always-present technical section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub latest_price: f64,
    pub volume: u64,
    pub market_cap: Option<f64>,
    pub technical: TechnicalSection,
}

/// Column-oriented price history for charting clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub dates: Vec<DateTime<Utc>>,
    pub prices: Vec<f64>,
    pub volumes: Vec<u64>,
}

impl From<&TimeSeries> for PriceHistory {
    fn from(series: &TimeSeries) -> Self {
        let points = series.points();
        Self {
            dates: points.iter().map(|p| p.timestamp).collect(),
            prices: points.iter().map(|p| p.close).collect(),
            volumes: points.iter().map(|p| p.volume).collect(),
        }
    }
}

/// Full report for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub ticker: String,
    pub metrics: Metrics,
    pub valuation: Option<ValuationSection>,
    pub risk: Option<RiskProfile>,
    pub price_history: PriceHistory,
    /// Section name to the reason it could not be produced
    pub unavailable: BTreeMap<String, String>,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(ticker: impl Into<String>, metrics: Metrics, price_history: PriceHistory) -> Self {
        Self {
            ticker: ticker.into(),
            metrics,
            valuation: None,
            risk: None,
            price_history,
            unavailable: BTreeMap::new(),
            generated_at: Utc::now(),
        }
    }

    pub fn mark_unavailable(&mut self, section: impl Into<String>, reason: impl Into<String>) {
        self.unavailable.insert(section.into(), reason.into());
    }

    pub fn is_complete(&self) -> bool {
        self.unavailable.is_empty()
    }
}

/// Outcome for one symbol of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Success(Box<AnalysisResult>),
    Failure(ErrorObject),
}

impl BatchEntry {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn as_success(&self) -> Option<&AnalysisResult> {
        match self {
            Self::Success(result) => Some(&**result),
            Self::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&ErrorObject> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }
}
