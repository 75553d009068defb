//! Market data collaborator interface

use async_trait::async_trait;

use crate::domain::{Fundamentals, Symbol, TimeSeries};
use crate::error::Result;

/// Source of price history and company fundamentals.
///
/// Implementations report retrieval failures as `AnalysisError::DataSource`;
/// the orchestrator retries those and absorbs them per report section.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name used in logs
    fn name(&self) -> &str;

    /// Daily price history covering `period` (e.g. `"1y"`)
    async fn get_historical_prices(&self, symbol: &Symbol, period: &str) -> Result<TimeSeries>;

    async fn get_fundamentals(&self, symbol: &Symbol) -> Result<Fundamentals>;
}
