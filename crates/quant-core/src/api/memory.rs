//! Fixture-backed market data provider

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::provider::MarketDataProvider;
use crate::domain::{Fundamentals, Symbol, TimeSeries};
use crate::error::{AnalysisError, Result};

/// Serialized market data keyed by symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketFixture {
    #[serde(default)]
    pub prices: HashMap<String, TimeSeries>,
    #[serde(default)]
    pub fundamentals: HashMap<String, Fundamentals>,
}

/// Serves data from memory. Useful offline and in tests, where failures and
/// latency can be injected per symbol.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    fixture: MarketFixture,
    failures: HashMap<String, String>,
    latency: HashMap<String, Duration>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: MarketFixture) -> Self {
        let fixture = MarketFixture {
            prices: normalize_keys(fixture.prices),
            fundamentals: normalize_keys(fixture.fundamentals),
        };
        Self {
            fixture,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::from_fixture(serde_json::from_str(json)?))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("cannot read fixture {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn with_prices(mut self, symbol: &str, series: TimeSeries) -> Self {
        self.fixture.prices.insert(normalize(symbol), series);
        self
    }

    pub fn with_fundamentals(mut self, symbol: &str, fundamentals: Fundamentals) -> Self {
        self.fixture.fundamentals.insert(normalize(symbol), fundamentals);
        self
    }

    /// Every request for `symbol` fails with `reason`
    pub fn with_failure(mut self, symbol: &str, reason: impl Into<String>) -> Self {
        self.failures.insert(normalize(symbol), reason.into());
        self
    }

    /// Delay every response for `symbol`
    pub fn with_latency(mut self, symbol: &str, delay: Duration) -> Self {
        self.latency.insert(normalize(symbol), delay);
        self
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.fixture.prices.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    async fn before_request(&self, symbol: &Symbol) -> Result<()> {
        if let Some(delay) = self.latency.get(symbol.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        match self.failures.get(symbol.as_str()) {
            Some(reason) => Err(AnalysisError::data_source(symbol.as_str(), reason.clone())),
            None => Ok(()),
        }
    }
}

fn normalize(symbol: &str) -> String {
    Symbol::parse(symbol).map_or_else(|_| symbol.trim().to_uppercase(), String::from)
}

fn normalize_keys<V>(map: HashMap<String, V>) -> HashMap<String, V> {
    map.into_iter().map(|(k, v)| (normalize(&k), v)).collect()
}

#[async_trait]
impl MarketDataProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn get_historical_prices(&self, symbol: &Symbol, period: &str) -> Result<TimeSeries> {
        self.before_request(symbol).await?;
        tracing::debug!(symbol = %symbol, period, "Serving fixture prices");
        self.fixture
            .prices
            .get(symbol.as_str())
            .cloned()
            .ok_or_else(|| AnalysisError::data_source(symbol.as_str(), "no price history"))
    }

    async fn get_fundamentals(&self, symbol: &Symbol) -> Result<Fundamentals> {
        self.before_request(symbol).await?;
        self.fixture
            .fundamentals
            .get(symbol.as_str())
            .cloned()
            .ok_or_else(|| AnalysisError::data_source(symbol.as_str(), "no fundamentals"))
    }
}
