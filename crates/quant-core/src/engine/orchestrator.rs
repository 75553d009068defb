//! Per-symbol analysis and concurrent batch runs

use futures::future::join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use super::pool::ComputePool;
use super::result::{AnalysisResult, BatchEntry, Metrics, PriceHistory, section};
use crate::analytics::{
    RiskEngine, RiskProfile, TechnicalIndicators, ValuationEngine, ValuationSection,
};
use crate::api::MarketDataProvider;
use crate::cache::{CacheKey, CacheManager};
use crate::config::EngineConfig;
use crate::domain::{Fundamentals, ReturnsMatrix, Symbol, TimeSeries};
use crate::error::{AnalysisError, Result};

struct Inner {
    provider: Arc<dyn MarketDataProvider>,
    caches: Arc<CacheManager>,
    config: EngineConfig,
    pool: ComputePool,
    technical: TechnicalIndicators,
    valuation: ValuationEngine,
    risk: RiskEngine,
}

/// Builds analysis reports from a market data provider.
///
/// Cloning is cheap; clones share the provider, caches and compute pool.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("config", &self.inner.config)
            .field("pool", &self.inner.pool)
            .finish_non_exhaustive()
    }
}

impl AnalysisOrchestrator {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        caches: Arc<CacheManager>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let pool = ComputePool::new(config.worker_threads)?;

        Ok(Self {
            inner: Arc::new(Inner {
                provider,
                caches,
                technical: config.technical,
                valuation: ValuationEngine::new(config.valuation.clone()),
                risk: RiskEngine::new(config.risk.clone()),
                pool,
                config,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn caches(&self) -> &Arc<CacheManager> {
        &self.inner.caches
    }

    /// Analyze one symbol.
    ///
    /// Fails only on an invalid symbol or when no price history can be
    /// obtained. Valuation and risk failures are recorded in
    /// `AnalysisResult::unavailable` instead.
    pub async fn analyze(&self, symbol: &str) -> Result<AnalysisResult> {
        let symbol = Symbol::parse(symbol)?;
        let config = &self.inner.config;
        let result_key = CacheKey::new(symbol.as_str(), "analysis", &config.price_period);

        if config.use_result_cache {
            if let Some(cached) = self.inner.caches.analysis.get(&result_key).await {
                tracing::debug!(symbol = %symbol, "Serving cached analysis");
                return Ok(cached);
            }
        }

        tracing::info!(symbol = %symbol, "Starting analysis");

        let (prices, fundamentals) =
            tokio::join!(self.fetch_prices(&symbol), self.fetch_fundamentals(&symbol));

        let prices = prices.inspect_err(|e| {
            tracing::error!(symbol = %symbol, error = %e, "Price history unavailable");
        })?;
        let Some(latest) = prices.latest().copied() else {
            tracing::error!(symbol = %symbol, "Price history is empty");
            return Err(AnalysisError::data_source(symbol.as_str(), "price history is empty"));
        };

        let market_cap = fundamentals
            .as_ref()
            .ok()
            .and_then(|f| f.shares_outstanding)
            .filter(|shares| *shares > 0.0)
            .map(|shares| latest.close * shares);

        let metrics = Metrics {
            latest_price: latest.close,
            volume: latest.volume,
            market_cap,
            technical: self.inner.technical.calculate(&prices),
        };
        let mut result = AnalysisResult::new(symbol.as_str(), metrics, PriceHistory::from(&prices));

        let valuation = match fundamentals {
            Ok(fundamentals) => self.valuation_section(fundamentals, latest.close).await,
            Err(e) => Err(e),
        };
        match valuation {
            Ok(valuation) => result.valuation = Some(valuation),
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "Valuation section unavailable");
                result.mark_unavailable(section::VALUATION, e.to_string());
            }
        }

        match self.risk_section(&symbol, &prices).await {
            Ok(profile) => result.risk = Some(profile),
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "Risk section unavailable");
                result.mark_unavailable(section::RISK, e.to_string());
            }
        }

        if config.use_result_cache {
            self.inner.caches.analysis.set(result_key, result.clone()).await;
        }

        tracing::info!(
            symbol = %symbol,
            unavailable = result.unavailable.len(),
            "Analysis complete"
        );
        Ok(result)
    }

    /// Analyze several symbols concurrently, one task per symbol.
    ///
    /// Every input symbol gets an entry; failures, timeouts and panics become
    /// `BatchEntry::Failure` without affecting the other symbols. Batches over
    /// `max_batch_size` are rejected before any work starts.
    pub async fn analyze_many<S: AsRef<str>>(
        &self,
        symbols: &[S],
    ) -> Result<BTreeMap<String, BatchEntry>> {
        let limit = self.inner.config.max_batch_size;
        if symbols.len() > limit {
            return Err(AnalysisError::Validation(format!(
                "batch of {} symbols exceeds the limit of {limit}",
                symbols.len()
            )));
        }

        let timeout = self.inner.config.symbol_timeout;
        let (names, tasks): (Vec<String>, Vec<_>) = symbols
            .iter()
            .map(|symbol| {
                let name = symbol.as_ref().to_string();
                let this = self.clone();
                let input = name.clone();
                let task = tokio::spawn(async move {
                    let outcome = tokio::time::timeout(timeout, this.analyze(&input)).await;
                    match outcome {
                        Ok(outcome) => outcome,
                        Err(_) => Err(AnalysisError::Timeout {
                            symbol: input,
                            elapsed: timeout,
                        }),
                    }
                });
                (name, task)
            })
            .unzip();

        let outcomes = join_all(tasks).await;

        let mut results = BTreeMap::new();
        for (name, outcome) in names.into_iter().zip(outcomes) {
            let entry = match outcome {
                Ok(Ok(result)) => BatchEntry::Success(Box::new(result)),
                Ok(Err(e)) => {
                    tracing::warn!(symbol = %name, error = %e, "Analysis failed");
                    BatchEntry::Failure(e.to_error_object(&name))
                }
                Err(join_error) => {
                    tracing::error!(symbol = %name, error = %join_error, "Analysis task aborted");
                    BatchEntry::Failure(
                        AnalysisError::Computation(format!("analysis task failed: {join_error}"))
                            .to_error_object(&name),
                    )
                }
            };
            results.insert(name, entry);
        }

        Ok(results)
    }

    async fn valuation_section(
        &self,
        mut fundamentals: Fundamentals,
        latest_price: f64,
    ) -> Result<ValuationSection> {
        let beta = fundamentals
            .beta
            .filter(|b| b.is_finite())
            .ok_or_else(|| AnalysisError::InsufficientData("beta is not available".to_string()))?;

        let params = self.inner.valuation.params_for(beta);
        let engine = self.inner.valuation.clone();
        let cash_flows = fundamentals.cash_flows.clone();
        let seed = self.inner.config.seed.unwrap_or_else(rand::random);

        let simulation = self
            .inner
            .pool
            .run(move || engine.simulate_dcf_seeded(&cash_flows, &params, seed))
            .await?;

        if fundamentals.current_price.is_none() {
            fundamentals.current_price = Some(latest_price);
        }
        Ok(ValuationSection::new(simulation, &params, &fundamentals))
    }

    async fn risk_section(&self, symbol: &Symbol, prices: &TimeSeries) -> Result<RiskProfile> {
        let config = &self.inner.config;

        let mut peers: Vec<Symbol> = Vec::new();
        for raw in &config.risk_universe {
            match Symbol::parse(raw) {
                Ok(peer) if peer != *symbol && !peers.contains(&peer) => peers.push(peer),
                Ok(_) => {}
                Err(e) => tracing::warn!(peer = %raw, error = %e, "Ignoring invalid risk peer"),
            }
        }

        let fetched = join_all(peers.iter().map(|peer| self.fetch_prices(peer))).await;

        let mut labels = vec![symbol.to_string()];
        let mut columns = vec![prices.daily_returns()];
        for (peer, series) in peers.into_iter().zip(fetched) {
            match series {
                Ok(series) if series.len() > 1 => {
                    labels.push(peer.to_string());
                    columns.push(series.daily_returns());
                }
                Ok(_) => tracing::warn!(peer = %peer, "Risk peer has too little history"),
                Err(e) => tracing::warn!(peer = %peer, error = %e, "Skipping risk peer"),
            }
        }

        let depth = columns.iter().map(Vec::len).min().unwrap_or(0);
        if depth < config.min_risk_observations {
            return Err(AnalysisError::InsufficientData(format!(
                "{depth} aligned return observations, at least {} required",
                config.min_risk_observations
            )));
        }

        let matrix = ReturnsMatrix::from_columns(&columns)?;
        let engine = self.inner.risk.clone();
        let optimize = labels.len() >= 2;
        let target = config.target_return;

        self.inner
            .pool
            .run(move || engine.risk_profile(&matrix, &labels, optimize, target))
            .await
    }

    async fn fetch_prices(&self, symbol: &Symbol) -> Result<TimeSeries> {
        let period = self.inner.config.price_period.as_str();
        let key = CacheKey::new(symbol.as_str(), "prices", period);
        self.inner
            .caches
            .prices
            .get_or_fetch(key, || {
                self.with_retry(symbol, "prices", || {
                    self.inner.provider.get_historical_prices(symbol, period)
                })
            })
            .await
    }

    async fn fetch_fundamentals(&self, symbol: &Symbol) -> Result<Fundamentals> {
        let key = CacheKey::new(symbol.as_str(), "fundamentals", ());
        self.inner
            .caches
            .fundamentals
            .get_or_fetch(key, || {
                self.with_retry(symbol, "fundamentals", || {
                    self.inner.provider.get_fundamentals(symbol)
                })
            })
            .await
    }

    /// Retry data source failures with exponential backoff
    async fn with_retry<T, F, Fut>(&self, symbol: &Symbol, what: &str, mut request: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.inner.config.max_fetch_attempts.max(1);
        let mut attempt = 0;
        loop {
            match request().await {
                Err(e @ AnalysisError::DataSource { .. }) if attempt + 1 < attempts => {
                    let backoff = self.inner.config.retry_backoff(attempt);
                    tracing::warn!(
                        symbol = %symbol,
                        what,
                        attempt = attempt + 1,
                        error = %e,
                        "Fetch failed, retrying in {:?}",
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::provider::MockMarketDataProvider;
    use crate::domain::PricePoint;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::time::Duration;

    fn series(days: usize, phase: f64) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let points = (0..days)
            .map(|i| {
                let x = i as f64;
                let close = 100.0 + 5.0 * (x * 0.7 + phase).sin() + 0.1 * x;
                PricePoint::new(start + ChronoDuration::days(i as i64), close, 1_000 + i as u64)
            })
            .collect();
        TimeSeries::new(points).unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig::builder()
            .worker_threads(2)
            .simulation_count(300)
            .retry_backoff_base(Duration::from_millis(1))
            .seed(42)
            .build()
            .unwrap()
    }

    fn orchestrator(mock: MockMarketDataProvider, config: EngineConfig) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(Arc::new(mock), Arc::new(config.cache_manager()), config).unwrap()
    }

    #[tokio::test]
    async fn test_full_report() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_historical_prices()
            .returning(|_, _| Ok(series(60, 0.0)));
        mock.expect_get_fundamentals().returning(|_| {
            Ok(Fundamentals::new(vec![100.0, 110.0, 121.0])
                .with_beta(1.0)
                .with_shares_outstanding(10.0))
        });

        let result = orchestrator(mock, config()).analyze("aapl").await.unwrap();

        assert_eq!(result.ticker, "AAPL");
        assert!(result.is_complete(), "{:?}", result.unavailable);
        assert!(result.metrics.technical.sma_50.is_some());
        assert!(result.metrics.technical.sma_200.is_none());
        let market_cap = result.metrics.market_cap.unwrap();
        assert!((market_cap - result.metrics.latest_price * 10.0).abs() < 1e-9);

        let valuation = result.valuation.unwrap();
        assert_eq!(valuation.simulation.simulation_count, 300);
        assert!(valuation.verdict.is_some());

        let risk = result.risk.unwrap();
        assert_eq!(risk.assets, vec!["AAPL"]);
        assert!(risk.optimization.is_none());
    }

    #[tokio::test]
    async fn test_zero_shares_leaves_market_cap_unset() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_historical_prices()
            .returning(|_, _| Ok(series(40, 0.0)));
        mock.expect_get_fundamentals().returning(|_| {
            Ok(Fundamentals::new(vec![100.0, 110.0, 121.0])
                .with_beta(1.0)
                .with_shares_outstanding(0.0))
        });

        let result = orchestrator(mock, config()).analyze("AAPL").await.unwrap();
        assert_eq!(result.metrics.market_cap, None);
        assert!(result.valuation.unwrap().fair_value_per_share.is_none());
    }

    #[tokio::test]
    async fn test_missing_beta_marks_valuation_unavailable() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_historical_prices()
            .returning(|_, _| Ok(series(40, 0.0)));
        mock.expect_get_fundamentals()
            .returning(|_| Ok(Fundamentals::new(vec![100.0, 110.0])));

        let result = orchestrator(mock, config()).analyze("MSFT").await.unwrap();
        assert!(result.valuation.is_none());
        assert!(result.unavailable["valuation"].contains("beta"));
        assert!(result.risk.is_some());
    }

    #[tokio::test]
    async fn test_invalid_cost_of_capital_is_absorbed() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_historical_prices()
            .returning(|_, _| Ok(series(40, 0.0)));
        // beta -1 gives a cost of capital below terminal growth
        mock.expect_get_fundamentals()
            .returning(|_| Ok(Fundamentals::new(vec![100.0, 110.0]).with_beta(-1.0)));

        let result = orchestrator(mock, config()).analyze("XOM").await.unwrap();
        assert!(result.unavailable["valuation"].contains("Invalid parameter"));
    }

    #[tokio::test]
    async fn test_short_history_marks_risk_unavailable() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_historical_prices()
            .returning(|_, _| Ok(series(10, 0.0)));
        mock.expect_get_fundamentals()
            .returning(|_| Err(AnalysisError::data_source("NEW", "no filings")));

        let result = orchestrator(mock, config()).analyze("NEW").await.unwrap();
        assert!(result.unavailable["risk"].contains("observations"));
        assert!(result.unavailable["valuation"].contains("no filings"));
        assert!(result.metrics.technical.rsi.is_none());
    }

    #[tokio::test]
    async fn test_price_failure_is_top_level_error() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_historical_prices()
            .times(3)
            .returning(|symbol, _| Err(AnalysisError::data_source(symbol.as_str(), "unknown")));
        mock.expect_get_fundamentals()
            .returning(|symbol| Err(AnalysisError::data_source(symbol.as_str(), "unknown")));

        let err = orchestrator(mock, config()).analyze("ZZZZ").await.unwrap_err();
        assert!(matches!(err, AnalysisError::DataSource { .. }));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let mut mock = MockMarketDataProvider::new();
        let mut calls = 0;
        mock.expect_get_historical_prices()
            .times(3)
            .returning(move |symbol, _| {
                calls += 1;
                if calls < 3 {
                    Err(AnalysisError::data_source(symbol.as_str(), "rate limited"))
                } else {
                    Ok(series(40, 0.0))
                }
            });
        mock.expect_get_fundamentals()
            .returning(|_| Ok(Fundamentals::default()));

        let result = orchestrator(mock, config()).analyze("AAPL").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_symbol_never_reaches_provider() {
        let mock = MockMarketDataProvider::new();
        let err = orchestrator(mock, config()).analyze("  ").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }

    #[tokio::test]
    async fn test_repeat_analysis_served_from_cache() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_historical_prices()
            .times(1)
            .returning(|_, _| Ok(series(40, 0.0)));
        mock.expect_get_fundamentals()
            .times(1)
            .returning(|_| Ok(Fundamentals::default()));

        let orchestrator = orchestrator(mock, config());
        let first = orchestrator.analyze("AAPL").await.unwrap();
        let second = orchestrator.analyze("aapl").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_data_cache_used_without_result_cache() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_historical_prices()
            .times(1)
            .returning(|_, _| Ok(series(40, 0.0)));
        mock.expect_get_fundamentals()
            .times(1)
            .returning(|_| Ok(Fundamentals::default()));

        let config = EngineConfig {
            use_result_cache: false,
            ..config()
        };
        let orchestrator = orchestrator(mock, config);
        orchestrator.analyze("AAPL").await.unwrap();
        orchestrator.analyze("AAPL").await.unwrap();
        assert!(orchestrator.caches().analysis.is_empty().await);
    }

    #[tokio::test]
    async fn test_risk_universe_enables_optimization() {
        let mut mock = MockMarketDataProvider::new();
        mock.expect_get_historical_prices()
            .returning(|symbol, _| match symbol.as_str() {
                "SPY" => Ok(series(80, 1.3)),
                "BAD" => Err(AnalysisError::data_source("BAD", "delisted")),
                _ => Ok(series(60, 0.0)),
            });
        mock.expect_get_fundamentals()
            .returning(|_| Ok(Fundamentals::default()));

        let config = EngineConfig {
            risk_universe: vec!["spy".to_string(), "BAD".to_string(), "AAPL".to_string()],
            ..config()
        };
        let result = orchestrator(mock, config).analyze("AAPL").await.unwrap();

        let risk = result.risk.unwrap();
        assert_eq!(risk.assets, vec!["AAPL", "SPY"]);
        assert_eq!(risk.observations, 59);
        let weights = risk.optimization.unwrap().weights;
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected_before_work() {
        let mock = MockMarketDataProvider::new();
        let symbols: Vec<String> = (0..11).map(|i| format!("S{i}")).collect();
        let err = orchestrator(mock, config())
            .analyze_many(&symbols)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }
}
