//! Configuration for the analytics engine

use crate::analytics::{ExecutionStrategy, RiskConfig, TechnicalIndicators, ValuationConfig};
use crate::cache::CacheManager;
use crate::error::{AnalysisError, Result};
use quant_utils::{env_duration_secs, env_parse};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine-wide settings shared by every analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Monte Carlo DCF settings
    pub valuation: ValuationConfig,

    /// CVaR and optimizer settings
    pub risk: RiskConfig,

    /// Indicator windows
    pub technical: TechnicalIndicators,

    /// Cache TTL for price series
    pub cache_ttl_prices: Duration,

    /// Cache TTL for fundamentals
    pub cache_ttl_fundamentals: Duration,

    /// Cache TTL for finished analyses
    pub cache_ttl_analysis: Duration,

    /// Serve fresh cached analyses instead of recomputing
    pub use_result_cache: bool,

    /// Largest accepted batch in `analyze_many`
    pub max_batch_size: usize,

    /// Deadline for a single symbol's analysis
    pub symbol_timeout: Duration,

    /// Threads in the CPU-bound compute pool
    pub worker_threads: usize,

    /// Provider attempts per data request (first try included)
    pub max_fetch_attempts: u32,

    /// Initial backoff duration between fetch attempts
    pub retry_backoff_base: Duration,

    /// History period requested from the provider
    pub price_period: String,

    /// Peer symbols whose returns join the risk matrix
    pub risk_universe: Vec<String>,

    /// Fewest aligned return observations the risk section accepts
    pub min_risk_observations: usize,

    /// Optional mean-return constraint for portfolio optimization
    pub target_return: Option<f64>,

    /// Fixed simulation seed; a fresh one is drawn per analysis when unset
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            valuation: ValuationConfig::default(),
            risk: RiskConfig::default(),
            technical: TechnicalIndicators::default(),
            cache_ttl_prices: Duration::from_secs(300),       // 5 minutes
            cache_ttl_fundamentals: Duration::from_secs(3600), // 1 hour
            cache_ttl_analysis: Duration::from_secs(3600),     // 1 hour
            use_result_cache: true,
            max_batch_size: 10,
            symbol_timeout: Duration::from_secs(30),
            worker_threads: std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get),
            max_fetch_attempts: 3,
            retry_backoff_base: Duration::from_millis(200),
            price_period: "1y".to_string(),
            risk_universe: Vec::new(),
            min_risk_observations: 30,
            target_return: None,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Apply `QUANT_*` environment overrides, then validate
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(n) = env_parse("QUANT_MAX_BATCH_SIZE")? {
            self.max_batch_size = n;
        }
        if let Some(d) = env_duration_secs("QUANT_SYMBOL_TIMEOUT_SECS")? {
            self.symbol_timeout = d;
        }
        if let Some(n) = env_parse("QUANT_WORKER_THREADS")? {
            self.worker_threads = n;
        }
        if let Some(n) = env_parse("QUANT_MAX_FETCH_ATTEMPTS")? {
            self.max_fetch_attempts = n;
        }
        if let Some(n) = env_parse("QUANT_SIMULATIONS")? {
            self.valuation.simulation_count = n;
        }
        if let Some(parallel) = env_parse::<bool>("QUANT_PARALLEL")? {
            self.valuation.strategy = if parallel {
                ExecutionStrategy::Parallel
            } else {
                ExecutionStrategy::Sequential
            };
        }
        if let Some(rate) = env_parse("QUANT_RISK_FREE_RATE")? {
            self.valuation.risk_free_rate = rate;
        }
        if let Some(premium) = env_parse("QUANT_MARKET_RISK_PREMIUM")? {
            self.valuation.market_risk_premium = premium;
        }
        if let Some(level) = env_parse("QUANT_CONFIDENCE_LEVEL")? {
            self.risk.confidence_level = level;
        }
        if let Some(d) = env_duration_secs("QUANT_CACHE_TTL_PRICES_SECS")? {
            self.cache_ttl_prices = d;
        }
        if let Some(d) = env_duration_secs("QUANT_CACHE_TTL_FUNDAMENTALS_SECS")? {
            self.cache_ttl_fundamentals = d;
        }
        if let Some(d) = env_duration_secs("QUANT_CACHE_TTL_ANALYSIS_SECS")? {
            self.cache_ttl_analysis = d;
        }
        if let Some(seed) = env_parse("QUANT_SEED")? {
            self.seed = Some(seed);
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(AnalysisError::Config(msg.to_string()));

        if self.max_batch_size == 0 {
            return invalid("max_batch_size must be greater than 0");
        }
        if self.worker_threads == 0 {
            return invalid("worker_threads must be greater than 0");
        }
        if self.max_fetch_attempts == 0 {
            return invalid("max_fetch_attempts must be greater than 0");
        }
        if self.symbol_timeout.is_zero() {
            return invalid("symbol_timeout must be greater than 0");
        }
        if self.valuation.simulation_count == 0 || self.valuation.years == 0 {
            return invalid("simulation_count and years must be greater than 0");
        }
        if self.valuation.chunk_size == 0 {
            return invalid("chunk_size must be greater than 0");
        }
        let confidence = self.risk.confidence_level;
        if !(confidence > 0.0 && confidence < 1.0) {
            return invalid("confidence_level must lie strictly between 0 and 1");
        }
        if self.risk.max_iterations == 0 {
            return invalid("max_iterations must be greater than 0");
        }
        if self.min_risk_observations < 2 {
            return invalid("min_risk_observations must be at least 2");
        }

        Ok(())
    }

    /// Get retry backoff duration for attempt number
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff_base
            .saturating_mul(2_u32.saturating_pow(attempt))
    }

    /// Caches sized with this configuration's TTLs
    pub fn cache_manager(&self) -> CacheManager {
        CacheManager::new(
            self.cache_ttl_prices,
            self.cache_ttl_fundamentals,
            self.cache_ttl_analysis,
        )
    }
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set valuation engine settings
    pub fn valuation(mut self, valuation: ValuationConfig) -> Self {
        self.config.valuation = valuation;
        self
    }

    /// Set risk engine settings
    pub fn risk(mut self, risk: RiskConfig) -> Self {
        self.config.risk = risk;
        self
    }

    /// Set technical indicator windows
    pub fn technical(mut self, technical: TechnicalIndicators) -> Self {
        self.config.technical = technical;
        self
    }

    /// Set the number of Monte Carlo trials
    pub fn simulation_count(mut self, count: usize) -> Self {
        self.config.valuation.simulation_count = count;
        self
    }

    /// Set how Monte Carlo trials are scheduled
    pub fn execution_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.config.valuation.strategy = strategy;
        self
    }

    /// Set cache TTL for price history
    pub fn cache_ttl_prices(mut self, duration: Duration) -> Self {
        self.config.cache_ttl_prices = duration;
        self
    }

    /// Set cache TTL for fundamentals
    pub fn cache_ttl_fundamentals(mut self, duration: Duration) -> Self {
        self.config.cache_ttl_fundamentals = duration;
        self
    }

    /// Set cache TTL for finished analysis results
    pub fn cache_ttl_analysis(mut self, duration: Duration) -> Self {
        self.config.cache_ttl_analysis = duration;
        self
    }

    /// Enable or disable caching of finished results
    pub fn use_result_cache(mut self, enabled: bool) -> Self {
        self.config.use_result_cache = enabled;
        self
    }

    /// Set the largest accepted batch
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    /// Set the per-symbol analysis deadline
    pub fn symbol_timeout(mut self, duration: Duration) -> Self {
        self.config.symbol_timeout = duration;
        self
    }

    /// Set compute pool thread count
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads;
        self
    }

    /// Set total attempts per provider call
    pub fn max_fetch_attempts(mut self, attempts: u32) -> Self {
        self.config.max_fetch_attempts = attempts;
        self
    }

    /// Set the first retry delay
    pub fn retry_backoff_base(mut self, duration: Duration) -> Self {
        self.config.retry_backoff_base = duration;
        self
    }

    /// Set the price history period requested from the provider
    pub fn price_period(mut self, period: impl Into<String>) -> Self {
        self.config.price_period = period.into();
        self
    }

    /// Set peer symbols included in the risk section
    pub fn risk_universe<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.risk_universe = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Set the minimum aligned return rows for the risk section
    pub fn min_risk_observations(mut self, observations: usize) -> Self {
        self.config.min_risk_observations = observations;
        self
    }

    /// Set the mean return the optimizer must hold
    pub fn target_return(mut self, target: f64) -> Self {
        self.config.target_return = Some(target);
        self
    }

    /// Set a fixed seed for reproducible valuations
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.max_fetch_attempts, 3);
        assert_eq!(config.cache_ttl_prices, Duration::from_secs(300));
        assert!((config.risk.confidence_level - 0.95).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::builder()
            .max_batch_size(5)
            .simulation_count(200)
            .symbol_timeout(Duration::from_secs(60))
            .risk_universe(["SPY", "QQQ"])
            .seed(7)
            .build()
            .unwrap();

        assert_eq!(config.max_batch_size, 5);
        assert_eq!(config.valuation.simulation_count, 200);
        assert_eq!(config.symbol_timeout, Duration::from_secs(60));
        assert_eq!(config.risk_universe, vec!["SPY", "QQQ"]);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        assert!(EngineConfig::builder().max_batch_size(0).build().is_err());
        assert!(EngineConfig::builder().worker_threads(0).build().is_err());
        assert!(EngineConfig::builder().simulation_count(0).build().is_err());
        assert!(EngineConfig::builder().max_fetch_attempts(0).build().is_err());
    }

    #[test]
    fn test_validation_confidence_level() {
        let config = EngineConfig {
            risk: RiskConfig {
                confidence_level: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
    }

    #[test]
    fn test_retry_backoff() {
        let config = EngineConfig::builder()
            .retry_backoff_base(Duration::from_secs(1))
            .build()
            .unwrap();
        assert_eq!(config.retry_backoff(0), Duration::from_secs(1));
        assert_eq!(config.retry_backoff(1), Duration::from_secs(2));
        assert_eq!(config.retry_backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_serde_round_trip_preserves_settings() {
        let config = EngineConfig::builder().seed(3).build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
