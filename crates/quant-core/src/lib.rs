//! Quantitative analytics engine
//!
//! This crate estimates the fair value and risk profile of a tradable security
//! from historical price, cash-flow and volatility data. It includes:
//!
//! - Monte Carlo discounted-cash-flow valuation with CAPM discounting
//! - VaR/CVaR risk measures and CVaR-maximising portfolio weights
//! - Technical indicators (SMA 50/200, RSI 14, annualised volatility)
//! - A time-bounded cache for market data and finished reports
//! - An orchestrator that runs many analyses concurrently
//!
//! # Architecture
//!
//! `AnalysisOrchestrator` composes the engines into per-symbol reports:
//! - `TechnicalIndicators`: always computed from the price series
//! - `ValuationEngine`: needs cash flows and beta, runs on the compute pool
//! - `RiskEngine`: needs enough aligned returns, runs on the compute pool
//!
//! Market data comes from a [`MarketDataProvider`]. A failing valuation or
//! risk section is recorded in the report rather than failing the analysis.
//!
//! # Example
//!
//! ```rust,no_run
//! use quant_core::{AnalysisOrchestrator, EngineConfig, InMemoryProvider};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = Arc::new(InMemoryProvider::from_path("market.json")?);
//!     let config = EngineConfig::default().with_env()?;
//!     let caches = Arc::new(config.cache_manager());
//!
//!     let orchestrator = AnalysisOrchestrator::new(provider, caches, config)?;
//!     let report = orchestrator.analyze("AAPL").await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;

// Re-export main types for convenience
pub use analytics::{
    DcfParams, ExecutionStrategy, RiskConfig, RiskEngine, RiskProfile, SimulationResult,
    TechnicalIndicators, TechnicalSection, ValuationConfig, ValuationEngine, ValuationSection,
};
pub use api::{InMemoryProvider, MarketDataProvider, MarketFixture};
pub use cache::{AnalysisCache, CacheKey, CacheManager, Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use domain::{CashFlowSeries, Fundamentals, PricePoint, ReturnsMatrix, Symbol, TimeSeries};
pub use engine::{AnalysisOrchestrator, AnalysisResult, BatchEntry, ComputePool};
pub use error::{AnalysisError, ErrorObject, Result};
