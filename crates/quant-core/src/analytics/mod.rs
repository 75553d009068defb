//! Numeric engines: technical indicators, Monte Carlo DCF valuation and CVaR risk

pub mod risk;
pub mod stats;
pub mod technical;
pub mod valuation;

pub use risk::{CvarResult, PortfolioOptimization, RiskConfig, RiskEngine, RiskProfile};
pub use technical::{RsiSignal, TechnicalIndicators, TechnicalSection};
pub use valuation::{
    DcfParams, ExecutionStrategy, SimulationResult, ValuationConfig, ValuationEngine,
    ValuationSection, ValuationVerdict, deterministic_npv,
};
