//! Monte Carlo discounted-cash-flow valuation
//!
//! Historical free-cash-flow growth is modelled as a normal distribution whose
//! mean and spread come from the observed period-over-period growth rates.
//! Each trial draws a growth path, compounds the latest cash flow along it,
//! attaches a Gordon-growth terminal value to the final year and discounts the
//! whole projection at the CAPM cost of capital.
//!
//! # Reproducibility
//!
//! The random source is always injected. Trials are grouped into fixed-size
//! chunks and every chunk is driven by its own [`StdRng`] seeded from the
//! injected generator, so the sequential and rayon-parallel strategies yield
//! bit-identical samples for the same seed and chunk size.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::stats::{mean, percentile_sorted, population_std};
use crate::domain::{CashFlowSeries, Fundamentals};
use crate::error::{AnalysisError, Result};

/// How trials are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Run every chunk on the calling thread
    #[default]
    Sequential,
    /// Fan chunks out over the current rayon pool
    Parallel,
}

/// Engine-level valuation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationConfig {
    pub risk_free_rate: f64,
    pub market_risk_premium: f64,
    pub terminal_growth: f64,
    /// Projection horizon in years
    pub years: usize,
    pub simulation_count: usize,
    pub strategy: ExecutionStrategy,
    /// Trials per independently seeded chunk
    pub chunk_size: usize,
    /// Keep the raw NPV samples in the result
    pub keep_samples: bool,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.03,
            market_risk_premium: 0.06,
            terminal_growth: 0.02,
            years: 5,
            simulation_count: 5_000,
            strategy: ExecutionStrategy::Sequential,
            chunk_size: 1_024,
            keep_samples: false,
        }
    }
}

/// Inputs to a single DCF simulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcfParams {
    pub years: usize,
    pub simulation_count: usize,
    pub risk_free_rate: f64,
    pub market_risk_premium: f64,
    pub beta: f64,
    pub terminal_growth: f64,
}

impl DcfParams {
    /// CAPM required return: `rf + beta * mrp`
    pub fn cost_of_capital(&self) -> f64 {
        self.risk_free_rate + self.beta * self.market_risk_premium
    }

    fn validate(&self) -> Result<()> {
        let coc = self.cost_of_capital();
        if !coc.is_finite() || !self.terminal_growth.is_finite() {
            return Err(AnalysisError::InvalidParameter(
                "cost of capital and terminal growth must be finite".to_string(),
            ));
        }
        if coc <= self.terminal_growth {
            return Err(AnalysisError::InvalidParameter(format!(
                "cost of capital {coc:.4} must exceed terminal growth {:.4}; \
                 the perpetuity value is undefined otherwise",
                self.terminal_growth
            )));
        }
        if self.years == 0 {
            return Err(AnalysisError::InvalidParameter(
                "projection horizon must be at least one year".to_string(),
            ));
        }
        if self.simulation_count == 0 {
            return Err(AnalysisError::InvalidParameter(
                "simulation count must be at least one".to_string(),
            ));
        }
        Ok(())
    }
}

/// Distribution of simulated net present values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub mean: f64,
    pub std_dev: f64,
    /// 2.5th percentile
    pub ci_lower: f64,
    /// 97.5th percentile
    pub ci_upper: f64,
    pub median: f64,
    pub simulation_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<f64>>,
}

impl SimulationResult {
    fn from_samples(mut samples: Vec<f64>, keep_samples: bool) -> Result<Self> {
        if samples.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::InvalidParameter(
                "simulation produced non-finite valuations".to_string(),
            ));
        }

        let mean_value = mean(&samples).unwrap_or(0.0);
        let std_dev = population_std(&samples).unwrap_or(0.0);
        let kept = keep_samples.then(|| samples.clone());

        samples.sort_by(f64::total_cmp);
        let pct = |p: f64| percentile_sorted(&samples, p).unwrap_or(mean_value);

        Ok(Self {
            mean: mean_value,
            std_dev,
            ci_lower: pct(2.5),
            ci_upper: pct(97.5),
            median: pct(50.0),
            simulation_count: samples.len(),
            samples: kept,
        })
    }
}

/// Growth-rate model fitted to historical cash flows
#[derive(Debug, Clone, Copy, PartialEq)]
struct GrowthModel {
    latest: f64,
    mu: f64,
    sigma: f64,
}

impl GrowthModel {
    fn fit(cash_flows: &CashFlowSeries) -> Result<Self> {
        let values = cash_flows.values();
        if values.len() < 2 {
            return Err(AnalysisError::InsufficientData(format!(
                "at least 2 cash flow observations are required, got {}",
                values.len()
            )));
        }

        let mut growth = Vec::with_capacity(values.len() - 1);
        for pair in values.windows(2) {
            if pair[0] == 0.0 {
                return Err(AnalysisError::InsufficientData(
                    "a zero cash flow leaves the following growth rate undefined".to_string(),
                ));
            }
            growth.push((pair[1] - pair[0]) / pair[0]);
        }

        Ok(Self {
            latest: values[values.len() - 1],
            mu: mean(&growth).unwrap_or(0.0),
            sigma: population_std(&growth).unwrap_or(0.0),
        })
    }
}

/// Present value of one growth path, terminal value included.
fn path_npv(latest: f64, path: &[f64], cost_of_capital: f64, terminal_growth: f64) -> f64 {
    let mut cash_flow = latest;
    let mut discount = 1.0;
    let mut npv = 0.0;

    for (t, rate) in path.iter().enumerate() {
        cash_flow *= 1.0 + rate;
        discount *= 1.0 + cost_of_capital;

        let mut flow = cash_flow;
        if t + 1 == path.len() {
            flow += cash_flow * (1.0 + terminal_growth) / (cost_of_capital - terminal_growth);
        }
        npv += flow / discount;
    }

    npv
}

/// Closed-form NPV when every projected year grows at the historical mean.
pub fn deterministic_npv(cash_flows: &CashFlowSeries, params: &DcfParams) -> Result<f64> {
    params.validate()?;
    let model = GrowthModel::fit(cash_flows)?;
    let path = vec![model.mu; params.years];
    Ok(path_npv(
        model.latest,
        &path,
        params.cost_of_capital(),
        params.terminal_growth,
    ))
}

/// Monte Carlo DCF valuation engine
#[derive(Debug, Clone, Default)]
pub struct ValuationEngine {
    config: ValuationConfig,
}

impl ValuationEngine {
    pub fn new(config: ValuationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValuationConfig {
        &self.config
    }

    /// Simulation parameters from the engine settings for a given beta
    pub fn params_for(&self, beta: f64) -> DcfParams {
        DcfParams {
            years: self.config.years,
            simulation_count: self.config.simulation_count,
            risk_free_rate: self.config.risk_free_rate,
            market_risk_premium: self.config.market_risk_premium,
            beta,
            terminal_growth: self.config.terminal_growth,
        }
    }

    /// Run the simulation with a generator seeded from `seed`
    pub fn simulate_dcf_seeded(
        &self,
        cash_flows: &CashFlowSeries,
        params: &DcfParams,
        seed: u64,
    ) -> Result<SimulationResult> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.simulate_dcf(cash_flows, params, &mut rng)
    }

    /// Run the Monte Carlo DCF simulation.
    ///
    /// Fails with `InvalidParameter` when the cost of capital does not exceed
    /// terminal growth (checked first), and with `InsufficientData` when fewer
    /// than two cash flows are available.
    pub fn simulate_dcf<R: RngCore + ?Sized>(
        &self,
        cash_flows: &CashFlowSeries,
        params: &DcfParams,
        rng: &mut R,
    ) -> Result<SimulationResult> {
        params.validate()?;
        let model = GrowthModel::fit(cash_flows)?;
        let distribution = Normal::new(model.mu, model.sigma).map_err(|e| {
            AnalysisError::InvalidParameter(format!("growth distribution is undefined: {e}"))
        })?;

        let chunk_size = self.config.chunk_size.max(1);
        let chunk_count = params.simulation_count.div_ceil(chunk_size);
        let chunks: Vec<(u64, usize)> = (0..chunk_count)
            .map(|i| {
                let trials = chunk_size.min(params.simulation_count - i * chunk_size);
                (rng.next_u64(), trials)
            })
            .collect();

        let coc = params.cost_of_capital();
        let run_chunk = |&(seed, trials): &(u64, usize)| -> Vec<f64> {
            let mut chunk_rng = StdRng::seed_from_u64(seed);
            let mut path = vec![0.0; params.years];
            (0..trials)
                .map(|_| {
                    for rate in &mut path {
                        *rate = distribution.sample(&mut chunk_rng);
                    }
                    path_npv(model.latest, &path, coc, params.terminal_growth)
                })
                .collect()
        };

        let samples: Vec<f64> = match self.config.strategy {
            ExecutionStrategy::Sequential => chunks.iter().flat_map(run_chunk).collect(),
            ExecutionStrategy::Parallel => chunks
                .par_iter()
                .map(run_chunk)
                .collect::<Vec<_>>()
                .concat(),
        };

        tracing::debug!(
            trials = samples.len(),
            mu = model.mu,
            sigma = model.sigma,
            strategy = ?self.config.strategy,
            "DCF simulation finished"
        );

        SimulationResult::from_samples(samples, self.config.keep_samples)
    }
}

/// Qualitative read of fair value against the market price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationVerdict {
    SignificantlyUndervalued,
    SlightlyUndervalued,
    FairlyValued,
    SlightlyOvervalued,
    SignificantlyOvervalued,
}

impl ValuationVerdict {
    /// Classify by `fair_value / current_price`
    pub fn classify(fair_value: f64, current_price: f64) -> Self {
        if fair_value > current_price * 1.2 {
            Self::SignificantlyUndervalued
        } else if fair_value > current_price * 1.05 {
            Self::SlightlyUndervalued
        } else if fair_value < current_price * 0.8 {
            Self::SignificantlyOvervalued
        } else if fair_value < current_price * 0.95 {
            Self::SlightlyOvervalued
        } else {
            Self::FairlyValued
        }
    }
}

/// Valuation section of an analysis report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSection {
    #[serde(flatten)]
    pub simulation: SimulationResult,
    pub beta: f64,
    pub cost_of_capital: f64,
    pub fair_value_per_share: Option<f64>,
    pub current_price: Option<f64>,
    /// Fractional difference of per-share fair value over the current price
    pub upside: Option<f64>,
    pub verdict: Option<ValuationVerdict>,
}

impl ValuationSection {
    pub fn new(simulation: SimulationResult, params: &DcfParams, fundamentals: &Fundamentals) -> Self {
        let fair_value_per_share = fundamentals
            .shares_outstanding
            .filter(|shares| *shares > 0.0)
            .map(|shares| simulation.mean / shares);
        let current_price = fundamentals.current_price.filter(|p| *p > 0.0);

        let (upside, verdict) = match (fair_value_per_share, current_price) {
            (Some(fair), Some(price)) => (
                Some(fair / price - 1.0),
                Some(ValuationVerdict::classify(fair, price)),
            ),
            _ => (None, None),
        };

        Self {
            simulation,
            beta: params.beta,
            cost_of_capital: params.cost_of_capital(),
            fair_value_per_share,
            current_price,
            upside,
            verdict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_params(simulation_count: usize) -> DcfParams {
        DcfParams {
            years: 5,
            simulation_count,
            risk_free_rate: 0.03,
            market_risk_premium: 0.06,
            beta: 1.0,
            terminal_growth: 0.02,
        }
    }

    /// Hand-computed value for 10% growth from 121 over 5 years at 9%.
    fn closed_form_ten_percent() -> f64 {
        let coc: f64 = 0.09;
        let mut npv = 0.0;
        for t in 1..=5 {
            npv += 121.0 * 1.1f64.powi(t) / (1.0 + coc).powi(t);
        }
        let final_flow = 121.0 * 1.1f64.powi(5);
        npv + final_flow * 1.02 / (coc - 0.02) / (1.0 + coc).powi(5)
    }

    #[test]
    fn test_constant_growth_matches_closed_form() {
        let engine = ValuationEngine::default();
        let cash_flows = CashFlowSeries::new([100.0, 110.0, 121.0]);
        let result = engine
            .simulate_dcf_seeded(&cash_flows, &scenario_params(5_000), 42)
            .unwrap();

        let expected = closed_form_ten_percent();
        assert!(
            (result.mean - expected).abs() / expected < 1e-6,
            "mean {} vs closed form {expected}",
            result.mean
        );
        assert!(result.std_dev / expected < 1e-9);
        assert!(result.ci_lower <= result.median && result.median <= result.ci_upper);

        let deterministic = deterministic_npv(&cash_flows, &scenario_params(1)).unwrap();
        assert!((deterministic - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn test_zero_sigma_has_no_spread_for_any_count() {
        let engine = ValuationEngine::default();
        let cash_flows = CashFlowSeries::new([50.0, 55.0, 60.5, 66.55]);
        for count in [1, 10, 1_000, 3_000] {
            let result = engine
                .simulate_dcf_seeded(&cash_flows, &scenario_params(count), 7)
                .unwrap();
            assert_eq!(result.simulation_count, count);
            assert!(result.std_dev / result.mean.abs() < 1e-9);
        }
    }

    #[test]
    fn test_same_seed_is_bit_for_bit_reproducible() {
        let engine = ValuationEngine::new(ValuationConfig {
            keep_samples: true,
            ..Default::default()
        });
        let cash_flows = CashFlowSeries::new([100.0, 120.0, 108.0, 130.0, 125.0]);
        let params = scenario_params(2_000);

        let a = engine.simulate_dcf_seeded(&cash_flows, &params, 99).unwrap();
        let b = engine.simulate_dcf_seeded(&cash_flows, &params, 99).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.mean.to_bits(), b.mean.to_bits());

        let c = engine.simulate_dcf_seeded(&cash_flows, &params, 100).unwrap();
        assert_ne!(a.samples, c.samples);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let cash_flows = CashFlowSeries::new([100.0, 120.0, 108.0, 130.0, 125.0]);
        let params = scenario_params(5_000);
        let base = ValuationConfig {
            chunk_size: 256,
            keep_samples: true,
            ..Default::default()
        };

        let sequential = ValuationEngine::new(base.clone())
            .simulate_dcf_seeded(&cash_flows, &params, 5)
            .unwrap();
        let parallel = ValuationEngine::new(ValuationConfig {
            strategy: ExecutionStrategy::Parallel,
            ..base
        })
        .simulate_dcf_seeded(&cash_flows, &params, 5)
        .unwrap();

        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_noisy_growth_has_spread() {
        let engine = ValuationEngine::default();
        let cash_flows = CashFlowSeries::new([100.0, 130.0, 110.0, 150.0, 140.0]);
        let result = engine
            .simulate_dcf_seeded(&cash_flows, &scenario_params(4_000), 11)
            .unwrap();
        assert!(result.std_dev > 0.0);
        assert!(result.ci_lower < result.median);
        assert!(result.median < result.ci_upper);
        assert!(result.samples.is_none());
    }

    #[test]
    fn test_cost_of_capital_not_above_terminal_growth_is_rejected() {
        let engine = ValuationEngine::default();
        let inputs = [
            (vec![100.0, 110.0, 121.0], 0.01, 0.02, 0.5, 0.04),
            (vec![100.0, 110.0, 121.0], 0.02, 0.0, 1.0, 0.02),
            (vec![5.0], 0.03, 0.06, 1.0, 0.20),
            (vec![], 0.0, 0.0, 0.0, 0.0),
        ];

        for (flows, rf, mrp, beta, g) in inputs {
            let params = DcfParams {
                years: 5,
                simulation_count: 100,
                risk_free_rate: rf,
                market_risk_premium: mrp,
                beta,
                terminal_growth: g,
            };
            let err = engine
                .simulate_dcf_seeded(&CashFlowSeries::new(flows), &params, 1)
                .unwrap_err();
            assert!(matches!(err, AnalysisError::InvalidParameter(_)), "{err}");
        }
    }

    #[test]
    fn test_insufficient_cash_flows() {
        let engine = ValuationEngine::default();
        for flows in [vec![], vec![100.0], vec![f64::NAN, 100.0]] {
            let err = engine
                .simulate_dcf_seeded(&CashFlowSeries::new(flows), &scenario_params(10), 1)
                .unwrap_err();
            assert!(matches!(err, AnalysisError::InsufficientData(_)));
        }

        let err = engine
            .simulate_dcf_seeded(&CashFlowSeries::new([0.0, 10.0]), &scenario_params(10), 1)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData(_)));
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let engine = ValuationEngine::default();
        let params = DcfParams {
            years: 0,
            ..scenario_params(10)
        };
        let err = engine
            .simulate_dcf_seeded(&CashFlowSeries::new([1.0, 2.0]), &params, 1)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidParameter(_)));
    }

    #[test]
    fn test_verdict_thresholds() {
        assert_eq!(
            ValuationVerdict::classify(130.0, 100.0),
            ValuationVerdict::SignificantlyUndervalued
        );
        assert_eq!(
            ValuationVerdict::classify(110.0, 100.0),
            ValuationVerdict::SlightlyUndervalued
        );
        assert_eq!(ValuationVerdict::classify(100.0, 100.0), ValuationVerdict::FairlyValued);
        assert_eq!(
            ValuationVerdict::classify(90.0, 100.0),
            ValuationVerdict::SlightlyOvervalued
        );
        assert_eq!(
            ValuationVerdict::classify(70.0, 100.0),
            ValuationVerdict::SignificantlyOvervalued
        );
    }

    #[test]
    fn test_section_per_share_values() {
        let simulation = SimulationResult {
            mean: 3_000.0,
            std_dev: 10.0,
            ci_lower: 2_900.0,
            ci_upper: 3_100.0,
            median: 3_000.0,
            simulation_count: 10,
            samples: None,
        };
        let fundamentals = Fundamentals::new(vec![1.0, 2.0])
            .with_shares_outstanding(100.0)
            .with_current_price(26.0);
        let section = ValuationSection::new(simulation, &scenario_params(10), &fundamentals);

        assert_eq!(section.fair_value_per_share, Some(30.0));
        assert!((section.upside.unwrap() - (30.0 / 26.0 - 1.0)).abs() < 1e-12);
        assert_eq!(section.verdict, Some(ValuationVerdict::SlightlyUndervalued));
        assert!((section.cost_of_capital - 0.09).abs() < 1e-12);

        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["mean"], 3_000.0);
        assert!(json.get("samples").is_none());
    }
}
