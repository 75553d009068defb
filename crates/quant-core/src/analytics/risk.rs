//! Conditional value-at-risk and CVaR-maximising portfolio weights
//!
//! Returns are signed, so VaR and CVaR are return levels (negative for a
//! loss). "Maximising CVaR" makes the average tail outcome as good as
//! possible.

use serde::{Deserialize, Serialize};

use super::stats::{mean, percentile};
use crate::domain::ReturnsMatrix;
use crate::error::{AnalysisError, Result};

const BISECTION_STEPS: usize = 100;
const BRACKET_DOUBLINGS: usize = 64;
const TARGET_EPSILON: f64 = 1e-12;
const STALL_WINDOW: usize = 10;

/// Risk engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// VaR/CVaR confidence level in `(0, 1)`
    pub confidence_level: f64,
    /// Optimizer iteration cap
    pub max_iterations: usize,
    /// Optimizer converges once its step length falls below this
    pub tolerance: f64,
    /// Length of the normalised ascent step before any halving
    pub initial_step: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            max_iterations: 1000,
            tolerance: 1e-6,
            initial_step: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CvarResult {
    pub var: f64,
    pub cvar: f64,
    pub confidence_level: f64,
}

/// Outcome of a portfolio optimization. Non-convergence is reported here,
/// never as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioOptimization {
    pub weights: Vec<f64>,
    pub cvar: f64,
    pub converged: bool,
    pub iterations: usize,
    pub message: String,
}

/// Risk section of an analysis report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub assets: Vec<String>,
    pub confidence_level: f64,
    /// VaR of the equally weighted portfolio
    pub var: f64,
    /// CVaR of the equally weighted portfolio
    pub cvar: f64,
    pub observations: usize,
    pub optimization: Option<PortfolioOptimization>,
}

#[derive(Debug, Clone, Default)]
pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// VaR and CVaR of a weighted portfolio; equal weights when `weights` is `None`.
    pub fn compute_cvar(&self, returns: &ReturnsMatrix, weights: Option<&[f64]>) -> Result<CvarResult> {
        let alpha = self.tail_fraction()?;
        let n = returns.n_assets();
        let weights = match weights {
            Some(w) if w.len() != n => {
                return Err(AnalysisError::InvalidParameter(format!(
                    "{} weights supplied for {n} assets",
                    w.len()
                )));
            }
            Some(w) => w.to_vec(),
            None => vec![1.0 / n as f64; n],
        };

        let (var, cvar) = tail_statistics(&returns.portfolio_returns(&weights), alpha);
        Ok(CvarResult {
            var,
            cvar,
            confidence_level: self.config.confidence_level,
        })
    }

    /// Weights in `[0, 1]` summing to 1 that maximise portfolio CVaR,
    /// optionally holding the mean portfolio return at `target_return`.
    pub fn optimize_portfolio(
        &self,
        returns: &ReturnsMatrix,
        target_return: Option<f64>,
    ) -> Result<PortfolioOptimization> {
        let alpha = self.tail_fraction()?;
        let means = returns.column_means();

        let Some(target) = target_return else {
            return Ok(self.ascend(returns, alpha, &Polytope::simplex()));
        };

        let (lowest, highest) = means
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), m| (lo.min(*m), hi.max(*m)));

        if !target.is_finite() || target < lowest - TARGET_EPSILON || target > highest + TARGET_EPSILON {
            tracing::warn!(target, lowest, highest, "target return is not reachable");
            let mut fallback = self.ascend(returns, alpha, &Polytope::simplex());
            fallback.converged = false;
            fallback.message = format!(
                "target return {target} is outside the achievable range [{lowest}, {highest}]; \
                 weights ignore the target"
            );
            return Ok(fallback);
        }

        let polytope = if highest - lowest < TARGET_EPSILON {
            // every allocation earns the same mean return
            Polytope::simplex()
        } else {
            Polytope::with_target(means, target)
        };
        Ok(self.ascend(returns, alpha, &polytope))
    }

    /// Equal-weight risk figures plus an optional optimization.
    pub fn risk_profile(
        &self,
        returns: &ReturnsMatrix,
        labels: &[String],
        optimize: bool,
        target_return: Option<f64>,
    ) -> Result<RiskProfile> {
        if labels.len() != returns.n_assets() {
            return Err(AnalysisError::Validation(format!(
                "{} labels supplied for {} assets",
                labels.len(),
                returns.n_assets()
            )));
        }

        let equal = self.compute_cvar(returns, None)?;
        let optimization = if optimize {
            Some(self.optimize_portfolio(returns, target_return)?)
        } else {
            None
        };

        Ok(RiskProfile {
            assets: labels.to_vec(),
            confidence_level: equal.confidence_level,
            var: equal.var,
            cvar: equal.cvar,
            observations: returns.n_observations(),
            optimization,
        })
    }

    fn tail_fraction(&self) -> Result<f64> {
        let confidence = self.config.confidence_level;
        if confidence.is_finite() && confidence > 0.0 && confidence < 1.0 {
            Ok(1.0 - confidence)
        } else {
            Err(AnalysisError::InvalidParameter(format!(
                "confidence level {confidence} must lie strictly between 0 and 1"
            )))
        }
    }

    /// Projected subgradient ascent on CVaR, keeping the best iterate.
    ///
    /// The step stays fixed while the best CVaR keeps improving. After
    /// `STALL_WINDOW` iterations without improvement the search restarts from
    /// the best weights with half the step, and it has converged once the step
    /// drops below `tolerance`.
    fn ascend(&self, returns: &ReturnsMatrix, alpha: f64, polytope: &Polytope) -> PortfolioOptimization {
        let n = returns.n_assets();
        let mut weights = polytope.project(&vec![1.0 / n as f64; n]);
        let mut best_cvar = tail_statistics(&returns.portfolio_returns(&weights), alpha).1;
        let mut best_weights = weights.clone();

        let mut step = self.config.initial_step;
        let mut stalled = 0;
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;

            let gradient = tail_gradient(returns, &weights, alpha);
            let norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
            if norm == 0.0 {
                converged = true;
                break;
            }

            let raised: Vec<f64> = weights
                .iter()
                .zip(&gradient)
                .map(|(w, g)| w + step * g / norm)
                .collect();
            weights = polytope.project(&raised);

            let cvar = tail_statistics(&returns.portfolio_returns(&weights), alpha).1;
            if cvar > best_cvar {
                best_cvar = cvar;
                best_weights.clone_from(&weights);
                stalled = 0;
            } else {
                stalled += 1;
            }

            if stalled >= STALL_WINDOW {
                step *= 0.5;
                stalled = 0;
                weights.clone_from(&best_weights);
                if step < self.config.tolerance {
                    converged = true;
                    break;
                }
            }
        }

        let message = if converged {
            format!("converged after {iterations} iterations")
        } else {
            format!(
                "iteration limit of {} reached with step {step:e} above tolerance {:e}",
                self.config.max_iterations, self.config.tolerance
            )
        };
        tracing::debug!(iterations, converged, step, cvar = best_cvar, "portfolio optimization finished");

        PortfolioOptimization {
            weights: normalize(best_weights),
            cvar: best_cvar,
            converged,
            iterations,
            message,
        }
    }
}

/// `(VaR, CVaR)` of a return sample at tail fraction `alpha`.
fn tail_statistics(portfolio: &[f64], alpha: f64) -> (f64, f64) {
    let var = percentile(portfolio, alpha * 100.0).unwrap_or(0.0);
    let tail: Vec<f64> = portfolio.iter().copied().filter(|r| *r <= var).collect();
    (var, mean(&tail).unwrap_or(var))
}

/// Supergradient of CVaR: the mean asset return over the current tail rows.
fn tail_gradient(returns: &ReturnsMatrix, weights: &[f64], alpha: f64) -> Vec<f64> {
    let portfolio = returns.portfolio_returns(weights);
    let (var, _) = tail_statistics(&portfolio, alpha);

    let mut gradient = vec![0.0; weights.len()];
    let mut count = 0usize;
    for (row, value) in returns.rows().iter().zip(&portfolio) {
        if *value <= var {
            count += 1;
            for (g, r) in gradient.iter_mut().zip(row) {
                *g += r;
            }
        }
    }
    if count > 0 {
        for g in &mut gradient {
            *g /= count as f64;
        }
    }
    gradient
}

/// Remove residual rounding so weights sum to one inside `[0, 1]`.
fn normalize(weights: Vec<f64>) -> Vec<f64> {
    let clamped: Vec<f64> = weights.into_iter().map(|w| w.clamp(0.0, 1.0)).collect();
    let total: f64 = clamped.iter().sum();
    if total <= 0.0 {
        let n = clamped.len() as f64;
        return vec![1.0 / n; clamped.len()];
    }
    clamped.into_iter().map(|w| (w / total).min(1.0)).collect()
}

/// Feasible set `{ w : 0 <= w <= 1, sum(w) = 1, means . w = target }`.
#[derive(Debug, Clone)]
struct Polytope {
    target: Option<(Vec<f64>, f64)>,
}

impl Polytope {
    fn simplex() -> Self {
        Self { target: None }
    }

    fn with_target(means: Vec<f64>, target: f64) -> Self {
        Self {
            target: Some((means, target)),
        }
    }

    /// Euclidean projection. The KKT conditions give
    /// `w_i = clamp(y_i - lambda - nu * m_i, 0, 1)`; `lambda` is found by
    /// bisection on the budget and `nu` by bisection on the target, since both
    /// constraint functions are monotone in their multiplier.
    fn project(&self, y: &[f64]) -> Vec<f64> {
        match &self.target {
            None => project_budget(y),
            Some((means, target)) => {
                let shifted = |nu: f64| -> Vec<f64> {
                    let z: Vec<f64> = y.iter().zip(means).map(|(v, m)| v - nu * m).collect();
                    project_budget(&z)
                };
                let achieved = |w: &[f64]| -> f64 { w.iter().zip(means).map(|(a, b)| a * b).sum() };

                // achieved(nu) is non-increasing in nu
                let mut bound = 1.0;
                for _ in 0..BRACKET_DOUBLINGS {
                    if achieved(&shifted(-bound)) >= *target && achieved(&shifted(bound)) <= *target {
                        break;
                    }
                    bound *= 2.0;
                }

                let (mut lo, mut hi) = (-bound, bound);
                for _ in 0..BISECTION_STEPS {
                    let mid = 0.5 * (lo + hi);
                    if achieved(&shifted(mid)) > *target {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                shifted(0.5 * (lo + hi))
            }
        }
    }
}

/// Projection onto `{ 0 <= w <= 1, sum(w) = 1 }`.
fn project_budget(y: &[f64]) -> Vec<f64> {
    let fill = |lambda: f64| -> f64 { y.iter().map(|v| (v - lambda).clamp(0.0, 1.0)).sum() };

    let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = y.iter().copied().fold(f64::INFINITY, f64::min);
    // fill(min - 1) = n >= 1 and fill(max) = 0
    let (mut lo, mut hi) = (min - 1.0, max);
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if fill(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let lambda = 0.5 * (lo + hi);
    y.iter().map(|v| (v - lambda).clamp(0.0, 1.0)).collect()
}
