//! Technical indicators over a daily price series
//!
//! Every indicator returns `Option<f64>`: `None` means the value could not be
//! computed from the data at hand and serializes as `null`, so a report can
//! tell "computed zero" apart from "not enough data".

use serde::{Deserialize, Serialize};
use ta::{Next, indicators::SimpleMovingAverage};

use super::stats::{sample_std, simple_returns};
pub use super::stats::simple_returns as daily_returns;
use crate::domain::TimeSeries;

/// Trading days used to annualize daily volatility
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Momentum reading derived from RSI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiSignal {
    Overbought,
    Oversold,
    Neutral,
}

impl RsiSignal {
    pub fn from_rsi(rsi: f64) -> Self {
        if rsi > 70.0 {
            Self::Overbought
        } else if rsi < 30.0 {
            Self::Oversold
        } else {
            Self::Neutral
        }
    }
}

/// Technical section of an analysis report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSection {
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub rsi: Option<f64>,
    pub rsi_signal: Option<RsiSignal>,
    pub volatility: Option<f64>,
    pub returns: Vec<f64>,
}

/// Indicator windows. Defaults: SMA 50/200, RSI 14.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub sma_short_window: usize,
    pub sma_long_window: usize,
    pub rsi_period: usize,
}

impl Default for TechnicalIndicators {
    fn default() -> Self {
        Self {
            sma_short_window: 50,
            sma_long_window: 200,
            rsi_period: 14,
        }
    }
}

impl TechnicalIndicators {
    /// Compute the full technical section for a series
    pub fn calculate(&self, series: &TimeSeries) -> TechnicalSection {
        let closes = series.closes();
        let rsi_value = rsi(&closes, self.rsi_period);

        TechnicalSection {
            sma_50: sma(&closes, self.sma_short_window),
            sma_200: sma(&closes, self.sma_long_window),
            rsi: rsi_value,
            rsi_signal: rsi_value.map(RsiSignal::from_rsi),
            volatility: annualized_volatility(&closes),
            returns: simple_returns(&closes),
        }
    }
}

/// Simple moving average of the trailing `window` closes.
pub fn sma(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window {
        return None;
    }

    let mut indicator = SimpleMovingAverage::new(window).ok()?;
    closes.iter().fold(None, |_, &close| Some(indicator.next(close)))
}

/// Relative strength index over the trailing `period` price changes.
///
/// Uses plain averages of gains and losses. With no losses in the window the
/// ratio is unbounded and the index saturates at 100; a window with neither
/// gains nor losses has no defined value.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let window = &closes[closes.len() - period - 1..];
    let (gains, losses) = window
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold((0.0, 0.0), |(gains, losses), delta| {
            if delta > 0.0 {
                (gains + delta, losses)
            } else {
                (gains, losses - delta)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return (avg_gain > 0.0).then_some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Sample standard deviation of daily returns scaled by sqrt(252).
pub fn annualized_volatility(closes: &[f64]) -> Option<f64> {
    sample_std(&simple_returns(closes)).map(|std| std * TRADING_DAYS_PER_YEAR.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PricePoint;
    use chrono::{Duration, TimeZone, Utc};

    fn series(closes: &[f64]) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PricePoint::new(start + Duration::days(i as i64), c, 1_000))
            .collect();
        TimeSeries::new(points).unwrap()
    }

    #[test]
    fn test_sma_unavailable_below_window() {
        for window in [1usize, 5, 50, 200] {
            for len in 0..window {
                let closes: Vec<f64> = (0..len).map(|i| 10.0 + i as f64).collect();
                assert_eq!(sma(&closes, window), None, "window {window} len {len}");
            }
        }
        assert_eq!(sma(&[1.0, 2.0], 0), None);
    }

    #[test]
    fn test_sma_uses_trailing_window() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((sma(&closes, 3).unwrap() - 4.0).abs() < 1e-12);
        assert!((sma(&closes, 5).unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_rising_series_reaches_100() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes[..14], 14), None);
        assert_eq!(rsi(&closes, 14), Some(100.0));
        assert_eq!(RsiSignal::from_rsi(100.0), RsiSignal::Overbought);
    }

    #[test]
    fn test_rsi_falling_series_reaches_0() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let value = rsi(&closes, 14).unwrap();
        assert!(value.abs() < 1e-12);
        assert_eq!(RsiSignal::from_rsi(value), RsiSignal::Oversold);
    }

    #[test]
    fn test_rsi_flat_series_unavailable() {
        assert_eq!(rsi(&[50.0; 20], 14), None);
    }

    #[test]
    fn test_rsi_mixed_window() {
        // 7 gains of 2, 7 losses of 1 => RS = 2 => RSI = 66.67
        let mut closes = vec![100.0];
        for i in 0..14 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 2.0 } else { last - 1.0 });
        }
        let value = rsi(&closes, 14).unwrap();
        assert!((value - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_needs_two_returns() {
        assert_eq!(annualized_volatility(&[]), None);
        assert_eq!(annualized_volatility(&[10.0, 11.0]), None);
        assert!(annualized_volatility(&[10.0, 11.0, 10.5]).is_some());
    }

    #[test]
    fn test_volatility_constant_growth_is_zero() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        assert!(annualized_volatility(&closes).unwrap() < 1e-9);
    }

    #[test]
    fn test_calculate_short_series_marks_unavailable() {
        let section = TechnicalIndicators::default().calculate(&series(&[10.0, 10.5, 10.2]));
        assert_eq!(section.sma_50, None);
        assert_eq!(section.sma_200, None);
        assert_eq!(section.rsi, None);
        assert_eq!(section.rsi_signal, None);
        assert!(section.volatility.is_some());
        assert_eq!(section.returns.len(), 2);

        let json = serde_json::to_value(&section).unwrap();
        assert!(json["sma_50"].is_null());
    }

    #[test]
    fn test_calculate_long_series() {
        let closes: Vec<f64> = (0..250).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let section = TechnicalIndicators::default().calculate(&series(&closes));
        assert!(section.sma_50.is_some());
        assert!(section.sma_200.is_some());
        let rsi = section.rsi.unwrap();
        assert!((0.0..=100.0).contains(&rsi));
    }
}
