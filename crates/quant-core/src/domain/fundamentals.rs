use serde::{Deserialize, Serialize};

/// Historical free cash flows, oldest first.
///
/// Non-finite entries are dropped on construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f64>", into = "Vec<f64>")]
pub struct CashFlowSeries(Vec<f64>);

impl CashFlowSeries {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self(values.into_iter().filter(|v| v.is_finite()).collect())
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for CashFlowSeries {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl From<CashFlowSeries> for Vec<f64> {
    fn from(series: CashFlowSeries) -> Self {
        series.0
    }
}

/// Company fundamentals as supplied by a market data provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    #[serde(default)]
    pub cash_flows: CashFlowSeries,
    #[serde(default)]
    pub beta: Option<f64>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub shares_outstanding: Option<f64>,
}

impl Fundamentals {
    pub fn new(cash_flows: impl Into<CashFlowSeries>) -> Self {
        Self {
            cash_flows: cash_flows.into(),
            ..Default::default()
        }
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = Some(beta);
        self
    }

    pub fn with_current_price(mut self, price: f64) -> Self {
        self.current_price = Some(price);
        self
    }

    pub fn with_shares_outstanding(mut self, shares: f64) -> Self {
        self.shares_outstanding = Some(shares);
        self
    }
}
