use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Asset returns laid out as rows of observations by columns of assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct ReturnsMatrix {
    rows: Vec<Vec<f64>>,
}

impl ReturnsMatrix {
    /// Build from observation rows; every row must have the same, non-zero width.
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(AnalysisError::InsufficientData(
                "returns matrix has no observations".to_string(),
            ));
        };

        let width = first.len();
        if width == 0 {
            return Err(AnalysisError::InsufficientData(
                "returns matrix has no assets".to_string(),
            ));
        }

        for (index, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(AnalysisError::Validation(format!(
                    "returns row {index} has {} assets, expected {width}",
                    row.len()
                )));
            }
            if row.iter().any(|r| !r.is_finite()) {
                return Err(AnalysisError::Validation(format!(
                    "returns row {index} contains a non-finite value"
                )));
            }
        }

        Ok(Self { rows })
    }

    /// Build from per-asset return columns, aligned on their most recent
    /// observations (columns are truncated to the shortest one).
    pub fn from_columns(columns: &[Vec<f64>]) -> Result<Self> {
        let depth = columns.iter().map(Vec::len).min().unwrap_or(0);
        let rows = (0..depth)
            .map(|row| {
                columns
                    .iter()
                    .map(|column| column[column.len() - depth + row])
                    .collect()
            })
            .collect();
        Self::new(rows)
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn n_observations(&self) -> usize {
        self.rows.len()
    }

    pub fn n_assets(&self) -> usize {
        self.rows[0].len()
    }

    /// Mean return of each asset
    pub fn column_means(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_assets()];
        for row in &self.rows {
            for (sum, value) in sums.iter_mut().zip(row) {
                *sum += value;
            }
        }
        let n = self.n_observations() as f64;
        sums.into_iter().map(|s| s / n).collect()
    }

    /// Weighted sum of asset returns per observation. Caller guarantees the
    /// weight vector length matches `n_assets`.
    pub fn portfolio_returns(&self, weights: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.iter().zip(weights).map(|(r, w)| r * w).sum())
            .collect()
    }
}

impl TryFrom<Vec<Vec<f64>>> for ReturnsMatrix {
    type Error = AnalysisError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self> {
        Self::new(rows)
    }
}

impl From<ReturnsMatrix> for Vec<Vec<f64>> {
    fn from(matrix: ReturnsMatrix) -> Self {
        matrix.rows
    }
}
