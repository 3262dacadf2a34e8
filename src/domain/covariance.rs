//! Annualized covariance structure and expected returns for a set of assets.
//!
//! Convention: every covariance entry produced here is annualized
//! (`sample covariance * 252`). Raw daily statistics live in [`crate::domain::stats`].

use crate::domain::asset::AssetSeries;
use crate::domain::stats::{TRADING_DAYS_PER_YEAR, annualized_mean_return, covariance};
use serde::{Deserialize, Serialize};

/// N x N symmetric matrix over a fixed asset ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    pub symbols: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CovarianceMatrix {
    pub fn from_values(symbols: Vec<String>, values: Vec<Vec<f64>>) -> Self {
        CovarianceMatrix { symbols, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values
            .get(i)
            .and_then(|row| row.get(j))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Build the annualized covariance matrix from each asset's daily returns.
///
/// Pairs whose return vectors differ in length get `0` (see
/// [`covariance`]); align assets first with
/// [`align_assets`](crate::domain::asset::align_assets).
pub fn build_covariance_matrix(assets: &[AssetSeries]) -> CovarianceMatrix {
    let returns: Vec<Vec<f64>> = assets.iter().map(|a| a.returns()).collect();
    let n = assets.len();
    let mut values = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in i..n {
            if returns[i].len() != returns[j].len() {
                tracing::debug!(
                    a = %assets[i].symbol,
                    b = %assets[j].symbol,
                    "return series lengths differ, covariance set to 0"
                );
            }
            let c = covariance(&returns[i], &returns[j]) * TRADING_DAYS_PER_YEAR;
            values[i][j] = c;
            values[j][i] = c;
        }
    }

    CovarianceMatrix {
        symbols: assets.iter().map(|a| a.symbol.clone()).collect(),
        values,
    }
}

/// Per-asset `(1 + mean daily return)^252 - 1`. Assets with no returns
/// contribute `0` and are reported back by symbol.
pub fn expected_returns(assets: &[AssetSeries]) -> (Vec<f64>, Vec<String>) {
    let mut missing = Vec::new();
    let values = assets
        .iter()
        .map(|asset| {
            let returns = asset.returns();
            if returns.is_empty() {
                tracing::warn!(symbol = %asset.symbol, "no return history, expected return set to 0");
                missing.push(asset.symbol.clone());
                return 0.0;
            }
            let annual = annualized_mean_return(&returns);
            tracing::debug!(symbol = %asset.symbol, expected_return = annual);
            annual
        })
        .collect();
    (values, missing)
}

/// Weighted sum of expected returns; `0` when the lengths disagree.
pub fn portfolio_return(weights: &[f64], expected_returns: &[f64]) -> f64 {
    if weights.len() != expected_returns.len() {
        return 0.0;
    }
    weights
        .iter()
        .zip(expected_returns)
        .map(|(w, r)| w * r)
        .sum()
}

/// Portfolio volatility with the raw quadratic form kept for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskEstimate {
    pub risk: f64,
    /// `w' * C * w` before clamping.
    pub radicand: f64,
}

impl RiskEstimate {
    /// True when the covariance matrix produced a negative variance, which
    /// only happens if it is not positive semi-definite.
    pub fn clamped(&self) -> bool {
        self.radicand < 0.0
    }
}

pub fn portfolio_risk_estimate(weights: &[f64], covariance: &CovarianceMatrix) -> RiskEstimate {
    if weights.is_empty() || covariance.is_empty() {
        return RiskEstimate {
            risk: 0.0,
            radicand: 0.0,
        };
    }

    let mut radicand = 0.0;
    for (i, wi) in weights.iter().enumerate() {
        for (j, wj) in weights.iter().enumerate() {
            radicand += wi * wj * covariance.get(i, j);
        }
    }

    RiskEstimate {
        risk: radicand.max(0.0).sqrt(),
        radicand,
    }
}

/// `sqrt(max(0, w' * C * w))`. A negative radicand is clamped silently; use
/// [`portfolio_risk_estimate`] to detect it.
pub fn portfolio_risk(weights: &[f64], covariance: &CovarianceMatrix) -> f64 {
    portfolio_risk_estimate(weights, covariance).risk
}

/// Covariance and expected returns of one asset pool, in a fixed order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CovarianceModel {
    pub covariance: CovarianceMatrix,
    pub expected_returns: Vec<f64>,
    /// Symbols that had no return history.
    pub missing_returns: Vec<String>,
}

impl CovarianceModel {
    pub fn build(assets: &[AssetSeries]) -> Self {
        let covariance = build_covariance_matrix(assets);
        let (expected_returns, missing_returns) = expected_returns(assets);
        CovarianceModel {
            covariance,
            expected_returns,
            missing_returns,
        }
    }

    pub fn from_parts(covariance: CovarianceMatrix, expected_returns: Vec<f64>) -> Self {
        CovarianceModel {
            covariance,
            expected_returns,
            missing_returns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.expected_returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covariance.is_empty() || self.expected_returns.is_empty()
    }

    pub fn portfolio_return(&self, weights: &[f64]) -> f64 {
        portfolio_return(weights, &self.expected_returns)
    }

    pub fn portfolio_risk(&self, weights: &[f64]) -> RiskEstimate {
        portfolio_risk_estimate(weights, &self.covariance)
    }

    /// `(min, max)` of the per-asset expected returns.
    pub fn return_range(&self) -> Option<(f64, f64)> {
        if self.expected_returns.is_empty() {
            return None;
        }
        let min = self.expected_returns.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self
            .expected_returns
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }
}
