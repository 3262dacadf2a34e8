//! Risk-adjusted performance ratios and tail/drawdown measures.

use crate::domain::period::{Period, RiskFreeRates};
use crate::domain::stats::{covariance, variance};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CVAR_CONFIDENCE: f64 = 0.95;

/// Regression slope of portfolio on market returns. A flat market (zero
/// variance) is treated as market-neutral and yields `1`.
pub fn beta(portfolio_returns: &[f64], market_returns: &[f64]) -> f64 {
    let market_var = variance(market_returns);
    if market_var == 0.0 {
        tracing::debug!("market variance is zero, beta defaults to 1");
        return 1.0;
    }
    covariance(portfolio_returns, market_returns) / market_var
}

pub fn sharpe_ratio(portfolio_return: f64, risk: f64, risk_free_rate: f64) -> f64 {
    if risk == 0.0 {
        return 0.0;
    }
    (portfolio_return - risk_free_rate) / risk
}

pub fn treynor_ratio(portfolio_return: f64, beta: f64, risk_free_rate: f64) -> f64 {
    if beta == 0.0 {
        return 0.0;
    }
    (portfolio_return - risk_free_rate) / beta
}

/// Historical conditional value at risk: mean of the worst
/// `floor((1 - confidence) * n)` returns, or the single worst return when that
/// count is zero. Empty input gives `0`.
pub fn cvar(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let cutoff = ((1.0 - confidence) * returns.len() as f64).floor() as usize;
    if cutoff == 0 {
        return sorted[0];
    }
    let tail = &sorted[..cutoff.min(sorted.len())];
    tail.iter().sum::<f64>() / tail.len() as f64
}

/// Largest peak-to-trough decline as a fraction of the running peak.
pub fn max_drawdown(prices: &[f64]) -> f64 {
    let Some(&first) = prices.first() else {
        return 0.0;
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &price in prices {
        if price > peak {
            peak = price;
        } else if peak > 0.0 {
            let dd = (peak - price) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Daily tracking error: sample standard deviation of `portfolio - benchmark`.
/// Mismatched or too-short series give `0`.
pub fn tracking_error(portfolio_returns: &[f64], benchmark_returns: &[f64]) -> f64 {
    if portfolio_returns.len() != benchmark_returns.len() || portfolio_returns.len() < 2 {
        return 0.0;
    }
    let diffs: Vec<f64> = portfolio_returns
        .iter()
        .zip(benchmark_returns)
        .map(|(p, b)| p - b)
        .collect();
    variance(&diffs).sqrt()
}

/// `portfolio_return - (rf + beta * (market_return - rf))`
pub fn jensen_alpha(portfolio_return: f64, beta: f64, market_return: f64, risk_free_rate: f64) -> f64 {
    portfolio_return - (risk_free_rate + beta * (market_return - risk_free_rate))
}

pub fn information_ratio(portfolio_return: f64, market_return: f64, tracking_error: f64) -> f64 {
    if tracking_error == 0.0 {
        return 0.0;
    }
    (portfolio_return - market_return) / tracking_error
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlphaMetrics {
    pub jensen_alpha: f64,
    pub treynor_ratio: f64,
    pub information_ratio: f64,
}

impl AlphaMetrics {
    /// Alpha, Treynor and information ratio against the period's risk-free rate.
    pub fn compute(
        portfolio_return: f64,
        beta: f64,
        market_return: f64,
        tracking_error: f64,
        period: Period,
        rates: &RiskFreeRates,
    ) -> Self {
        let rf = rates.rate(period);
        AlphaMetrics {
            jensen_alpha: jensen_alpha(portfolio_return, beta, market_return, rf),
            treynor_ratio: treynor_ratio(portfolio_return, beta, rf),
            information_ratio: information_ratio(portfolio_return, market_return, tracking_error),
        }
    }
}
