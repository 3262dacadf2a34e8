//! Sample statistics over return series.
//!
//! All dispersion measures use the sample divisor `n - 1` and are *daily*
//! quantities. Annualization is the caller's decision: multiply variances and
//! covariances by [`TRADING_DAYS_PER_YEAR`], standard deviations by its square
//! root (see [`annualize_volatility`]).

use serde::{Deserialize, Serialize};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub const DEFAULT_EWMA_LAMBDA: f64 = 0.94;
pub const DEFAULT_BETA_WINDOW: usize = 60;

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance; `0` for fewer than two observations.
pub fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

/// Sample covariance; `0` when the lengths differ or there are fewer than two
/// observations.
pub fn covariance(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() != ys.len() || xs.len() < 2 {
        return 0.0;
    }
    let mx = mean(xs);
    let my = mean(ys);
    xs.iter()
        .zip(ys)
        .map(|(x, y)| (x - mx) * (y - my))
        .sum::<f64>()
        / (xs.len() - 1) as f64
}

/// Pearson correlation; `0` if either series has zero dispersion.
pub fn correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let sx = variance(xs).sqrt();
    let sy = variance(ys).sqrt();
    if sx == 0.0 || sy == 0.0 {
        return 0.0;
    }
    covariance(xs, ys) / (sx * sy)
}

/// Sample standard deviation, optionally over log returns `ln(1 + r)`.
pub fn standard_deviation(returns: &[f64], use_log: bool) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    if use_log {
        let logs: Vec<f64> = returns.iter().map(|r| (1.0 + r).ln()).collect();
        variance(&logs).sqrt()
    } else {
        variance(returns).sqrt()
    }
}

/// Annualized log-return volatility: `standard_deviation(returns, true) * sqrt(252)`.
pub fn annualize_volatility(returns: &[f64]) -> f64 {
    standard_deviation(returns, true) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// `(1 + mean daily return)^252 - 1`; `0` for an empty series.
pub fn annualized_mean_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    (1.0 + mean(returns)).powf(TRADING_DAYS_PER_YEAR) - 1.0
}

/// RiskMetrics-style exponentially weighted volatility.
///
/// `v_0 = r_0^2`, `v_t = lambda * v_{t-1} + (1 - lambda) * r_t^2`, result is
/// `sqrt(v_last)`. Fewer than two returns gives `0`.
pub fn ewma_volatility(returns: &[f64], lambda: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mut v = returns[0] * returns[0];
    for r in &returns[1..] {
        v = lambda * v + (1.0 - lambda) * r * r;
    }
    v.sqrt()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingBeta {
    pub current_beta: f64,
    /// Blume adjustment: `2/3 * mean(rolling) + 1/3`.
    pub adjusted_beta: f64,
    pub rolling_betas: Vec<f64>,
}

/// Beta over each trailing window of `window` observations.
///
/// Series of different length are compared over their most recent common
/// span. A window with zero market variance contributes a beta of `0`. When
/// not a single full window fits, every field is zero/empty.
pub fn rolling_beta(portfolio: &[f64], market: &[f64], window: usize) -> RollingBeta {
    let n = portfolio.len().min(market.len());
    if window < 2 || n < window {
        return RollingBeta::default();
    }
    let portfolio = &portfolio[portfolio.len() - n..];
    let market = &market[market.len() - n..];

    let rolling_betas: Vec<f64> = (window..=n)
        .map(|end| {
            let p = &portfolio[end - window..end];
            let m = &market[end - window..end];
            let market_var = variance(m);
            if market_var == 0.0 {
                0.0
            } else {
                covariance(p, m) / market_var
            }
        })
        .collect();

    let current_beta = rolling_betas.last().copied().unwrap_or(0.0);
    let adjusted_beta = (2.0 / 3.0) * mean(&rolling_betas) + (1.0 / 3.0);

    RollingBeta {
        current_beta,
        adjusted_beta,
        rolling_betas,
    }
}
