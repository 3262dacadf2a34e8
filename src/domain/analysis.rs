//! Portfolio-level reports built from the statistics, risk and optimizer
//! modules.
//!
//! Every entry point takes an explicit [`AnalysisContext`] owned by the
//! caller. Per-asset gaps and degenerate math never fail a call; they are
//! listed in the returned `diagnostics`. Only an empty portfolio, missing
//! benchmark data, or an unreachable target are errors.

use crate::domain::asset::{AssetSeries, PricePoint, align_assets, common_timeline};
use crate::domain::covariance::CovarianceModel;
use crate::domain::error::PortoptError;
use crate::domain::optimizer::{
    EfficientFrontier, OptimizerSettings, SearchProblem, efficient_frontier,
    find_optimal_weights, sector_concentration,
};
use crate::domain::period::{Period, RiskFreeRates};
use crate::domain::portfolio::Portfolio;
use crate::domain::returns::{base_100, daily_returns, total_return};
use crate::domain::risk::{self, AlphaMetrics, DEFAULT_CVAR_CONFIDENCE};
use crate::domain::stats::{
    DEFAULT_BETA_WINDOW, DEFAULT_EWMA_LAMBDA, RollingBeta, TRADING_DAYS_PER_YEAR,
    annualize_volatility, annualized_mean_return, correlation, ewma_volatility, rolling_beta,
};
use chrono::NaiveDate;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Annual risk-free rate used for the optimizer's Sharpe and Treynor ratios.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.0475;

/// A problem that was recovered from rather than reported as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    MissingPriceHistory { symbol: String },
    NoReturnHistory { symbol: String },
    /// The covariance matrix produced a negative portfolio variance, clamped to 0.
    NonPsdCovariance { radicand: f64 },
    DegradedOptimization { reason: String },
    RelaxedWeightBound { max_weight: f64 },
}

/// Tunables for one analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub optimizer: OptimizerSettings,
    pub risk_free_rate: f64,
    pub rates: RiskFreeRates,
    pub cvar_confidence: f64,
    pub ewma_lambda: f64,
    pub beta_window: usize,
    /// Fixed RNG seed. `None` draws a fresh seed per call.
    pub seed: Option<u64>,
}

impl Default for AnalysisContext {
    fn default() -> Self {
        AnalysisContext {
            optimizer: OptimizerSettings::default(),
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            rates: RiskFreeRates::default(),
            cvar_confidence: DEFAULT_CVAR_CONFIDENCE,
            ewma_lambda: DEFAULT_EWMA_LAMBDA,
            beta_window: DEFAULT_BETA_WINDOW,
            seed: None,
        }
    }
}

impl AnalysisContext {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| rand::thread_rng().next_u64())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    pub period: Period,
    pub expected_return: f64,
    pub volatility: f64,
    pub benchmark_return: f64,
    pub beta: f64,
    pub sharpe_ratio: f64,
    pub tracking_error: f64,
    #[serde(flatten)]
    pub alpha: AlphaMetrics,
}

impl PeriodMetrics {
    fn zero(period: Period) -> Self {
        PeriodMetrics {
            period,
            expected_return: 0.0,
            volatility: 0.0,
            benchmark_return: 0.0,
            beta: 0.0,
            sharpe_ratio: 0.0,
            tracking_error: 0.0,
            alpha: AlphaMetrics::default(),
        }
    }
}

/// Current-state metrics of a portfolio. All fields are zero when the data
/// needed to compute them is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub portfolio_id: String,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub treynor_ratio: f64,
    pub beta: f64,
    pub rolling_beta: RollingBeta,
    pub ewma_volatility: f64,
    pub cvar: f64,
    pub max_drawdown: f64,
    pub total_return: f64,
    pub sector_concentration: f64,
    pub periods: Vec<PeriodMetrics>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceComparison {
    pub dates: Vec<NaiveDate>,
    pub portfolio: Vec<f64>,
    pub benchmark: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub symbols: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
}

/// One line of an optimized allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub symbol: String,
    pub sector: Option<String>,
    pub weight: f64,
    pub current_price: Option<f64>,
    pub expected_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub weights: Vec<f64>,
    pub expected_return: f64,
    pub estimated_risk: f64,
    pub sharpe: f64,
    pub treynor: f64,
    pub cvar: f64,
    pub beta: f64,
    pub sector_concentration: f64,
    pub performance_series: PerformanceComparison,
    pub assets: Vec<AllocationRow>,
    pub seed: u64,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub metrics: PortfolioMetrics,
    pub performance: PerformanceComparison,
    pub correlation: CorrelationMatrix,
}

/// Aligned assets and their covariance model, shared by every entry point.
struct Prepared {
    aligned: Vec<AssetSeries>,
    model: CovarianceModel,
    diagnostics: Vec<Diagnostic>,
}

impl Prepared {
    fn new(portfolio: &Portfolio) -> Result<Self, PortoptError> {
        if portfolio.assets.is_empty() {
            return Err(PortoptError::EmptyPortfolio {
                portfolio: portfolio.id.clone(),
            });
        }
        let aligned = align_assets(&portfolio.assets);
        let model = CovarianceModel::build(&aligned);

        let mut diagnostics = portfolio.diagnostics.clone();
        for symbol in &model.missing_returns {
            let already_reported = diagnostics.iter().any(|d| {
                matches!(d, Diagnostic::MissingPriceHistory { symbol: s } if s == symbol)
            });
            if !already_reported {
                diagnostics.push(Diagnostic::NoReturnHistory {
                    symbol: symbol.clone(),
                });
            }
        }

        Ok(Prepared {
            aligned,
            model,
            diagnostics,
        })
    }

    /// The model, or an empty one when no asset has any returns.
    fn search_model(&self) -> CovarianceModel {
        if self.model.missing_returns.len() == self.model.len() {
            CovarianceModel::default()
        } else {
            self.model.clone()
        }
    }

    fn note_risk(&mut self, weights: &[f64]) -> f64 {
        let estimate = self.model.portfolio_risk(weights);
        if estimate.clamped() {
            tracing::warn!(radicand = estimate.radicand, "negative portfolio variance clamped to 0");
            self.diagnostics.push(Diagnostic::NonPsdCovariance {
                radicand: estimate.radicand,
            });
        }
        estimate.risk
    }
}

/// Portfolio and benchmark levels on the dates both have data.
#[derive(Debug, Default)]
struct MarketView {
    dates: Vec<NaiveDate>,
    portfolio: Vec<f64>,
    benchmark: Vec<f64>,
}

impl MarketView {
    fn portfolio_returns(&self) -> Vec<f64> {
        daily_returns(&self.portfolio)
    }

    fn benchmark_returns(&self) -> Vec<f64> {
        daily_returns(&self.benchmark)
    }

    /// Trailing `days + 1` observations, i.e. `days` returns.
    fn tail(&self, days: usize) -> (Vec<f64>, Vec<f64>) {
        let start = self.portfolio.len().saturating_sub(days + 1);
        (
            daily_returns(&self.portfolio[start..]),
            daily_returns(&self.benchmark[start..]),
        )
    }
}

/// Value the holdings on each date of the common asset/benchmark timeline.
///
/// When any asset carries a quantity the value is `sum(quantity * price)`;
/// otherwise each asset's growth since the first date is weighted by its
/// allocation. Assets without history contribute nothing.
fn market_view(
    assets: &[AssetSeries],
    benchmark: &[PricePoint],
    end_date: Option<NaiveDate>,
) -> MarketView {
    let bench: HashMap<NaiveDate, f64> = benchmark.iter().map(|p| (p.date, p.price)).collect();
    let dates: Vec<NaiveDate> = common_timeline(assets)
        .into_iter()
        .filter(|d| bench.contains_key(d))
        .filter(|d| end_date.is_none_or(|end| *d <= end))
        .collect();
    let Some(&first) = dates.first() else {
        return MarketView::default();
    };

    let held: Vec<&AssetSeries> = assets.iter().filter(|a| a.has_history()).collect();
    let use_quantity = held.iter().any(|a| a.quantity > 0.0);
    let bases: Vec<f64> = held
        .iter()
        .map(|a| a.price_on(first).unwrap_or(0.0))
        .collect();

    let portfolio = dates
        .iter()
        .map(|&date| {
            held.iter()
                .zip(&bases)
                .map(|(asset, &base)| {
                    let price = asset.price_on(date).unwrap_or(0.0);
                    if use_quantity {
                        asset.quantity * price
                    } else if base > 0.0 {
                        asset.weight * price / base
                    } else {
                        0.0
                    }
                })
                .sum()
        })
        .collect();
    let benchmark = dates.iter().map(|d| bench[d]).collect();

    MarketView {
        dates,
        portfolio,
        benchmark,
    }
}

fn require_market_data(portfolio: &Portfolio) -> Result<(), PortoptError> {
    if portfolio.benchmark.is_empty() {
        let since = portfolio
            .assets
            .iter()
            .filter_map(|a| a.history.first().map(|p| p.date.to_string()))
            .min()
            .unwrap_or_else(|| "the requested start date".to_string());
        return Err(PortoptError::NoMarketData { since });
    }
    Ok(())
}

fn period_metrics(view: &MarketView, period: Period, rates: &RiskFreeRates) -> PeriodMetrics {
    let (p, m) = view.tail(period.trading_days());
    if p.len() < 2 {
        tracing::debug!(%period, returns = p.len(), "not enough history for period");
        return PeriodMetrics::zero(period);
    }

    let expected_return = annualized_mean_return(&p);
    let volatility = annualize_volatility(&p);
    let benchmark_return = annualized_mean_return(&m);
    let beta = risk::beta(&p, &m);
    let tracking_error = risk::tracking_error(&p, &m) * TRADING_DAYS_PER_YEAR.sqrt();

    PeriodMetrics {
        period,
        expected_return,
        volatility,
        benchmark_return,
        beta,
        sharpe_ratio: risk::sharpe_ratio(expected_return, volatility, rates.rate(period)),
        tracking_error,
        alpha: AlphaMetrics::compute(
            expected_return,
            beta,
            benchmark_return,
            tracking_error,
            period,
            rates,
        ),
    }
}

/// Current-state metrics: model return and risk of the held weights, plus
/// benchmark-relative measures over the common price history.
pub fn compute_initial_metrics(
    portfolio: &Portfolio,
    ctx: &AnalysisContext,
) -> Result<PortfolioMetrics, PortoptError> {
    let mut prepared = Prepared::new(portfolio)?;
    require_market_data(portfolio)?;

    let weights = portfolio.weights();
    let expected_return = prepared.model.portfolio_return(&weights);
    let volatility = prepared.note_risk(&weights);
    let concentration = sector_concentration(&portfolio.sectors(), &weights);

    let view = market_view(&prepared.aligned, &portfolio.benchmark, None);
    let p = view.portfolio_returns();
    let m = view.benchmark_returns();

    let mut metrics = PortfolioMetrics {
        portfolio_id: portfolio.id.clone(),
        expected_return,
        volatility,
        sharpe_ratio: risk::sharpe_ratio(expected_return, volatility, ctx.risk_free_rate),
        sector_concentration: concentration,
        ..PortfolioMetrics::default()
    };

    if p.len() < 2 {
        tracing::warn!(
            portfolio = %portfolio.id,
            "portfolio and benchmark share too little history, market metrics left at 0"
        );
    } else {
        let beta = risk::beta(&p, &m);
        metrics.beta = beta;
        metrics.treynor_ratio = risk::treynor_ratio(expected_return, beta, ctx.risk_free_rate);
        metrics.rolling_beta = rolling_beta(&p, &m, ctx.beta_window);
        metrics.ewma_volatility = ewma_volatility(&p, ctx.ewma_lambda);
        metrics.cvar = risk::cvar(&p, ctx.cvar_confidence);
        metrics.max_drawdown = risk::max_drawdown(&view.portfolio);
        metrics.total_return = total_return(&view.portfolio);
        metrics.periods = Period::ALL
            .iter()
            .map(|&period| period_metrics(&view, period, &ctx.rates))
            .collect();
    }

    metrics.diagnostics = prepared.diagnostics;
    tracing::info!(portfolio = %portfolio.id, "initial metrics computed");
    Ok(metrics)
}

/// Base-100 portfolio value against the benchmark, optionally cut off at
/// `end_date`.
pub fn performance_comparison(
    portfolio: &Portfolio,
    end_date: Option<NaiveDate>,
) -> PerformanceComparison {
    let view = market_view(&portfolio.assets, &portfolio.benchmark, end_date);
    comparison_from(view)
}

fn comparison_from(view: MarketView) -> PerformanceComparison {
    let portfolio = base_100(&view.portfolio);
    let benchmark = base_100(&view.benchmark);
    if portfolio.len() != view.dates.len() || benchmark.len() != view.dates.len() {
        tracing::warn!("performance series starts at zero, comparison left empty");
        return PerformanceComparison::default();
    }
    PerformanceComparison {
        dates: view.dates,
        portfolio,
        benchmark,
    }
}

/// Pairwise correlation of daily returns over the assets' common dates.
/// Assets with no history correlate `0` with everything, themselves included.
pub fn compute_correlation_matrix(assets: &[AssetSeries]) -> CorrelationMatrix {
    let aligned = align_assets(assets);
    let returns: Vec<Vec<f64>> = aligned.iter().map(|a| a.returns()).collect();
    let n = returns.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let c = correlation(&returns[i], &returns[j]);
            matrix[i][j] = c;
            matrix[j][i] = c;
        }
    }
    CorrelationMatrix {
        symbols: aligned.iter().map(|a| a.symbol.clone()).collect(),
        matrix,
    }
}

/// Model expected return of the held weights, the default optimization
/// target. Clamped into the reachable range so weights that sum to one only
/// within tolerance still give a valid target.
pub fn current_expected_return(portfolio: &Portfolio) -> Result<f64, PortoptError> {
    let prepared = Prepared::new(portfolio)?;
    let current = prepared.model.portfolio_return(&portfolio.weights());
    Ok(match prepared.search_model().return_range() {
        Some((min, max)) => current.clamp(min, max),
        None => current,
    })
}

/// Search for the allocation closest to `target_return` under the configured
/// constraints and report its metrics.
pub fn optimize(
    portfolio: &Portfolio,
    target_return: f64,
    risk_tolerance: f64,
    ctx: &AnalysisContext,
) -> Result<OptimizationResult, PortoptError> {
    let mut prepared = Prepared::new(portfolio)?;
    require_market_data(portfolio)?;

    if !risk_tolerance.is_finite() || !(0.0..=1.0).contains(&risk_tolerance) {
        return Err(PortoptError::invalid_input(format!(
            "risk tolerance {risk_tolerance} is outside [0, 1]"
        )));
    }

    let search_model = prepared.search_model();
    if let Some((min, max)) = search_model.return_range() {
        let slack = 1e-12;
        if !target_return.is_finite() || target_return < min - slack || target_return > max + slack {
            return Err(PortoptError::TargetOutOfRange {
                target: target_return,
                min,
                max,
            });
        }
    }

    let seed = ctx.resolve_seed();
    let current = portfolio.weights();
    let sectors = portfolio.sectors();
    let problem = SearchProblem {
        model: &search_model,
        sectors: &sectors,
        target_return,
        risk_tolerance,
    };
    let outcome = find_optimal_weights(&problem, &current, &ctx.optimizer, seed)?;
    if let Some(max_weight) = outcome.relaxed_max_weight {
        prepared
            .diagnostics
            .push(Diagnostic::RelaxedWeightBound { max_weight });
    }
    if let Some(reason) = &outcome.degraded {
        prepared.diagnostics.push(Diagnostic::DegradedOptimization {
            reason: reason.clone(),
        });
    }

    let weights = outcome.weights;
    let expected_return = prepared.model.portfolio_return(&weights);
    let estimated_risk = prepared.note_risk(&weights);

    let reweighted: Vec<AssetSeries> = prepared
        .aligned
        .iter()
        .zip(&weights)
        .map(|(asset, &w)| {
            let mut a = asset.clone();
            a.weight = w;
            a.quantity = 0.0;
            a
        })
        .collect();
    let view = market_view(&reweighted, &portfolio.benchmark, None);
    let p = view.portfolio_returns();
    let m = view.benchmark_returns();
    // too little shared history: market-neutral beta
    let (beta, cvar) = if p.len() < 2 {
        (1.0, 0.0)
    } else {
        (risk::beta(&p, &m), risk::cvar(&p, ctx.cvar_confidence))
    };

    let assets = portfolio
        .assets
        .iter()
        .zip(&weights)
        .zip(&prepared.model.expected_returns)
        .map(|((asset, &weight), &expected_return)| AllocationRow {
            symbol: asset.symbol.clone(),
            sector: asset.sector.clone(),
            weight,
            current_price: asset.latest_price(),
            expected_return,
        })
        .collect();

    tracing::info!(
        portfolio = %portfolio.id,
        target_return,
        risk_tolerance,
        seed,
        expected_return,
        estimated_risk,
        "optimization finished"
    );

    Ok(OptimizationResult {
        sharpe: risk::sharpe_ratio(expected_return, estimated_risk, ctx.risk_free_rate),
        treynor: risk::treynor_ratio(expected_return, beta, ctx.risk_free_rate),
        cvar,
        beta,
        sector_concentration: sector_concentration(&sectors, &weights),
        performance_series: comparison_from(view),
        assets,
        expected_return,
        estimated_risk,
        weights,
        seed,
        diagnostics: prepared.diagnostics,
    })
}

/// Efficient frontier across the portfolio's per-asset return range.
pub fn compute_efficient_frontier(
    portfolio: &Portfolio,
    ctx: &AnalysisContext,
) -> Result<EfficientFrontier, PortoptError> {
    let prepared = Prepared::new(portfolio)?;
    let model = prepared.search_model();
    let seed = ctx.resolve_seed();
    let frontier = efficient_frontier(
        &model,
        &portfolio.sectors(),
        &portfolio.weights(),
        &ctx.optimizer,
        seed,
    )?;
    tracing::info!(
        portfolio = %portfolio.id,
        points = frontier.points.len(),
        seed,
        "efficient frontier computed"
    );
    Ok(frontier)
}

/// Metrics, performance comparison and correlation matrix in one report.
pub fn analyze_portfolio(
    portfolio: &Portfolio,
    ctx: &AnalysisContext,
    end_date: Option<NaiveDate>,
) -> Result<PortfolioReport, PortoptError> {
    let metrics = compute_initial_metrics(portfolio, ctx)?;
    Ok(PortfolioReport {
        metrics,
        performance: performance_comparison(portfolio, end_date),
        correlation: compute_correlation_matrix(&portfolio.assets),
    })
}
