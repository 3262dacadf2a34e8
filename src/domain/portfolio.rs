//! Portfolio assembly: holdings plus freshly fetched price history.
//!
//! Per-asset gaps are absorbed here (the asset keeps an empty history and a
//! diagnostic is recorded). A failing data store or a portfolio with no
//! holdings aborts the load.

use crate::domain::analysis::Diagnostic;
use crate::domain::asset::{AssetSeries, Holding, PricePoint};
use crate::domain::error::PortoptError;
use crate::ports::data_port::MarketDataPort;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// Tolerance on the sum of simulated allocation weights.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Everything one analysis call needs, owned by that call.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub id: String,
    pub assets: Vec<AssetSeries>,
    pub benchmark: Vec<PricePoint>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Portfolio {
    pub fn weights(&self) -> Vec<f64> {
        self.assets.iter().map(|a| a.weight).collect()
    }

    pub fn sectors(&self) -> Vec<Option<String>> {
        self.assets.iter().map(|a| a.sector.clone()).collect()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.symbol.clone()).collect()
    }
}

pub(crate) fn upstream(source_name: &str) -> impl Fn(PortoptError) -> PortoptError + '_ {
    move |e| match e {
        PortoptError::UpstreamUnavailable { .. } => e,
        other => PortoptError::UpstreamUnavailable {
            source_name: source_name.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Load a stored portfolio and the price history of each holding since
/// `start_date`.
pub fn load_portfolio(
    port: &dyn MarketDataPort,
    portfolio_id: &str,
    start_date: NaiveDate,
) -> Result<Portfolio, PortoptError> {
    let holdings = port
        .portfolio_composition(portfolio_id)
        .map_err(upstream("portfolio store"))?;
    if holdings.is_empty() {
        return Err(PortoptError::EmptyPortfolio {
            portfolio: portfolio_id.to_string(),
        });
    }
    load_holdings(port, portfolio_id, &holdings, start_date)
}

/// Build an ad-hoc portfolio from `(symbol, weight)` pairs. Sectors are taken
/// from the catalog when it knows the symbol.
pub fn simulate_portfolio(
    port: &dyn MarketDataPort,
    allocations: &[(String, f64)],
    start_date: NaiveDate,
) -> Result<Portfolio, PortoptError> {
    if allocations.is_empty() {
        return Err(PortoptError::EmptyPortfolio {
            portfolio: "simulation".to_string(),
        });
    }
    let total: f64 = allocations.iter().map(|(_, w)| w).sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(PortoptError::invalid_input(format!(
            "simulated weights sum to {total:.6}, expected 1"
        )));
    }

    let catalog: HashMap<String, Option<String>> = port
        .list_symbols()
        .map_err(upstream("price store"))?
        .into_iter()
        .collect();

    let holdings: Vec<Holding> = allocations
        .iter()
        .map(|(symbol, weight)| Holding {
            symbol: symbol.clone(),
            sector: catalog.get(symbol).cloned().flatten(),
            weight: *weight,
            quantity: 0.0,
            purchase_price: 0.0,
        })
        .collect();

    load_holdings(port, "simulation", &holdings, start_date)
}

fn validate_holdings(holdings: &[Holding]) -> Result<(), PortoptError> {
    let mut seen = HashSet::new();
    for h in holdings {
        if h.symbol.trim().is_empty() {
            return Err(PortoptError::invalid_input("holding with empty symbol"));
        }
        if !h.weight.is_finite() || !(0.0..=1.0).contains(&h.weight) {
            return Err(PortoptError::invalid_input(format!(
                "weight {} for {} is outside [0, 1]",
                h.weight, h.symbol
            )));
        }
        if !h.quantity.is_finite() || h.quantity < 0.0 {
            return Err(PortoptError::invalid_input(format!(
                "quantity {} for {} must be non-negative",
                h.quantity, h.symbol
            )));
        }
        if !seen.insert(h.symbol.as_str()) {
            return Err(PortoptError::invalid_input(format!(
                "duplicate holding {}",
                h.symbol
            )));
        }
    }
    Ok(())
}

fn load_holdings(
    port: &dyn MarketDataPort,
    portfolio_id: &str,
    holdings: &[Holding],
    start_date: NaiveDate,
) -> Result<Portfolio, PortoptError> {
    validate_holdings(holdings)?;

    let mut assets = Vec::with_capacity(holdings.len());
    let mut diagnostics = Vec::new();

    for holding in holdings {
        let history = port
            .asset_price_history(&holding.symbol, start_date)
            .map_err(upstream("price store"))?;
        if history.is_empty() {
            tracing::warn!(symbol = %holding.symbol, "no price history, asset contributes 0");
            diagnostics.push(Diagnostic::MissingPriceHistory {
                symbol: holding.symbol.clone(),
            });
        } else {
            tracing::debug!(symbol = %holding.symbol, points = history.len(), "loaded price history");
        }
        assets.push(AssetSeries::from_holding(holding, history));
    }

    let benchmark = port
        .benchmark_series(start_date)
        .map_err(upstream("benchmark"))?;
    if benchmark.is_empty() {
        tracing::warn!(%start_date, "benchmark series is empty");
    }

    tracing::info!(
        portfolio = portfolio_id,
        assets = assets.len(),
        gaps = diagnostics.len(),
        "portfolio loaded"
    );

    Ok(Portfolio {
        id: portfolio_id.to_string(),
        assets,
        benchmark,
        diagnostics,
    })
}

/// Parse `"AAPL:0.5,MSFT:0.5"` into upper-cased `(symbol, weight)` pairs.
pub fn parse_allocations(input: &str) -> Result<Vec<(String, f64)>, PortoptError> {
    let mut allocations = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(PortoptError::invalid_input("empty entry in allocation list"));
        }
        let (symbol, weight) = trimmed.split_once(':').ok_or_else(|| {
            PortoptError::invalid_input(format!("expected SYMBOL:WEIGHT, got '{trimmed}'"))
        })?;
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(PortoptError::invalid_input(format!("missing symbol in '{trimmed}'")));
        }
        let weight: f64 = weight.trim().parse().map_err(|_| {
            PortoptError::invalid_input(format!("invalid weight in '{trimmed}'"))
        })?;
        if !seen.insert(symbol.clone()) {
            return Err(PortoptError::invalid_input(format!("duplicate symbol {symbol}")));
        }
        allocations.push((symbol, weight));
    }

    Ok(allocations)
}
