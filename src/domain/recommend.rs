//! Diversification suggestions from the asset catalog.

use crate::domain::asset::{AssetSeries, align_assets};
use crate::domain::error::PortoptError;
use crate::domain::portfolio::{Portfolio, upstream};
use crate::domain::stats::correlation;
use crate::ports::data_port::MarketDataPort;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const MAX_RECOMMENDATIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub sector: Option<String>,
    pub current_price: Option<f64>,
    /// Mean correlation with the held assets; absent for sector picks.
    pub average_correlation: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub sector_diversification: Vec<Recommendation>,
    pub low_correlation: Vec<Recommendation>,
}

/// Mean pairwise return correlation between `candidate` and each held asset,
/// each pair compared over the dates both traded.
pub fn average_correlation(candidate: &AssetSeries, held: &[AssetSeries]) -> f64 {
    if held.is_empty() {
        return 0.0;
    }
    let total: f64 = held
        .iter()
        .map(|h| {
            let pair = align_assets(&[candidate.clone(), h.clone()]);
            correlation(&pair[0].returns(), &pair[1].returns())
        })
        .sum();
    total / held.len() as f64
}

/// Up to five unheld candidates from sectors the portfolio does not hold,
/// and the five unheld candidates least correlated with the holdings.
pub fn recommend(held: &[AssetSeries], candidates: &[AssetSeries]) -> Recommendations {
    let held_symbols: HashSet<&str> = held.iter().map(|a| a.symbol.as_str()).collect();
    let held_sectors: HashSet<&str> = held.iter().filter_map(|a| a.sector.as_deref()).collect();

    let mut unheld: Vec<&AssetSeries> = candidates
        .iter()
        .filter(|c| !held_symbols.contains(c.symbol.as_str()))
        .collect();
    unheld.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let sector_diversification = unheld
        .iter()
        .filter(|c| c.sector.as_deref().is_some_and(|s| !held_sectors.contains(s)))
        .take(MAX_RECOMMENDATIONS)
        .map(|c| Recommendation {
            symbol: c.symbol.clone(),
            sector: c.sector.clone(),
            current_price: c.latest_price(),
            average_correlation: None,
        })
        .collect();

    let held_with_history: Vec<AssetSeries> =
        held.iter().filter(|a| a.has_history()).cloned().collect();
    let mut scored: Vec<(f64, &AssetSeries)> = unheld
        .par_iter()
        .filter(|c| c.has_history())
        .map(|c| (average_correlation(c, &held_with_history), *c))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.symbol.cmp(&b.1.symbol)));

    let low_correlation = scored
        .into_iter()
        .take(MAX_RECOMMENDATIONS)
        .map(|(avg, c)| Recommendation {
            symbol: c.symbol.clone(),
            sector: c.sector.clone(),
            current_price: c.latest_price(),
            average_correlation: Some(avg),
        })
        .collect();

    Recommendations {
        sector_diversification,
        low_correlation,
    }
}

/// Fetch every catalog asset the portfolio does not hold.
pub fn load_candidates(
    port: &dyn MarketDataPort,
    portfolio: &Portfolio,
    start_date: NaiveDate,
) -> Result<Vec<AssetSeries>, PortoptError> {
    let held: HashSet<String> = portfolio.symbols().into_iter().collect();
    let mut candidates = Vec::new();
    let catalog = port.list_symbols().map_err(upstream("price store"))?;
    for (symbol, sector) in catalog {
        if held.contains(&symbol) {
            continue;
        }
        let history = port
            .asset_price_history(&symbol, start_date)
            .map_err(upstream("price store"))?;
        candidates.push(AssetSeries::new(symbol, sector, 0.0, history));
    }
    tracing::debug!(candidates = candidates.len(), "catalog candidates loaded");
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(symbol: &str, sector: Option<&str>, prices: &[f64]) -> AssetSeries {
        let mut a = AssetSeries::from_prices(symbol, 0.0, prices);
        a.sector = sector.map(str::to_string);
        a
    }

    fn held() -> Vec<AssetSeries> {
        vec![asset("AAA", Some("Tech"), &[10.0, 11.0, 10.5, 12.0, 11.0, 12.5])]
    }

    #[test]
    fn sector_picks_skip_held_sectors_and_symbols() {
        let candidates = vec![
            asset("AAA", Some("Energy"), &[1.0, 2.0]),
            asset("BBB", Some("Tech"), &[1.0, 2.0]),
            asset("CCC", Some("Energy"), &[1.0, 2.0]),
            asset("DDD", None, &[1.0, 2.0]),
        ];
        let r = recommend(&held(), &candidates);
        let symbols: Vec<&str> = r
            .sector_diversification
            .iter()
            .map(|c| c.symbol.as_str())
            .collect();
        assert_eq!(symbols, vec!["CCC"]);
    }

    #[test]
    fn at_most_five_of_each() {
        let candidates: Vec<AssetSeries> = (0..8)
            .map(|i| {
                asset(
                    &format!("S{i}"),
                    Some(&format!("Sector{i}")),
                    &[1.0, 1.0 + i as f64 * 0.1, 1.2, 1.1],
                )
            })
            .collect();
        let r = recommend(&held(), &candidates);
        assert_eq!(r.sector_diversification.len(), 5);
        assert_eq!(r.low_correlation.len(), 5);
    }

    #[test]
    fn low_correlation_is_sorted_ascending() {
        let base = [10.0, 11.0, 10.5, 12.0, 11.0, 12.5];
        let inverse = [10.0, 9.0, 9.5, 8.0, 9.0, 7.5];
        let candidates = vec![
            asset("SAME", Some("Tech"), &base),
            asset("INV", Some("Tech"), &inverse),
            asset("NONE", Some("Tech"), &[]),
        ];
        let r = recommend(&held(), &candidates);
        assert_eq!(r.low_correlation.len(), 2);
        assert_eq!(r.low_correlation[0].symbol, "INV");
        assert!(r.low_correlation[0].average_correlation.unwrap() < 0.0);
        assert_eq!(r.low_correlation[1].symbol, "SAME");
    }
}
