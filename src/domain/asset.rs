//! Asset price history, portfolio holdings and date alignment.

use crate::domain::returns::daily_returns;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// One dated observation of an asset or benchmark price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// A single line of a stored portfolio composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub sector: Option<String>,
    /// Fraction of the portfolio, in `[0, 1]`.
    pub weight: f64,
    pub quantity: f64,
    pub purchase_price: f64,
}

#[derive(Debug, Clone)]
pub struct AssetSeries {
    pub symbol: String,
    pub sector: Option<String>,
    pub weight: f64,
    pub quantity: f64,
    pub history: Vec<PricePoint>,
    date_index: HashMap<NaiveDate, usize>,
}

impl AssetSeries {
    pub fn new(
        symbol: impl Into<String>,
        sector: Option<String>,
        weight: f64,
        history: Vec<PricePoint>,
    ) -> Self {
        let date_index = history
            .iter()
            .enumerate()
            .map(|(i, p)| (p.date, i))
            .collect();
        Self {
            symbol: symbol.into(),
            sector,
            weight,
            quantity: 0.0,
            history,
            date_index,
        }
    }

    pub fn from_holding(holding: &Holding, history: Vec<PricePoint>) -> Self {
        let mut series = Self::new(
            holding.symbol.clone(),
            holding.sector.clone(),
            holding.weight,
            history,
        );
        series.quantity = holding.quantity;
        series
    }

    /// Series with bare prices and synthetic consecutive dates, for callers
    /// that only have an ordered price list.
    pub fn from_prices(symbol: impl Into<String>, weight: f64, prices: &[f64]) -> Self {
        let base = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
        let history = prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint {
                date: base + chrono::Duration::days(i as i64),
                price,
            })
            .collect();
        Self::new(symbol, None, weight, history)
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn prices(&self) -> Vec<f64> {
        self.history.iter().map(|p| p.price).collect()
    }

    pub fn returns(&self) -> Vec<f64> {
        daily_returns(&self.prices())
    }

    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn latest_price(&self) -> Option<f64> {
        self.history.last().map(|p| p.price)
    }

    pub fn price_on(&self, date: NaiveDate) -> Option<f64> {
        self.date_index.get(&date).map(|&i| self.history[i].price)
    }

    /// Restrict the history to the given dates. Dates the asset does not
    /// trade on are dropped.
    pub fn aligned_to(&self, timeline: &[NaiveDate]) -> AssetSeries {
        let history = timeline
            .iter()
            .filter_map(|&date| self.price_on(date).map(|price| PricePoint { date, price }))
            .collect();
        let mut aligned = AssetSeries::new(
            self.symbol.clone(),
            self.sector.clone(),
            self.weight,
            history,
        );
        aligned.quantity = self.quantity;
        aligned
    }
}

/// Dates on which every asset that has any history traded. Assets with an
/// empty history do not constrain the timeline.
pub fn common_timeline(assets: &[AssetSeries]) -> Vec<NaiveDate> {
    let mut with_history = assets.iter().filter(|a| a.has_history());
    let Some(first) = with_history.next() else {
        return Vec::new();
    };
    let mut dates: BTreeSet<NaiveDate> = first.history.iter().map(|p| p.date).collect();
    for asset in with_history {
        dates.retain(|d| asset.date_index.contains_key(d));
    }
    dates.into_iter().collect()
}

/// Align every asset onto [`common_timeline`] so their return vectors share
/// one length and one date ordering.
pub fn align_assets(assets: &[AssetSeries]) -> Vec<AssetSeries> {
    let timeline = common_timeline(assets);
    assets
        .iter()
        .map(|a| {
            if a.has_history() {
                a.aligned_to(&timeline)
            } else {
                a.clone()
            }
        })
        .collect()
}
