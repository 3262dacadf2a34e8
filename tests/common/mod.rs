#![allow(dead_code)]

use chrono::NaiveDate;
pub use portopt::domain::asset::{Holding, PricePoint};
use portopt::domain::error::PortoptError;
use portopt::ports::data_port::MarketDataPort;
use std::collections::{BTreeMap, HashMap};

pub struct MockDataPort {
    pub prices: BTreeMap<String, Vec<PricePoint>>,
    pub sectors: HashMap<String, String>,
    pub benchmark: Vec<PricePoint>,
    pub portfolios: HashMap<String, Vec<Holding>>,
    pub errors: HashMap<String, String>,
    pub benchmark_error: Option<String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            prices: BTreeMap::new(),
            sectors: HashMap::new(),
            benchmark: Vec::new(),
            portfolios: HashMap::new(),
            errors: HashMap::new(),
            benchmark_error: None,
        }
    }

    pub fn with_prices(mut self, symbol: &str, sector: Option<&str>, points: Vec<PricePoint>) -> Self {
        self.prices.insert(symbol.to_string(), points);
        if let Some(sector) = sector {
            self.sectors.insert(symbol.to_string(), sector.to_string());
        }
        self
    }

    pub fn with_benchmark(mut self, points: Vec<PricePoint>) -> Self {
        self.benchmark = points;
        self
    }

    pub fn with_holding(mut self, portfolio_id: &str, symbol: &str, weight: f64) -> Self {
        let sector = self.sectors.get(symbol).cloned();
        self.portfolios
            .entry(portfolio_id.to_string())
            .or_default()
            .push(Holding {
                symbol: symbol.to_string(),
                sector,
                weight,
                quantity: 0.0,
                purchase_price: 0.0,
            });
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn with_benchmark_error(mut self, reason: &str) -> Self {
        self.benchmark_error = Some(reason.to_string());
        self
    }
}

impl MarketDataPort for MockDataPort {
    fn asset_price_history(
        &self,
        symbol: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortoptError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(PortoptError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self
            .prices
            .get(symbol)
            .map(|points| points.iter().filter(|p| p.date >= start_date).copied().collect())
            .unwrap_or_default())
    }

    fn benchmark_series(&self, start_date: NaiveDate) -> Result<Vec<PricePoint>, PortoptError> {
        if let Some(reason) = &self.benchmark_error {
            return Err(PortoptError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self
            .benchmark
            .iter()
            .filter(|p| p.date >= start_date)
            .copied()
            .collect())
    }

    fn portfolio_composition(&self, portfolio_id: &str) -> Result<Vec<Holding>, PortoptError> {
        Ok(self.portfolios.get(portfolio_id).cloned().unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<(String, Option<String>)>, PortoptError> {
        Ok(self
            .prices
            .keys()
            .map(|s| (s.clone(), self.sectors.get(s).cloned()))
            .collect())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Daily points from `start` following a drifting sine path.
pub fn generate_prices(
    start: NaiveDate,
    count: usize,
    start_price: f64,
    drift: f64,
    amplitude: f64,
    phase: f64,
) -> Vec<PricePoint> {
    (0..count)
        .map(|i| PricePoint {
            date: start + chrono::Duration::days(i as i64),
            price: start_price * (1.0 + drift * i as f64)
                + amplitude * ((i as f64) * 0.7 + phase).sin(),
        })
        .collect()
}

/// Three-asset portfolio "core" plus two unheld catalog assets.
pub fn sample_market() -> MockDataPort {
    let start = date(2024, 1, 1);
    MockDataPort::new()
        .with_prices("AAA", Some("Tech"), generate_prices(start, 120, 100.0, 0.002, 2.0, 0.0))
        .with_prices("BBB", Some("Energy"), generate_prices(start, 120, 50.0, 0.001, 1.5, 1.0))
        .with_prices("CCC", Some("Health"), generate_prices(start, 120, 80.0, 0.0005, 1.0, 2.0))
        .with_prices("DDD", Some("Utilities"), generate_prices(start, 120, 30.0, 0.0003, 0.5, 3.0))
        .with_prices("EEE", Some("Tech"), generate_prices(start, 120, 60.0, 0.001, 1.2, 0.2))
        .with_benchmark(generate_prices(start, 120, 4000.0, 0.001, 30.0, 0.5))
        .with_holding("core", "AAA", 0.4)
        .with_holding("core", "BBB", 0.3)
        .with_holding("core", "CCC", 0.3)
}
