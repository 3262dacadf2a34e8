//! Market data port: the price store the analytics read from.

use crate::domain::asset::{Holding, PricePoint};
use crate::domain::error::PortoptError;
use chrono::NaiveDate;

pub trait MarketDataPort {
    /// Chronological prices for `symbol` on or after `start_date`. Dates with
    /// no trading are simply absent. An unknown symbol yields an empty vector.
    fn asset_price_history(
        &self,
        symbol: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortoptError>;

    /// Chronological benchmark index levels on or after `start_date`.
    fn benchmark_series(&self, start_date: NaiveDate) -> Result<Vec<PricePoint>, PortoptError>;

    /// Holdings of a stored portfolio. An unknown id yields an empty vector.
    fn portfolio_composition(&self, portfolio_id: &str) -> Result<Vec<Holding>, PortoptError>;

    /// Every symbol with stored prices, sorted, with its sector when known.
    fn list_symbols(&self) -> Result<Vec<(String, Option<String>)>, PortoptError>;
}
