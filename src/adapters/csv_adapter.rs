//! CSV directory data adapter.
//!
//! Layout under the base directory:
//!
//! ```text
//! prices/<SYMBOL>.csv   date,price
//! benchmark.csv         date,price
//! portfolios.csv        portfolio_id,symbol,sector,weight,quantity,purchase_price
//! catalog.csv           symbol,sector          (optional)
//! ```
//!
//! A missing file reads as empty.

use crate::domain::asset::{Holding, PricePoint};
use crate::domain::error::PortoptError;
use crate::ports::data_port::MarketDataPort;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub struct CsvAdapter {
    base_path: PathBuf,
}

fn db_error(reason: String) -> PortoptError {
    PortoptError::Database { reason }
}

fn parse_field<T: FromStr>(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    path: &Path,
) -> Result<T, PortoptError>
where
    T::Err: std::fmt::Display,
{
    let raw = record
        .get(index)
        .ok_or_else(|| db_error(format!("{}: missing {name} column", path.display())))?;
    raw.trim()
        .parse()
        .map_err(|e| db_error(format!("{}: invalid {name} '{raw}': {e}", path.display())))
}

fn optional_text(record: &csv::StringRecord, index: usize) -> Option<String> {
    record
        .get(index)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn prices_dir(&self) -> PathBuf {
        self.base_path.join("prices")
    }

    fn price_path(&self, symbol: &str) -> PathBuf {
        self.prices_dir().join(format!("{symbol}.csv"))
    }

    /// Records of a CSV file with a header row, or `None` if it does not exist.
    fn read_records(&self, path: &Path) -> Result<Option<Vec<csv::StringRecord>>, PortoptError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(db_error(format!("failed to read {}: {e}", path.display()))),
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let records = rdr
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| db_error(format!("{}: CSV parse error: {e}", path.display())))?;
        Ok(Some(records))
    }

    fn read_prices(&self, path: &Path, start_date: NaiveDate) -> Result<Vec<PricePoint>, PortoptError> {
        let Some(records) = self.read_records(path)? else {
            return Ok(Vec::new());
        };

        let mut points = Vec::with_capacity(records.len());
        for record in &records {
            let raw_date: String = parse_field(record, 0, "date", path)?;
            let date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d").map_err(|e| {
                db_error(format!("{}: invalid date '{raw_date}': {e}", path.display()))
            })?;
            if date < start_date {
                continue;
            }
            let price: f64 = parse_field(record, 1, "price", path)?;
            points.push(PricePoint { date, price });
        }

        points.sort_by_key(|p| p.date);
        Ok(points)
    }

    fn catalog_sectors(&self) -> Result<HashMap<String, String>, PortoptError> {
        let path = self.base_path.join("catalog.csv");
        let mut sectors = HashMap::new();
        for record in self.read_records(&path)?.unwrap_or_default() {
            let symbol: String = parse_field(&record, 0, "symbol", &path)?;
            if let Some(sector) = optional_text(&record, 1) {
                sectors.insert(symbol.to_uppercase(), sector);
            }
        }
        Ok(sectors)
    }
}

impl MarketDataPort for CsvAdapter {
    fn asset_price_history(
        &self,
        symbol: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortoptError> {
        self.read_prices(&self.price_path(symbol), start_date)
    }

    fn benchmark_series(&self, start_date: NaiveDate) -> Result<Vec<PricePoint>, PortoptError> {
        self.read_prices(&self.base_path.join("benchmark.csv"), start_date)
    }

    fn portfolio_composition(&self, portfolio_id: &str) -> Result<Vec<Holding>, PortoptError> {
        let path = self.base_path.join("portfolios.csv");
        let mut holdings = Vec::new();
        for record in self.read_records(&path)?.unwrap_or_default() {
            let id: String = parse_field(&record, 0, "portfolio_id", &path)?;
            if id != portfolio_id {
                continue;
            }
            holdings.push(Holding {
                symbol: parse_field::<String>(&record, 1, "symbol", &path)?.to_uppercase(),
                sector: optional_text(&record, 2),
                weight: parse_field(&record, 3, "weight", &path)?,
                quantity: parse_field(&record, 4, "quantity", &path)?,
                purchase_price: parse_field(&record, 5, "purchase_price", &path)?,
            });
        }
        Ok(holdings)
    }

    fn list_symbols(&self) -> Result<Vec<(String, Option<String>)>, PortoptError> {
        let dir = self.prices_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(db_error(format!(
                    "failed to read directory {}: {e}",
                    dir.display()
                )));
            }
        };

        let sectors = self.catalog_sectors()?;
        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| db_error(format!("directory entry error: {e}")))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(symbol) = name.strip_suffix(".csv") {
                let sector = sectors.get(&symbol.to_uppercase()).cloned();
                symbols.push((symbol.to_string(), sector));
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
