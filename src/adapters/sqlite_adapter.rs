//! SQLite price store adapter.

use crate::domain::asset::{Holding, PricePoint};
use crate::domain::error::PortoptError;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Row, params};

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn query_err(e: rusqlite::Error) -> PortoptError {
    PortoptError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn pool_err(e: r2d2::Error) -> PortoptError {
    PortoptError::Database {
        reason: e.to_string(),
    }
}

fn parse_date(raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(raw.len(), rusqlite::types::Type::Text, Box::new(e))
    })
}

fn price_point(row: &Row<'_>) -> rusqlite::Result<PricePoint> {
    Ok(PricePoint {
        date: parse_date(row.get(0)?)?,
        price: row.get(1)?,
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PortoptError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| PortoptError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        tracing::debug!(path = %db_path, pool_size, "sqlite pool ready");
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, PortoptError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, PortoptError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), PortoptError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS price_history (
                    symbol TEXT NOT NULL,
                    date TEXT NOT NULL,
                    price REAL NOT NULL,
                    PRIMARY KEY (symbol, date)
                );
                CREATE TABLE IF NOT EXISTS benchmark (
                    date TEXT PRIMARY KEY,
                    price REAL NOT NULL
                );
                CREATE TABLE IF NOT EXISTS holdings (
                    portfolio_id TEXT NOT NULL,
                    symbol TEXT NOT NULL,
                    sector TEXT,
                    weight REAL NOT NULL,
                    quantity REAL NOT NULL DEFAULT 0,
                    purchase_price REAL NOT NULL DEFAULT 0,
                    PRIMARY KEY (portfolio_id, symbol)
                );
                CREATE TABLE IF NOT EXISTS assets (
                    symbol TEXT PRIMARY KEY,
                    sector TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_price_history_date ON price_history(date);",
            )
            .map_err(query_err)
    }

    pub fn insert_prices(&self, symbol: &str, points: &[PricePoint]) -> Result<(), PortoptError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for p in points {
            tx.execute(
                "INSERT OR REPLACE INTO price_history (symbol, date, price) VALUES (?1, ?2, ?3)",
                params![symbol, p.date.format("%Y-%m-%d").to_string(), p.price],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    pub fn insert_benchmark(&self, points: &[PricePoint]) -> Result<(), PortoptError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for p in points {
            tx.execute(
                "INSERT OR REPLACE INTO benchmark (date, price) VALUES (?1, ?2)",
                params![p.date.format("%Y-%m-%d").to_string(), p.price],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    pub fn insert_holdings(&self, portfolio_id: &str, holdings: &[Holding]) -> Result<(), PortoptError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for h in holdings {
            tx.execute(
                "INSERT OR REPLACE INTO holdings
                 (portfolio_id, symbol, sector, weight, quantity, purchase_price)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    portfolio_id,
                    h.symbol,
                    h.sector,
                    h.weight,
                    h.quantity,
                    h.purchase_price
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    pub fn insert_asset(&self, symbol: &str, sector: Option<&str>) -> Result<(), PortoptError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO assets (symbol, sector) VALUES (?1, ?2)",
                params![symbol, sector],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn query_prices(
        &self,
        query: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<PricePoint>, PortoptError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(query).map_err(query_err)?;
        let rows = stmt.query_map(args, price_point).map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

impl MarketDataPort for SqliteAdapter {
    fn asset_price_history(
        &self,
        symbol: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortoptError> {
        self.query_prices(
            "SELECT date, price FROM price_history
             WHERE symbol = ?1 AND date >= ?2
             ORDER BY date ASC",
            params![symbol, start_date.format("%Y-%m-%d").to_string()],
        )
    }

    fn benchmark_series(&self, start_date: NaiveDate) -> Result<Vec<PricePoint>, PortoptError> {
        self.query_prices(
            "SELECT date, price FROM benchmark WHERE date >= ?1 ORDER BY date ASC",
            params![start_date.format("%Y-%m-%d").to_string()],
        )
    }

    fn portfolio_composition(&self, portfolio_id: &str) -> Result<Vec<Holding>, PortoptError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, sector, weight, quantity, purchase_price
                 FROM holdings WHERE portfolio_id = ?1 ORDER BY rowid",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![portfolio_id], |row| {
                Ok(Holding {
                    symbol: row.get(0)?,
                    sector: row.get(1)?,
                    weight: row.get(2)?,
                    quantity: row.get(3)?,
                    purchase_price: row.get(4)?,
                })
            })
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn list_symbols(&self) -> Result<Vec<(String, Option<String>)>, PortoptError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT p.symbol, a.sector
                 FROM price_history p LEFT JOIN assets a ON a.symbol = p.symbol
                 ORDER BY p.symbol",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(date: &str, price: f64) -> PricePoint {
        PricePoint {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            price,
        }
    }

    fn seeded() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
            .insert_prices(
                "AAPL",
                &[
                    point("2024-01-03", 102.0),
                    point("2024-01-02", 101.0),
                    point("2023-12-29", 99.0),
                ],
            )
            .unwrap();
        adapter
            .insert_prices("XOM", &[point("2024-01-02", 50.0)])
            .unwrap();
        adapter.insert_asset("XOM", Some("Energy")).unwrap();
        adapter
            .insert_benchmark(&[point("2024-01-02", 4700.0), point("2024-01-03", 4710.0)])
            .unwrap();
        adapter
            .insert_holdings(
                "1",
                &[Holding {
                    symbol: "AAPL".into(),
                    sector: Some("Tech".into()),
                    weight: 1.0,
                    quantity: 3.0,
                    purchase_price: 140.0,
                }],
            )
            .unwrap();
        adapter
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn price_history_is_filtered_and_ordered() {
        let adapter = seeded();
        let history = adapter.asset_price_history("AAPL", start()).unwrap();
        assert_eq!(history, vec![point("2024-01-02", 101.0), point("2024-01-03", 102.0)]);
    }

    #[test]
    fn unknown_symbol_has_no_history() {
        let adapter = seeded();
        assert!(adapter.asset_price_history("NOPE", start()).unwrap().is_empty());
    }

    #[test]
    fn benchmark_round_trip() {
        let adapter = seeded();
        assert_eq!(adapter.benchmark_series(start()).unwrap().len(), 2);
    }

    #[test]
    fn holdings_round_trip() {
        let adapter = seeded();
        let holdings = adapter.portfolio_composition("1").unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].quantity, 3.0);
        assert_eq!(holdings[0].sector.as_deref(), Some("Tech"));
        assert!(adapter.portfolio_composition("2").unwrap().is_empty());
    }

    #[test]
    fn list_symbols_includes_sectors() {
        let adapter = seeded();
        assert_eq!(
            adapter.list_symbols().unwrap(),
            vec![
                ("AAPL".to_string(), None),
                ("XOM".to_string(), Some("Energy".to_string()))
            ]
        );
    }

    #[test]
    fn from_config_requires_path() {
        let config =
            crate::adapters::file_config_adapter::FileConfigAdapter::from_string("[sqlite]\n")
                .unwrap();
        let err = SqliteAdapter::from_config(&config).err().unwrap();
        assert!(matches!(err, PortoptError::ConfigMissing { key, .. } if key == "path"));
    }
}
