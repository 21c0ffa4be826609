//! Durable cache store for daily time-series rows.
//!
//! One DuckDB file holds two tables keyed by `(trade_date, instrument_code)`:
//! `daily_bars` for price series (equities and indexes share the table) and
//! `moneyflow` for day-scoped flow aggregates. The store is deliberately thin:
//! range queries sorted ascending by trade date, and batch inserts that commit
//! all rows or none. Completeness and conflict policy live above the store.

pub mod migrations;
pub mod pool;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use duckdb::{params, Connection, ToSql};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use pool::{ConnectionPool, PooledConnection};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    DuckDb(#[from] duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::at_home(resolve_home())
    }
}

impl StoreConfig {
    /// Config rooted at an explicit home directory.
    pub fn at_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let db_path = home.join("cache").join("history.duckdb");
        Self {
            home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// One trading day of price data for one instrument.
///
/// Numeric columns are nullable: rows written by a faulty upstream may carry
/// holes, and the completeness check upstairs decides whether a queried set
/// is usable. The primary key is enforced by the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRow {
    pub trade_date: String,
    pub instrument_code: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub vol: Option<f64>,
    pub amount: Option<f64>,
    pub adj_factor: Option<f64>,
}

/// One trading day of money-flow aggregates for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoneyflowRow {
    pub trade_date: String,
    pub instrument_code: String,
    pub buy_sm_amount: Option<f64>,
    pub sell_sm_amount: Option<f64>,
    pub buy_md_amount: Option<f64>,
    pub sell_md_amount: Option<f64>,
    pub buy_lg_amount: Option<f64>,
    pub sell_lg_amount: Option<f64>,
    pub buy_elg_amount: Option<f64>,
    pub sell_elg_amount: Option<f64>,
    pub net_mf_amount: Option<f64>,
}

/// DuckDB-backed cache of daily series rows.
#[derive(Clone)]
pub struct CacheStore {
    pool: ConnectionPool,
}

impl CacheStore {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(StoreConfig::default())
    }

    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::open(config.db_path.clone(), config.max_pool_size)?;
        let store = Self { pool };
        store.initialize()?;
        tracing::debug!(db_path = %store.db_path().display(), "cache store ready");
        Ok(store)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        let connection = self.pool.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    /// Price rows for one instrument, ascending by trade date. Unbounded
    /// sides of the range are left unconstrained.
    pub fn query_bars(
        &self,
        instrument_code: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<BarRow>, StoreError> {
        let mut sql = String::from(
            "SELECT trade_date, instrument_code, open, high, low, close, vol, amount, adj_factor \
             FROM daily_bars WHERE instrument_code = ?",
        );
        let mut binds: Vec<&dyn ToSql> = vec![&instrument_code];
        if let Some(start) = start.as_ref() {
            sql.push_str(" AND trade_date >= ?");
            binds.push(start);
        }
        if let Some(end) = end.as_ref() {
            sql.push_str(" AND trade_date <= ?");
            binds.push(end);
        }
        sql.push_str(" ORDER BY trade_date");

        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(sql.as_str())?;
        let rows = statement
            .query_map(binds.as_slice(), |row| {
                Ok(BarRow {
                    trade_date: row.get(0)?,
                    instrument_code: row.get(1)?,
                    open: row.get(2)?,
                    high: row.get(3)?,
                    low: row.get(4)?,
                    close: row.get(5)?,
                    vol: row.get(6)?,
                    amount: row.get(7)?,
                    adj_factor: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Insert a batch of price rows atomically. A single failing row (for
    /// example a primary-key violation) rolls back the entire batch.
    pub fn insert_bars(&self, rows: &[BarRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, StoreError> {
            let mut statement = connection.prepare(
                "INSERT INTO daily_bars \
                 (trade_date, instrument_code, open, high, low, close, vol, amount, adj_factor) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for row in rows {
                statement.execute(params![
                    row.trade_date,
                    row.instrument_code,
                    row.open,
                    row.high,
                    row.low,
                    row.close,
                    row.vol,
                    row.amount,
                    row.adj_factor,
                ])?;
            }
            Ok(rows.len())
        })();

        finalize_transaction(&connection, result)
    }

    /// Money-flow rows across all instruments in a date window, ascending by
    /// (trade date, instrument code).
    pub fn query_moneyflow(
        &self,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<MoneyflowRow>, StoreError> {
        let mut sql = String::from(
            "SELECT trade_date, instrument_code, buy_sm_amount, sell_sm_amount, buy_md_amount, \
             sell_md_amount, buy_lg_amount, sell_lg_amount, buy_elg_amount, sell_elg_amount, \
             net_mf_amount FROM moneyflow WHERE 1 = 1",
        );
        let mut binds: Vec<&dyn ToSql> = Vec::new();
        if let Some(start) = start.as_ref() {
            sql.push_str(" AND trade_date >= ?");
            binds.push(start);
        }
        if let Some(end) = end.as_ref() {
            sql.push_str(" AND trade_date <= ?");
            binds.push(end);
        }
        sql.push_str(" ORDER BY trade_date, instrument_code");

        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(sql.as_str())?;
        let rows = statement
            .query_map(binds.as_slice(), |row| {
                Ok(MoneyflowRow {
                    trade_date: row.get(0)?,
                    instrument_code: row.get(1)?,
                    buy_sm_amount: row.get(2)?,
                    sell_sm_amount: row.get(3)?,
                    buy_md_amount: row.get(4)?,
                    sell_md_amount: row.get(5)?,
                    buy_lg_amount: row.get(6)?,
                    sell_lg_amount: row.get(7)?,
                    buy_elg_amount: row.get(8)?,
                    sell_elg_amount: row.get(9)?,
                    net_mf_amount: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Insert a batch of money-flow rows atomically.
    pub fn insert_moneyflow(&self, rows: &[MoneyflowRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, StoreError> {
            let mut statement = connection.prepare(
                "INSERT INTO moneyflow \
                 (trade_date, instrument_code, buy_sm_amount, sell_sm_amount, buy_md_amount, \
                  sell_md_amount, buy_lg_amount, sell_lg_amount, buy_elg_amount, sell_elg_amount, \
                  net_mf_amount) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for row in rows {
                statement.execute(params![
                    row.trade_date,
                    row.instrument_code,
                    row.buy_sm_amount,
                    row.sell_sm_amount,
                    row.buy_md_amount,
                    row.sell_md_amount,
                    row.buy_lg_amount,
                    row.sell_lg_amount,
                    row.buy_elg_amount,
                    row.sell_elg_amount,
                    row.net_mf_amount,
                ])?;
            }
            Ok(rows.len())
        })();

        finalize_transaction(&connection, result)
    }
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn resolve_home() -> PathBuf {
    if let Some(path) = env::var_os("BARVAULT_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".barvault");
    }

    PathBuf::from(".barvault")
}
