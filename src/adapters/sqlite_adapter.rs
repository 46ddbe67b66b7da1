//! SQLite market data adapter.

use crate::domain::benchmark::BenchmarkClose;
use crate::domain::config_validation::sqlite_pool_size;
use crate::domain::error::ZooIndexError;
use crate::domain::price::PriceRow;
use crate::domain::run_config::DATE_FORMAT;
use crate::domain::schedule::TradingCalendar;
use crate::domain::security::{NameChange, NameHistory, Security};
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::collections::HashMap;

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ZooIndexError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| ZooIndexError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = sqlite_pool_size(config)?;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| ZooIndexError::Database {
                    reason: e.to_string(),
                })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, ZooIndexError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| ZooIndexError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, ZooIndexError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| ZooIndexError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), ZooIndexError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS securities (
                code TEXT PRIMARY KEY,
                exchange TEXT NOT NULL,
                name TEXT NOT NULL,
                list_date TEXT,
                delist_date TEXT
            );
            CREATE TABLE IF NOT EXISTS name_history (
                code TEXT NOT NULL,
                start_date TEXT NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (code, start_date)
            );
            CREATE TABLE IF NOT EXISTS trade_calendar (
                date TEXT PRIMARY KEY
            );
            CREATE TABLE IF NOT EXISTS daily_close (
                code TEXT NOT NULL,
                date TEXT NOT NULL,
                close REAL,
                PRIMARY KEY (code, date)
            );
            CREATE INDEX IF NOT EXISTS idx_daily_close_date ON daily_close(date);
            CREATE TABLE IF NOT EXISTS benchmark_close (
                date TEXT PRIMARY KEY,
                close REAL
            );",
        )
        .map_err(query_error)?;

        Ok(())
    }

    /// Writes securities with their full name histories.
    pub fn insert_securities(&self, securities: &[Security]) -> Result<(), ZooIndexError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for security in securities {
            let code = security.code.to_uppercase();
            tx.execute(
                "INSERT OR REPLACE INTO securities (code, exchange, name, list_date, delist_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    code,
                    security.exchange,
                    security.names.latest().unwrap_or_default(),
                    security.list_date.map(format_date),
                    security.delist_date.map(format_date),
                ],
            )
            .map_err(query_error)?;

            for change in security.names.entries() {
                tx.execute(
                    "INSERT OR REPLACE INTO name_history (code, start_date, name)
                     VALUES (?1, ?2, ?3)",
                    params![code, format_date(change.effective), change.name],
                )
                .map_err(query_error)?;
            }
        }

        tx.commit().map_err(query_error)?;
        Ok(())
    }

    pub fn insert_calendar(&self, dates: &[NaiveDate]) -> Result<(), ZooIndexError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        for date in dates {
            tx.execute(
                "INSERT OR IGNORE INTO trade_calendar (date) VALUES (?1)",
                params![format_date(*date)],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)?;
        Ok(())
    }

    pub fn insert_closes(&self, rows: &[PriceRow]) -> Result<(), ZooIndexError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO daily_close (code, date, close) VALUES (?1, ?2, ?3)",
                params![row.code.to_uppercase(), format_date(row.date), row.close],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)?;
        Ok(())
    }

    pub fn insert_benchmark(&self, rows: &[BenchmarkClose]) -> Result<(), ZooIndexError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO benchmark_close (date, close) VALUES (?1, ?2)",
                params![format_date(row.date), row.close],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)?;
        Ok(())
    }

    fn name_histories(&self) -> Result<HashMap<String, Vec<NameChange>>, ZooIndexError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT code, start_date, name FROM name_history ORDER BY code, start_date")
            .map_err(query_error)?;
        let rows = stmt
            .query_map([], |row| {
                let code: String = row.get(0)?;
                let start: String = row.get(1)?;
                let name: String = row.get(2)?;
                Ok((code, parse_date(&start)?, name))
            })
            .map_err(query_error)?;

        let mut by_code: HashMap<String, Vec<NameChange>> = HashMap::new();
        for row in rows {
            let (code, effective, name) = row.map_err(query_error)?;
            by_code
                .entry(code)
                .or_default()
                .push(NameChange::new(effective, name));
        }
        Ok(by_code)
    }
}

impl MarketDataPort for SqliteAdapter {
    fn securities(&self) -> Result<Vec<Security>, ZooIndexError> {
        let mut histories = self.name_histories()?;
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT code, exchange, name, list_date, delist_date
                 FROM securities ORDER BY code",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map([], |row| {
                let list: Option<String> = row.get(3)?;
                let delist: Option<String> = row.get(4)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    list.as_deref().map(parse_date).transpose()?,
                    delist.as_deref().map(parse_date).transpose()?,
                ))
            })
            .map_err(query_error)?;

        let mut securities = Vec::new();
        for row in rows {
            let (code, exchange, name, list_date, delist_date) = row.map_err(query_error)?;
            let names = histories.remove(&code).unwrap_or_else(|| {
                vec![NameChange::new(list_date.unwrap_or(NaiveDate::MIN), name)]
            });
            securities.push(Security {
                code,
                exchange,
                names: NameHistory::new(names),
                list_date,
                delist_date,
            });
        }

        Ok(securities)
    }

    fn trading_calendar(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TradingCalendar, ZooIndexError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date FROM trade_calendar
                 WHERE date >= ?1 AND date <= ?2 ORDER BY date",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![format_date(start), format_date(end)], |row| {
                let date: String = row.get(0)?;
                parse_date(&date)
            })
            .map_err(query_error)?;

        let mut dates = Vec::new();
        for row in rows {
            dates.push(row.map_err(query_error)?);
        }
        Ok(TradingCalendar::new(dates))
    }

    fn closes(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceRow>, ZooIndexError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT code, date, close FROM daily_close
                 WHERE date >= ?1 AND date <= ?2 ORDER BY date, code",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![format_date(start), format_date(end)], |row| {
                let date: String = row.get(1)?;
                Ok(PriceRow {
                    code: row.get(0)?,
                    date: parse_date(&date)?,
                    close: row.get(2)?,
                })
            })
            .map_err(query_error)?;

        let mut closes = Vec::new();
        for row in rows {
            closes.push(row.map_err(query_error)?);
        }
        Ok(closes)
    }

    fn benchmark_closes(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BenchmarkClose>, ZooIndexError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, close FROM benchmark_close
                 WHERE date >= ?1 AND date <= ?2 ORDER BY date",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![format_date(start), format_date(end)], |row| {
                let date: String = row.get(0)?;
                Ok(BenchmarkClose {
                    date: parse_date(&date)?,
                    close: row.get(1)?,
                })
            })
            .map_err(query_error)?;

        let mut closes = Vec::new();
        for row in rows {
            closes.push(row.map_err(query_error)?);
        }
        Ok(closes)
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(value: &str) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            value.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn query_error(e: rusqlite::Error) -> ZooIndexError {
    ZooIndexError::DatabaseQuery {
        reason: e.to_string(),
    }
}
