//! Market data read from a directory of CSV files.
//!
//! Layout:
//!
//! - `securities.csv`: `code,exchange,name,list_date,delist_date`
//! - `name_history.csv` (optional): `code,start_date,name`
//! - `calendar.csv`: `date`
//! - `prices.csv`: `code,date,close` (an empty close is a missing quote)
//! - `benchmark.csv` (optional): `date,close`
//!
//! Dates are `YYYY-MM-DD`; compact `YYYYMMDD` is accepted as well.

use crate::domain::benchmark::BenchmarkClose;
use crate::domain::error::ZooIndexError;
use crate::domain::price::PriceRow;
use crate::domain::schedule::TradingCalendar;
use crate::domain::security::{NameChange, NameHistory, Security};
use crate::ports::market_data_port::MarketDataPort;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const SECURITIES_FILE: &str = "securities.csv";
pub const NAME_HISTORY_FILE: &str = "name_history.csv";
pub const CALENDAR_FILE: &str = "calendar.csv";
pub const PRICES_FILE: &str = "prices.csv";
pub const BENCHMARK_FILE: &str = "benchmark.csv";

#[derive(Debug, Deserialize)]
struct SecurityRecord {
    code: String,
    exchange: String,
    name: String,
    #[serde(default)]
    list_date: String,
    #[serde(default)]
    delist_date: String,
}

#[derive(Debug, Deserialize)]
struct NameRecord {
    code: String,
    start_date: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CalendarRecord {
    date: String,
}

#[derive(Debug, Deserialize)]
struct CloseRecord {
    code: String,
    date: String,
    close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BenchmarkRecord {
    date: String,
    close: Option<f64>,
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, ZooIndexError> {
        let path = self.base_path.join(file);
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| source_error(&path, e))?;
        rdr.deserialize()
            .collect::<Result<Vec<T>, csv::Error>>()
            .map_err(|e| source_error(&path, e))
    }

    fn name_histories(&self) -> Result<HashMap<String, Vec<NameChange>>, ZooIndexError> {
        let mut by_code: HashMap<String, Vec<NameChange>> = HashMap::new();
        if !self.base_path.join(NAME_HISTORY_FILE).exists() {
            return Ok(by_code);
        }
        for record in self.read::<NameRecord>(NAME_HISTORY_FILE)? {
            let Some(effective) = parse_date(NAME_HISTORY_FILE, "start_date", &record.start_date)?
            else {
                continue;
            };
            by_code
                .entry(record.code.to_uppercase())
                .or_default()
                .push(NameChange::new(effective, record.name));
        }
        Ok(by_code)
    }
}

impl MarketDataPort for CsvAdapter {
    fn securities(&self) -> Result<Vec<Security>, ZooIndexError> {
        let mut histories = self.name_histories()?;
        let mut securities = Vec::new();

        for record in self.read::<SecurityRecord>(SECURITIES_FILE)? {
            let code = record.code.to_uppercase();
            let list_date = parse_date(SECURITIES_FILE, "list_date", &record.list_date)?;
            let delist_date = parse_date(SECURITIES_FILE, "delist_date", &record.delist_date)?;

            // Without a recorded history the current name holds from listing.
            let names = match histories.remove(&code) {
                Some(entries) => entries,
                None => vec![NameChange::new(
                    list_date.unwrap_or(NaiveDate::MIN),
                    record.name,
                )],
            };

            securities.push(Security {
                code,
                exchange: record.exchange.to_uppercase(),
                names: NameHistory::new(names),
                list_date,
                delist_date,
            });
        }

        if !histories.is_empty() {
            log::debug!(
                "{} name history codes have no row in {}",
                histories.len(),
                SECURITIES_FILE
            );
        }
        Ok(securities)
    }

    fn trading_calendar(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TradingCalendar, ZooIndexError> {
        let mut dates = Vec::new();
        for record in self.read::<CalendarRecord>(CALENDAR_FILE)? {
            match parse_date(CALENDAR_FILE, "date", &record.date)? {
                Some(date) if date >= start && date <= end => dates.push(date),
                _ => {}
            }
        }
        Ok(TradingCalendar::new(dates))
    }

    fn closes(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceRow>, ZooIndexError> {
        let mut rows = Vec::new();
        for record in self.read::<CloseRecord>(PRICES_FILE)? {
            let Some(date) = parse_date(PRICES_FILE, "date", &record.date)? else {
                continue;
            };
            if date < start || date > end {
                continue;
            }
            rows.push(PriceRow {
                code: record.code.to_uppercase(),
                date,
                close: record.close,
            });
        }
        Ok(rows)
    }

    fn benchmark_closes(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BenchmarkClose>, ZooIndexError> {
        if !self.base_path.join(BENCHMARK_FILE).exists() {
            return Ok(Vec::new());
        }
        let mut rows = Vec::new();
        for record in self.read::<BenchmarkRecord>(BENCHMARK_FILE)? {
            match parse_date(BENCHMARK_FILE, "date", &record.date)? {
                Some(date) if date >= start && date <= end => rows.push(BenchmarkClose {
                    date,
                    close: record.close,
                }),
                _ => {}
            }
        }
        Ok(rows)
    }
}

/// Blank fields are `None`.
fn parse_date(file: &str, field: &str, value: &str) -> Result<Option<NaiveDate>, ZooIndexError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y%m%d"))
        .map(Some)
        .map_err(|e| ZooIndexError::Database {
            reason: format!("{file}: invalid {field} '{value}': {e}"),
        })
}

fn source_error(path: &Path, e: csv::Error) -> ZooIndexError {
    ZooIndexError::Database {
        reason: format!("failed to read {}: {}", path.display(), e),
    }
}
