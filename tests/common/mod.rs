#![allow(dead_code)]

use chrono::{Datelike, NaiveDate, Weekday};
use std::cell::RefCell;
use std::collections::HashMap;
use zooindex::domain::backfill::LatestSummary;
use zooindex::domain::benchmark::BenchmarkClose;
use zooindex::domain::changes::ChangeSummary;
use zooindex::domain::classifier::Classification;
use zooindex::domain::error::ZooIndexError;
use zooindex::domain::merge::NavBook;
use zooindex::domain::nav::DayComputation;
use zooindex::domain::price::PriceRow;
use zooindex::domain::rules::RuleConfig;
use zooindex::domain::schedule::TradingCalendar;
use zooindex::domain::security::{NameChange, NameHistory, Security};
use zooindex::ports::artifact_port::ArtifactPort;
use zooindex::ports::market_data_port::MarketDataPort;
use zooindex::ports::nav_store_port::NavStorePort;

pub struct MockDataPort {
    pub securities: Vec<Security>,
    pub calendar: Vec<NaiveDate>,
    pub closes: Vec<PriceRow>,
    pub benchmark: Vec<BenchmarkClose>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            securities: Vec::new(),
            calendar: Vec::new(),
            closes: Vec::new(),
            benchmark: Vec::new(),
            error: None,
        }
    }

    pub fn with_security(mut self, security: Security) -> Self {
        self.securities.push(security);
        self
    }

    pub fn with_calendar(mut self, dates: Vec<NaiveDate>) -> Self {
        self.calendar = dates;
        self
    }

    /// One close per calendar date, following `price(session_index)`.
    pub fn with_closes(mut self, code: &str, price: impl Fn(usize) -> f64) -> Self {
        let rows: Vec<PriceRow> = self
            .calendar
            .iter()
            .enumerate()
            .map(|(i, date)| PriceRow {
                code: code.to_string(),
                date: *date,
                close: Some(price(i)),
            })
            .collect();
        self.closes.extend(rows);
        self
    }

    /// Benchmark close per calendar date, following `price(session_index)`.
    pub fn with_benchmark(mut self, price: impl Fn(usize) -> f64) -> Self {
        self.benchmark = self
            .calendar
            .iter()
            .enumerate()
            .map(|(i, date)| BenchmarkClose {
                date: *date,
                close: Some(price(i)),
            })
            .collect();
        self
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }

    fn check(&self) -> Result<(), ZooIndexError> {
        match &self.error {
            Some(reason) => Err(ZooIndexError::Database {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl MarketDataPort for MockDataPort {
    fn securities(&self) -> Result<Vec<Security>, ZooIndexError> {
        self.check()?;
        Ok(self.securities.clone())
    }

    fn trading_calendar(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TradingCalendar, ZooIndexError> {
        self.check()?;
        Ok(TradingCalendar::new(
            self.calendar
                .iter()
                .copied()
                .filter(|d| *d >= start && *d <= end),
        ))
    }

    fn closes(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceRow>, ZooIndexError> {
        self.check()?;
        Ok(self
            .closes
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .cloned()
            .collect())
    }

    fn benchmark_closes(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BenchmarkClose>, ZooIndexError> {
        self.check()?;
        Ok(self
            .benchmark
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .copied()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryNavStore {
    pub book: RefCell<NavBook>,
    pub saves: RefCell<usize>,
}

impl NavStorePort for MemoryNavStore {
    fn load(&self) -> Result<NavBook, ZooIndexError> {
        Ok(self.book.borrow().clone())
    }

    fn save(&self, book: &NavBook) -> Result<(), ZooIndexError> {
        *self.book.borrow_mut() = book.clone();
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingArtifacts {
    pub constituents: RefCell<Vec<NaiveDate>>,
    pub holdings: RefCell<HashMap<NaiveDate, usize>>,
    pub changes: RefCell<Vec<ChangeSummary>>,
    pub latest: RefCell<Option<LatestSummary>>,
}

impl ArtifactPort for RecordingArtifacts {
    fn write_constituents(&self, classification: &Classification) -> Result<(), ZooIndexError> {
        self.constituents.borrow_mut().push(classification.as_of);
        Ok(())
    }

    fn write_holdings(
        &self,
        date: NaiveDate,
        days: &[&DayComputation],
    ) -> Result<(), ZooIndexError> {
        self.holdings.borrow_mut().insert(date, days.len());
        Ok(())
    }

    fn write_changes(&self, summary: &ChangeSummary) -> Result<(), ZooIndexError> {
        self.changes.borrow_mut().push(summary.clone());
        Ok(())
    }

    fn write_latest(&self, latest: &LatestSummary) -> Result<(), ZooIndexError> {
        *self.latest.borrow_mut() = Some(latest.clone());
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Every weekday in `[start, end]`.
pub fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

pub fn make_security(code: &str, exchange: &str, name: &str) -> Security {
    Security {
        code: code.to_string(),
        exchange: exchange.to_string(),
        names: NameHistory::new(vec![NameChange::new(date(2000, 1, 1), name)]),
        list_date: Some(date(2000, 1, 1)),
        delist_date: None,
    }
}

/// A security whose name changes from `before` to `after` on `effective`.
pub fn renamed_security(
    code: &str,
    before: &str,
    after: &str,
    effective: NaiveDate,
) -> Security {
    Security {
        names: NameHistory::new(vec![
            NameChange::new(date(2000, 1, 1), before),
            NameChange::new(effective, after),
        ]),
        ..make_security(code, "SSE", before)
    }
}

pub fn zoo_rules() -> RuleConfig {
    RuleConfig {
        strict_keywords: vec!["熊猫".into(), "老虎".into()],
        extended_keywords: vec!["熊猫".into(), "老虎".into(), "马".into()],
        ..RuleConfig::default()
    }
}
