//! Market and reference data port trait.

use crate::domain::benchmark::BenchmarkClose;
use crate::domain::error::ZooIndexError;
use crate::domain::price::PriceRow;
use crate::domain::schedule::TradingCalendar;
use crate::domain::security::Security;
use chrono::NaiveDate;

pub trait MarketDataPort {
    /// Every known security with its full name history.
    fn securities(&self) -> Result<Vec<Security>, ZooIndexError>;

    /// Trading dates in `[start, end]`.
    fn trading_calendar(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TradingCalendar, ZooIndexError>;

    /// Daily closes for all codes in `[start, end]`.
    fn closes(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceRow>, ZooIndexError>;

    /// Benchmark index closes in `[start, end]`. Sources without a benchmark
    /// return nothing and the run proceeds untracked.
    fn benchmark_closes(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<BenchmarkClose>, ZooIndexError> {
        Ok(Vec::new())
    }
}
