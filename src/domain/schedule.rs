//! Trading calendar and the monthly Reconstitution Scheduler.

use crate::domain::error::ZooIndexError;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;

/// Ordered, de-duplicated set of trading dates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingCalendar {
    dates: Vec<NaiveDate>,
}

impl TradingCalendar {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let unique: BTreeSet<NaiveDate> = dates.into_iter().collect();
        Self {
            dates: unique.into_iter().collect(),
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Latest trading date strictly before `date`.
    pub fn previous(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.dates.partition_point(|d| *d < date);
        idx.checked_sub(1).map(|i| self.dates[i])
    }

    /// Trading dates in `[start, end]`.
    pub fn range(&self, start: NaiveDate, end: NaiveDate) -> &[NaiveDate] {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end);
        if lo >= hi { &[] } else { &self.dates[lo..hi] }
    }

    /// Number of trading dates strictly between `a` and `b`.
    pub fn sessions_between(&self, a: NaiveDate, b: NaiveDate) -> usize {
        if b <= a {
            return 0;
        }
        let lo = self.dates.partition_point(|d| *d <= a);
        let hi = self.dates.partition_point(|d| *d < b);
        hi.saturating_sub(lo)
    }
}

/// First trading day of each calendar month intersecting `[start, end]`.
///
/// A month's first trading day may fall before `start`; it is still returned
/// because it governs the in-range days of that month. Months whose trading
/// days all fall outside the calendar are skipped.
pub fn reconstitution_dates(
    calendar: &TradingCalendar,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<NaiveDate> {
    if end < start {
        return Vec::new();
    }
    let first_month = (start.year(), start.month());
    let last_month = (end.year(), end.month());

    let mut out: Vec<NaiveDate> = Vec::new();
    for date in calendar.dates() {
        let month = (date.year(), date.month());
        if month < first_month {
            continue;
        }
        if month > last_month {
            break;
        }
        let new_month = out
            .last()
            .is_none_or(|prev| (prev.year(), prev.month()) != month);
        if new_month {
            out.push(*date);
        }
    }
    out
}

/// Reconstitution date of the month before `recon`'s month, if the calendar
/// reaches back that far.
pub fn previous_reconstitution(calendar: &TradingCalendar, recon: NaiveDate) -> Option<NaiveDate> {
    let prior = calendar.previous(recon)?;
    let month_start = NaiveDate::from_ymd_opt(prior.year(), prior.month(), 1)?;
    reconstitution_dates(calendar, month_start, prior)
        .first()
        .copied()
}

/// Latest reconstitution date not after `trading_date`.
pub fn governing_date(
    trading_date: NaiveDate,
    reconstitution_dates: &[NaiveDate],
) -> Result<NaiveDate, ZooIndexError> {
    let idx = reconstitution_dates.partition_point(|d| *d <= trading_date);
    idx.checked_sub(1)
        .map(|i| reconstitution_dates[i])
        .ok_or(ZooIndexError::NoGoverningSnapshot { date: trading_date })
}
