//! Run parameters: which dates to compute and how to merge them.

use crate::domain::error::ZooIndexError;
use crate::domain::merge::{MergeMode, SnapshotPolicy};
use crate::domain::schedule::TradingCalendar;
use chrono::{Datelike, Days, Months, NaiveDate};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// The span of trading dates a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunWindow {
    /// Daily update of a single date.
    Day(NaiveDate),
    /// Explicit backfill range, inclusive.
    Range { start: NaiveDate, end: NaiveDate },
    /// The last `sessions` trading days ending at `end`.
    TrailingSessions { end: NaiveDate, sessions: u32 },
}

impl RunWindow {
    pub fn end(&self) -> NaiveDate {
        match *self {
            RunWindow::Day(date) => date,
            RunWindow::Range { end, .. } | RunWindow::TrailingSessions { end, .. } => end,
        }
    }

    /// Earliest calendar date a run over this window needs: the previous
    /// month's reconstitution and the session before the window start.
    pub fn lookback_start(&self) -> NaiveDate {
        let first = match *self {
            RunWindow::Day(date) => date,
            RunWindow::Range { start, .. } => start,
            RunWindow::TrailingSessions { end, sessions } => end
                .checked_sub_days(Days::new(u64::from(sessions) * 2))
                .unwrap_or(NaiveDate::MIN),
        };
        first
            .with_day(1)
            .and_then(|d| d.checked_sub_months(Months::new(1)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Trading dates of the window, or `None` when it holds none.
    pub fn sessions<'c>(&self, calendar: &'c TradingCalendar) -> Option<&'c [NaiveDate]> {
        let dates = match *self {
            RunWindow::Day(date) => calendar.range(date, date),
            RunWindow::Range { start, end } => calendar.range(start, end),
            RunWindow::TrailingSessions { end, sessions } => {
                let upto = calendar.range(NaiveDate::MIN, end);
                let skip = upto.len().saturating_sub(sessions as usize);
                &upto[skip..]
            }
        };
        (!dates.is_empty()).then_some(dates)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub window: RunWindow,
    pub mode: MergeMode,
    pub snapshots: SnapshotPolicy,
}

/// Raw, optional run settings as gathered from config and command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunParams {
    pub date: Option<NaiveDate>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub days: Option<u32>,
    pub years: Option<u32>,
    pub mode: MergeMode,
    pub snapshots: SnapshotPolicy,
}

impl RunParams {
    /// Settles the window. Precedence: explicit start, then a year count,
    /// then a session count, then a single date. The window ends at `end`,
    /// else `date`, else `today`.
    pub fn resolve(&self, today: NaiveDate) -> Result<RunConfig, ZooIndexError> {
        let end = self.end.or(self.date).unwrap_or(today);

        let window = if let Some(start) = self.start {
            if start > end {
                return Err(invalid(
                    "start_date",
                    format!("start {start} is after end {end}"),
                ));
            }
            RunWindow::Range { start, end }
        } else if let Some(years) = self.years {
            if years == 0 {
                return Err(invalid("backfill_years", "must be at least 1"));
            }
            let start = end
                .checked_sub_months(Months::new(years.saturating_mul(12)))
                .ok_or_else(|| invalid("backfill_years", "reaches before the calendar start"))?;
            RunWindow::Range { start, end }
        } else if let Some(days) = self.days {
            if days == 0 {
                return Err(invalid("backfill_days", "must be at least 1"));
            }
            RunWindow::TrailingSessions {
                end,
                sessions: days,
            }
        } else if self.end.is_some() && self.date.is_none() {
            return Err(invalid(
                "end_date",
                "end_date needs start_date, backfill_days or backfill_years",
            ));
        } else {
            RunWindow::Day(end)
        };

        Ok(RunConfig {
            window,
            mode: self.mode,
            snapshots: self.snapshots,
        })
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

fn invalid(key: &str, reason: impl Into<String>) -> ZooIndexError {
    ZooIndexError::ConfigInvalid {
        section: "run".into(),
        key: key.into(),
        reason: reason.into(),
    }
}
