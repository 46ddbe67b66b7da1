//! Benchmark close series tracked alongside the index.
//!
//! The benchmark level is anchored at the index base date: 1.0 on the first
//! benchmark close on or after that date. Close ratios telescope, so the
//! level on any later date is that date's close over the anchor close and
//! nothing besides the closes needs to be stored.

use crate::domain::nav::BASE_LEVEL;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkClose {
    pub date: NaiveDate,
    /// `None` when the source has a row but no quote.
    pub close: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkSeries {
    closes: BTreeMap<NaiveDate, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BenchmarkEntry {
    pub date: NaiveDate,
    pub level: f64,
    pub daily_return: f64,
}

impl BenchmarkSeries {
    /// Keeps present, finite, strictly positive closes.
    pub fn new(rows: impl IntoIterator<Item = BenchmarkClose>) -> Self {
        let closes = rows
            .into_iter()
            .filter_map(|r| r.close.filter(|c| c.is_finite() && *c > 0.0).map(|c| (r.date, c)))
            .collect();
        Self { closes }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    /// Level and return on `date` with the series based at `base`.
    ///
    /// `None` when the benchmark has no close on `date` or nothing between
    /// `base` and `date`. The first close on or after `base` carries a zero
    /// return.
    pub fn entry(&self, base: NaiveDate, date: NaiveDate) -> Option<BenchmarkEntry> {
        if date < base {
            return None;
        }
        let close = *self.closes.get(&date)?;
        let (_, anchor) = self.closes.range(base..=date).next()?;
        let daily_return = match self.closes.range(base..date).next_back() {
            Some((_, prior)) => close / prior - 1.0,
            None => 0.0,
        };
        Some(BenchmarkEntry {
            date,
            level: BASE_LEVEL * close / anchor,
            daily_return,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn series() -> BenchmarkSeries {
        BenchmarkSeries::new([
            BenchmarkClose { date: d(2), close: Some(3500.0) },
            BenchmarkClose { date: d(3), close: Some(3535.0) },
            BenchmarkClose { date: d(4), close: None },
            BenchmarkClose { date: d(5), close: Some(3464.3) },
            BenchmarkClose { date: d(8), close: Some(f64::NAN) },
        ])
    }

    #[test]
    fn invalid_closes_are_dropped() {
        assert_eq!(series().len(), 3);
        assert!(BenchmarkSeries::default().is_empty());
    }

    #[test]
    fn base_day_is_level_one() {
        let entry = series().entry(d(2), d(2)).unwrap();
        assert_eq!(entry.level, BASE_LEVEL);
        assert_eq!(entry.daily_return, 0.0);
    }

    #[test]
    fn level_telescopes_from_the_anchor() {
        let entry = series().entry(d(2), d(5)).unwrap();
        assert_relative_eq!(entry.level, 3464.3 / 3500.0, epsilon = 1e-12);
        // Jan 4 has no quote, so the return spans Jan 3 to Jan 5.
        assert_relative_eq!(entry.daily_return, 3464.3 / 3535.0 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn anchor_is_first_close_on_or_after_base() {
        let entry = series().entry(d(1), d(3)).unwrap();
        assert_relative_eq!(entry.level, 3535.0 / 3500.0, epsilon = 1e-12);
        let late_base = series().entry(d(3), d(5)).unwrap();
        assert_relative_eq!(late_base.level, 3464.3 / 3535.0, epsilon = 1e-12);
    }

    #[test]
    fn missing_quote_has_no_entry() {
        assert!(series().entry(d(2), d(4)).is_none());
        assert!(series().entry(d(2), d(8)).is_none());
        assert!(series().entry(d(5), d(3)).is_none());
    }
}
