//! Backfill Merge Engine: folds freshly computed rows into the persisted
//! NAV series.
//!
//! Incremental merges may only append to or overwrite the tail of a series.
//! Anything that would rewrite history (a batch that skips existing rows, a
//! changed governing snapshot, a calendar gap, a broken level chain) is a
//! [`ZooIndexError::MergeConflict`] and needs a full recompute.

use crate::domain::error::ZooIndexError;
use crate::domain::membership::Variant;
use crate::domain::nav::{NavRow, BASE_LEVEL};
use crate::domain::schedule::TradingCalendar;
use chrono::NaiveDate;
use std::str::FromStr;

const LEVEL_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMode {
    #[default]
    Incremental,
    FullRecompute,
}

impl FromStr for MergeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "incremental" => Ok(MergeMode::Incremental),
            "full" | "full-recompute" | "full_recompute" => Ok(MergeMode::FullRecompute),
            other => Err(format!(
                "unknown merge mode '{other}' (expected incremental or full)"
            )),
        }
    }
}

/// Which days get a full holdings snapshot written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnapshotPolicy {
    #[default]
    FinalDateOnly,
    EveryDay,
}

impl SnapshotPolicy {
    pub fn keeps(&self, date: NaiveDate, final_date: NaiveDate) -> bool {
        match self {
            SnapshotPolicy::FinalDateOnly => date == final_date,
            SnapshotPolicy::EveryDay => true,
        }
    }
}

impl FromStr for SnapshotPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "final" => Ok(SnapshotPolicy::FinalDateOnly),
            "every_day" | "every-day" | "all" => Ok(SnapshotPolicy::EveryDay),
            other => Err(format!(
                "unknown snapshot policy '{other}' (expected final or every_day)"
            )),
        }
    }
}

/// NAV rows of one variant, strictly ordered by date.
#[derive(Debug, Clone, PartialEq)]
pub struct NavSeries {
    pub variant: Variant,
    rows: Vec<NavRow>,
}

impl NavSeries {
    pub fn empty(variant: Variant) -> Self {
        Self {
            variant,
            rows: Vec::new(),
        }
    }

    /// Builds a series from persisted rows. Rows of other variants are
    /// ignored; for a repeated date the last row wins.
    pub fn from_rows(variant: Variant, rows: impl IntoIterator<Item = NavRow>) -> Self {
        let mut rows: Vec<NavRow> = rows.into_iter().filter(|r| r.variant == variant).collect();
        rows.sort_by_key(|r| r.date);
        let mut deduped: Vec<NavRow> = Vec::with_capacity(rows.len());
        for row in rows {
            match deduped.last_mut() {
                Some(last) if last.date == row.date => *last = row,
                _ => deduped.push(row),
            }
        }
        Self {
            variant,
            rows: deduped,
        }
    }

    pub fn rows(&self) -> &[NavRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&NavRow> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&NavRow> {
        self.rows.last()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&NavRow> {
        self.rows
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Latest row strictly before `date`.
    pub fn row_before(&self, date: NaiveDate) -> Option<&NavRow> {
        let idx = self.rows.partition_point(|r| r.date < date);
        idx.checked_sub(1).map(|i| &self.rows[i])
    }
}

/// The persisted NAV file: one series per variant.
#[derive(Debug, Clone, PartialEq)]
pub struct NavBook {
    pub strict: NavSeries,
    pub extended: NavSeries,
}

impl Default for NavBook {
    fn default() -> Self {
        Self {
            strict: NavSeries::empty(Variant::Strict),
            extended: NavSeries::empty(Variant::Extended),
        }
    }
}

impl NavBook {
    pub fn from_rows(rows: Vec<NavRow>) -> Self {
        Self {
            strict: NavSeries::from_rows(Variant::Strict, rows.iter().cloned()),
            extended: NavSeries::from_rows(Variant::Extended, rows),
        }
    }

    pub fn series(&self, variant: Variant) -> &NavSeries {
        match variant {
            Variant::Strict => &self.strict,
            Variant::Extended => &self.extended,
        }
    }

    pub fn series_mut(&mut self, variant: Variant) -> &mut NavSeries {
        match variant {
            Variant::Strict => &mut self.strict,
            Variant::Extended => &mut self.extended,
        }
    }

    /// Rows of every variant, variant-major then by date.
    pub fn rows(&self) -> impl Iterator<Item = &NavRow> {
        self.strict.rows().iter().chain(self.extended.rows())
    }

    pub fn is_empty(&self) -> bool {
        self.strict.is_empty() && self.extended.is_empty()
    }
}

/// A merged series and the stored dates a full recompute removed because the
/// new batch no longer has a row for them.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub series: NavSeries,
    pub dropped: Vec<NaiveDate>,
}

pub fn merge(
    existing: &NavSeries,
    new_rows: &[NavRow],
    mode: MergeMode,
    calendar: &TradingCalendar,
) -> Result<Merged, ZooIndexError> {
    let variant = existing.variant;
    let batch = sorted_batch(variant, new_rows)?;
    let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
        return Ok(Merged {
            series: existing.clone(),
            dropped: Vec::new(),
        });
    };
    let (first_date, last_date) = (first.date, last.date);

    let (rows, dropped) = match mode {
        MergeMode::Incremental => (
            merge_incremental(existing, batch, first_date, calendar)?,
            Vec::new(),
        ),
        MergeMode::FullRecompute => {
            let start = existing.rows.partition_point(|r| r.date < first_date);
            let end = existing.rows.partition_point(|r| r.date <= last_date);
            let dropped: Vec<NaiveDate> = existing.rows[start..end]
                .iter()
                .map(|r| r.date)
                .filter(|date| batch.binary_search_by_key(date, |r| r.date).is_err())
                .collect();
            log::debug!(
                "{variant}: full recompute {first_date}..={last_date} replaces {} rows with {}",
                end - start,
                batch.len()
            );
            for date in &dropped {
                log::warn!("{variant}: full recompute dropped stored row {date}");
            }
            let mut rows: Vec<NavRow> = Vec::with_capacity(existing.len() - (end - start) + batch.len());
            rows.extend_from_slice(&existing.rows[..start]);
            rows.extend(batch);
            rows.extend_from_slice(&existing.rows[end..]);
            rechain_from(&mut rows, start);
            (rows, dropped)
        }
    };

    Ok(Merged {
        series: NavSeries { variant, rows },
        dropped,
    })
}

fn merge_incremental(
    existing: &NavSeries,
    batch: Vec<NavRow>,
    first_date: NaiveDate,
    calendar: &TradingCalendar,
) -> Result<Vec<NavRow>, ZooIndexError> {
    let variant = existing.variant;
    let split = existing.rows.partition_point(|r| r.date < first_date);
    let (history, tail) = existing.rows.split_at(split);

    for old in tail {
        let Ok(idx) = batch.binary_search_by_key(&old.date, |r| r.date) else {
            return Err(conflict(
                variant,
                old.date,
                "existing row is not covered by the incremental batch",
            ));
        };
        if batch[idx].governing_date != old.governing_date {
            return Err(conflict(
                variant,
                old.date,
                format!(
                    "governing snapshot changed from {} to {}",
                    old.governing_date, batch[idx].governing_date
                ),
            ));
        }
    }

    let mut previous = history.last();
    for row in &batch {
        match previous {
            Some(prev) => {
                let skipped = calendar.sessions_between(prev.date, row.date);
                if skipped > 0 {
                    return Err(conflict(
                        variant,
                        row.date,
                        format!("{skipped} trading day(s) missing after {}", prev.date),
                    ));
                }
                let expected = prev.level * (1.0 + row.daily_return);
                if !levels_match(expected, row.level) {
                    return Err(conflict(
                        variant,
                        row.date,
                        format!(
                            "level {} does not chain from {} on {}",
                            row.level, prev.level, prev.date
                        ),
                    ));
                }
            }
            None => {
                if row.level != BASE_LEVEL || row.daily_return != 0.0 {
                    return Err(conflict(
                        variant,
                        row.date,
                        "series head must start at the base level with zero return",
                    ));
                }
            }
        }
        previous = Some(row);
    }

    log::debug!(
        "{variant}: incremental merge keeps {} rows, replaces {}, appends {}",
        history.len(),
        tail.len(),
        batch.len() - tail.len()
    );

    let mut rows = history.to_vec();
    rows.extend(batch);
    Ok(rows)
}

fn sorted_batch(variant: Variant, new_rows: &[NavRow]) -> Result<Vec<NavRow>, ZooIndexError> {
    let mut batch = new_rows.to_vec();
    batch.sort_by_key(|r| r.date);
    if let Some(stray) = batch.iter().find(|r| r.variant != variant) {
        return Err(conflict(
            variant,
            stray.date,
            format!("batch contains a {} row", stray.variant),
        ));
    }
    if let Some(pair) = batch.windows(2).find(|w| w[0].date == w[1].date) {
        return Err(conflict(variant, pair[0].date, "date repeated within batch"));
    }
    Ok(batch)
}

/// Recomputes levels from stored returns starting at `from`.
fn rechain_from(rows: &mut [NavRow], from: usize) {
    for i in from..rows.len() {
        if i == 0 {
            rows[0].level = BASE_LEVEL;
            rows[0].daily_return = 0.0;
        } else {
            rows[i].level = rows[i - 1].level * (1.0 + rows[i].daily_return);
        }
    }
}

fn levels_match(expected: f64, actual: f64) -> bool {
    (expected - actual).abs() <= LEVEL_TOLERANCE * expected.abs().max(1.0)
}

fn conflict(variant: Variant, date: NaiveDate, reason: impl Into<String>) -> ZooIndexError {
    ZooIndexError::MergeConflict {
        variant,
        date,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    /// Jan 2-5, Jan 8-12 2024.
    fn calendar() -> TradingCalendar {
        TradingCalendar::new([2, 3, 4, 5, 8, 9, 10, 11, 12].map(d))
    }

    /// Rows chained from `prior` (or seeded when `None`).
    fn rows(days: &[u32], returns: &[f64], prior: Option<f64>) -> Vec<NavRow> {
        let mut level = prior;
        days.iter()
            .zip(returns)
            .map(|(day, r)| {
                let (lvl, ret) = match level {
                    Some(prev) => (prev * (1.0 + r), *r),
                    None => (BASE_LEVEL, 0.0),
                };
                level = Some(lvl);
                NavRow {
                    date: d(*day),
                    variant: Variant::Strict,
                    governing_date: d(2),
                    level: lvl,
                    daily_return: ret,
                    constituent_count: 3,
                }
            })
            .collect()
    }

    fn series(rows: Vec<NavRow>) -> NavSeries {
        NavSeries::from_rows(Variant::Strict, rows)
    }

    #[test]
    fn parse_modes() {
        assert_eq!("incremental".parse::<MergeMode>().unwrap(), MergeMode::Incremental);
        assert_eq!("FULL".parse::<MergeMode>().unwrap(), MergeMode::FullRecompute);
        assert!("sideways".parse::<MergeMode>().is_err());
        assert_eq!("every_day".parse::<SnapshotPolicy>().unwrap(), SnapshotPolicy::EveryDay);
        assert_eq!("final".parse::<SnapshotPolicy>().unwrap(), SnapshotPolicy::FinalDateOnly);
    }

    #[test]
    fn snapshot_policy_keeps() {
        assert!(SnapshotPolicy::FinalDateOnly.keeps(d(5), d(5)));
        assert!(!SnapshotPolicy::FinalDateOnly.keeps(d(4), d(5)));
        assert!(SnapshotPolicy::EveryDay.keeps(d(4), d(5)));
    }

    #[test]
    fn merge_into_empty_series() {
        let batch = rows(&[2, 3, 4], &[0.0, 0.01, -0.02], None);
        let merged = merge(&NavSeries::empty(Variant::Strict), &batch, MergeMode::Incremental, &calendar()).unwrap().series;
        assert_eq!(merged.rows(), batch.as_slice());
    }

    #[test]
    fn append_extends_tail() {
        let existing = series(rows(&[2, 3], &[0.0, 0.01], None));
        let prior = existing.last().unwrap().level;
        let batch = rows(&[4, 5], &[0.02, 0.03], Some(prior));
        let merged = merge(&existing, &batch, MergeMode::Incremental, &calendar()).unwrap().series;
        assert_eq!(merged.len(), 4);
        assert_relative_eq!(merged.last().unwrap().level, 1.01 * 1.02 * 1.03, epsilon = 1e-12);
    }

    #[test]
    fn rerun_of_last_day_overwrites_it() {
        let existing = series(rows(&[2, 3, 4], &[0.0, 0.01, 0.05], None));
        let prior = existing.get(d(3)).unwrap().level;
        let batch = rows(&[4], &[-0.01], Some(prior));
        let merged = merge(&existing, &batch, MergeMode::Incremental, &calendar()).unwrap().series;
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.last().unwrap().daily_return, -0.01);
    }

    #[test]
    fn incremental_merge_is_idempotent() {
        let existing = series(rows(&[2, 3], &[0.0, 0.01], None));
        let batch = rows(&[4, 5], &[0.02, 0.03], Some(existing.last().unwrap().level));
        let once = merge(&existing, &batch, MergeMode::Incremental, &calendar()).unwrap().series;
        let twice = merge(&once, &batch, MergeMode::Incremental, &calendar()).unwrap().series;
        assert_eq!(once, twice);
    }

    #[test]
    fn batch_skipping_existing_row_conflicts() {
        let existing = series(rows(&[2, 3, 4, 5], &[0.0, 0.01, 0.01, 0.01], None));
        let batch = rows(&[3], &[0.02], Some(1.0));
        let err = merge(&existing, &batch, MergeMode::Incremental, &calendar()).unwrap_err();
        assert!(matches!(err, ZooIndexError::MergeConflict { date, .. } if date == d(4)));
    }

    #[test]
    fn changed_governing_date_conflicts() {
        let existing = series(rows(&[2, 3], &[0.0, 0.01], None));
        let mut batch = rows(&[3], &[0.01], Some(1.0));
        batch[0].governing_date = d(3);
        let err = merge(&existing, &batch, MergeMode::Incremental, &calendar()).unwrap_err();
        assert!(matches!(err, ZooIndexError::MergeConflict { ref reason, .. } if reason.contains("governing")));
    }

    #[test]
    fn calendar_gap_conflicts() {
        let existing = series(rows(&[2, 3], &[0.0, 0.01], None));
        let batch = rows(&[5], &[0.01], Some(existing.last().unwrap().level));
        let err = merge(&existing, &batch, MergeMode::Incremental, &calendar()).unwrap_err();
        assert!(matches!(err, ZooIndexError::MergeConflict { date, .. } if date == d(5)));
    }

    #[test]
    fn weekend_is_not_a_gap() {
        let existing = series(rows(&[2, 3, 4, 5], &[0.0, 0.0, 0.0, 0.0], None));
        let batch = rows(&[8], &[0.01], Some(1.0));
        assert!(merge(&existing, &batch, MergeMode::Incremental, &calendar()).is_ok());
    }

    #[test]
    fn broken_level_chain_conflicts() {
        let existing = series(rows(&[2, 3], &[0.0, 0.01], None));
        let batch = rows(&[4], &[0.02], Some(5.0));
        let err = merge(&existing, &batch, MergeMode::Incremental, &calendar()).unwrap_err();
        assert!(matches!(err, ZooIndexError::MergeConflict { ref reason, .. } if reason.contains("chain")));
    }

    #[test]
    fn unseeded_head_conflicts() {
        let batch = rows(&[2, 3], &[0.01, 0.01], Some(1.0));
        let err = merge(&NavSeries::empty(Variant::Strict), &batch, MergeMode::Incremental, &calendar())
            .unwrap_err();
        assert!(matches!(err, ZooIndexError::MergeConflict { date, .. } if date == d(2)));
    }

    #[test]
    fn wrong_variant_and_duplicate_dates_conflict() {
        let mut batch = rows(&[2], &[0.0], None);
        batch[0].variant = Variant::Extended;
        assert!(merge(&NavSeries::empty(Variant::Strict), &batch, MergeMode::Incremental, &calendar()).is_err());

        let mut dup = rows(&[2, 3], &[0.0, 0.0], None);
        dup[1].date = d(2);
        assert!(merge(&NavSeries::empty(Variant::Strict), &dup, MergeMode::Incremental, &calendar()).is_err());
    }

    #[test]
    fn full_recompute_fills_gaps_and_rechains_later_rows() {
        // History has a hole on Jan 4.
        let existing = series(rows(&[2, 3, 5, 8], &[0.0, 0.01, 0.02, 0.03], None));

        let prior = existing.get(d(3)).unwrap().level;
        let batch = rows(&[4, 5], &[0.10, 0.10], Some(prior));
        let merged = merge(&existing, &batch, MergeMode::FullRecompute, &calendar()).unwrap().series;

        let dates: Vec<_> = merged.rows().iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(2), d(3), d(4), d(5), d(8)]);
        let expected_last = 1.01 * 1.10 * 1.10 * 1.03;
        assert_relative_eq!(merged.last().unwrap().level, expected_last, epsilon = 1e-12);
    }

    #[test]
    fn full_recompute_drops_rows_the_batch_omits() {
        let existing = series(rows(&[2, 3, 4, 5], &[0.0, 0.01, 0.02, 0.03], None));
        let batch = rows(&[3, 5], &[0.0, 0.0], Some(1.0));
        let merged = merge(&existing, &batch, MergeMode::FullRecompute, &calendar()).unwrap();
        let dates: Vec<_> = merged.series.rows().iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(2), d(3), d(5)]);
        assert_eq!(merged.dropped, vec![d(4)]);
    }

    #[test]
    fn full_recompute_of_covered_dates_drops_nothing() {
        let existing = series(rows(&[2, 3, 4], &[0.0, 0.01, 0.02], None));
        let batch = rows(&[3, 4, 5], &[0.0, 0.02, 0.01], Some(1.0));
        let merged = merge(&existing, &batch, MergeMode::FullRecompute, &calendar()).unwrap();
        assert!(merged.dropped.is_empty());
        assert_eq!(merged.series.len(), 4);
    }

    #[test]
    fn full_recompute_is_idempotent() {
        let existing = series(rows(&[2, 3, 4], &[0.0, 0.01, 0.02], None));
        let batch = rows(&[3, 4], &[0.05, 0.05], Some(1.0));
        let once = merge(&existing, &batch, MergeMode::FullRecompute, &calendar()).unwrap().series;
        let twice = merge(&once, &batch, MergeMode::FullRecompute, &calendar()).unwrap().series;
        assert_eq!(once, twice);
    }

    #[test]
    fn book_splits_rows_by_variant() {
        let mut all = rows(&[2, 3], &[0.0, 0.01], None);
        let mut ext = rows(&[2], &[0.0], None);
        ext[0].variant = Variant::Extended;
        all.extend(ext);
        let book = NavBook::from_rows(all);
        assert_eq!(book.strict.len(), 2);
        assert_eq!(book.extended.len(), 1);
        assert_eq!(book.rows().count(), 3);
        assert!(book.series(Variant::Extended).get(d(2)).is_some());
        assert_eq!(book.strict.row_before(d(3)).unwrap().date, d(2));
    }
}
