//! One index run: schedule, classify, price, chain, merge and diff.
//!
//! The run is a pure function of its inputs. Loading market data and writing
//! the merged series or artifacts is left to the caller.

use crate::domain::benchmark::{BenchmarkEntry, BenchmarkSeries};
use crate::domain::changes::{diff, ChangeSummary};
use crate::domain::classifier::{classify, Classification};
use crate::domain::error::ZooIndexError;
use crate::domain::membership::{MembershipSnapshot, Variant};
use crate::domain::merge::{merge, NavBook};
use crate::domain::nav::{chain_levels, compute_day, DayComputation, NavRow};
use crate::domain::price::PriceTable;
use crate::domain::rules::RuleConfig;
use crate::domain::run_config::{RunConfig, RunWindow};
use crate::domain::schedule::{
    governing_date, previous_reconstitution, reconstitution_dates, TradingCalendar,
};
use crate::domain::universe::Universe;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything a run reads.
#[derive(Debug, Clone, Copy)]
pub struct RunInput<'a> {
    pub universe: &'a Universe,
    pub calendar: &'a TradingCalendar,
    pub prices: &'a PriceTable,
    pub rules: &'a RuleConfig,
    pub existing: &'a NavBook,
    /// Empty when the data source carries no benchmark.
    pub benchmark: &'a BenchmarkSeries,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunDiagnostics {
    /// Codes skipped for lack of an as-of name, per reconstitution date.
    pub missing_names: BTreeMap<NaiveDate, Vec<String>>,
    /// Codes skipped as unlisted, per reconstitution date.
    pub not_listed: BTreeMap<NaiveDate, usize>,
    /// Days whose return was forced to zero because nothing was priced.
    pub zero_constituent_days: Vec<(NaiveDate, Variant)>,
    /// Stored dates a full recompute removed because the window no longer
    /// contains them.
    pub dropped_dates: Vec<(NaiveDate, Variant)>,
}

impl RunDiagnostics {
    pub fn missing_name_count(&self) -> usize {
        self.missing_names.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatestEntry {
    pub date: NaiveDate,
    pub level: f64,
    pub daily_return: f64,
    pub constituent_count: usize,
    /// Daily return over the benchmark's on the same date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excess_return: Option<f64>,
}

impl LatestEntry {
    fn from_row(row: &NavRow, benchmark: Option<&BenchmarkEntry>) -> Self {
        Self {
            date: row.date,
            level: round6(row.level),
            daily_return: round6(row.daily_return),
            constituent_count: row.constituent_count,
            excess_return: benchmark
                .filter(|b| b.date == row.date)
                .map(|b| round6(row.daily_return - b.daily_return)),
        }
    }
}

/// Most recent value of each variant, and of the benchmark when one is
/// tracked, based at the same date as the index series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatestSummary {
    pub date: NaiveDate,
    pub strict: Option<LatestEntry>,
    pub extended: Option<LatestEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<BenchmarkEntry>,
}

impl LatestSummary {
    pub fn from_book(book: &NavBook, benchmark: &BenchmarkSeries) -> Option<Self> {
        let (strict, extended) = (book.strict.last(), book.extended.last());
        let date = strict.iter().chain(extended.iter()).map(|r| r.date).max()?;
        let base = [book.strict.first(), book.extended.first()]
            .into_iter()
            .flatten()
            .map(|r| r.date)
            .min()?;
        let tracked = benchmark.entry(base, date);
        Some(Self {
            date,
            strict: strict.map(|r| LatestEntry::from_row(r, tracked.as_ref())),
            extended: extended.map(|r| LatestEntry::from_row(r, tracked.as_ref())),
            benchmark: tracked.map(|b| BenchmarkEntry {
                date: b.date,
                level: round6(b.level),
                daily_return: round6(b.daily_return),
            }),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Trading dates recomputed by this run.
    pub sessions: Vec<NaiveDate>,
    pub book: NavBook,
    /// Classifications of the reconstitution dates governing the run.
    pub classifications: Vec<Classification>,
    pub changes: Vec<ChangeSummary>,
    /// Per-day computations kept by the snapshot policy.
    pub holdings: Vec<DayComputation>,
    pub latest: Option<LatestSummary>,
    pub diagnostics: RunDiagnostics,
}

#[derive(Debug, Clone)]
pub enum RunStatus {
    /// A single-day run landed on a date the exchange was closed.
    NonTradingDay(NaiveDate),
    Completed(Box<RunOutcome>),
}

pub fn run(input: RunInput<'_>, config: &RunConfig) -> Result<RunStatus, ZooIndexError> {
    let calendar = input.calendar;
    let Some(sessions) = config.window.sessions(calendar) else {
        return match config.window {
            RunWindow::Day(date) => Ok(RunStatus::NonTradingDay(date)),
            _ => Err(ZooIndexError::NoData {
                what: format!("no trading days in window ending {}", config.window.end()),
            }),
        };
    };
    let (Some(&start), Some(&end)) = (sessions.first(), sessions.last()) else {
        return Ok(RunStatus::NonTradingDay(config.window.end()));
    };

    let recon = reconstitution_dates(calendar, start, end);
    log::info!(
        "computing {} sessions {start}..={end} over {} reconstitution dates",
        sessions.len(),
        recon.len()
    );

    let classifications: Vec<Classification> = recon
        .par_iter()
        .map(|date| classify(input.universe, *date, input.rules))
        .collect();
    let by_date: BTreeMap<NaiveDate, &Classification> =
        classifications.iter().map(|c| (c.as_of, c)).collect();

    let mut diagnostics = RunDiagnostics::default();
    for c in &classifications {
        if !c.diagnostics.missing_names.is_empty() {
            diagnostics
                .missing_names
                .insert(c.as_of, c.diagnostics.missing_names.clone());
        }
        diagnostics
            .not_listed
            .insert(c.as_of, c.diagnostics.not_listed.len());
    }

    let mut book = input.existing.clone();
    let mut computed: Vec<DayComputation> = Vec::with_capacity(sessions.len() * 2);

    for variant in Variant::ALL {
        let existing = input.existing.series(variant);
        let prior_row = existing.row_before(start);

        let days = sessions
            .par_iter()
            .enumerate()
            .map(|(i, date)| {
                let governing = governing_date(*date, &recon)?;
                let snapshot = by_date
                    .get(&governing)
                    .map(|c| c.snapshot(variant))
                    .ok_or(ZooIndexError::NoGoverningSnapshot { date: *date })?;
                let prior_date = if i == 0 && prior_row.is_none() {
                    None
                } else {
                    calendar.previous(*date)
                };
                Ok(compute_day(*date, prior_date, snapshot, input.prices, input.universe))
            })
            .collect::<Result<Vec<DayComputation>, ZooIndexError>>()?;

        diagnostics.zero_constituent_days.extend(
            days.iter()
                .filter(|d| d.is_zero_constituent())
                .map(|d| (d.date, variant)),
        );

        let rows = chain_levels(prior_row, &days);
        let merged = merge(existing, &rows, config.mode, calendar)?;
        diagnostics
            .dropped_dates
            .extend(merged.dropped.iter().map(|date| (*date, variant)));
        *book.series_mut(variant) = merged.series;
        computed.extend(days);
    }

    let changes = change_summaries(calendar, input, &classifications);

    let holdings: Vec<DayComputation> = computed
        .into_iter()
        .filter(|d| config.snapshots.keeps(d.date, end))
        .collect();

    if diagnostics.missing_name_count() > 0 {
        log::info!(
            "{} securities skipped without an as-of name",
            diagnostics.missing_name_count()
        );
    }

    if !diagnostics.dropped_dates.is_empty() {
        log::warn!(
            "full recompute removed {} stored rows outside the trading calendar",
            diagnostics.dropped_dates.len()
        );
    }

    if input.benchmark.is_empty() {
        log::debug!("no benchmark closes; latest summary is untracked");
    }
    let latest = LatestSummary::from_book(&book, input.benchmark);
    Ok(RunStatus::Completed(Box::new(RunOutcome {
        sessions: sessions.to_vec(),
        book,
        classifications,
        changes,
        holdings,
        latest,
        diagnostics,
    })))
}

/// One change document per reconstitution date, diffing each snapshot
/// against the one before it. The first in-scope date diffs against the
/// previous month when the calendar reaches back that far.
fn change_summaries(
    calendar: &TradingCalendar,
    input: RunInput<'_>,
    classifications: &[Classification],
) -> Vec<ChangeSummary> {
    let Some(first) = classifications.first() else {
        return Vec::new();
    };
    let lead = previous_reconstitution(calendar, first.as_of)
        .map(|date| classify(input.universe, date, input.rules));

    let mut summaries = Vec::with_capacity(classifications.len());
    let mut previous: Option<&Classification> = lead.as_ref();
    for current in classifications {
        let mut summary = ChangeSummary::new(current.as_of);
        for variant in Variant::ALL {
            let before: Option<&MembershipSnapshot> = previous.map(|p| p.snapshot(variant));
            let snapshot = current.snapshot(variant);
            let record = diff(before, snapshot);
            if record.is_unchanged() {
                log::debug!("{} {variant}: membership unchanged", current.as_of);
            } else {
                log::info!(
                    "{} {variant}: +{} -{}",
                    current.as_of,
                    record.added.len(),
                    record.removed.len()
                );
            }
            summary.record(&record, snapshot);
        }
        summaries.push(summary);
        previous = Some(current);
    }
    summaries
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}
