//! NAV Compute Engine: equal-weight daily returns and chained index levels.
//!
//! A constituent enters a day's mean only if it is listed on the day and has
//! a usable close on both the day and the prior trading day. Missing quotes
//! shrink the denominator, which spreads their weight evenly over the rest.

use crate::domain::membership::{MembershipSnapshot, Variant};
use crate::domain::price::PriceTable;
use crate::domain::universe::Universe;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const BASE_LEVEL: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavRow {
    pub date: NaiveDate,
    pub variant: Variant,
    pub governing_date: NaiveDate,
    pub level: f64,
    pub daily_return: f64,
    pub constituent_count: usize,
}

impl NavRow {
    pub fn seed(date: NaiveDate, variant: Variant, governing_date: NaiveDate, count: usize) -> Self {
        Self {
            date,
            variant,
            governing_date,
            level: BASE_LEVEL,
            daily_return: 0.0,
            constituent_count: count,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Members of the governing snapshot.
    pub total: usize,
    /// Members that entered the mean.
    pub priced: usize,
    /// Members dropped for the day.
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub code: String,
    pub name: String,
    pub weight: f64,
    pub daily_return: f64,
    pub close: f64,
    pub prev_close: Option<f64>,
}

/// One day's return for one variant, before level chaining.
#[derive(Debug, Clone, PartialEq)]
pub struct DayComputation {
    pub date: NaiveDate,
    pub variant: Variant,
    pub governing_date: NaiveDate,
    pub daily_return: f64,
    pub stats: IndexStats,
    pub holdings: Vec<Holding>,
}

impl DayComputation {
    pub fn is_zero_constituent(&self) -> bool {
        self.stats.priced == 0
    }
}

/// Computes a day's equal-weight return against its governing snapshot.
///
/// With no `prior_trading_date` the day is a series seed: its return is zero
/// and its count is the members with a usable close on the day itself.
pub fn compute_day(
    trading_date: NaiveDate,
    prior_trading_date: Option<NaiveDate>,
    snapshot: &MembershipSnapshot,
    prices: &PriceTable,
    universe: &Universe,
) -> DayComputation {
    let mut priced: Vec<(&str, &str, f64, Option<f64>, f64)> = Vec::with_capacity(snapshot.len());

    for member in snapshot.iter() {
        let listed = universe
            .get(&member.code)
            .is_some_and(|s| s.is_listed_on(trading_date));
        if !listed {
            continue;
        }
        let Some(close) = prices.close(&member.code, trading_date) else {
            continue;
        };
        match prior_trading_date {
            Some(prior) => {
                let Some(prev_close) = prices.close(&member.code, prior) else {
                    continue;
                };
                let ret = close / prev_close - 1.0;
                priced.push((member.code.as_str(), member.name.as_str(), close, Some(prev_close), ret));
            }
            None => priced.push((member.code.as_str(), member.name.as_str(), close, None, 0.0)),
        }
    }

    let stats = IndexStats {
        total: snapshot.len(),
        priced: priced.len(),
        missing: snapshot.len() - priced.len(),
    };

    if priced.is_empty() {
        log::warn!(
            "{} {}: no constituent priced (governing {}, {} members); return set to 0",
            trading_date,
            snapshot.variant,
            snapshot.date,
            snapshot.len()
        );
        return DayComputation {
            date: trading_date,
            variant: snapshot.variant,
            governing_date: snapshot.date,
            daily_return: 0.0,
            stats,
            holdings: Vec::new(),
        };
    }

    let n = priced.len() as f64;
    let daily_return = match prior_trading_date {
        Some(_) => priced.iter().map(|p| p.4).sum::<f64>() / n,
        None => 0.0,
    };
    let weight = 1.0 / n;
    let holdings = priced
        .into_iter()
        .map(|(code, name, close, prev_close, ret)| Holding {
            code: code.to_string(),
            name: name.to_string(),
            weight,
            daily_return: ret,
            close,
            prev_close,
        })
        .collect();

    DayComputation {
        date: trading_date,
        variant: snapshot.variant,
        governing_date: snapshot.date,
        daily_return,
        stats,
        holdings,
    }
}

/// Folds per-day returns into rows in date order.
///
/// Without a `prior` row the first day becomes the series head at
/// [`BASE_LEVEL`] with a zero return. Input must be sorted by date.
pub fn chain_levels(prior: Option<&NavRow>, days: &[DayComputation]) -> Vec<NavRow> {
    let mut rows: Vec<NavRow> = Vec::with_capacity(days.len());
    for day in days {
        let previous = rows.last().or(prior);
        let row = match previous {
            Some(prev) => NavRow {
                date: day.date,
                variant: day.variant,
                governing_date: day.governing_date,
                level: prev.level * (1.0 + day.daily_return),
                daily_return: day.daily_return,
                constituent_count: day.stats.priced,
            },
            None => NavRow::seed(day.date, day.variant, day.governing_date, day.stats.priced),
        };
        rows.push(row);
    }
    rows
}
