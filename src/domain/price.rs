//! Daily close prices keyed by (code, trading date).

use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub code: String,
    pub date: NaiveDate,
    /// `None` when the source has a row but no quote.
    pub close: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    closes: HashMap<(String, NaiveDate), Option<f64>>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: impl IntoIterator<Item = PriceRow>) -> Self {
        let mut table = Self::new();
        for row in rows {
            table.insert(row);
        }
        table
    }

    pub fn insert(&mut self, row: PriceRow) {
        self.closes
            .insert((row.code.to_uppercase(), row.date), row.close);
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    /// A usable close: present, finite and strictly positive.
    pub fn close(&self, code: &str, date: NaiveDate) -> Option<f64> {
        self.closes
            .get(&(code.to_uppercase(), date))
            .copied()
            .flatten()
            .filter(|p| p.is_finite() && *p > 0.0)
    }
}
