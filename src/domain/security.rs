//! Security reference data and as-of name resolution.

use crate::domain::error::ZooIndexError;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameChange {
    pub effective: NaiveDate,
    pub name: String,
}

impl NameChange {
    pub fn new(effective: NaiveDate, name: impl Into<String>) -> Self {
        Self {
            effective,
            name: name.into(),
        }
    }
}

/// Display-name history ordered by effective date.
///
/// Entries are kept sorted with unique effective dates so lookups can binary
/// search. When two entries share a date the later one in the input wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameHistory {
    entries: Vec<NameChange>,
}

impl NameHistory {
    pub fn new(mut entries: Vec<NameChange>) -> Self {
        entries.sort_by_key(|e| e.effective);
        let mut deduped: Vec<NameChange> = Vec::with_capacity(entries.len());
        for entry in entries {
            match deduped.last_mut() {
                Some(last) if last.effective == entry.effective => *last = entry,
                _ => deduped.push(entry),
            }
        }
        Self { entries: deduped }
    }

    /// Name in effect on `as_of`: the entry with the latest effective date
    /// not after `as_of`.
    pub fn resolve(&self, as_of: NaiveDate) -> Option<&str> {
        let idx = self.entries.partition_point(|e| e.effective <= as_of);
        idx.checked_sub(1).map(|i| self.entries[i].name.as_str())
    }

    pub fn latest(&self) -> Option<&str> {
        self.entries.last().map(|e| e.name.as_str())
    }

    pub fn entries(&self) -> &[NameChange] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Security {
    pub code: String,
    pub exchange: String,
    pub names: NameHistory,
    pub list_date: Option<NaiveDate>,
    pub delist_date: Option<NaiveDate>,
}

impl Security {
    pub fn resolve_name(&self, as_of: NaiveDate) -> Result<&str, ZooIndexError> {
        self.names
            .resolve(as_of)
            .ok_or_else(|| ZooIndexError::NoNameRecord {
                code: self.code.clone(),
                as_of,
            })
    }

    /// Listed on or before `date` and not delisted before it.
    pub fn is_listed_on(&self, date: NaiveDate) -> bool {
        self.list_date.is_none_or(|d| d <= date) && self.delist_date.is_none_or(|d| d >= date)
    }
}
