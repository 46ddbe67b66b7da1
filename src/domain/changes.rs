//! Change Detector: membership deltas between consecutive reconstitutions.

use crate::domain::membership::{MembershipSnapshot, Variant};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub date: NaiveDate,
    pub variant: Variant,
    /// Code to as-of name in the current snapshot.
    pub added: BTreeMap<String, String>,
    /// Code to as-of name in the previous snapshot.
    pub removed: BTreeMap<String, String>,
    /// Ambiguous matches in the current snapshot, whether or not they moved.
    pub ambiguous: BTreeSet<String>,
}

impl ChangeRecord {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Diffs `current` against the previous reconstitution's snapshot of the same
/// variant. With no previous snapshot every member counts as added.
pub fn diff(previous: Option<&MembershipSnapshot>, current: &MembershipSnapshot) -> ChangeRecord {
    let empty = MembershipSnapshot::empty(current.date, current.variant);
    let previous = previous.unwrap_or(&empty);

    ChangeRecord {
        date: current.date,
        variant: current.variant,
        added: only_in(current, previous),
        removed: only_in(previous, current),
        ambiguous: current.ambiguous().map(|c| c.code.clone()).collect(),
    }
}

fn only_in(a: &MembershipSnapshot, b: &MembershipSnapshot) -> BTreeMap<String, String> {
    a.iter()
        .filter(|c| !b.contains(&c.code))
        .map(|c| (c.code.clone(), c.name.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoiseEntry {
    pub code: String,
    pub name: String,
    pub keyword: String,
}

/// Single-character keyword matches worth a manual look. Forced members are
/// never reported.
pub fn suspected_noise(snapshot: &MembershipSnapshot) -> Vec<NoiseEntry> {
    snapshot
        .ambiguous()
        .filter(|c| !c.is_forced())
        .map(|c| NoiseEntry {
            code: c.code.clone(),
            name: c.name.clone(),
            keyword: c.matched.label().to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedMember {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariantChanges {
    pub added: Vec<ChangedMember>,
    pub removed: Vec<ChangedMember>,
}

fn members(entries: &BTreeMap<String, String>) -> Vec<ChangedMember> {
    entries
        .iter()
        .map(|(code, name)| ChangedMember {
            code: code.clone(),
            name: name.clone(),
        })
        .collect()
}

/// The change document written for one reconstitution date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub date: NaiveDate,
    pub changes: BTreeMap<Variant, VariantChanges>,
    pub suspected_noise: BTreeMap<Variant, Vec<NoiseEntry>>,
}

impl ChangeSummary {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            changes: BTreeMap::new(),
            suspected_noise: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, record: &ChangeRecord, current: &MembershipSnapshot) {
        self.changes.insert(
            record.variant,
            VariantChanges {
                added: members(&record.added),
                removed: members(&record.removed),
            },
        );
        self.suspected_noise
            .insert(record.variant, suspected_noise(current));
    }
}
