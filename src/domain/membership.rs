//! Index variants and per-reconstitution membership snapshots.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Strict,
    Extended,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Strict, Variant::Extended];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Strict => "strict",
            Variant::Extended => "extended",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Variant::Strict),
            "extended" => Ok(Variant::Extended),
            other => Err(format!("unknown variant '{other}'")),
        }
    }
}

/// Why a constituent is in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKind {
    Keyword(String),
    Forced,
}

impl MatchKind {
    pub fn label(&self) -> &str {
        match self {
            MatchKind::Keyword(keyword) => keyword,
            MatchKind::Forced => "forced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constituent {
    pub code: String,
    /// As-of name that triggered inclusion.
    pub name: String,
    pub matched: MatchKind,
    /// Matched through a single-character keyword.
    pub ambiguous: bool,
}

impl Constituent {
    pub fn is_forced(&self) -> bool {
        matches!(self.matched, MatchKind::Forced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedConstituent<'a> {
    pub constituent: &'a Constituent,
    pub weight: f64,
}

/// Membership of one variant as of one reconstitution date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSnapshot {
    pub date: NaiveDate,
    pub variant: Variant,
    members: BTreeMap<String, Constituent>,
}

impl MembershipSnapshot {
    pub fn new(date: NaiveDate, variant: Variant, constituents: Vec<Constituent>) -> Self {
        let members = constituents
            .into_iter()
            .map(|c| (c.code.clone(), c))
            .collect();
        Self {
            date,
            variant,
            members,
        }
    }

    pub fn empty(date: NaiveDate, variant: Variant) -> Self {
        Self::new(date, variant, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.members.contains_key(code)
    }

    pub fn get(&self, code: &str) -> Option<&Constituent> {
        self.members.get(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constituent> {
        self.members.values()
    }

    pub fn codes(&self) -> BTreeSet<&str> {
        self.members.keys().map(String::as_str).collect()
    }

    pub fn ambiguous(&self) -> impl Iterator<Item = &Constituent> {
        self.members.values().filter(|c| c.ambiguous)
    }

    /// The full membership with equal weights attached.
    pub fn equal_weights(&self) -> Vec<WeightedConstituent<'_>> {
        if self.members.is_empty() {
            return Vec::new();
        }
        let weight = 1.0 / self.members.len() as f64;
        self.members
            .values()
            .map(|constituent| WeightedConstituent { constituent, weight })
            .collect()
    }
}
