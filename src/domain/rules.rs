//! Membership rule configuration.
//!
//! A [`RuleConfig`] is built once per run and passed by reference into every
//! classification call; nothing here is process-wide state.

use crate::domain::error::ZooIndexError;
use crate::domain::membership::Variant;
use std::collections::{BTreeSet, HashSet};

pub const DEFAULT_EXCHANGES: [&str; 2] = ["SSE", "SZSE"];
pub const BEIJING_EXCHANGE: &str = "BSE";

/// Marker in a display name that flags special-treatment (ST / *ST) status.
pub const ST_MARKER: &str = "ST";

#[derive(Debug, Clone, PartialEq)]
pub struct RuleConfig {
    pub strict_keywords: Vec<String>,
    pub extended_keywords: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Codes or exact names.
    pub force_include: Vec<String>,
    /// Codes or exact names.
    pub force_exclude: Vec<String>,
    pub exclude_st: bool,
    pub exchanges: BTreeSet<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            strict_keywords: Vec::new(),
            extended_keywords: Vec::new(),
            exclude_patterns: Vec::new(),
            force_include: Vec::new(),
            force_exclude: Vec::new(),
            exclude_st: true,
            exchanges: DEFAULT_EXCHANGES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RuleConfig {
    pub fn keywords(&self, variant: Variant) -> &[String] {
        match variant {
            Variant::Strict => &self.strict_keywords,
            Variant::Extended => &self.extended_keywords,
        }
    }

    /// Rejects malformed or contradictory configuration.
    pub fn validate(&self) -> Result<(), ZooIndexError> {
        if self.strict_keywords.is_empty() && self.extended_keywords.is_empty() {
            return Err(invalid("no keywords configured for either variant"));
        }
        for variant in Variant::ALL {
            if self.keywords(variant).iter().any(|k| k.trim().is_empty()) {
                return Err(invalid(format!("empty keyword in {variant} keyword set")));
            }
        }
        if self.exclude_patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid("empty exclude pattern would exclude every name"));
        }
        if self.exchanges.is_empty() {
            return Err(invalid("exchange set is empty"));
        }

        let excluded: HashSet<String> = self
            .force_exclude
            .iter()
            .map(|e| normalize_force_entry(e))
            .collect();
        let mut conflicts: Vec<&str> = self
            .force_include
            .iter()
            .filter(|e| excluded.contains(&normalize_force_entry(e)))
            .map(String::as_str)
            .collect();
        if !conflicts.is_empty() {
            conflicts.sort_unstable();
            conflicts.dedup();
            return Err(invalid(format!(
                "in both force_include and force_exclude: {}",
                conflicts.join(", ")
            )));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ZooIndexError {
    ZooIndexError::InvalidRuleConfig {
        reason: reason.into(),
    }
}

/// Force-list entries compare case-insensitively so `600000.sh` and
/// `600000.SH` are the same code. Names are unaffected by ASCII casing.
pub fn normalize_force_entry(entry: &str) -> String {
    entry.trim().to_uppercase()
}

/// Splits a comma-separated list: entries trimmed, empties dropped,
/// duplicates removed keeping the first occurrence.
pub fn parse_list(input: &str) -> Vec<String> {
    union_preserving_order(&[], input.split(',').map(str::trim))
}

/// `first` followed by the unseen items of `rest`.
pub fn union_preserving_order<'a>(
    first: &'a [String],
    rest: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for item in first.iter().map(String::as_str).chain(rest) {
        if item.is_empty() || !seen.insert(item.to_string()) {
            continue;
        }
        out.push(item.to_string());
    }
    out
}
