//! Rule Engine: classifies the universe into strict and extended memberships.
//!
//! Per security and variant, in precedence order:
//!
//! 1. no as-of name → skipped (recorded as a diagnostic)
//! 2. code or exact name in `force_exclude` → out
//! 3. code or exact name in `force_include` → in, tagged as forced
//! 4. exclude pattern, ST status, or disallowed exchange → out
//! 5. otherwise in iff the name contains one of the variant's keywords
//!
//! Variants never borrow each other's keywords: a name is strict only if it
//! contains a strict keyword, even when an extended keyword it contains is a
//! substring of some strict keyword.

use crate::domain::membership::{Constituent, MatchKind, MembershipSnapshot, Variant};
use crate::domain::rules::{normalize_force_entry, RuleConfig, ST_MARKER};
use crate::domain::security::Security;
use crate::domain::universe::Universe;
use chrono::NaiveDate;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    ForceExcluded,
    ExcludePattern(String),
    SpecialTreatment,
    Exchange(String),
    NoKeyword,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Included { matched: MatchKind, ambiguous: bool },
    Excluded(ExclusionReason),
}

/// Force lists split into code and name lookups.
#[derive(Debug, Default)]
struct ForceList {
    codes: HashSet<String>,
    names: HashSet<String>,
}

impl ForceList {
    fn new(entries: &[String]) -> Self {
        Self {
            codes: entries.iter().map(|e| normalize_force_entry(e)).collect(),
            names: entries.iter().map(|e| e.trim().to_string()).collect(),
        }
    }

    fn hits(&self, code: &str, name: &str) -> bool {
        self.codes.contains(&code.to_uppercase()) || self.names.contains(name)
    }
}

/// Precompiled view of a [`RuleConfig`].
#[derive(Debug)]
pub struct Matcher<'a> {
    config: &'a RuleConfig,
    include: ForceList,
    exclude: ForceList,
    exchanges: HashSet<String>,
    strict: Vec<&'a str>,
    extended: Vec<&'a str>,
}

impl<'a> Matcher<'a> {
    pub fn new(config: &'a RuleConfig) -> Self {
        Self {
            config,
            include: ForceList::new(&config.force_include),
            exclude: ForceList::new(&config.force_exclude),
            exchanges: config.exchanges.iter().map(|e| e.to_uppercase()).collect(),
            strict: sorted_keywords(&config.strict_keywords),
            extended: sorted_keywords(&config.extended_keywords),
        }
    }

    pub fn decide(&self, security: &Security, name: &str, variant: Variant) -> Decision {
        if self.exclude.hits(&security.code, name) {
            return Decision::Excluded(ExclusionReason::ForceExcluded);
        }
        if self.include.hits(&security.code, name) {
            return Decision::Included {
                matched: MatchKind::Forced,
                ambiguous: false,
            };
        }
        if let Some(pattern) = self
            .config
            .exclude_patterns
            .iter()
            .find(|p| !p.is_empty() && name.contains(p.as_str()))
        {
            return Decision::Excluded(ExclusionReason::ExcludePattern(pattern.clone()));
        }
        if self.config.exclude_st && name.contains(ST_MARKER) {
            return Decision::Excluded(ExclusionReason::SpecialTreatment);
        }
        if !self.exchanges.contains(&security.exchange.to_uppercase()) {
            return Decision::Excluded(ExclusionReason::Exchange(security.exchange.clone()));
        }
        match self.first_keyword(name, variant) {
            Some(keyword) => Decision::Included {
                ambiguous: keyword.chars().count() == 1,
                matched: MatchKind::Keyword(keyword.to_string()),
            },
            None => Decision::Excluded(ExclusionReason::NoKeyword),
        }
    }

    fn first_keyword(&self, name: &str, variant: Variant) -> Option<&'a str> {
        let keywords = match variant {
            Variant::Strict => &self.strict,
            Variant::Extended => &self.extended,
        };
        keywords.iter().copied().find(|k| name.contains(k))
    }
}

/// Longest first by character count, ties broken lexicographically.
fn sorted_keywords(keywords: &[String]) -> Vec<&str> {
    let mut sorted: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    sorted.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });
    sorted.dedup();
    sorted
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationDiagnostics {
    /// Codes skipped because no name was effective on the as-of date.
    pub missing_names: Vec<String>,
    /// Codes skipped because they were not listed on the as-of date.
    pub not_listed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub as_of: NaiveDate,
    pub strict: MembershipSnapshot,
    pub extended: MembershipSnapshot,
    pub diagnostics: ClassificationDiagnostics,
}

impl Classification {
    pub fn snapshot(&self, variant: Variant) -> &MembershipSnapshot {
        match variant {
            Variant::Strict => &self.strict,
            Variant::Extended => &self.extended,
        }
    }
}

pub fn classify(universe: &Universe, as_of: NaiveDate, config: &RuleConfig) -> Classification {
    let matcher = Matcher::new(config);
    let mut strict = Vec::new();
    let mut extended = Vec::new();
    let mut diagnostics = ClassificationDiagnostics::default();

    for security in universe.iter() {
        if !security.is_listed_on(as_of) {
            diagnostics.not_listed.push(security.code.clone());
            continue;
        }
        let name = match security.resolve_name(as_of) {
            Ok(name) => name,
            Err(e) => {
                log::debug!("skipping {}: {}", security.code, e);
                diagnostics.missing_names.push(security.code.clone());
                continue;
            }
        };

        for variant in Variant::ALL {
            if let Decision::Included { matched, ambiguous } =
                matcher.decide(security, name, variant)
            {
                let constituent = Constituent {
                    code: security.code.clone(),
                    name: name.to_string(),
                    matched,
                    ambiguous,
                };
                match variant {
                    Variant::Strict => strict.push(constituent),
                    Variant::Extended => extended.push(constituent),
                }
            }
        }
    }

    if !diagnostics.missing_names.is_empty() {
        log::info!(
            "{}: {} securities without an as-of name were skipped",
            as_of,
            diagnostics.missing_names.len()
        );
    }

    Classification {
        as_of,
        strict: MembershipSnapshot::new(as_of, Variant::Strict, strict),
        extended: MembershipSnapshot::new(as_of, Variant::Extended, extended),
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::security::{NameChange, NameHistory};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn security(code: &str, exchange: &str, name: &str) -> Security {
        Security {
            code: code.to_string(),
            exchange: exchange.to_string(),
            names: NameHistory::new(vec![NameChange::new(d(2000, 1, 1), name)]),
            list_date: None,
            delist_date: None,
        }
    }

    fn rules(strict: &[&str], extended: &[&str]) -> RuleConfig {
        RuleConfig {
            strict_keywords: strict.iter().map(|s| s.to_string()).collect(),
            extended_keywords: extended.iter().map(|s| s.to_string()).collect(),
            exclude_st: false,
            ..RuleConfig::default()
        }
    }

    #[test]
    fn multi_character_keyword_is_not_ambiguous() {
        let config = rules(&["熊猫"], &["熊猫"]);
        let universe = Universe::new(vec![security("X001", "SZSE", "国星熊猫")]).unwrap();
        let result = classify(&universe, d(2024, 1, 2), &config);

        let member = result.strict.get("X001").unwrap();
        assert_eq!(member.matched, MatchKind::Keyword("熊猫".into()));
        assert!(!member.ambiguous);
        assert_eq!(member.name, "国星熊猫");
    }

    #[test]
    fn exclude_pattern_beats_single_character_keyword() {
        let config = RuleConfig {
            exclude_patterns: vec!["马钢".into()],
            ..rules(&[], &["马"])
        };
        let universe = Universe::new(vec![security("X002", "SSE", "马钢股份")]).unwrap();
        let result = classify(&universe, d(2024, 1, 2), &config);
        assert!(result.extended.is_empty());

        let matcher = Matcher::new(&config);
        let sec = universe.get("X002").unwrap();
        assert_eq!(
            matcher.decide(sec, "马钢股份", Variant::Extended),
            Decision::Excluded(ExclusionReason::ExcludePattern("马钢".into()))
        );
    }

    #[test]
    fn single_character_match_is_flagged() {
        let config = rules(&[], &["马"]);
        let universe = Universe::new(vec![security("X003", "SSE", "马应龙")]).unwrap();
        let result = classify(&universe, d(2024, 1, 2), &config);
        assert!(result.extended.get("X003").unwrap().ambiguous);
    }

    #[test]
    fn longest_keyword_wins() {
        let config = rules(&["CATFISH", "CAT"], &["CATFISH", "CAT"]);
        let matcher = Matcher::new(&config);
        let sec = security("000001.SZ", "SZSE", "ACME CATFISH LTD");
        match matcher.decide(&sec, "ACME CATFISH LTD", Variant::Strict) {
            Decision::Included { matched, .. } => {
                assert_eq!(matched, MatchKind::Keyword("CATFISH".into()))
            }
            other => panic!("expected inclusion, got {other:?}"),
        }
    }

    #[test]
    fn longer_keyword_clears_ambiguity_flag() {
        let config = rules(&[], &["马", "熊猫"]);
        let matcher = Matcher::new(&config);
        let sec = security("X004", "SSE", "马熊猫");
        assert_eq!(
            matcher.decide(&sec, "马熊猫", Variant::Extended),
            Decision::Included {
                matched: MatchKind::Keyword("熊猫".into()),
                ambiguous: false
            }
        );
    }

    #[test]
    fn equal_length_keywords_tie_break_lexicographically() {
        let config = rules(&[], &["牛", "马"]);
        let matcher = Matcher::new(&config);
        let sec = security("X005", "SSE", "牛马");
        let expected = if "牛" < "马" { "牛" } else { "马" };
        match matcher.decide(&sec, "牛马", Variant::Extended) {
            Decision::Included { matched, .. } => {
                assert_eq!(matched, MatchKind::Keyword(expected.into()))
            }
            other => panic!("expected inclusion, got {other:?}"),
        }
    }

    #[test]
    fn force_exclude_beats_keyword_and_force_include() {
        let config = RuleConfig {
            force_include: vec!["X006".into()],
            force_exclude: vec!["国星熊猫".into()],
            ..rules(&["熊猫"], &["熊猫"])
        };
        let universe = Universe::new(vec![security("X006", "SSE", "国星熊猫")]).unwrap();
        let result = classify(&universe, d(2024, 1, 2), &config);
        assert!(result.strict.is_empty());
        assert!(result.extended.is_empty());
    }

    #[test]
    fn force_include_beats_pattern_st_and_exchange() {
        let config = RuleConfig {
            force_include: vec!["*ST长城".into(), "830001.bj".into()],
            exclude_patterns: vec!["长城".into()],
            exclude_st: true,
            ..rules(&["熊猫"], &["熊猫"])
        };
        let universe = Universe::new(vec![
            security("600001.SH", "SSE", "*ST长城"),
            security("830001.BJ", "BSE", "北交所公司"),
        ])
        .unwrap();
        let result = classify(&universe, d(2024, 1, 2), &config);
        for variant in Variant::ALL {
            let snap = result.snapshot(variant);
            assert_eq!(snap.len(), 2);
            assert!(snap.iter().all(|c| c.is_forced() && !c.ambiguous));
        }
    }

    #[test]
    fn st_names_are_excluded_when_enabled() {
        let config = RuleConfig {
            exclude_st: true,
            ..rules(&["熊猫"], &["熊猫"])
        };
        let universe = Universe::new(vec![
            security("A", "SSE", "*ST熊猫"),
            security("B", "SSE", "ST熊猫"),
            security("C", "SSE", "熊猫乳品"),
        ])
        .unwrap();
        let result = classify(&universe, d(2024, 1, 2), &config);
        assert_eq!(result.strict.codes().into_iter().collect::<Vec<_>>(), vec!["C"]);
    }

    #[test]
    fn disallowed_exchange_is_excluded() {
        let config = rules(&["熊猫"], &["熊猫"]);
        let matcher = Matcher::new(&config);
        let sec = security("830001.BJ", "BSE", "熊猫科技");
        assert_eq!(
            matcher.decide(&sec, "熊猫科技", Variant::Strict),
            Decision::Excluded(ExclusionReason::Exchange("BSE".into()))
        );
    }

    #[test]
    fn variants_do_not_infer_keyword_hierarchy() {
        // "熊" is only an extended keyword; "熊猫" only strict.
        let config = rules(&["熊猫"], &["熊"]);
        let universe = Universe::new(vec![security("A", "SSE", "熊出没")]).unwrap();
        let result = classify(&universe, d(2024, 1, 2), &config);
        assert!(result.strict.is_empty());
        assert!(result.extended.contains("A"));
    }

    #[test]
    fn names_resolve_as_of_the_classification_date() {
        let mut renamed = security("A", "SSE", "普通公司");
        renamed.names = NameHistory::new(vec![
            NameChange::new(d(2000, 1, 1), "普通公司"),
            NameChange::new(d(2024, 2, 1), "熊猫公司"),
        ]);
        let config = rules(&["熊猫"], &["熊猫"]);
        let universe = Universe::new(vec![renamed]).unwrap();

        assert!(classify(&universe, d(2024, 1, 2), &config).strict.is_empty());
        let after = classify(&universe, d(2024, 2, 1), &config);
        assert_eq!(after.strict.get("A").unwrap().name, "熊猫公司");
    }

    #[test]
    fn missing_names_and_unlisted_are_diagnosed() {
        let mut young = security("NEW", "SSE", "熊猫新股");
        young.list_date = Some(d(2024, 6, 1));
        let mut nameless = security("ANON", "SSE", "x");
        nameless.names = NameHistory::default();
        let config = rules(&["熊猫"], &["熊猫"]);
        let universe = Universe::new(vec![young, nameless]).unwrap();

        let result = classify(&universe, d(2024, 1, 2), &config);
        assert!(result.strict.is_empty());
        assert_eq!(result.diagnostics.not_listed, vec!["NEW"]);
        assert_eq!(result.diagnostics.missing_names, vec!["ANON"]);
    }
}
