//! Configuration validation.
//!
//! Field-level checks on the raw INI values, run before any section is turned
//! into domain types. Semantic rule checks live in [`RuleConfig::validate`].
//!
//! [`RuleConfig::validate`]: crate::domain::rules::RuleConfig::validate

use crate::domain::error::ZooIndexError;
use crate::domain::merge::{MergeMode, SnapshotPolicy};
use crate::domain::run_config::parse_date;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_POOL_SIZE: u32 = 4;
pub const MAX_POOL_SIZE: u32 = 64;

pub const RULE_FLAGS: [&str; 3] = ["exclude_st", "allow_beijing", "merge_strict_into_extended"];

pub fn validate_rules_config(config: &dyn ConfigPort) -> Result<(), ZooIndexError> {
    validate_keywords(config)?;
    for key in RULE_FLAGS {
        validate_flag(config, "rules", key)?;
    }
    Ok(())
}

pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), ZooIndexError> {
    for key in ["date", "start_date", "end_date"] {
        validate_date(config, key)?;
    }
    for key in ["backfill_days", "backfill_years"] {
        validate_count(config, key)?;
    }
    validate_mode(config)?;
    validate_snapshots(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), ZooIndexError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    match source.trim().to_lowercase().as_str() {
        "csv" => match config.get_string("data", "path") {
            Some(p) if !p.trim().is_empty() => Ok(()),
            _ => Err(ZooIndexError::ConfigMissing {
                section: "data".to_string(),
                key: "path".to_string(),
            }),
        },
        "sqlite" => match config.get_string("sqlite", "path") {
            Some(p) if !p.trim().is_empty() => sqlite_pool_size(config).map(|_| ()),
            _ => Err(ZooIndexError::ConfigMissing {
                section: "sqlite".to_string(),
                key: "path".to_string(),
            }),
        },
        other => Err(ZooIndexError::ConfigInvalid {
            section: "data".to_string(),
            key: "source".to_string(),
            reason: format!("unknown data source '{other}' (expected csv or sqlite)"),
        }),
    }
}

/// Connection pool size from `[sqlite] pool_size`, within `1..=MAX_POOL_SIZE`.
pub fn sqlite_pool_size(config: &dyn ConfigPort) -> Result<u32, ZooIndexError> {
    let Some(raw) = config.get_string("sqlite", "pool_size") else {
        return Ok(DEFAULT_POOL_SIZE);
    };
    match raw.trim().parse::<i64>().ok().map(u32::try_from) {
        Some(Ok(n)) if (1..=MAX_POOL_SIZE).contains(&n) => Ok(n),
        _ => Err(ZooIndexError::ConfigInvalid {
            section: "sqlite".to_string(),
            key: "pool_size".to_string(),
            reason: format!("'{}' is not a pool size between 1 and {MAX_POOL_SIZE}", raw.trim()),
        }),
    }
}

fn validate_keywords(config: &dyn ConfigPort) -> Result<(), ZooIndexError> {
    let strict = config.get_string("rules", "strict_keywords");
    let extended = config.get_string("rules", "extended_keywords");
    match (strict, extended) {
        (None, None) => Err(ZooIndexError::ConfigMissing {
            section: "rules".to_string(),
            key: "strict_keywords".to_string(),
        }),
        _ => Ok(()),
    }
}

fn validate_flag(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), ZooIndexError> {
    let Some(value) = config.get_string(section, key) else {
        return Ok(());
    };
    match value.trim().to_lowercase().as_str() {
        "true" | "false" | "yes" | "no" | "on" | "off" | "1" | "0" => Ok(()),
        _ => Err(ZooIndexError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("'{value}' is not a boolean"),
        }),
    }
}

fn validate_date(config: &dyn ConfigPort, key: &str) -> Result<(), ZooIndexError> {
    match config.get_string("run", key) {
        None => Ok(()),
        Some(s) if s.trim().is_empty() => Ok(()),
        Some(s) => parse_date(&s).map(|_| ()).ok_or_else(|| ZooIndexError::ConfigInvalid {
            section: "run".to_string(),
            key: key.to_string(),
            reason: format!("invalid {} format, expected YYYY-MM-DD", key),
        }),
    }
}

fn validate_count(config: &dyn ConfigPort, key: &str) -> Result<(), ZooIndexError> {
    let Some(raw) = config.get_string("run", key) else {
        return Ok(());
    };
    match raw.trim().parse::<u32>() {
        Ok(n) if n >= 1 => Ok(()),
        _ => Err(ZooIndexError::ConfigInvalid {
            section: "run".to_string(),
            key: key.to_string(),
            reason: format!("{} must be a positive integer", key),
        }),
    }
}

fn validate_mode(config: &dyn ConfigPort) -> Result<(), ZooIndexError> {
    match config.get_string("run", "mode") {
        None => Ok(()),
        Some(s) => s
            .parse::<MergeMode>()
            .map(|_| ())
            .map_err(|reason| ZooIndexError::ConfigInvalid {
                section: "run".to_string(),
                key: "mode".to_string(),
                reason,
            }),
    }
}

fn validate_snapshots(config: &dyn ConfigPort) -> Result<(), ZooIndexError> {
    match config.get_string("run", "snapshots") {
        None => Ok(()),
        Some(s) => s
            .parse::<SnapshotPolicy>()
            .map(|_| ())
            .map_err(|reason| ZooIndexError::ConfigInvalid {
                section: "run".to_string(),
                key: "snapshots".to_string(),
                reason,
            }),
    }
}
