//! Domain error types.

use chrono::NaiveDate;

use super::membership::Variant;

/// Top-level error type for zooindex.
#[derive(Debug, thiserror::Error)]
pub enum ZooIndexError {
    #[error("no name record for {code} on or before {as_of}")]
    NoNameRecord { code: String, as_of: NaiveDate },

    #[error("no reconstitution snapshot governs {date}")]
    NoGoverningSnapshot { date: NaiveDate },

    #[error("invalid rule config: {reason}")]
    InvalidRuleConfig { reason: String },

    #[error("merge conflict in {variant} series at {date}: {reason}")]
    MergeConflict {
        variant: Variant,
        date: NaiveDate,
        reason: String,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("no data: {what}")]
    NoData { what: String },

    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ZooIndexError {
    fn from(err: serde_json::Error) -> Self {
        ZooIndexError::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<csv::Error> for ZooIndexError {
    fn from(err: csv::Error) -> Self {
        ZooIndexError::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<&ZooIndexError> for std::process::ExitCode {
    fn from(err: &ZooIndexError) -> Self {
        let code: u8 = match err {
            ZooIndexError::Io(_) | ZooIndexError::Serialization { .. } => 1,
            ZooIndexError::ConfigParse { .. }
            | ZooIndexError::ConfigMissing { .. }
            | ZooIndexError::ConfigInvalid { .. }
            | ZooIndexError::InvalidRuleConfig { .. } => 2,
            ZooIndexError::Database { .. } | ZooIndexError::DatabaseQuery { .. } => 3,
            ZooIndexError::NoNameRecord { .. } | ZooIndexError::NoGoverningSnapshot { .. } => 4,
            ZooIndexError::MergeConflict { .. } => 5,
            ZooIndexError::NoData { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
