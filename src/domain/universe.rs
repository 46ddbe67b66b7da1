//! The security universe.

use crate::domain::security::Security;
use std::collections::BTreeMap;

/// All securities known to a run, keyed by upper-cased code.
///
/// Iteration order is by code, which keeps classification output
/// deterministic regardless of how the data source ordered its rows.
#[derive(Debug, Clone, Default)]
pub struct Universe {
    securities: BTreeMap<String, Security>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty security code")]
    EmptyCode,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

impl Universe {
    pub fn new(securities: Vec<Security>) -> Result<Self, UniverseError> {
        let mut map = BTreeMap::new();
        for mut security in securities {
            let code = security.code.trim().to_uppercase();
            if code.is_empty() {
                return Err(UniverseError::EmptyCode);
            }
            if map.contains_key(&code) {
                return Err(UniverseError::DuplicateCode(code));
            }
            security.code = code.clone();
            map.insert(code, security);
        }
        Ok(Self { securities: map })
    }

    pub fn count(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&Security> {
        self.securities.get(&code.to_uppercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Security> {
        self.securities.values()
    }
}
