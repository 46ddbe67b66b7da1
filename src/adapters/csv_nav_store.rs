//! NAV series persisted as a single CSV file.

use crate::domain::error::ZooIndexError;
use crate::domain::merge::NavBook;
use crate::domain::nav::NavRow;
use crate::ports::nav_store_port::NavStorePort;
use std::fs;
use std::path::PathBuf;

pub const NAV_FILE: &str = "nav.csv";

pub struct CsvNavStore {
    path: PathBuf,
}

impl CsvNavStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl NavStorePort for CsvNavStore {
    fn load(&self) -> Result<NavBook, ZooIndexError> {
        if !self.path.exists() {
            log::info!("no NAV series at {}; starting fresh", self.path.display());
            return Ok(NavBook::default());
        }
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?;
        let rows = rdr
            .deserialize()
            .collect::<Result<Vec<NavRow>, csv::Error>>()?;
        log::debug!("loaded {} NAV rows from {}", rows.len(), self.path.display());
        Ok(NavBook::from_rows(rows))
    }

    /// Writes to a sibling temp file first so a failed write never truncates
    /// the existing series.
    fn save(&self, book: &NavBook) -> Result<(), ZooIndexError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut wtr = csv::Writer::from_path(&tmp)?;
            for row in book.rows() {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::membership::Variant;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn row(variant: Variant, day: u32, level: f64, ret: f64) -> NavRow {
        NavRow {
            date: d(day),
            variant,
            governing_date: d(2),
            level,
            daily_return: ret,
            constituent_count: 12,
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = CsvNavStore::new(dir.path().join(NAV_FILE));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_preserves_rows() {
        let dir = TempDir::new().unwrap();
        let store = CsvNavStore::new(dir.path().join("data").join(NAV_FILE));
        let book = NavBook::from_rows(vec![
            row(Variant::Extended, 2, 1.0, 0.0),
            row(Variant::Strict, 2, 1.0, 0.0),
            row(Variant::Strict, 3, 1.0123456789, 0.0123456789),
        ]);
        store.save(&book).unwrap();
        assert_eq!(store.load().unwrap(), book);
        assert!(!store.path().with_extension("csv.tmp").exists());
    }

    #[test]
    fn file_is_ordered_by_variant_then_date() {
        let dir = TempDir::new().unwrap();
        let store = CsvNavStore::new(dir.path().join(NAV_FILE));
        let book = NavBook::from_rows(vec![
            row(Variant::Extended, 2, 1.0, 0.0),
            row(Variant::Strict, 3, 1.1, 0.1),
            row(Variant::Strict, 2, 1.0, 0.0),
        ]);
        store.save(&book).unwrap();
        let text = fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "date,variant,governing_date,level,daily_return,constituent_count"
        );
        assert!(lines[1].starts_with("2024-01-02,strict"));
        assert!(lines[2].starts_with("2024-01-03,strict"));
        assert!(lines[3].starts_with("2024-01-02,extended"));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(NAV_FILE);
        fs::write(
            &path,
            "date,variant,governing_date,level,daily_return,constituent_count\n2024-01-02,sideways,2024-01-02,1,0,1\n",
        )
        .unwrap();
        let store = CsvNavStore::new(path);
        assert!(matches!(store.load(), Err(ZooIndexError::Serialization { .. })));
    }
}
