//! Run artifacts written into an output directory: CSV listings and JSON
//! documents.

use crate::domain::backfill::LatestSummary;
use crate::domain::changes::ChangeSummary;
use crate::domain::classifier::Classification;
use crate::domain::error::ZooIndexError;
use crate::domain::membership::{Variant, WeightedConstituent};
use crate::domain::nav::DayComputation;
use crate::domain::run_config::DATE_FORMAT;
use crate::ports::artifact_port::ArtifactPort;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const LATEST_FILE: &str = "latest.json";

#[derive(Serialize)]
struct ConstituentRecord<'a> {
    variant: Variant,
    code: &'a str,
    name: &'a str,
    keyword: &'a str,
    forced: bool,
    ambiguous: bool,
    weight: f64,
}

#[derive(Serialize)]
struct HoldingRecord<'a> {
    variant: Variant,
    code: &'a str,
    name: &'a str,
    weight: f64,
    daily_return: f64,
    close: f64,
    prev_close: Option<f64>,
}

pub struct FileArtifactAdapter {
    dir: PathBuf,
}

impl FileArtifactAdapter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dated_path(&self, prefix: &str, date: NaiveDate, ext: &str) -> PathBuf {
        self.dir
            .join(format!("{prefix}_{}.{ext}", date.format(DATE_FORMAT)))
    }

    fn prepare(&self) -> Result<(), ZooIndexError> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), ZooIndexError> {
        self.prepare()?;
        let text = serde_json::to_string_pretty(value)?;
        fs::write(path, text + "\n")?;
        Ok(())
    }
}

impl ArtifactPort for FileArtifactAdapter {
    fn write_constituents(&self, classification: &Classification) -> Result<(), ZooIndexError> {
        self.prepare()?;
        let path = self.dated_path("constituents", classification.as_of, "csv");
        let mut wtr = csv::Writer::from_path(&path)?;
        for variant in Variant::ALL {
            let snapshot = classification.snapshot(variant);
            for WeightedConstituent { constituent: c, weight } in snapshot.equal_weights() {
                wtr.serialize(ConstituentRecord {
                    variant,
                    code: &c.code,
                    name: &c.name,
                    keyword: c.matched.label(),
                    forced: c.is_forced(),
                    ambiguous: c.ambiguous,
                    weight,
                })?;
            }
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_holdings(
        &self,
        date: NaiveDate,
        days: &[&DayComputation],
    ) -> Result<(), ZooIndexError> {
        self.prepare()?;
        let path = self.dated_path("holdings", date, "csv");
        let mut wtr = csv::Writer::from_path(&path)?;
        for day in days {
            for h in &day.holdings {
                wtr.serialize(HoldingRecord {
                    variant: day.variant,
                    code: &h.code,
                    name: &h.name,
                    weight: h.weight,
                    daily_return: h.daily_return,
                    close: h.close,
                    prev_close: h.prev_close,
                })?;
            }
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_changes(&self, summary: &ChangeSummary) -> Result<(), ZooIndexError> {
        let path = self.dated_path("changes", summary.date, "json");
        self.write_json(&path, summary)
    }

    fn write_latest(&self, latest: &LatestSummary) -> Result<(), ZooIndexError> {
        self.write_json(&self.dir.join(LATEST_FILE), latest)
    }
}
