//! Run artifact port trait.

use crate::domain::backfill::LatestSummary;
use crate::domain::changes::ChangeSummary;
use crate::domain::classifier::Classification;
use crate::domain::error::ZooIndexError;
use crate::domain::nav::DayComputation;
use chrono::NaiveDate;

/// Port for writing per-run documents next to the NAV series.
pub trait ArtifactPort {
    /// Both memberships of one reconstitution date.
    fn write_constituents(&self, classification: &Classification) -> Result<(), ZooIndexError>;

    /// Weighted holdings of every variant computed for `date`.
    fn write_holdings(
        &self,
        date: NaiveDate,
        days: &[&DayComputation],
    ) -> Result<(), ZooIndexError>;

    fn write_changes(&self, summary: &ChangeSummary) -> Result<(), ZooIndexError>;

    fn write_latest(&self, latest: &LatestSummary) -> Result<(), ZooIndexError>;
}
