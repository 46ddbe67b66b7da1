//! Persisted NAV series port trait.

use crate::domain::error::ZooIndexError;
use crate::domain::merge::NavBook;

/// Storage for the NAV series. The merge step is its only writer.
pub trait NavStorePort {
    /// The stored series, or an empty book when nothing has been written yet.
    fn load(&self) -> Result<NavBook, ZooIndexError>;

    /// Replaces the stored series with `book`.
    fn save(&self, book: &NavBook) -> Result<(), ZooIndexError>;
}
