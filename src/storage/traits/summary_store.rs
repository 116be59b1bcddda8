//! The Summary Store trait (C6 persistence): the singleton `rolling_summary` row.

use crate::Result;
use crate::models::RollingSummary;

/// Durable storage for the single [`RollingSummary`] row.
///
/// Implementations share the Fact Store's lock discipline: [`SummaryStore::load`] acquires the
/// shared side, [`SummaryStore::save`] the exclusive side.
pub trait SummaryStore: Send + Sync {
    /// Returns the persisted summary, or [`RollingSummary::empty`] if none has ever been saved.
    fn load(&self) -> Result<RollingSummary>;

    /// Replaces the singleton row in place (upsert on the fixed `id = 1`).
    fn save(&self, summary: &RollingSummary) -> Result<()>;
}
