//! The `RollingSummary` record: a singleton, second-person condensation of top facts.

use serde::{Deserialize, Serialize};

use super::FactId;

/// A single, dense second-person summary synthesized from the top facts.
///
/// Exactly one row exists per store; `ForceRefresh`/the background ticker replace it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingSummary {
    /// The summary text (e.g. "You prefer dark mode and live in Berlin.").
    pub summary_text: String,
    /// Wall clock of the most recent regeneration.
    pub updated_at: u64,
    /// The facts the current text was synthesized from.
    pub source_fact_ids: Vec<FactId>,
    /// `source_fact_ids.len()`, persisted redundantly so it can be read without the full list.
    pub fact_count: usize,
    /// Optional embedding of `summary_text`, for summary-aware semantic search.
    pub embedding: Option<Vec<f32>>,
}

impl RollingSummary {
    /// An empty summary, returned when no summary has ever been generated.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            summary_text: String::new(),
            updated_at: 0,
            source_fact_ids: Vec::new(),
            fact_count: 0,
            embedding: None,
        }
    }

    /// True if no summary has ever been generated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summary_text.is_empty()
    }
}

impl Default for RollingSummary {
    fn default() -> Self {
        Self::empty()
    }
}
