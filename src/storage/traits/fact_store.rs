//! The Fact Store trait (C1): single source of truth for facts.

use std::collections::HashMap;

use crate::Result;
use crate::models::{Category, Fact, FactId};

/// Aggregate counts returned by [`FactStore::stats`].
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FactStats {
    /// Count of non-obsolete facts.
    pub active: u64,
    /// Count of obsolete facts.
    pub obsolete: u64,
    /// Active fact count per category.
    pub by_category: HashMap<String, u64>,
}

/// Durable storage of facts with embeddings, access stats, and obsolescence marks.
///
/// Implementations hold a process-wide read-write lock: reads ([`FactStore::get`],
/// [`FactStore::search_similar`], [`FactStore::recent`], [`FactStore::by_category`]) acquire it
/// shared; mutations ([`FactStore::insert`], [`FactStore::update`], [`FactStore::mark_obsolete`],
/// [`FactStore::update_access`], [`FactStore::prune_old`]) acquire it exclusive.
pub trait FactStore: Send + Sync {
    /// Assigns an id, persists all columns, and returns the id. Atomic: a persistence error
    /// leaves the store unchanged.
    fn insert(&self, fact: &Fact) -> Result<FactId>;

    /// Returns the fact with `id`, or `None` if it does not exist.
    fn get(&self, id: FactId) -> Result<Option<Fact>>;

    /// Rewrites the mutable fields of an existing fact. `id` and `created_at` are preserved
    /// regardless of what `fact` carries for them.
    fn update(&self, fact: &Fact) -> Result<()>;

    /// Atomically sets `is_obsolete = true` and, if given, `superseded_by`.
    fn mark_obsolete(&self, id: FactId, superseded_by: Option<FactId>) -> Result<()>;

    /// Increments `access_count` and sets `last_accessed` to now. Best-effort by convention of
    /// callers (the Retriever logs rather than propagates failures here).
    fn update_access(&self, id: FactId) -> Result<()>;

    /// Returns the `k` facts with highest cosine similarity to `query_vec` among facts whose
    /// embedding is present and of dimension `D`. Ties are broken by higher `id`. Zero results
    /// is not an error.
    fn search_similar(
        &self,
        query_vec: &[f32],
        k: usize,
        include_obsolete: bool,
    ) -> Result<Vec<(Fact, f32)>>;

    /// Returns up to `k` facts ordered by `created_at` descending.
    fn recent(&self, k: usize, include_obsolete: bool) -> Result<Vec<Fact>>;

    /// Returns up to `k` active facts in the given category.
    fn by_category(&self, category: Category, k: usize) -> Result<Vec<Fact>>;

    /// When `active count > prune_threshold`, removes the lowest-importance,
    /// least-recently-accessed active facts until `active count <= prune_keep_recent`. Returns
    /// the number of facts removed (0 if the threshold was not exceeded).
    fn prune_old(&self, prune_threshold: usize, prune_keep_recent: usize) -> Result<u64>;

    /// Returns aggregate counts over the store.
    fn stats(&self) -> Result<FactStats>;
}
