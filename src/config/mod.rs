//! Configuration surface: one top-level [`MemoryConfig`] owning a sub-struct per component
//! group, each field documented with its default. Sourcing a config document from a file or
//! environment is out of scope for this crate (see the crate-level docs); this module only
//! defines the in-process shape and its defaults.
//!
//! Boolean flags are plain `bool` (not `Option<bool>`): merging two configs takes the whole
//! incoming struct rather than overlaying only truthy fields, so disabling a flag that
//! defaults to `true` is representable. This resolves the override-asymmetry open question
//! noted in the design notes.

use serde::{Deserialize, Serialize};

/// Storage configuration (C1 Fact Store, C2 Entity Graph).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the on-disk `SQLite` database file.
    pub db_path: String,
    /// Fixed embedding dimension `D` for this store; set at store creation, immutable after.
    pub embedding_dim: usize,
    /// Soft cap on active facts before `PruneOld` is expected to be invoked.
    pub max_facts: usize,
    /// `PruneOld` triggers when `activeCount > pruneThreshold`.
    pub prune_threshold: usize,
    /// `PruneOld` removes facts until `activeCount <= pruneKeepRecent`.
    pub prune_keep_recent: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "memory.sqlite3".to_string(),
            embedding_dim: 384,
            max_facts: 10_000,
            prune_threshold: 12_000,
            prune_keep_recent: 8_000,
        }
    }
}

/// Fact Extractor configuration (C3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Whether extraction runs at all.
    pub enabled: bool,
    /// Whether extraction is enqueued on the bounded async queue rather than run inline.
    pub r#async: bool,
    /// Turns shorter than this (after trimming) are filtered before extraction.
    pub min_text_length: usize,
    /// Upper bound on facts accepted from a single extraction call.
    pub max_facts_per_extraction: usize,
    /// Whether entity extraction runs alongside fact extraction.
    pub extract_entities: bool,
    /// Whether relationship extraction runs alongside fact extraction.
    pub extract_relationships: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            r#async: true,
            min_text_length: 10,
            max_facts_per_extraction: 20,
            extract_entities: true,
            extract_relationships: true,
        }
    }
}

/// Memory Updater configuration (C4).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Whether the Updater's conflict-resolution ladder runs at all; when false every incoming
    /// fact is an unconditional ADD.
    pub enabled: bool,
    /// The similarity at or above which a conflict is consulted with the generator.
    pub conflict_threshold: f32,
    /// Candidate count requested from `SearchSimilar` during candidate search.
    pub top_similar_count: usize,
    /// Whether `UPDATE` asks the generator to merge texts, versus simply replacing with the
    /// new text.
    pub auto_resolve_conflicts: bool,
    /// Whether `DELETE` sets `superseded_by` provenance on the obsoleted fact.
    pub track_supersession: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            conflict_threshold: 0.5,
            top_similar_count: 5,
            auto_resolve_conflicts: true,
            track_supersession: true,
        }
    }
}

/// Entity Graph configuration (C2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Whether the graph pass runs during retrieval and ingestion at all.
    pub enabled: bool,
    /// Hard cap on `Traverse` hop count; the spec fixes this ceiling at 5.
    pub max_hops: u32,
    /// Similarity threshold for entity-embedding-based resolution, if used.
    pub entity_similarity_threshold: f32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_hops: 2,
            entity_similarity_threshold: 0.85,
        }
    }
}

/// Hybrid Retriever configuration (C5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Weight on the semantic-similarity signal, before normalization.
    pub semantic_weight: f32,
    /// Weight on the fact-importance signal, before normalization.
    pub importance_weight: f32,
    /// Weight on the recency signal, before normalization.
    pub recency_weight: f32,
    /// Weight on the access-frequency signal, before normalization.
    pub frequency_weight: f32,
    /// Age, in hours, at which the recency weight halves.
    pub recency_half_life_hours: f32,
    /// Results scoring below this are dropped.
    pub min_score: f32,
    /// Default result count cap.
    pub max_results: usize,
    /// Additive graph-boost weight applied to facts reachable from query-mentioned entities.
    pub graph_results_weight: f32,
    /// Whether the graph pass runs for a given query.
    pub include_graph: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.50,
            importance_weight: 0.25,
            recency_weight: 0.15,
            frequency_weight: 0.10,
            recency_half_life_hours: 168.0,
            min_score: 0.0,
            max_results: 10,
            graph_results_weight: 0.15,
            include_graph: true,
        }
    }
}

impl RetrievalConfig {
    /// Returns the four scoring weights normalized to sum to 1.0.
    ///
    /// Falls back to the default weights if the configured weights sum to zero (or are
    /// otherwise non-positive), so a misconfigured weight set never divides by zero.
    #[must_use]
    pub fn normalized_weights(&self) -> (f32, f32, f32, f32) {
        let sum = self.semantic_weight
            + self.importance_weight
            + self.recency_weight
            + self.frequency_weight;
        if sum <= 0.0 {
            let d = Self::default();
            return (
                d.semantic_weight,
                d.importance_weight,
                d.recency_weight,
                d.frequency_weight,
            );
        }
        (
            self.semantic_weight / sum,
            self.importance_weight / sum,
            self.recency_weight / sum,
            self.frequency_weight / sum,
        )
    }
}

/// Rolling Summary configuration (C6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Whether summary generation runs at all.
    pub enabled: bool,
    /// Whether refresh runs on the background ticker, versus only on explicit
    /// `ForceRefresh`/`MarkDirty`.
    pub r#async: bool,
    /// Background ticker period, in seconds.
    pub refresh_interval_secs: u64,
    /// Number of top facts pulled as regeneration input.
    pub max_facts: usize,
    /// Soft token budget for the generated summary text.
    pub max_tokens: u32,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            r#async: true,
            refresh_interval_secs: 300,
            max_facts: 100,
            max_tokens: 256,
        }
    }
}

/// Context Builder configuration (C7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Fixed system-message text prepended to every built context.
    pub system_message: String,
    /// Number of most recent turns considered for inclusion.
    pub turns_to_use: usize,
    /// Token budget reserved for the rolling summary section, deducted before facts and turns
    /// are fit. Conceptually tied to [`SummaryConfig::max_tokens`].
    pub reserved_for_summary: u32,
    /// Fixed overhead (section separators, role labels) subtracted from the caller-supplied
    /// token budget before allocation.
    pub prompt_overhead_tokens: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            system_message: "You are a helpful assistant with access to long-term memory about \
                              the user."
                .to_string(),
            turns_to_use: 10,
            reserved_for_summary: 256,
            prompt_overhead_tokens: 16,
        }
    }
}

/// Top-level configuration for the memory subsystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Storage (C1, C2) settings.
    pub storage: StorageConfig,
    /// Fact Extractor (C3) settings.
    pub extraction: ExtractionConfig,
    /// Memory Updater (C4) settings.
    pub update: UpdateConfig,
    /// Entity Graph (C2) settings.
    pub graph: GraphConfig,
    /// Hybrid Retriever (C5) settings.
    pub retrieval: RetrievalConfig,
    /// Rolling Summary (C6) settings.
    pub summary: SummaryConfig,
    /// Context Builder (C7) settings.
    pub context: ContextConfig,
}

impl MemoryConfig {
    /// Sets the database path, consuming and returning `self`.
    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<String>) -> Self {
        self.storage.db_path = path.into();
        self
    }

    /// Sets the embedding dimension, consuming and returning `self`.
    #[must_use]
    pub const fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.storage.embedding_dim = dim;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_normalize_to_one() {
        let cfg = RetrievalConfig::default();
        let (s, i, r, f) = cfg.normalized_weights();
        assert!(((s + i + r + f) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_weights_fall_back_to_defaults() {
        let cfg = RetrievalConfig {
            semantic_weight: 0.0,
            importance_weight: 0.0,
            recency_weight: 0.0,
            frequency_weight: 0.0,
            ..RetrievalConfig::default()
        };
        let (s, i, r, f) = cfg.normalized_weights();
        assert!((s + i + r + f - 1.0).abs() < 1e-6);
    }

    #[test]
    fn arbitrary_positive_weights_normalize_to_one() {
        let cfg = RetrievalConfig {
            semantic_weight: 2.0,
            importance_weight: 1.0,
            recency_weight: 1.0,
            frequency_weight: 6.0,
            ..RetrievalConfig::default()
        };
        let (s, i, r, f) = cfg.normalized_weights();
        assert!((s + i + r + f - 1.0).abs() < 1e-6);
        assert!((s - 0.2).abs() < 1e-6);
    }

    #[test]
    fn builder_methods_override_nested_fields() {
        let cfg = MemoryConfig::default()
            .with_db_path("/tmp/test.sqlite3")
            .with_embedding_dim(128);
        assert_eq!(cfg.storage.db_path, "/tmp/test.sqlite3");
        assert_eq!(cfg.storage.embedding_dim, 128);
    }
}
