//! # slm-memory
//!
//! Long-term memory subsystem for a self-hosted conversational runtime for small language
//! models. Persists every exchange, extracts durable facts about the speaker, indexes them
//! under complementary views (semantic, recency, entity-graph), and assembles a bounded,
//! high-signal slice of that memory into a prompt at request time.
//!
//! The generation backend and the embedding model are external collaborators: this crate
//! consumes them only through the [`collaborators::Generator`] and [`collaborators::Embedder`]
//! traits supplied by the host.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

pub mod collaborators;
pub mod config;
pub mod engine;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use collaborators::{Embedder, GenerationOptions, GenerationOutcome, Generator};
pub use config::MemoryConfig;
pub use engine::MemoryEngine;
pub use models::{
    Category, Entity, EntityId, EntityType, Fact, FactId, Relationship, RelationshipId,
    RollingSummary, Role, Turn,
};
pub use services::{ContextBuilder, FactExtractor, HybridRetriever, MemoryUpdater, SummaryService};
pub use storage::sqlite::{SqliteEntityGraph, SqliteFactStore};
pub use storage::traits::{EntityGraphStore, FactStore};

/// Error type for `slm-memory` operations.
///
/// Variants correspond one-to-one with the error taxonomy the memory subsystem is specified
/// against: a fixed set of kinds, not an open-ended wrapper type.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Empty/oversized text, wrong embedding dimension, malformed config |
/// | `NotFound` | A requested fact/entity/relationship id does not exist |
/// | `StorageUnavailable` | The store's connection or lock cannot be acquired |
/// | `StorageFull` | The persistence layer rejects a write (disk full, quota) |
/// | `Backpressure` | A bounded queue (extraction) is full |
/// | `Timeout` | An operation exceeded its configured deadline |
/// | `Cancelled` | A cancellation token fired before completion |
/// | `GeneratorFailure` | The host's generator collaborator returned an error |
/// | `EmbedderFailure` | The host's embedder collaborator returned an error |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - Fact text is empty or exceeds the configured maximum length
    /// - An embedding's length does not equal the store-wide dimension `D`
    /// - A category, entity type, or relation type string does not parse
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A requested record does not exist.
    ///
    /// Raised when:
    /// - `Get`/`Update`/`MarkObsolete` is called with an unknown fact id
    /// - An entity or relationship id referenced by a caller has no row
    #[error("not found: {0}")]
    NotFound(String),

    /// The storage layer could not be reached.
    ///
    /// Raised when:
    /// - The underlying `SQLite` connection's mutex is poisoned and cannot be recovered
    /// - A connection could not be opened at store construction
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The storage layer rejected a write.
    ///
    /// Raised when:
    /// - `SQLite` returns a disk-full or quota-exceeded error on `Insert`/`Update`
    #[error("storage full: {0}")]
    StorageFull(String),

    /// A bounded queue rejected new work.
    ///
    /// Raised when:
    /// - The extraction queue is at capacity when a new job is enqueued
    #[error("backpressure: {0}")]
    Backpressure(String),

    /// An operation exceeded its deadline.
    ///
    /// Raised when:
    /// - Extraction, embedding, or summary refresh runs longer than its configured timeout
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// An operation was cancelled before completion.
    ///
    /// Raised when:
    /// - A caller-supplied cancellation token fires mid-operation
    #[error("cancelled")]
    Cancelled,

    /// The generator collaborator failed.
    ///
    /// Raised when:
    /// - `Generator::generate`/`stream` returns an error
    ///
    /// Inside extraction, update-decision, and summary refresh this is recovered locally
    /// (see `services`); it only surfaces when a caller invokes the generator directly via
    /// `ForceRefresh` and the recovery path itself is exhausted.
    #[error("generator failure: {0}")]
    GeneratorFailure(String),

    /// The embedder collaborator failed.
    ///
    /// Raised when:
    /// - `Embedder::embed` returns an error
    ///
    /// Recovered locally wherever an embedding is optional (facts without an embedding remain
    /// retrievable by non-semantic paths); surfaces only where an embedding is mandatory, e.g.
    /// a caller-supplied query embedding request.
    #[error("embedder failure: {0}")]
    EmbedderFailure(String),
}

/// Result type alias for `slm-memory` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized so that every module shares one epoch source; falls back to 0 if the system
/// clock precedes the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("empty text".to_string());
        assert_eq!(err.to_string(), "invalid input: empty text");

        let err = Error::NotFound("fact 42".to_string());
        assert_eq!(err.to_string(), "not found: fact 42");

        let err = Error::Backpressure("extraction queue full".to_string());
        assert_eq!(err.to_string(), "backpressure: extraction queue full");
    }

    #[test]
    fn test_current_timestamp_is_reasonable() {
        let ts = current_timestamp();
        assert!(ts > 1_700_000_000);
    }
}
