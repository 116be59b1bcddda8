//! `SQLite`-backed implementations of the Fact Store (C1) and Entity Graph (C2).
//!
//! A single [`SqliteHandle`] — one `Mutex<Connection>` plus one `RwLock<()>` for lock
//! discipline — is shared between a [`SqliteFactStore`] and a [`SqliteEntityGraph`], matching
//! the concurrency model's requirement that the graph "shares the same underlying storage
//! handle and mirrors the same lock discipline" as the fact store.

mod connection;
mod fact_row;
mod fact_store;
mod schema;
mod summary_store;

pub use connection::SqliteHandle;
pub use fact_store::SqliteFactStore;
pub use summary_store::SqliteSummaryStore;

pub(crate) use fact_row::{decode_embedding, encode_embedding};

pub use crate::storage::graph::SqliteEntityGraph;

use std::sync::Arc;

use crate::Result;

/// Opens (or creates) a `SQLite`-backed store at `path`, bootstrapping the schema, and returns
/// a fact store, entity graph, and summary store sharing one underlying connection handle.
///
/// `embedding_dim` fixes `D` for every embedding this store will ever hold (invariant I4); it
/// cannot be changed after creation.
///
/// # Errors
///
/// Returns [`crate::Error::StorageUnavailable`] if the connection cannot be opened or the
/// schema cannot be bootstrapped — per the error-handling policy this is a fatal condition the
/// host should treat as "refuse to start".
pub fn open(
    path: &str,
    embedding_dim: usize,
) -> Result<(SqliteFactStore, SqliteEntityGraph, SqliteSummaryStore)> {
    let handle = Arc::new(SqliteHandle::open(path, embedding_dim)?);
    Ok((
        SqliteFactStore::new(Arc::clone(&handle)),
        SqliteEntityGraph::new(Arc::clone(&handle)),
        SqliteSummaryStore::new(handle),
    ))
}

/// Opens an in-memory store, for tests and ephemeral sessions.
///
/// # Errors
///
/// Returns [`crate::Error::StorageUnavailable`] if the in-memory connection cannot be opened.
pub fn open_in_memory(
    embedding_dim: usize,
) -> Result<(SqliteFactStore, SqliteEntityGraph, SqliteSummaryStore)> {
    let handle = Arc::new(SqliteHandle::open_in_memory(embedding_dim)?);
    Ok((
        SqliteFactStore::new(Arc::clone(&handle)),
        SqliteEntityGraph::new(Arc::clone(&handle)),
        SqliteSummaryStore::new(handle),
    ))
}
