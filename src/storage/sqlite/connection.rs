//! Connection handling shared by the Fact Store and Entity Graph: a `Mutex<Connection>` with
//! poison recovery, guarded by an outer `RwLock<()>` that encodes the shared-read /
//! exclusive-write discipline the concurrency model specifies.
//!
//! Both locks are kept deliberately: the outer `RwLock` makes multi-statement sequences (e.g.
//! the Updater's `DELETE k` — insert the replacement, then mark the original obsolete) appear
//! atomic to other callers, while `SQLite`'s own transactions give each individual statement
//! its own durability guarantee. Neither alone is sufficient; see `DESIGN.md`.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rusqlite::Connection;

use crate::{Error, Result};

use super::schema::initialize_schema;

/// Shared `SQLite` connection state for the Fact Store and Entity Graph.
pub struct SqliteHandle {
    conn: Mutex<Connection>,
    lock: RwLock<()>,
    embedding_dim: usize,
}

impl SqliteHandle {
    /// Opens (or creates) a database file at `path` and bootstraps the schema.
    pub(crate) fn open(path: &str, embedding_dim: usize) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::StorageUnavailable(format!("opening {path}: {e}")))?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            lock: RwLock::new(()),
            embedding_dim,
        })
    }

    /// Opens an in-memory database and bootstraps the schema.
    pub(crate) fn open_in_memory(embedding_dim: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::StorageUnavailable(format!("opening in-memory db: {e}")))?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            lock: RwLock::new(()),
            embedding_dim,
        })
    }

    /// The fixed embedding dimension `D` for this store.
    pub(crate) const fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Acquires the read-side of the outer lock and a connection guard for a read-only
    /// operation. Recovers from mutex poisoning rather than propagating a panic: a previous
    /// panicking holder does not corrupt `SQLite`'s own state, so the connection remains
    /// usable.
    pub(crate) fn read(&self) -> Result<(RwLockReadGuard<'_, ()>, MutexGuard<'_, Connection>)> {
        let guard = self
            .lock
            .read()
            .map_err(|_| Error::StorageUnavailable("fact store read lock poisoned".to_string()))?;
        let conn = self.acquire_conn()?;
        Ok((guard, conn))
    }

    /// Acquires the write-side of the outer lock and a connection guard for a mutating
    /// operation.
    pub(crate) fn write(&self) -> Result<(RwLockWriteGuard<'_, ()>, MutexGuard<'_, Connection>)> {
        let guard = self.lock.write().map_err(|_| {
            Error::StorageUnavailable("fact store write lock poisoned".to_string())
        })?;
        let conn = self.acquire_conn()?;
        Ok((guard, conn))
    }

    fn acquire_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        match self.conn.lock() {
            Ok(guard) => Ok(guard),
            Err(poisoned) => {
                tracing::warn!("sqlite connection mutex was poisoned; recovering");
                Ok(poisoned.into_inner())
            },
        }
    }
}
