//! [`SqliteFactStore`]: the `SQLite`-backed [`FactStore`] implementation.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::params;

use crate::models::{Category, Fact, FactId};
use crate::storage::traits::{FactStats, FactStore};
use crate::{Error, Result, current_timestamp};

use super::connection::SqliteHandle;
use super::fact_row::{FACT_COLUMNS, build_fact_from_row, encode_embedding, encode_source_turn_ids};

/// `SQLite`-backed [`FactStore`].
///
/// Cheaply cloneable: holds an `Arc<SqliteHandle>` shared with a sibling
/// [`crate::storage::graph::SqliteEntityGraph`].
#[derive(Clone)]
pub struct SqliteFactStore {
    handle: Arc<SqliteHandle>,
}

impl SqliteFactStore {
    pub(crate) const fn new(handle: Arc<SqliteHandle>) -> Self {
        Self { handle }
    }

    fn check_embedding_dim(&self, embedding: &[f32]) -> Result<()> {
        let d = self.handle.embedding_dim();
        if embedding.len() != d {
            return Err(Error::InvalidInput(format!(
                "embedding dimension {} does not match store dimension {d}",
                embedding.len()
            )));
        }
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

impl FactStore for SqliteFactStore {
    #[tracing::instrument(skip(self, fact), fields(category = %fact.category))]
    fn insert(&self, fact: &Fact) -> Result<FactId> {
        if fact.text.trim().is_empty() {
            return Err(Error::InvalidInput("fact text must not be empty".to_string()));
        }
        if let Some(embedding) = &fact.embedding {
            self.check_embedding_dim(embedding)?;
        }

        let (_guard, conn) = self.handle.write()?;
        let embedding_blob = fact.embedding.as_deref().map(encode_embedding);
        conn.execute(
            "INSERT INTO facts (text, category, importance, embedding, created_at, \
             last_accessed, access_count, is_obsolete, superseded_by, source_turn_ids) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                fact.text,
                fact.category.as_str(),
                fact.importance,
                embedding_blob,
                fact.created_at as i64,
                fact.last_accessed as i64,
                fact.access_count as i64,
                fact.is_obsolete,
                fact.superseded_by.map(FactId::value),
                encode_source_turn_ids(&fact.source_turn_ids),
            ],
        )
        .map_err(|e| storage_error(&e))?;

        Ok(FactId(conn.last_insert_rowid()))
    }

    fn get(&self, id: FactId) -> Result<Option<Fact>> {
        let (_guard, conn) = self.handle.read()?;
        let sql = format!("SELECT {FACT_COLUMNS} FROM facts WHERE id = ?1");
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let mut rows = stmt
            .query_map(params![id.value()], build_fact_from_row)
            .map_err(|e| storage_error(&e))?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| storage_error(&e))?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self, fact))]
    fn update(&self, fact: &Fact) -> Result<()> {
        if let Some(embedding) = &fact.embedding {
            self.check_embedding_dim(embedding)?;
        }
        let (_guard, conn) = self.handle.write()?;
        let embedding_blob = fact.embedding.as_deref().map(encode_embedding);
        let changed = conn
            .execute(
                "UPDATE facts SET text = ?1, category = ?2, importance = ?3, embedding = ?4, \
                 last_accessed = ?5, access_count = ?6, is_obsolete = ?7, superseded_by = ?8, \
                 source_turn_ids = ?9 WHERE id = ?10",
                params![
                    fact.text,
                    fact.category.as_str(),
                    fact.importance,
                    embedding_blob,
                    fact.last_accessed as i64,
                    fact.access_count as i64,
                    fact.is_obsolete,
                    fact.superseded_by.map(FactId::value),
                    encode_source_turn_ids(&fact.source_turn_ids),
                    fact.id.value(),
                ],
            )
            .map_err(|e| storage_error(&e))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("fact {}", fact.id)));
        }
        Ok(())
    }

    fn mark_obsolete(&self, id: FactId, superseded_by: Option<FactId>) -> Result<()> {
        let (_guard, conn) = self.handle.write()?;
        let changed = conn
            .execute(
                "UPDATE facts SET is_obsolete = 1, superseded_by = ?1 WHERE id = ?2",
                params![superseded_by.map(FactId::value), id.value()],
            )
            .map_err(|e| storage_error(&e))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("fact {id}")));
        }
        Ok(())
    }

    fn update_access(&self, id: FactId) -> Result<()> {
        let (_guard, conn) = self.handle.write()?;
        let changed = conn
            .execute(
                "UPDATE facts SET access_count = access_count + 1, last_accessed = ?1 \
                 WHERE id = ?2",
                params![current_timestamp() as i64, id.value()],
            )
            .map_err(|e| storage_error(&e))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("fact {id}")));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, query_vec))]
    fn search_similar(
        &self,
        query_vec: &[f32],
        k: usize,
        include_obsolete: bool,
    ) -> Result<Vec<(Fact, f32)>> {
        let (_guard, conn) = self.handle.read()?;
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM facts WHERE embedding IS NOT NULL \
             {}",
            if include_obsolete { "" } else { "AND is_obsolete = 0" }
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let rows = stmt
            .query_map([], build_fact_from_row)
            .map_err(|e| storage_error(&e))?;

        let mut scored = Vec::new();
        for row in rows {
            let fact = row.map_err(|e| storage_error(&e))?;
            let Some(embedding) = fact.embedding.as_deref() else {
                continue;
            };
            if embedding.len() != query_vec.len() {
                continue;
            }
            let sim = cosine_similarity(query_vec, embedding);
            scored.push((fact, sim));
        }

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.id.cmp(&a.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    fn recent(&self, k: usize, include_obsolete: bool) -> Result<Vec<Fact>> {
        let (_guard, conn) = self.handle.read()?;
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM facts {} ORDER BY created_at DESC, id DESC LIMIT ?1",
            if include_obsolete { "" } else { "WHERE is_obsolete = 0" }
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let rows = stmt
            .query_map(params![k as i64], build_fact_from_row)
            .map_err(|e| storage_error(&e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage_error(&e))
    }

    fn by_category(&self, category: Category, k: usize) -> Result<Vec<Fact>> {
        let (_guard, conn) = self.handle.read()?;
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM facts WHERE category = ?1 AND is_obsolete = 0 \
             ORDER BY created_at DESC LIMIT ?2"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let rows = stmt
            .query_map(params![category.as_str(), k as i64], build_fact_from_row)
            .map_err(|e| storage_error(&e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| storage_error(&e))
    }

    #[tracing::instrument(skip(self))]
    fn prune_old(&self, prune_threshold: usize, prune_keep_recent: usize) -> Result<u64> {
        let (_guard, conn) = self.handle.write()?;

        let active_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM facts WHERE is_obsolete = 0",
                [],
                |r| r.get(0),
            )
            .map_err(|e| storage_error(&e))?;

        if (active_count as usize) <= prune_threshold {
            return Ok(0);
        }

        let to_remove = (active_count as usize).saturating_sub(prune_keep_recent);
        if to_remove == 0 {
            return Ok(0);
        }

        // Lowest importance, then least-recently-accessed, survive least.
        let removed = conn
            .execute(
                "DELETE FROM facts WHERE id IN (
                    SELECT id FROM facts WHERE is_obsolete = 0
                    ORDER BY importance ASC, last_accessed ASC
                    LIMIT ?1
                )",
                params![to_remove as i64],
            )
            .map_err(|e| storage_error(&e))?;

        metrics::counter!(crate::observability::counters::PRUNE_REMOVED)
            .increment(removed as u64);
        Ok(removed as u64)
    }

    fn stats(&self) -> Result<FactStats> {
        let (_guard, conn) = self.handle.read()?;
        let active: i64 = conn
            .query_row("SELECT COUNT(*) FROM facts WHERE is_obsolete = 0", [], |r| {
                r.get(0)
            })
            .map_err(|e| storage_error(&e))?;
        let obsolete: i64 = conn
            .query_row("SELECT COUNT(*) FROM facts WHERE is_obsolete = 1", [], |r| {
                r.get(0)
            })
            .map_err(|e| storage_error(&e))?;

        let mut stmt = conn
            .prepare(
                "SELECT category, COUNT(*) FROM facts WHERE is_obsolete = 0 GROUP BY category",
            )
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let mut by_category = HashMap::new();
        let rows = stmt
            .query_map([], |r| {
                let cat: String = r.get(0)?;
                let count: i64 = r.get(1)?;
                Ok((cat, count as u64))
            })
            .map_err(|e| storage_error(&e))?;
        for row in rows {
            let (cat, count) = row.map_err(|e| storage_error(&e))?;
            by_category.insert(cat, count);
        }

        Ok(FactStats {
            active: active as u64,
            obsolete: obsolete as u64,
            by_category,
        })
    }
}

/// Maps a `rusqlite` error to the store's `Storage*` kinds, distinguishing full/quota failures
/// from generic unavailability (constraint violations, lock contention, I/O errors).
fn storage_error(err: &rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(e, _) = err {
        if matches!(
            e.code,
            rusqlite::ErrorCode::DiskFull | rusqlite::ErrorCode::ReadOnly
        ) {
            return Error::StorageFull(err.to_string());
        }
    }
    Error::StorageUnavailable(err.to_string())
}
