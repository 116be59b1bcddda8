//! [`SqliteSummaryStore`]: the `SQLite`-backed [`SummaryStore`] implementation over the
//! singleton `rolling_summary` row.

use std::sync::Arc;

use rusqlite::params;

use crate::models::{FactId, RollingSummary};
use crate::storage::traits::SummaryStore;
use crate::{Error, Result};

use super::connection::SqliteHandle;
use super::fact_row::{decode_embedding, encode_embedding};

fn encode_fact_ids(ids: &[FactId]) -> String {
    let raw: Vec<i64> = ids.iter().map(FactId::value).collect();
    serde_json::to_string(&raw).unwrap_or_else(|_| "[]".to_string())
}

fn decode_fact_ids(text: &str) -> Vec<FactId> {
    serde_json::from_str::<Vec<i64>>(text)
        .unwrap_or_default()
        .into_iter()
        .map(FactId)
        .collect()
}

/// `SQLite`-backed [`SummaryStore`], sharing a connection handle with the Fact Store and Entity
/// Graph.
#[derive(Clone)]
pub struct SqliteSummaryStore {
    handle: Arc<SqliteHandle>,
}

impl SqliteSummaryStore {
    pub(crate) const fn new(handle: Arc<SqliteHandle>) -> Self {
        Self { handle }
    }
}

impl SummaryStore for SqliteSummaryStore {
    fn load(&self) -> Result<RollingSummary> {
        let (_guard, conn) = self.handle.read()?;
        let row = conn.query_row(
            "SELECT summary, updated_at, source_facts, fact_count, embedding \
             FROM rolling_summary WHERE id = 1",
            [],
            |r| {
                let summary_text: String = r.get(0)?;
                let updated_at: i64 = r.get(1)?;
                let source_facts: String = r.get(2)?;
                let fact_count: i64 = r.get(3)?;
                let embedding_blob: Option<Vec<u8>> = r.get(4)?;
                Ok((summary_text, updated_at, source_facts, fact_count, embedding_blob))
            },
        );

        match row {
            Ok((summary_text, updated_at, source_facts, fact_count, embedding_blob)) => {
                Ok(RollingSummary {
                    summary_text,
                    updated_at: updated_at.max(0) as u64,
                    source_fact_ids: decode_fact_ids(&source_facts),
                    fact_count: fact_count.max(0) as usize,
                    embedding: embedding_blob.and_then(|b| decode_embedding(&b).ok()),
                })
            },
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(RollingSummary::empty()),
            Err(e) => Err(Error::StorageUnavailable(e.to_string())),
        }
    }

    fn save(&self, summary: &RollingSummary) -> Result<()> {
        let (_guard, conn) = self.handle.write()?;
        let embedding_blob = summary.embedding.as_deref().map(encode_embedding);
        conn.execute(
            "INSERT INTO rolling_summary (id, summary, updated_at, source_facts, fact_count, embedding) \
             VALUES (1, ?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(id) DO UPDATE SET \
                summary = excluded.summary, \
                updated_at = excluded.updated_at, \
                source_facts = excluded.source_facts, \
                fact_count = excluded.fact_count, \
                embedding = excluded.embedding",
            params![
                summary.summary_text,
                summary.updated_at as i64,
                encode_fact_ids(&summary.source_fact_ids),
                summary.fact_count as i64,
                embedding_blob,
            ],
        )
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        Ok(())
    }
}
