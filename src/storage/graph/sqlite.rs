//! [`SqliteEntityGraph`]: the `SQLite`-backed [`EntityGraphStore`] implementation.
//!
//! `traverse` is a recursive CTE over `relationships`, carrying the visited-entity path as a
//! comma-delimited accumulator and guarding against cycles with `instr(path, ...) = 0` —
//! grounded directly on the teacher's graph-backend traversal query.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::{Row, params};

use crate::models::{Entity, EntityId, EntityType, FactId, Relationship, RelationshipId};
use crate::storage::sqlite::SqliteHandle;
use crate::storage::traits::{EntityGraphStore, GraphPath, GraphStep};
use crate::{Error, Result, current_timestamp};

/// Hard cap on `Traverse`'s `max_hops`, independent of caller-requested values.
const MAX_HOPS_CEILING: u32 = 5;

/// `SQLite`-backed [`EntityGraphStore`], sharing a connection handle with a sibling
/// [`crate::storage::sqlite::SqliteFactStore`].
#[derive(Clone)]
pub struct SqliteEntityGraph {
    handle: Arc<SqliteHandle>,
}

impl SqliteEntityGraph {
    pub(crate) const fn new(handle: Arc<SqliteHandle>) -> Self {
        Self { handle }
    }
}

fn build_entity_from_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let id: i64 = row.get(0)?;
    let name: String = row.get(1)?;
    let entity_type: String = row.get(2)?;
    let embedding_blob: Option<Vec<u8>> = row.get(3)?;
    let created_at: i64 = row.get(4)?;
    Ok(Entity {
        id: EntityId(id),
        name,
        entity_type: EntityType::parse(&entity_type),
        embedding: embedding_blob
            .map(|b| crate::storage::sqlite::decode_embedding(&b))
            .transpose()
            .unwrap_or(None),
        created_at: created_at.max(0) as u64,
    })
}

fn build_relationship_from_row(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    let id: i64 = row.get(0)?;
    let source: i64 = row.get(1)?;
    let target: i64 = row.get(2)?;
    let relation_type: String = row.get(3)?;
    let fact_id: Option<i64> = row.get(4)?;
    let confidence: f32 = row.get(5)?;
    let created_at: i64 = row.get(6)?;
    let is_obsolete: bool = row.get(7)?;
    Ok(Relationship {
        id: RelationshipId(id),
        source_entity_id: EntityId(source),
        target_entity_id: EntityId(target),
        relation_type,
        fact_id: fact_id.map(FactId),
        confidence,
        created_at: created_at.max(0) as u64,
        is_obsolete,
    })
}

const ENTITY_COLUMNS: &str = "id, name, entity_type, embedding, created_at";
const RELATIONSHIP_COLUMNS: &str =
    "id, source_entity_id, target_entity_id, relation_type, fact_id, confidence, created_at, is_obsolete";

impl EntityGraphStore for SqliteEntityGraph {
    #[tracing::instrument(skip(self, embedding))]
    fn upsert_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        embedding: Option<&[f32]>,
    ) -> Result<EntityId> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("entity name must not be empty".to_string()));
        }
        let (_guard, conn) = self.handle.write()?;
        let embedding_blob = embedding.map(crate::storage::sqlite::encode_embedding);
        let insert = conn.execute(
            "INSERT INTO entities (name, entity_type, embedding, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![name, entity_type.as_str(), embedding_blob, current_timestamp() as i64],
        );

        match insert {
            Ok(_) => Ok(EntityId(conn.last_insert_rowid())),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // Race-safe reread: another caller won the unique-constraint race.
                let id: i64 = conn
                    .query_row(
                        "SELECT id FROM entities WHERE name = ?1 COLLATE NOCASE AND entity_type = ?2",
                        params![name, entity_type.as_str()],
                        |r| r.get(0),
                    )
                    .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
                Ok(EntityId(id))
            },
            Err(e) => Err(Error::StorageUnavailable(e.to_string())),
        }
    }

    fn link_fact_to_entity(&self, entity_id: EntityId, fact_id: FactId) -> Result<()> {
        let (_guard, conn) = self.handle.write()?;
        conn.execute(
            "INSERT OR IGNORE INTO entity_facts (entity_id, fact_id) VALUES (?1, ?2)",
            params![entity_id.value(), fact_id.value()],
        )
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn create_relationship(
        &self,
        source: EntityId,
        target: EntityId,
        relation_type: &str,
        fact_id: Option<FactId>,
        confidence: f32,
    ) -> Result<()> {
        let (_guard, conn) = self.handle.write()?;

        let existing: Option<(i64, f32, Option<i64>)> = conn
            .query_row(
                "SELECT id, confidence, fact_id FROM relationships \
                 WHERE source_entity_id = ?1 AND target_entity_id = ?2 AND relation_type = ?3 \
                 AND is_obsolete = 0",
                params![source.value(), target.value(), relation_type],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .ok();

        if let Some((id, old_confidence, old_fact_id)) = existing {
            let new_confidence = old_confidence.max(confidence);
            let new_fact_id = old_fact_id.or_else(|| fact_id.map(FactId::value));
            conn.execute(
                "UPDATE relationships SET confidence = ?1, fact_id = ?2 WHERE id = ?3",
                params![new_confidence, new_fact_id, id],
            )
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
            return Ok(());
        }

        conn.execute(
            "INSERT INTO relationships \
             (source_entity_id, target_entity_id, relation_type, fact_id, confidence, \
              created_at, is_obsolete) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                source.value(),
                target.value(),
                relation_type,
                fact_id.map(FactId::value),
                confidence.clamp(f32::MIN_POSITIVE, 1.0),
                current_timestamp() as i64,
            ],
        )
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    fn outgoing(&self, entity_id: EntityId, include_obsolete: bool) -> Result<Vec<Relationship>> {
        let (_guard, conn) = self.handle.read()?;
        let sql = format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE source_entity_id = ?1 {}",
            if include_obsolete { "" } else { "AND is_obsolete = 0" }
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let rows = stmt
            .query_map(params![entity_id.value()], build_relationship_from_row)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))
    }

    fn incoming(&self, entity_id: EntityId, include_obsolete: bool) -> Result<Vec<Relationship>> {
        let (_guard, conn) = self.handle.read()?;
        let sql = format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE target_entity_id = ?1 {}",
            if include_obsolete { "" } else { "AND is_obsolete = 0" }
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let rows = stmt
            .query_map(params![entity_id.value()], build_relationship_from_row)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))
    }

    #[tracing::instrument(skip(self))]
    fn traverse(&self, entity_id: EntityId, max_hops: u32) -> Result<Vec<GraphPath>> {
        let max_hops = max_hops.min(MAX_HOPS_CEILING);
        let (_guard, conn) = self.handle.read()?;

        let mut stmt = conn
            .prepare(
                "WITH RECURSIVE paths(current_entity_id, entity_path, rel_path, hops) AS (
                    SELECT ?1, ',' || ?1 || ',', '', 0
                    UNION ALL
                    SELECT r.target_entity_id,
                           p.entity_path || r.target_entity_id || ',',
                           p.rel_path || r.id || ',',
                           p.hops + 1
                    FROM paths p
                    JOIN relationships r
                        ON r.source_entity_id = p.current_entity_id AND r.is_obsolete = 0
                    WHERE p.hops < ?2
                      AND instr(p.entity_path, ',' || r.target_entity_id || ',') = 0
                )
                SELECT entity_path, rel_path, hops FROM paths WHERE hops > 0",
            )
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        let raw_paths: Vec<(String, String, u32)> = stmt
            .query_map(params![entity_id.value(), max_hops], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        if raw_paths.is_empty() {
            return Ok(Vec::new());
        }

        // Batch-fetch every entity/relationship referenced across all discovered paths, then
        // assemble GraphPaths from the in-memory maps rather than re-querying per step.
        let mut entity_ids = std::collections::HashSet::new();
        let mut relationship_ids = std::collections::HashSet::new();
        let mut parsed: Vec<(Vec<i64>, Vec<i64>, u32)> = Vec::with_capacity(raw_paths.len());
        for (entity_path, rel_path, hops) in raw_paths {
            let eids: Vec<i64> = entity_path
                .split(',')
                .filter(|s| !s.is_empty())
                .filter_map(|s| s.parse().ok())
                .collect();
            let rids: Vec<i64> = rel_path
                .split(',')
                .filter(|s| !s.is_empty())
                .filter_map(|s| s.parse().ok())
                .collect();
            entity_ids.extend(eids.iter().copied());
            relationship_ids.extend(rids.iter().copied());
            parsed.push((eids, rids, hops));
        }

        let entities = fetch_entities(&conn, &entity_ids)?;
        let relationships = fetch_relationships(&conn, &relationship_ids)?;

        let mut paths = Vec::with_capacity(parsed.len());
        for (eids, rids, hops) in parsed {
            let mut steps = Vec::with_capacity(eids.len());
            for (i, eid) in eids.iter().enumerate() {
                let Some(entity) = entities.get(eid).cloned() else {
                    continue;
                };
                let via = if i == 0 {
                    None
                } else {
                    rids.get(i - 1).and_then(|rid| relationships.get(rid)).cloned()
                };
                steps.push(GraphStep { entity, via });
            }
            paths.push(GraphPath {
                steps,
                total_hops: hops,
            });
        }
        Ok(paths)
    }

    fn search_by_name(&self, query: &str, k: usize) -> Result<Vec<Entity>> {
        let (_guard, conn) = self.handle.read()?;
        let like_pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE name LIKE ?1 ESCAPE '\\' \
             ORDER BY (LOWER(name) = LOWER(?2)) DESC, created_at DESC LIMIT ?3"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let rows = stmt
            .query_map(
                params![like_pattern, query, k as i64],
                build_entity_from_row,
            )
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))
    }

    fn facts_for_entity(&self, entity_id: EntityId) -> Result<Vec<FactId>> {
        let (_guard, conn) = self.handle.read()?;
        let mut stmt = conn
            .prepare("SELECT fact_id FROM entity_facts WHERE entity_id = ?1")
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        let rows = stmt
            .query_map(params![entity_id.value()], |r| r.get::<_, i64>(0))
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map(|ids| ids.into_iter().map(FactId).collect())
            .map_err(|e| Error::StorageUnavailable(e.to_string()))
    }
}

fn fetch_entities(
    conn: &rusqlite::Connection,
    ids: &std::collections::HashSet<i64>,
) -> Result<HashMap<i64, Entity>> {
    let mut out = HashMap::with_capacity(ids.len());
    for &id in ids {
        let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1");
        if let Ok(entity) = conn.query_row(&sql, params![id], build_entity_from_row) {
            out.insert(id, entity);
        }
    }
    Ok(out)
}

fn fetch_relationships(
    conn: &rusqlite::Connection,
    ids: &std::collections::HashSet<i64>,
) -> Result<HashMap<i64, Relationship>> {
    let mut out = HashMap::with_capacity(ids.len());
    for &id in ids {
        let sql = format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE id = ?1");
        if let Ok(rel) = conn.query_row(&sql, params![id], build_relationship_from_row) {
            out.insert(id, rel);
        }
    }
    Ok(out)
}
