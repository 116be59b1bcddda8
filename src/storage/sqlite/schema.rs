//! Schema bootstrap for the persisted state: `facts`, `entities`, `relationships`,
//! `entity_facts`, `rolling_summary`.

use rusqlite::Connection;

use crate::{Error, Result};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS facts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    text            TEXT NOT NULL,
    category        TEXT NOT NULL,
    importance      REAL NOT NULL,
    embedding       BLOB,
    created_at      INTEGER NOT NULL,
    last_accessed   INTEGER NOT NULL,
    access_count    INTEGER NOT NULL DEFAULT 0,
    is_obsolete     INTEGER NOT NULL DEFAULT 0,
    superseded_by   INTEGER,
    source_turn_ids TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_facts_is_obsolete ON facts(is_obsolete);
CREATE INDEX IF NOT EXISTS idx_facts_category ON facts(category);
CREATE INDEX IF NOT EXISTS idx_facts_created_at ON facts(created_at);

CREATE TABLE IF NOT EXISTS entities (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    embedding   BLOB,
    created_at  INTEGER NOT NULL,
    UNIQUE (name COLLATE NOCASE, entity_type)
);

CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS relationships (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    source_entity_id  INTEGER NOT NULL REFERENCES entities(id),
    target_entity_id  INTEGER NOT NULL REFERENCES entities(id),
    relation_type     TEXT NOT NULL,
    fact_id           INTEGER REFERENCES facts(id),
    confidence        REAL NOT NULL,
    created_at        INTEGER NOT NULL,
    is_obsolete       INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_entity_id, is_obsolete);
CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_entity_id, is_obsolete);
CREATE INDEX IF NOT EXISTS idx_relationships_triple
    ON relationships(source_entity_id, target_entity_id, relation_type, is_obsolete);

CREATE TABLE IF NOT EXISTS entity_facts (
    entity_id INTEGER NOT NULL REFERENCES entities(id),
    fact_id   INTEGER NOT NULL REFERENCES facts(id),
    PRIMARY KEY (entity_id, fact_id)
);

CREATE INDEX IF NOT EXISTS idx_entity_facts_fact ON entity_facts(fact_id);

CREATE TABLE IF NOT EXISTS rolling_summary (
    id            INTEGER PRIMARY KEY CHECK (id = 1),
    summary       TEXT NOT NULL,
    updated_at    INTEGER NOT NULL,
    source_facts  TEXT NOT NULL DEFAULT '[]',
    fact_count    INTEGER NOT NULL DEFAULT 0,
    embedding     BLOB
);
";

/// Creates every table and index if absent. Idempotent; safe to call on every open.
pub(crate) fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)
        .map_err(|e| Error::StorageUnavailable(format!("schema bootstrap failed: {e}")))
}
