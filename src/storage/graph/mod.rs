//! `SQLite`-backed Entity Graph (C2): typed entities and directed relationships linked to
//! facts, colocated with the Fact Store.

mod sqlite;

pub use sqlite::SqliteEntityGraph;
