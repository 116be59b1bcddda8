//! Storage layer: the Fact Store (C1) and Entity Graph (C2) traits and their `SQLite`
//! implementations.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::unused_self)]

pub mod graph;
pub mod sqlite;
pub mod traits;

pub use traits::{EntityGraphStore, FactStats, FactStore, GraphPath, GraphStep, SummaryStore};
