//! The Entity Graph trait (C2): a lightweight knowledge graph colocated with the fact store.

use crate::Result;
use crate::models::{Entity, EntityId, EntityType, FactId, Relationship};

/// One hop's worth of context in a [`GraphPath`]: the entity arrived at, and the edge used to
/// reach it (absent for the path's starting entity).
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStep {
    /// The entity at this step.
    pub entity: Entity,
    /// The relationship traversed to reach `entity`, if this is not the first step.
    pub via: Option<Relationship>,
}

/// A simple path discovered by [`EntityGraphStore::traverse`].
#[derive(Debug, Clone, PartialEq)]
pub struct GraphPath {
    /// Entities and connecting edges, starting-entity first.
    pub steps: Vec<GraphStep>,
    /// `steps.len() - 1`: the number of edges traversed.
    pub total_hops: u32,
}

/// Typed entities and directed relationships linked to facts.
///
/// Shares the Fact Store's underlying storage handle and lock discipline (see the
/// concurrency model).
pub trait EntityGraphStore: Send + Sync {
    /// Case-insensitive match on `(name, type)`: returns the existing id if found, else inserts
    /// and returns the new id. Race-safe: on a unique-constraint violation from a concurrent
    /// insert, re-reads and returns the existing id rather than erroring.
    fn upsert_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        embedding: Option<&[f32]>,
    ) -> Result<EntityId>;

    /// Links an entity to a fact. Idempotent: calling this `n` times creates exactly one link.
    fn link_fact_to_entity(&self, entity_id: EntityId, fact_id: FactId) -> Result<()>;

    /// If an active `(source, target, relation_type)` triple exists, bumps its confidence to
    /// `max(old, new)` and attaches `fact_id` if the existing edge has none; otherwise inserts a
    /// new relationship.
    fn create_relationship(
        &self,
        source: EntityId,
        target: EntityId,
        relation_type: &str,
        fact_id: Option<FactId>,
        confidence: f32,
    ) -> Result<()>;

    /// Active (unless `include_obsolete`) outgoing edges from `entity_id`.
    fn outgoing(&self, entity_id: EntityId, include_obsolete: bool) -> Result<Vec<Relationship>>;

    /// Active (unless `include_obsolete`) incoming edges to `entity_id`.
    fn incoming(&self, entity_id: EntityId, include_obsolete: bool) -> Result<Vec<Relationship>>;

    /// BFS over active edges, producing every simple path up to `max_hops` (hard cap 5),
    /// avoiding revisits within a path.
    fn traverse(&self, entity_id: EntityId, max_hops: u32) -> Result<Vec<GraphPath>>;

    /// Case-insensitive substring match over entity names, exact matches first, then
    /// most-recently-created.
    fn search_by_name(&self, query: &str, k: usize) -> Result<Vec<Entity>>;

    /// Facts linked to `entity_id` via `entity_facts`.
    fn facts_for_entity(&self, entity_id: EntityId) -> Result<Vec<FactId>>;
}
