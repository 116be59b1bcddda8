//! The `Relationship` record: a directed, typed edge between two entities.

use serde::{Deserialize, Serialize};

use super::{EntityId, FactId};

/// A relationship's persistent identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub i64);

impl RelationshipId {
    /// Wraps a raw row id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw row id.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directed edge `(source_entity_id, target_entity_id, relation_type)`.
///
/// At most one active edge exists per `(source, target, relation_type)` triple. Relationships
/// are never deleted, only marked obsolete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Persistent identifier.
    pub id: RelationshipId,
    /// The edge's source entity.
    pub source_entity_id: EntityId,
    /// The edge's target entity.
    pub target_entity_id: EntityId,
    /// A free-text relation label (e.g. "lives_in", "works_as").
    pub relation_type: String,
    /// The fact this relationship was extracted from, if any.
    pub fact_id: Option<FactId>,
    /// Confidence in `(0, 1]`.
    pub confidence: f32,
    /// Wall clock at first insert.
    pub created_at: u64,
    /// Excluded from default traversal when true; the edge row itself is retained.
    pub is_obsolete: bool,
}

impl Relationship {
    /// Builds a relationship for insertion; `id` is assigned by the store.
    #[must_use]
    pub fn new(
        source_entity_id: EntityId,
        target_entity_id: EntityId,
        relation_type: String,
        fact_id: Option<FactId>,
        confidence: f32,
        now: u64,
    ) -> Self {
        Self {
            id: RelationshipId(0),
            source_entity_id,
            target_entity_id,
            relation_type,
            fact_id,
            confidence: confidence.clamp(f32::MIN_POSITIVE, 1.0),
            created_at: now,
            is_obsolete: false,
        }
    }
}
