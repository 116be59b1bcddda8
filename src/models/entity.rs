//! The `Entity` record: a named node in the lightweight knowledge graph.

use serde::{Deserialize, Serialize};

/// An entity's persistent identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl EntityId {
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

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of thing an entity denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A named individual.
    Person,
    /// A location.
    Place,
    /// A physical object.
    Thing,
    /// An abstract idea or topic.
    Concept,
    /// A company, institution, or other organization.
    Organization,
    /// A named point or span in time.
    Time,
    /// Anything not covered above; also the default for entities upserted implicitly.
    Other,
}

impl EntityType {
    /// Parses an entity type from the extractor's line-format token, defaulting to `Other`.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "person" => Self::Person,
            "place" => Self::Place,
            "thing" => Self::Thing,
            "concept" => Self::Concept,
            "organization" => Self::Organization,
            "time" => Self::Time,
            _ => Self::Other,
        }
    }

    /// Returns the canonical lowercase token for this entity type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Place => "place",
            Self::Thing => "thing",
            Self::Concept => "concept",
            Self::Organization => "organization",
            Self::Time => "time",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named node. `(name, type)` is unique, case-insensitive on `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Persistent identifier.
    pub id: EntityId,
    /// Display name, as first seen (case preserved; uniqueness is case-insensitive).
    pub name: String,
    /// The kind of thing this entity denotes.
    pub entity_type: EntityType,
    /// Optional embedding, used for similarity-based entity resolution.
    pub embedding: Option<Vec<f32>>,
    /// Wall clock at first upsert.
    pub created_at: u64,
}

impl Entity {
    /// Builds an entity for insertion; `id` is assigned by the store.
    #[must_use]
    pub fn new(name: String, entity_type: EntityType, now: u64) -> Self {
        Self {
            id: EntityId(0),
            name,
            entity_type,
            embedding: None,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_parse_defaults_to_other() {
        assert_eq!(EntityType::parse("spaceship"), EntityType::Other);
        assert_eq!(EntityType::parse(" Organization "), EntityType::Organization);
    }
}
