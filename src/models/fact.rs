//! The `Fact` record: an atomic, third-person, self-contained statement about the speaker.

use serde::{Deserialize, Serialize};

/// A fact's persistent identifier.
///
/// Monotonic within a store: ids strictly increase and are never reused (invariant I1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactId(pub i64);

impl FactId {
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

impl std::fmt::Display for FactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse semantic bucket a fact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// A stated preference ("I prefer dark mode").
    Preference,
    /// A stated belief or opinion.
    Belief,
    /// Biographical information (name, location, occupation).
    Biographical,
    /// A dated or datable occurrence.
    Event,
    /// A fact about the speaker's relationship to another entity.
    Relationship,
    /// A pending or recurring task.
    Task,
    /// Anything not covered by the other categories.
    Other,
}

impl Category {
    /// Parses a category from the extractor's line-format token.
    ///
    /// Unknown tokens fall back to `Other` rather than failing the whole line, matching the
    /// extractor's forgiving-but-field-strict parsing policy.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "preference" => Self::Preference,
            "belief" => Self::Belief,
            "biographical" => Self::Biographical,
            "event" => Self::Event,
            "relationship" => Self::Relationship,
            "task" => Self::Task,
            _ => Self::Other,
        }
    }

    /// Returns the canonical lowercase token for this category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preference => "preference",
            Self::Belief => "belief",
            Self::Biographical => "biographical",
            Self::Event => "event",
            Self::Relationship => "relationship",
            Self::Task => "task",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An atomic, third-person statement about the speaker, with an optional embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Monotonic identifier, assigned on insert, stable thereafter.
    pub id: FactId,
    /// Natural-language sentence, typically at most 200 characters.
    pub text: String,
    /// Coarse semantic bucket.
    pub category: Category,
    /// Durability hint in `[0, 1]`; defaults to 0.5; never mutated silently.
    pub importance: f32,
    /// Dense embedding of dimension `D`; absent excludes the fact from semantic search.
    pub embedding: Option<Vec<f32>>,
    /// Wall clock at insert; immutable thereafter.
    pub created_at: u64,
    /// Wall clock of the most recent retrieval hit.
    pub last_accessed: u64,
    /// Non-negative count of retrieval hits.
    pub access_count: u64,
    /// Excluded from default reads when true.
    pub is_obsolete: bool,
    /// The replacing fact's id, set only when `is_obsolete`; always a newer id (no cycles).
    pub superseded_by: Option<FactId>,
    /// Opaque provenance: the turn id(s) this fact was extracted from.
    pub source_turn_ids: Vec<String>,
}

impl Fact {
    /// Builds a fact for insertion: `id` is assigned by the store, `created_at`/`last_accessed`
    /// default to the provided timestamp, `access_count` starts at zero.
    #[must_use]
    pub fn new(text: String, category: Category, importance: f32, now: u64) -> Self {
        Self {
            id: FactId(0),
            text,
            category,
            importance: importance.clamp(0.0, 1.0),
            embedding: None,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            is_obsolete: false,
            superseded_by: None,
            source_turn_ids: Vec::new(),
        }
    }

    /// Attaches an embedding, consuming and returning `self` (builder style).
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Attaches provenance turn ids, consuming and returning `self`.
    #[must_use]
    pub fn with_source_turn_ids(mut self, ids: Vec<String>) -> Self {
        self.source_turn_ids = ids;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_is_case_insensitive_and_forgiving() {
        assert_eq!(Category::parse("  Preference "), Category::Preference);
        assert_eq!(Category::parse("BELIEF"), Category::Belief);
        assert_eq!(Category::parse("not-a-category"), Category::Other);
    }

    #[test]
    fn category_round_trips_through_str() {
        for c in [
            Category::Preference,
            Category::Belief,
            Category::Biographical,
            Category::Event,
            Category::Relationship,
            Category::Task,
            Category::Other,
        ] {
            assert_eq!(Category::parse(c.as_str()), c);
        }
    }

    #[test]
    fn new_fact_clamps_importance() {
        let f = Fact::new("x".into(), Category::Other, 1.5, 100);
        assert!((f.importance - 1.0).abs() < f32::EPSILON);
        let f = Fact::new("x".into(), Category::Other, -1.0, 100);
        assert!((f.importance - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn new_fact_has_zero_access_count_and_matching_timestamps() {
        let f = Fact::new("x".into(), Category::Other, 0.5, 42);
        assert_eq!(f.access_count, 0);
        assert_eq!(f.created_at, f.last_accessed);
        assert!(!f.is_obsolete);
        assert!(f.superseded_by.is_none());
    }
}
