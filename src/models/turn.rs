//! The `Turn` shape: the contractual representation of the host-owned turn log.
//!
//! The turn log itself — storage, retention, pagination — is the host's responsibility
//! (see the crate-level docs' external-collaborator boundary). This module only defines the
//! shape the memory subsystem reads turns through.

use serde::{Deserialize, Serialize};

/// The speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The end user.
    User,
    /// The model.
    Assistant,
    /// A system/instruction message.
    System,
}

/// One entry in the host's turn log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who said it.
    pub role: Role,
    /// The message text.
    pub content: String,
    /// Wall clock when the turn was recorded.
    pub created_at: u64,
    /// Opaque host-assigned identifier, used as fact provenance.
    pub turn_id: Option<String>,
}

impl Turn {
    /// Builds a turn with no assigned turn id.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>, created_at: u64) -> Self {
        Self {
            role,
            content: content.into(),
            created_at,
            turn_id: None,
        }
    }

    /// Attaches a turn id, consuming and returning `self`.
    #[must_use]
    pub fn with_turn_id(mut self, turn_id: impl Into<String>) -> Self {
        self.turn_id = Some(turn_id.into());
        self
    }

    /// True if the trimmed content is empty.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}
