//! Context Builder (C7): assembles the final prompt within a fixed token budget from the
//! system message, the Rolling Summary, retrieved facts, recent turns, and the user's message.

use crate::config::ContextConfig;
use crate::models::{RollingSummary, Role, Turn};
use crate::services::retriever::ScoredFact;

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Estimates a token count from text length using the crate-wide `chars/4` heuristic.
#[must_use]
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.trim().chars().count() as u32;
    chars.div_ceil(4)
}

/// Assembles prompts from the system message, summary, facts, and turn history within a fixed
/// token budget, using the `chars/4` estimate throughout.
///
/// Holds no collaborator state (no generator, no embedder, no store): it is a pure formatting
/// step over whatever the caller already retrieved.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    /// Builds a context assembler from the given configuration.
    #[must_use]
    pub const fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Assembles the prompt: system message, then summary (bounded by
    /// `reservedForSummary`), then retrieved facts (bounded by half the remaining budget),
    /// then the most recent non-empty turns oldest-first (remaining budget), then the current
    /// user message. Empty sections are omitted; everything else is joined by
    /// `\n\n---\n\n`.
    #[must_use]
    pub fn build(
        &self,
        user_message: &str,
        max_context_tokens: u32,
        summary: &RollingSummary,
        facts: &[ScoredFact],
        turns: &[Turn],
    ) -> String {
        let system = self.config.system_message.trim();
        let user = user_message.trim();

        let system_tokens = estimate_tokens(system);
        let user_tokens = estimate_tokens(user);
        let reserved_for_summary = self.config.reserved_for_summary;

        let remaining_budget = max_context_tokens
            .saturating_sub(self.config.prompt_overhead_tokens)
            .saturating_sub(reserved_for_summary)
            .saturating_sub(user_tokens)
            .saturating_sub(system_tokens);

        let mut sections = Vec::new();

        if !system.is_empty() {
            sections.push(system.to_string());
        }

        let summary_text = summary.summary_text.trim();
        if !summary_text.is_empty() {
            sections.push(truncate_to_budget(summary_text, reserved_for_summary));
        }

        let facts_budget = remaining_budget / 2;
        let (facts_section, facts_used) = self.render_facts(facts, facts_budget);
        if let Some(section) = facts_section {
            sections.push(section);
        }

        let turns_budget = remaining_budget.saturating_sub(facts_used);
        if let Some(section) = self.render_turns(turns, turns_budget) {
            sections.push(section);
        }

        if !user.is_empty() {
            sections.push(user.to_string());
        }

        sections.join(SECTION_SEPARATOR)
    }

    fn render_facts(&self, facts: &[ScoredFact], budget: u32) -> (Option<String>, u32) {
        if budget == 0 || facts.is_empty() {
            return (None, 0);
        }
        let mut used = 0_u32;
        let mut lines = Vec::new();
        for scored in facts {
            let line = scored.fact.text.trim();
            if line.is_empty() {
                continue;
            }
            let tokens = estimate_tokens(line);
            if used.saturating_add(tokens) > budget && !lines.is_empty() {
                break;
            }
            lines.push(line.to_string());
            used = used.saturating_add(tokens);
        }
        if lines.is_empty() {
            (None, 0)
        } else {
            (Some(lines.join("\n")), used)
        }
    }

    fn render_turns(&self, turns: &[Turn], budget: u32) -> Option<String> {
        if budget == 0 {
            return None;
        }
        let most_recent: Vec<&Turn> = turns
            .iter()
            .rev()
            .filter(|t| !t.is_blank())
            .take(self.config.turns_to_use)
            .collect();
        let oldest_first: Vec<&Turn> = most_recent.into_iter().rev().collect();

        let mut used = 0_u32;
        let mut lines = Vec::new();
        for turn in oldest_first {
            let formatted = format_turn(turn);
            let tokens = estimate_tokens(&formatted);
            if used.saturating_add(tokens) > budget && !lines.is_empty() {
                break;
            }
            used = used.saturating_add(tokens);
            lines.push(formatted);
        }
        if lines.is_empty() { None } else { Some(lines.join("\n")) }
    }
}

fn format_turn(turn: &Turn) -> String {
    let role = match turn.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    format!("{role}: {}", turn.content.trim())
}

fn truncate_to_budget(text: &str, token_budget: u32) -> String {
    if token_budget == 0 {
        return String::new();
    }
    let char_budget = (token_budget as usize).saturating_mul(4);
    if text.chars().count() <= char_budget {
        return text.to_string();
    }
    let truncated: String = text.chars().take(char_budget).collect();
    match truncated.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => truncated[..idx].trim_end().to_string(),
        _ => truncated,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::{Category, Fact};

    fn scored(text: &str, score: f32) -> ScoredFact {
        ScoredFact {
            fact: Fact::new(text.to_string(), Category::Other, 0.5, 0),
            score,
        }
    }

    #[test]
    fn empty_sections_are_omitted() {
        let builder = ContextBuilder::new(ContextConfig {
            system_message: String::new(),
            ..ContextConfig::default()
        });
        let summary = RollingSummary::empty();
        let prompt = builder.build("hello", 1000, &summary, &[], &[]);
        assert_eq!(prompt, "hello");
    }

    #[test]
    fn sections_are_joined_with_separator_in_order() {
        let builder = ContextBuilder::new(ContextConfig {
            system_message: "You are helpful.".to_string(),
            ..ContextConfig::default()
        });
        let mut summary = RollingSummary::empty();
        summary.summary_text = "You like tea.".to_string();
        let facts = vec![scored("likes tea", 0.9)];
        let prompt = builder.build("what do I like?", 1000, &summary, &facts, &[]);
        let parts: Vec<&str> = prompt.split(SECTION_SEPARATOR).collect();
        assert_eq!(parts[0], "You are helpful.");
        assert_eq!(parts[1], "You like tea.");
        assert_eq!(parts[2], "likes tea");
        assert_eq!(*parts.last().unwrap(), "what do I like?");
    }

    #[test]
    fn tight_budget_drops_lower_priority_sections_first() {
        let builder = ContextBuilder::new(ContextConfig {
            system_message: "Sys.".to_string(),
            reserved_for_summary: 0,
            prompt_overhead_tokens: 0,
            ..ContextConfig::default()
        });
        let summary = RollingSummary::empty();
        let facts = vec![scored("a very long fact that will not fit in a tiny budget at all", 0.9)];
        let prompt = builder.build("hi", 4, &summary, &facts, &[]);
        assert!(!prompt.contains("very long fact"));
        assert!(prompt.contains("Sys."));
        assert!(prompt.contains("hi"));
    }

    #[test]
    fn turns_are_ordered_oldest_first() {
        let builder = ContextBuilder::new(ContextConfig::default());
        let summary = RollingSummary::empty();
        let turns = vec![
            Turn::new(Role::User, "first", 1),
            Turn::new(Role::Assistant, "second", 2),
            Turn::new(Role::User, "third", 3),
        ];
        let prompt = builder.build("now", 1000, &summary, &[], &turns);
        let first_pos = prompt.find("first").unwrap();
        let second_pos = prompt.find("second").unwrap();
        let third_pos = prompt.find("third").unwrap();
        assert!(first_pos < second_pos);
        assert!(second_pos < third_pos);
    }

    #[test]
    fn blank_turns_are_skipped() {
        let builder = ContextBuilder::new(ContextConfig::default());
        let summary = RollingSummary::empty();
        let turns = vec![Turn::new(Role::User, "   ", 1), Turn::new(Role::User, "real", 2)];
        let prompt = builder.build("now", 1000, &summary, &[], &turns);
        assert!(prompt.contains("real"));
        assert_eq!(prompt.matches("user:").count(), 1);
    }

    #[test]
    fn token_estimate_uses_chars_over_four() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }
}
