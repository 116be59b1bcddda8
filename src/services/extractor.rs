//! Fact Extractor (C3): turns conversation turns into atomic facts, entities, and
//! relationships by prompting the generator and parsing its line-delimited output.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::collaborators::{Embedder, GenerationOptions, Generator};
use crate::config::ExtractionConfig;
use crate::models::{Category, EntityType, Fact, Turn};
use crate::observability::{counters, logging};
use crate::{Error, Result, current_timestamp};

/// An entity line parsed from the generator's output, not yet resolved to a store id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntity {
    /// Display name as extracted.
    pub name: String,
    /// The entity's kind.
    pub entity_type: EntityType,
}

/// A relationship line parsed from the generator's output, entities referenced by name.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRelationship {
    /// Source entity name.
    pub source_name: String,
    /// Free-text relation label.
    pub relation_type: String,
    /// Target entity name.
    pub target_name: String,
    /// Confidence in `(0, 1]`.
    pub confidence: f32,
}

/// Everything the extractor produced from one batch of turns.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// Atomic facts, embedded where the embedder succeeded.
    pub facts: Vec<Fact>,
    /// Deduplicated entities mentioned across the batch.
    pub entities: Vec<ExtractedEntity>,
    /// Deduplicated relationships mentioned across the batch.
    pub relationships: Vec<ExtractedRelationship>,
}

/// Converts conversation turns into atomic facts (and, optionally, entities and
/// relationships) by prompting `G` and embedding each fact with `E`.
///
/// Generic over its collaborators rather than boxed as trait objects, the same way the
/// teacher's deduplication service is generic over its embedder and vector backend.
pub struct FactExtractor<G: Generator, E: Embedder> {
    generator: Arc<G>,
    embedder: Arc<E>,
    config: ExtractionConfig,
}

impl<G: Generator, E: Embedder> FactExtractor<G, E> {
    /// Builds an extractor over the given collaborators and configuration.
    pub const fn new(generator: Arc<G>, embedder: Arc<E>, config: ExtractionConfig) -> Self {
        Self {
            generator,
            embedder,
            config,
        }
    }

    /// Extracts facts (and, per configuration, entities/relationships) from `turns`.
    ///
    /// Turns shorter than `minTextLength` after trimming are filtered out before prompting.
    /// Malformed output lines are skipped silently rather than failing the call.
    #[tracing::instrument(skip(self, turns), fields(turn_count = turns.len()))]
    pub async fn extract(&self, turns: &[Turn]) -> Result<ExtractionOutcome> {
        if !self.config.enabled {
            return Ok(ExtractionOutcome::default());
        }

        let relevant: Vec<&Turn> = turns
            .iter()
            .filter(|t| t.content.trim().len() >= self.config.min_text_length)
            .collect();
        if relevant.is_empty() {
            metrics::counter!(counters::EXTRACTION_ATTEMPTS, "result" => "empty").increment(1);
            return Ok(ExtractionOutcome::default());
        }

        let transcript = render_transcript(&relevant);

        let fact_lines = match self
            .generator
            .generate(&fact_prompt(&transcript), &GenerationOptions::extraction())
            .await
        {
            Ok(outcome) => outcome.text,
            Err(e) => {
                metrics::counter!(counters::EXTRACTION_ATTEMPTS, "result" => "error").increment(1);
                return Err(Error::GeneratorFailure(e.to_string()));
            },
        };

        let turn_ids: Vec<String> = relevant.iter().filter_map(|t| t.turn_id.clone()).collect();
        let mut facts = Vec::new();
        for line in fact_lines.lines().take(self.config.max_facts_per_extraction) {
            let Some((category, importance, text)) = parse_fact_line(line) else {
                continue;
            };
            let mut fact = Fact::new(text, category, importance, current_timestamp())
                .with_source_turn_ids(turn_ids.clone());
            match self.embedder.embed(&fact.text).await {
                Ok(embedding) => fact = fact.with_embedding(embedding),
                Err(e) => logging::log_recovered_failure("extractor", "embed", &e),
            }
            facts.push(fact);
        }

        let entities = if self.config.extract_entities && !facts.is_empty() {
            self.extract_entities(&transcript).await
        } else {
            Vec::new()
        };

        let relationships = if self.config.extract_relationships && !facts.is_empty() {
            self.extract_relationships(&transcript).await
        } else {
            Vec::new()
        };

        metrics::counter!(counters::EXTRACTION_ATTEMPTS, "result" => "ok").increment(1);
        Ok(ExtractionOutcome {
            facts,
            entities,
            relationships,
        })
    }

    async fn extract_entities(&self, transcript: &str) -> Vec<ExtractedEntity> {
        let response = match self
            .generator
            .generate(&entity_prompt(transcript), &GenerationOptions::extraction())
            .await
        {
            Ok(outcome) => outcome.text,
            Err(e) => {
                logging::log_recovered_failure("extractor", "extract_entities", &e);
                return Vec::new();
            },
        };

        let mut seen = HashSet::new();
        let mut entities = Vec::new();
        for line in response.lines() {
            let Some(entity) = parse_entity_line(line) else {
                continue;
            };
            if seen.insert(entity.name.to_ascii_lowercase()) {
                entities.push(entity);
            }
        }
        entities
    }

    async fn extract_relationships(&self, transcript: &str) -> Vec<ExtractedRelationship> {
        let response = match self
            .generator
            .generate(
                &relationship_prompt(transcript),
                &GenerationOptions::extraction(),
            )
            .await
        {
            Ok(outcome) => outcome.text,
            Err(e) => {
                logging::log_recovered_failure("extractor", "extract_relationships", &e);
                return Vec::new();
            },
        };

        let mut seen = HashSet::new();
        let mut relationships = Vec::new();
        for line in response.lines() {
            let Some(rel) = parse_relationship_line(line) else {
                continue;
            };
            let key = (
                rel.source_name.to_ascii_lowercase(),
                rel.relation_type.to_ascii_lowercase(),
                rel.target_name.to_ascii_lowercase(),
            );
            if seen.insert(key) {
                relationships.push(rel);
            }
        }
        relationships
    }
}

fn render_transcript(turns: &[&Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{:?}: {}", t.role, t.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn fact_prompt(transcript: &str) -> String {
    format!(
        "Extract atomic, third-person facts about the user from the conversation below.\n\
         Emit one fact per line in the exact format:\n\
         FACT|<category>|<importance 0..1>|<text>\n\
         Categories: preference, belief, biographical, event, relationship, task, other.\n\
         Skip anything not clearly about the user.\n\n{transcript}"
    )
}

fn entity_prompt(transcript: &str) -> String {
    format!(
        "List named entities mentioned in the conversation below.\n\
         Emit one entity per line in the exact format:\n\
         ENTITY|<type>|<name>\n\
         Types: person, place, thing, concept, organization, time, other.\n\n{transcript}"
    )
}

fn relationship_prompt(transcript: &str) -> String {
    format!(
        "List relationships between entities mentioned in the conversation below.\n\
         Emit one relationship per line in the exact format:\n\
         REL|<source>|<relation_type>|<target>|<confidence 0..1>\n\n{transcript}"
    )
}

/// Parses a `FACT|<category>|<importance>|<text>` line. Forgiving of surrounding whitespace,
/// strict about the four-field count.
fn parse_fact_line(line: &str) -> Option<(Category, f32, String)> {
    let parts: Vec<&str> = line.trim().splitn(4, '|').map(str::trim).collect();
    if parts.len() != 4 || !parts[0].eq_ignore_ascii_case("FACT") {
        return None;
    }
    let importance: f32 = parts[2].parse().ok()?;
    if parts[3].is_empty() {
        return None;
    }
    Some((
        Category::parse(parts[1]),
        importance.clamp(0.0, 1.0),
        parts[3].to_string(),
    ))
}

/// Parses an `ENTITY|<type>|<name>` line.
fn parse_entity_line(line: &str) -> Option<ExtractedEntity> {
    let parts: Vec<&str> = line.trim().splitn(3, '|').map(str::trim).collect();
    if parts.len() != 3 || !parts[0].eq_ignore_ascii_case("ENTITY") || parts[2].is_empty() {
        return None;
    }
    Some(ExtractedEntity {
        name: parts[2].to_string(),
        entity_type: EntityType::parse(parts[1]),
    })
}

/// Parses a `REL|<source>|<relation_type>|<target>|<confidence>` line.
fn parse_relationship_line(line: &str) -> Option<ExtractedRelationship> {
    let parts: Vec<&str> = line.trim().splitn(5, '|').map(str::trim).collect();
    if parts.len() != 5 || !parts[0].eq_ignore_ascii_case("REL") {
        return None;
    }
    if parts[1].is_empty() || parts[3].is_empty() {
        return None;
    }
    let confidence: f32 = parts[4].parse().ok()?;
    Some(ExtractedRelationship {
        source_name: parts[1].to_string(),
        relation_type: parts[2].to_string(),
        target_name: parts[3].to_string(),
        confidence: confidence.clamp(f32::MIN_POSITIVE, 1.0),
    })
}

/// One turn batch queued for asynchronous extraction.
struct QueuedJob {
    turns: Vec<Turn>,
    reply: oneshot::Sender<Result<ExtractionOutcome>>,
}

/// A bounded async extraction queue (capacity ~100) drained by a single worker task, per the
/// async-extraction design note: backpressure is an observable signal, never a silent block.
pub struct ExtractionQueue {
    tx: mpsc::Sender<QueuedJob>,
}

impl ExtractionQueue {
    /// Spawns the drain worker and returns a handle for enqueueing jobs.
    ///
    /// Each job is wrapped in `job_timeout`; exceeding it yields [`Error::Timeout`] to that
    /// job's caller without affecting the queue itself.
    pub fn spawn<G, E>(extractor: Arc<FactExtractor<G, E>>, capacity: usize, job_timeout: Duration) -> Self
    where
        G: Generator + 'static,
        E: Embedder + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<QueuedJob>(capacity);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = match tokio::time::timeout(job_timeout, extractor.extract(&job.turns)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(job_timeout)),
                };
                drop(job.reply.send(result));
            }
        });
        Self { tx }
    }

    /// Enqueues `turns` for extraction, returning a receiver for the eventual result.
    ///
    /// Non-blocking: if the queue is at capacity, returns [`Error::Backpressure`] immediately
    /// rather than waiting for room.
    pub fn enqueue(&self, turns: Vec<Turn>) -> Result<oneshot::Receiver<Result<ExtractionOutcome>>> {
        let (reply, receiver) = oneshot::channel();
        self.tx.try_send(QueuedJob { turns, reply }).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                metrics::counter!(counters::EXTRACTION_BACKPRESSURE).increment(1);
                Error::Backpressure("extraction queue is at capacity".to_string())
            },
            mpsc::error::TrySendError::Closed(_) => {
                Error::StorageUnavailable("extraction worker has stopped".to_string())
            },
        })?;
        Ok(receiver)
    }
}
