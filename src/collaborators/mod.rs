//! Capability interfaces for the two collaborators the memory subsystem consumes but does not
//! own: the generation backend and the embedding model.
//!
//! Per the design note on dynamic dispatch, these are modeled as small traits supplied by the
//! host rather than a tagged enum of known backends — the host may wire in any implementation
//! (a local SLM runtime, a remote API client, a test double) without this crate knowing which.

mod embedder;
mod generator;

pub use embedder::Embedder;
pub use generator::{GenerationOptions, GenerationOutcome, Generator};
