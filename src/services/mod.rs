//! Business logic services.
//!
//! Each service orchestrates one component of the architecture (C3-C7) over the storage and
//! collaborator traits; none of them depend on a concrete backend.

// Allow cast_precision_loss for score calculations where exact precision is not critical.
#![allow(clippy::cast_precision_loss)]
// Allow option_if_let_else for clearer code in some contexts.
#![allow(clippy::option_if_let_else)]
// Allow significant_drop_tightening as dropping slightly early provides no benefit.
#![allow(clippy::significant_drop_tightening)]
// Allow unused_self for methods kept for API consistency.
#![allow(clippy::unused_self)]
// Allow trivially_copy_pass_by_ref for namespace references.
#![allow(clippy::trivially_copy_pass_by_ref)]
// Allow unnecessary_wraps for const fn methods returning Result.
#![allow(clippy::unnecessary_wraps)]
// Allow manual_let_else for clearer error handling patterns.
#![allow(clippy::manual_let_else)]
// Allow or_fun_call for entry API with closures.
#![allow(clippy::or_fun_call)]

pub mod context;
pub mod extractor;
pub mod retriever;
pub mod summary;
pub mod updater;

pub use context::ContextBuilder;
pub use extractor::{ExtractedEntity, ExtractedRelationship, ExtractionOutcome, ExtractionQueue, FactExtractor};
pub use retriever::{HybridRetriever, RetrievalQuery, ScoredFact};
pub use summary::SummaryService;
pub use updater::{DirtyMarker, MemoryUpdater, UpdateOutcome};
