//! Logging conventions.
//!
//! This crate emits through the ambient `tracing` subscriber; it never configures one itself.
//! The helpers here exist so every "recover locally" branch (see the crate-level error policy)
//! logs with the same shape instead of each call site inventing its own fields.

/// Logs a recovered, non-surfaced failure at `warn` level with a consistent field shape.
///
/// Used at every "recover locally" branch from the error-handling policy: embedder/generator
/// failures inside extraction, update-decision, and summary refresh never become an `Err` the
/// caller sees, but they are never silent either.
pub fn log_recovered_failure(component: &str, operation: &str, cause: &dyn std::fmt::Display) {
    tracing::warn!(
        component,
        operation,
        cause = %cause,
        "recovered from collaborator failure, degrading gracefully"
    );
}
