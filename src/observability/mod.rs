//! Observability helpers: named metrics and logging conventions shared by every component.
//!
//! This crate does not own a `tracing`/`metrics` exporter — the host process initializes those
//! (matching the external-collaborator boundary: observability *sinks* are an outer-surface
//! concern). Every public operation still emits `tracing` spans/events and `metrics` calls at
//! the seams named below, so the host gets signal for free once it installs a subscriber.

pub mod logging;
pub mod metrics;

pub use metrics::counters;
