//! Metric name constants, kept in one place so counters and histograms stay consistent across
//! the extraction, update, retrieval, and summary seams.

/// Names for the `metrics::counter!`/`histogram!` calls emitted throughout `services`.
pub mod counters {
    /// Extraction attempts, labeled `result = "ok" | "empty" | "error"`.
    pub const EXTRACTION_ATTEMPTS: &str = "slm_memory_extraction_attempts_total";
    /// Memory Updater decisions, labeled `outcome = "add" | "update" | "delete" | "noop"`.
    pub const UPDATER_DECISIONS: &str = "slm_memory_updater_decisions_total";
    /// Hybrid Retriever latency, in seconds.
    pub const RETRIEVAL_LATENCY: &str = "slm_memory_retrieval_latency_seconds";
    /// Rolling Summary refreshes, labeled `mode = "incremental" | "full"`.
    pub const SUMMARY_REFRESHES: &str = "slm_memory_summary_refreshes_total";
    /// Facts removed by `PruneOld`.
    pub const PRUNE_REMOVED: &str = "slm_memory_prune_removed_total";
    /// Extraction jobs dropped due to a full bounded queue.
    pub const EXTRACTION_BACKPRESSURE: &str = "slm_memory_extraction_backpressure_total";
}
