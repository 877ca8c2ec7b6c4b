//! `PipelineMetrics` (SPEC_FULL.md §2's "Supplemented: stage-level metrics
//! surface"): the dropped-item counters spec.md §7's error table calls for,
//! made first-class instead of scattered `tracing` calls only, and carried
//! on every `Snapshot`.

/// Counters for every non-fatal condition spec.md §7 names. Every field is
/// monotonically increasing for the life of the engine (never reset), so a
/// UI can diff two reads to get a rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PipelineMetrics {
    /// `MalformedProtocolHeader` — a command body the classifier rejected.
    pub malformed_total: u64,
    /// `ReassemblyOverflow`/`Timeout` — a reassembly buffer dropped, whether
    /// by mismatched `total_length`, the 30s GC sweep, or the 16 MiB arena
    /// cap.
    pub reassembly_failed_total: u64,
    /// `UnknownTag` — the decoder stopped on a tag it didn't recognize.
    pub unknown_tag_total: u64,
    /// `UnknownEventCode` — an `(kind, code)` pair with no registered
    /// builder.
    pub unknown_event_total: u64,
    /// `DeferredQueueFull` — the roster's per-actor deferred queue evicted
    /// its oldest buffered tuple.
    pub deferred_queue_evictions: u64,
    /// `CaptureQueueFull` — the capture thread dropped the oldest raw
    /// packet because the bounded queue was full.
    pub capture_drop_total: u64,
}
