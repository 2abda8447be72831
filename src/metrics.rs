use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_indexed: AtomicU64,
    documents_skipped: AtomicU64,
    analysis_failures: AtomicU64,
    index_failures: AtomicU64,
    payloads_diverted: AtomicU64,
    documents_queued: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document whose record reached the index.
    pub fn record_indexed(&self) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a document rejected by the file-type gate.
    pub fn record_skipped(&self) {
        self.documents_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an analysis that failed, timed out, or was cancelled.
    pub fn record_analysis_failure(&self) {
        self.analysis_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failure between extraction and publish.
    pub fn record_index_failure(&self) {
        self.index_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a payload written to the failure sink.
    pub fn record_diverted(&self) {
        self.payloads_diverted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upload accepted onto the processing queue.
    pub fn record_queued(&self) {
        self.documents_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            documents_skipped: self.documents_skipped.load(Ordering::Relaxed),
            analysis_failures: self.analysis_failures.load(Ordering::Relaxed),
            index_failures: self.index_failures.load(Ordering::Relaxed),
            payloads_diverted: self.payloads_diverted.load(Ordering::Relaxed),
            documents_queued: self.documents_queued.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents indexed since startup.
    pub documents_indexed: u64,
    /// Documents rejected by validation.
    pub documents_skipped: u64,
    /// Analyses that did not succeed.
    pub analysis_failures: u64,
    /// Extraction, build, or publish failures.
    pub index_failures: u64,
    /// Payloads written to the failure sink.
    pub payloads_diverted: u64,
    /// Uploads placed on the processing queue.
    pub documents_queued: u64,
}
