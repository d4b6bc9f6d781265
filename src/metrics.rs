use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct Metrics {
    documents_ingested: AtomicU64,
    chunks_ingested: AtomicU64,
    questions_answered: AtomicU64,
    contexts_retrieved: AtomicU64,
}

impl Metrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed ingestion run and the number of chunks it produced.
    pub fn record_ingest(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_ingested.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a completed query run and the number of contexts retrieved for it.
    pub fn record_query(&self, context_count: u64) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
        self.contexts_retrieved
            .fetch_add(context_count, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_ingested: self.chunks_ingested.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            contexts_retrieved: self.contexts_retrieved.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of ingestion runs completed since startup.
    pub documents_ingested: u64,
    /// Total chunk count upserted across all ingestion runs.
    pub chunks_ingested: u64,
    /// Number of query runs completed since startup.
    pub questions_answered: u64,
    /// Total context count retrieved across all query runs.
    pub contexts_retrieved: u64,
}
