use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion activity.
#[derive(Default)]
pub struct IngestMetrics {
    files_ingested: AtomicU64,
    chunks_completed: AtomicU64,
    chunks_failed: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed file along with its per-chunk outcomes.
    pub fn record_file(&self, completed: u64, failed: u64) {
        self.files_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_completed.fetch_add(completed, Ordering::Relaxed);
        self.chunks_failed.fetch_add(failed, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_ingested: self.files_ingested.load(Ordering::Relaxed),
            chunks_completed: self.chunks_completed.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of files that entered the pipeline since startup.
    pub files_ingested: u64,
    /// Chunks that reached the `completed` status.
    pub chunks_completed: u64,
    /// Chunks that terminated without completing.
    pub chunks_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_files_and_chunk_outcomes() {
        let metrics = IngestMetrics::new();
        metrics.record_file(2, 1);
        metrics.record_file(3, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.files_ingested, 2);
        assert_eq!(snapshot.chunks_completed, 5);
        assert_eq!(snapshot.chunks_failed, 1);
    }

    #[test]
    fn snapshot_starts_at_zero() {
        let metrics = IngestMetrics::new();
        assert_eq!(metrics.snapshot().files_ingested, 0);
        assert_eq!(metrics.snapshot().chunks_failed, 0);
    }
}
