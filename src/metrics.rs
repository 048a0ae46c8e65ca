//! Store instrumentation
//!
//! Injectable counter collector shared by the record store and the upload
//! orchestrator. Each consumer holds its own clone; tests construct a
//! fresh instance, so counts never leak across tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Shared counters for store reads, writes and dedup activity.
#[derive(Clone, Default)]
pub struct StoreMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    documents_written: AtomicU64,
    documents_read: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    duplicate_hits: AtomicU64,
    sessions_committed: AtomicU64,
    sessions_swept: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub documents_written: u64,
    pub documents_read: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub duplicate_hits: u64,
    pub sessions_committed: u64,
    pub sessions_swept: u64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one document write of `bytes` bytes.
    pub fn record_write(&self, bytes: u64) {
        self.inner.documents_written.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record one document read of `bytes` bytes.
    pub fn record_read(&self, bytes: u64) {
        self.inner.documents_read.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_duplicate_hit(&self) {
        self.inner.duplicate_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.inner.sessions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swept(&self, count: u64) {
        self.inner.sessions_swept.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_written: self.inner.documents_written.load(Ordering::Relaxed),
            documents_read: self.inner.documents_read.load(Ordering::Relaxed),
            bytes_written: self.inner.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.inner.bytes_read.load(Ordering::Relaxed),
            duplicate_hits: self.inner.duplicate_hits.load(Ordering::Relaxed),
            sessions_committed: self.inner.sessions_committed.load(Ordering::Relaxed),
            sessions_swept: self.inner.sessions_swept.load(Ordering::Relaxed),
        }
    }
}
