//! Process-lifetime counters for the blocklist cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Atomic counters shared between the store, the cleaner, and the writer.
///
/// Counters live for the life of the process and are only reset by restart.
#[derive(Debug, Default)]
pub struct RecorderMetrics {
    total_blocked: AtomicU64,
    total_expired: AtomicU64,
    current_blocked: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    write_queue_size: AtomicU64,
    cleanup_duration_ms: AtomicU64,
}

impl RecorderMetrics {
    /// Count one genuinely new block insert.
    pub(crate) fn record_block(&self) {
        self.total_blocked.fetch_add(1, Ordering::Relaxed);
        self.current_blocked.fetch_add(1, Ordering::Relaxed);
    }

    /// Count entries removed by an expiry sweep.
    pub(crate) fn record_expired(&self, removed: u64) {
        self.total_expired.fetch_add(removed, Ordering::Relaxed);
    }

    /// Count a lookup that found an active block.
    pub(crate) fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a lookup that found nothing (or only a lapsed entry).
    pub(crate) fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Reconcile the live-block gauge against the store.
    pub(crate) fn set_current_blocked(&self, current: u64) {
        self.current_blocked.store(current, Ordering::Relaxed);
    }

    /// Update the write-behind queue depth gauge.
    pub(crate) fn set_write_queue_size(&self, size: u64) {
        self.write_queue_size.store(size, Ordering::Relaxed);
    }

    /// Record the duration of the latest sweep pass.
    pub(crate) fn set_cleanup_duration(&self, duration: Duration) {
        self.cleanup_duration_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Export a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_blocked: self.total_blocked.load(Ordering::Relaxed),
            total_expired: self.total_expired.load(Ordering::Relaxed),
            current_blocked: self.current_blocked.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            write_queue_size: self.write_queue_size.load(Ordering::Relaxed),
            cleanup_duration_ms: self.cleanup_duration_ms.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time metrics export for observability scrapers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Blocks ever inserted (refreshes excluded).
    pub total_blocked: u64,
    /// Entries removed by expiry sweeps.
    pub total_expired: u64,
    /// Blocks currently tracked.
    pub current_blocked: u64,
    /// Lookups that found an active block.
    pub cache_hits: u64,
    /// Lookups that found nothing.
    pub cache_misses: u64,
    /// Records waiting in the write-behind queue.
    pub write_queue_size: u64,
    /// Duration of the latest sweep pass, in milliseconds.
    pub cleanup_duration_ms: u64,
}
