//! Recorder configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the durable-write circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a trial batch.
    pub timeout: Duration,
    /// Consecutive successes in half-open before closing again.
    pub recovery_count: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            recovery_count: 3,
        }
    }
}

/// Configuration for the blocklist recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Maximum number of tracked blocks across all shards.
    ///
    /// When a shard fills up it evicts its earliest-expiring entry, even if
    /// that entry has not lapsed yet. This is the tunable to revisit if
    /// long-duration blocks must survive capacity pressure.
    pub capacity: usize,
    /// Number of shards; forced to a power of two.
    pub shard_count: usize,
    /// Baseline sweep interval; shrinks as occupancy rises.
    pub cleanup_interval: Duration,
    /// Capacity of the write-behind ring buffer.
    pub write_queue_size: usize,
    /// How often the persistence writer drains the queue.
    pub flush_interval: Duration,
    /// Initial batch size for durable writes.
    pub batch_size: usize,
    /// Lower clamp for the adaptive batch size.
    pub min_batch_size: usize,
    /// Upper clamp for the adaptive batch size.
    pub max_batch_size: usize,
    /// Timeout for a single durable write attempt.
    pub write_timeout: Duration,
    /// Write attempts per batch before giving up.
    pub max_retries: u32,
    /// Circuit breaker settings for the durable path.
    pub breaker: BreakerConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            shard_count: 16,
            cleanup_interval: Duration::from_secs(60),
            write_queue_size: 10_000,
            flush_interval: Duration::from_secs(5),
            batch_size: 100,
            min_batch_size: 10,
            max_batch_size: 1_000,
            write_timeout: Duration::from_secs(10),
            max_retries: 3,
            breaker: BreakerConfig::default(),
        }
    }
}

impl RecorderConfig {
    /// Coerce the configuration into a usable shape.
    ///
    /// Shard count is rounded up to a power of two, capacity and batch
    /// bounds are kept non-zero and ordered.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.capacity = self.capacity.max(1);
        self.shard_count = self.shard_count.max(1).next_power_of_two();
        self.write_queue_size = self.write_queue_size.max(1);
        self.min_batch_size = self.min_batch_size.max(1);
        self.max_batch_size = self.max_batch_size.max(self.min_batch_size);
        self.batch_size = self.batch_size.clamp(self.min_batch_size, self.max_batch_size);
        self.max_retries = self.max_retries.max(1);
        self
    }
}
