//! The blocked-IP recorder: in-memory truth plus write-behind persistence.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::breaker::CircuitBreaker;
use crate::cleaner::{start_cleaner_task, CleanerHandle};
use crate::config::RecorderConfig;
use crate::metrics::{MetricsSnapshot, RecorderMetrics};
use crate::queue::WriteBehindQueue;
use crate::record::{BlockReason, BlockRecord, BlockRecordFull};
use crate::sink::BlockSink;
use crate::store::ShardedBlockStore;
use crate::writer::{start_writer_task, WriterHandle};

/// Authoritative tracker of blocked IPs.
///
/// Every block lands in the sharded in-memory store immediately; a full copy
/// of the event is queued for the background writer, which mirrors it to the
/// durable sink on a best-effort basis. A slow or dead sink never touches the
/// request path: the circuit breaker turns the durable side-effect into a
/// no-op while the in-memory block still applies.
///
/// Construct one recorder at the composition root and share it by `Arc`;
/// construction spawns the sweeper and writer tasks and therefore requires a
/// tokio runtime.
#[derive(Debug)]
pub struct BlockedIpRecorder {
    store: Arc<ShardedBlockStore>,
    queue: Arc<WriteBehindQueue>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<RecorderMetrics>,
    cleaner: CleanerHandle,
    writer: WriterHandle,
    closed: AtomicBool,
}

impl BlockedIpRecorder {
    /// Create a recorder and start its background tasks.
    #[must_use]
    pub fn new(config: RecorderConfig, sink: Arc<dyn BlockSink>) -> Self {
        let config = config.normalized();
        let metrics = Arc::new(RecorderMetrics::default());
        let store = Arc::new(ShardedBlockStore::new(&config, Arc::clone(&metrics)));
        let queue = Arc::new(WriteBehindQueue::new(config.write_queue_size));
        let breaker = Arc::new(CircuitBreaker::new(&config.breaker));

        let cleaner = start_cleaner_task(
            Arc::clone(&store),
            Arc::clone(&metrics),
            config.cleanup_interval,
        );
        let writer = start_writer_task(
            Arc::clone(&queue),
            sink,
            Arc::clone(&breaker),
            Arc::clone(&metrics),
            config.clone(),
        );

        info!(
            capacity = config.capacity,
            shards = config.shard_count,
            queue = queue.capacity(),
            "blocked-IP recorder started"
        );

        Self {
            store,
            queue,
            breaker,
            metrics,
            cleaner,
            writer,
            closed: AtomicBool::new(false),
        }
    }

    /// Block `ip` for `duration`, refreshing any existing block.
    ///
    /// Each call also emits one durable event, unless the breaker is open or
    /// the write-behind queue is full — both losses are silent by design.
    pub fn record(&self, ip: IpAddr, reason: BlockReason, request_uri: &str, duration: Duration) {
        self.store.record_block(ip, duration);

        if self.breaker.is_open() {
            warn!(ip = %ip, reason = %reason, "durable path open-circuited, skipping persistence");
            return;
        }

        let now = Utc::now();
        let record = BlockRecordFull {
            ip,
            reason,
            request_uri: request_uri.to_owned(),
            blocked_at: now,
            blocked_until: now + chrono::Duration::milliseconds(duration.as_millis() as i64),
        };

        if !self.queue.push(record) {
            warn!(ip = %ip, reason = %reason, "write-behind queue full, dropping durable record");
        }
        self.metrics.set_write_queue_size(self.queue.len() as u64);
    }

    /// Look up an active block for `ip`.
    #[must_use]
    pub fn is_blocked(&self, ip: &IpAddr) -> Option<BlockRecord> {
        self.store.is_blocked(ip)
    }

    /// Export every currently-active block.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BlockRecord> {
        self.store.snapshot()
    }

    /// Number of tracked blocks, lapsed-but-unswept included.
    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.store.len()
    }

    /// Current metrics, with the gauges reconciled first.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.set_current_blocked(self.store.len() as u64);
        self.metrics.set_write_queue_size(self.queue.len() as u64);
        self.metrics.snapshot()
    }

    /// Stop the sweeper and the writer, flushing buffered records once.
    ///
    /// Idempotent; later calls return immediately.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cleaner.stop().await;
        self.writer.stop().await;
        info!("blocked-IP recorder closed");
    }
}
