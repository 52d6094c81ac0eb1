//! Background persistence writer draining the write-behind queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::breaker::CircuitBreaker;
use crate::config::RecorderConfig;
use crate::metrics::RecorderMetrics;
use crate::queue::WriteBehindQueue;
use crate::record::BlockRecordFull;
use crate::sink::BlockSink;

/// Size the next batch from the last observed write latency.
///
/// A slow store gets smaller batches, a fast one larger, clamped to the
/// configured bounds.
fn adjust_batch_size(current: usize, last_latency: Option<Duration>, config: &RecorderConfig) -> usize {
    let Some(latency) = last_latency else {
        return current;
    };

    let next = if latency > Duration::from_millis(200) {
        current / 2
    } else if latency > Duration::from_millis(100) {
        current * 3 / 4
    } else if latency < Duration::from_millis(50) {
        current * 2
    } else {
        current
    };

    next.clamp(config.min_batch_size, config.max_batch_size)
}

/// Write one batch with retries and exponential backoff.
///
/// Every attempt feeds the breaker; returns the latency of the last attempt
/// for adaptive batch sizing.
async fn flush_with_retry(
    sink: &dyn BlockSink,
    breaker: &CircuitBreaker,
    batch: &[BlockRecordFull],
    config: &RecorderConfig,
) -> Option<Duration> {
    let mut last_latency = None;

    for attempt in 0..config.max_retries {
        let started = Instant::now();
        let outcome = tokio::time::timeout(config.write_timeout, sink.insert_many(batch)).await;
        let latency = started.elapsed();
        last_latency = Some(latency);

        match outcome {
            Ok(Ok(())) => {
                breaker.record_success();
                debug!(
                    batch = batch.len(),
                    latency_ms = latency.as_millis() as u64,
                    "flushed batch to durable store"
                );
                return last_latency;
            }
            Ok(Err(err)) => {
                breaker.record_failure();
                warn!(error = %err, attempt, batch = batch.len(), "batch write failed");
            }
            Err(_) => {
                breaker.record_failure();
                warn!(
                    attempt,
                    timeout_ms = config.write_timeout.as_millis() as u64,
                    "batch write timed out"
                );
            }
        }

        if attempt + 1 < config.max_retries {
            tokio::time::sleep(Duration::from_secs(u64::from(1_u32 << attempt))).await;
        }
    }

    error!(batch = batch.len(), retries = config.max_retries, "giving up on batch");
    last_latency
}

/// Handle for stopping the writer task.
#[derive(Debug)]
pub struct WriterHandle {
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WriterHandle {
    /// Stop the writer after one final best-effort flush. Idempotent.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Start the persistence-writer task.
///
/// Must be called from within a tokio runtime.
pub(crate) fn start_writer_task(
    queue: Arc<WriteBehindQueue>,
    sink: Arc<dyn BlockSink>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<RecorderMetrics>,
    config: RecorderConfig,
) -> WriterHandle {
    let (shutdown, mut rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut batch_size = config.batch_size;
        let mut last_latency: Option<Duration> = None;

        loop {
            tokio::select! {
                () = tokio::time::sleep(config.flush_interval) => {}
                _ = rx.changed() => break,
            }

            batch_size = adjust_batch_size(batch_size, last_latency.take(), &config);
            let batch = queue.pop_batch(batch_size);
            metrics.set_write_queue_size(queue.len() as u64);
            if batch.is_empty() {
                continue;
            }

            if breaker.is_open() {
                debug!(dropped = batch.len(), "circuit breaker open, dropping batch");
                continue;
            }

            last_latency = flush_with_retry(&*sink, &breaker, &batch, &config).await;
        }

        // Drain whatever is still buffered with one final best-effort flush.
        let batch = queue.pop_batch(queue.capacity());
        if !batch.is_empty() && !breaker.is_open() {
            flush_with_retry(&*sink, &breaker, &batch, &config).await;
        }
        metrics.set_write_queue_size(queue.len() as u64);
    });

    WriterHandle {
        shutdown,
        task: Mutex::new(Some(task)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::record::{BlockReason, BlockRecordFull};
    use crate::sink::MemoryBlockSink;
    use chrono::Utc;

    fn record(n: u8) -> BlockRecordFull {
        BlockRecordFull {
            ip: std::net::IpAddr::from([192, 0, 2, n]),
            reason: BlockReason::HighFrequencyAttack,
            request_uri: format!("/attack/{n}"),
            blocked_at: Utc::now(),
            blocked_until: Utc::now() + chrono::Duration::seconds(600),
        }
    }

    fn test_config() -> RecorderConfig {
        RecorderConfig {
            flush_interval: Duration::from_millis(50),
            batch_size: 10,
            min_batch_size: 2,
            max_batch_size: 40,
            write_timeout: Duration::from_secs(5),
            max_retries: 1,
            breaker: BreakerConfig {
                failure_threshold: 2,
                timeout: Duration::from_secs(3600),
                recovery_count: 1,
            },
            ..RecorderConfig::default()
        }
        .normalized()
    }

    fn parts(
        config: &RecorderConfig,
    ) -> (Arc<WriteBehindQueue>, Arc<MemoryBlockSink>, Arc<CircuitBreaker>, Arc<RecorderMetrics>) {
        (
            Arc::new(WriteBehindQueue::new(64)),
            Arc::new(MemoryBlockSink::new()),
            Arc::new(CircuitBreaker::new(&config.breaker)),
            Arc::new(RecorderMetrics::default()),
        )
    }

    #[test]
    fn test_adjust_batch_size_thresholds() {
        let config = RecorderConfig {
            min_batch_size: 10,
            max_batch_size: 1_000,
            ..RecorderConfig::default()
        };

        // No observation yet: unchanged.
        assert_eq!(adjust_batch_size(100, None, &config), 100);

        assert_eq!(adjust_batch_size(100, Some(Duration::from_millis(250)), &config), 50);
        assert_eq!(adjust_batch_size(100, Some(Duration::from_millis(150)), &config), 75);
        assert_eq!(adjust_batch_size(100, Some(Duration::from_millis(75)), &config), 100);
        assert_eq!(adjust_batch_size(100, Some(Duration::from_millis(10)), &config), 200);
    }

    #[test]
    fn test_adjust_batch_size_clamps() {
        let config = RecorderConfig {
            min_batch_size: 50,
            max_batch_size: 200,
            ..RecorderConfig::default()
        };

        assert_eq!(adjust_batch_size(60, Some(Duration::from_millis(300)), &config), 50);
        assert_eq!(adjust_batch_size(150, Some(Duration::from_millis(1)), &config), 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_flushes_queued_records() {
        let config = test_config();
        let (queue, sink, breaker, metrics) = parts(&config);

        for n in 0..5_u8 {
            assert!(queue.push(record(n)));
        }

        let handle = start_writer_task(
            Arc::clone(&queue),
            Arc::clone(&sink) as Arc<dyn BlockSink>,
            Arc::clone(&breaker),
            Arc::clone(&metrics),
            config,
        );

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(sink.len(), 5);
        assert!(queue.is_empty());
        assert_eq!(metrics.snapshot().write_queue_size, 0);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_skips_writes_while_breaker_open() {
        let config = test_config();
        let (queue, sink, breaker, metrics) = parts(&config);
        sink.set_failing(true);

        let handle = start_writer_task(
            Arc::clone(&queue),
            Arc::clone(&sink) as Arc<dyn BlockSink>,
            Arc::clone(&breaker),
            metrics,
            config,
        );

        // Two failed batches trip the breaker (threshold 2, one attempt each).
        queue.push(record(1));
        tokio::time::sleep(Duration::from_millis(80)).await;
        queue.push(record(2));
        tokio::time::sleep(Duration::from_millis(80)).await;

        let attempts_when_tripped = sink.attempts();
        assert_eq!(attempts_when_tripped, 2);
        assert!(breaker.is_open());

        // Further batches are dropped without touching the sink.
        queue.push(record(3));
        queue.push(record(4));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(sink.attempts(), attempts_when_tripped);
        assert!(queue.is_empty());

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_retries_with_backoff() {
        let config = RecorderConfig {
            max_retries: 3,
            ..test_config()
        }
        .normalized();
        let (queue, sink, breaker, metrics) = parts(&config);
        sink.set_failing(true);

        let handle = start_writer_task(
            Arc::clone(&queue),
            Arc::clone(&sink) as Arc<dyn BlockSink>,
            breaker,
            metrics,
            config,
        );

        queue.push(record(1));
        // One tick plus 1s + 2s of backoff, all on virtual time.
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(sink.attempts(), 3);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_final_flush_on_stop() {
        let config = RecorderConfig {
            // Long interval: the periodic tick never fires in this test.
            flush_interval: Duration::from_secs(3600),
            ..test_config()
        }
        .normalized();
        let (queue, sink, breaker, metrics) = parts(&config);

        let handle = start_writer_task(
            Arc::clone(&queue),
            Arc::clone(&sink) as Arc<dyn BlockSink>,
            breaker,
            metrics,
            config,
        );

        for n in 0..7_u8 {
            queue.push(record(n));
        }

        handle.stop().await;

        assert_eq!(sink.len(), 7);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_stop_is_idempotent() {
        let config = test_config();
        let (queue, sink, breaker, metrics) = parts(&config);

        let handle = start_writer_task(queue, sink as Arc<dyn BlockSink>, breaker, metrics, config);

        handle.stop().await;
        handle.stop().await;
    }
}
