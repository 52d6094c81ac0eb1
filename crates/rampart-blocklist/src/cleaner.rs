//! Adaptive background sweeper for the block store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::metrics::RecorderMetrics;
use crate::store::ShardedBlockStore;

/// Pick the next sweep interval from the store's occupancy ratio.
///
/// The fuller the store, the faster it reclaims: this is the backpressure
/// signal that keeps memory bounded under sustained attack.
fn next_interval(occupancy: f64, default: Duration) -> Duration {
    if occupancy > 0.9 {
        Duration::from_secs(10)
    } else if occupancy > 0.7 {
        Duration::from_secs(30)
    } else if occupancy > 0.5 {
        Duration::from_secs(45)
    } else {
        default
    }
}

/// Handle for stopping the sweeper task.
#[derive(Debug)]
pub struct CleanerHandle {
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CleanerHandle {
    /// Stop the sweeper, waiting out any in-flight sweep. Idempotent.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Start the adaptive sweeper task.
///
/// Must be called from within a tokio runtime.
pub(crate) fn start_cleaner_task(
    store: Arc<ShardedBlockStore>,
    metrics: Arc<RecorderMetrics>,
    default_interval: Duration,
) -> CleanerHandle {
    let (shutdown, mut rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut interval = default_interval;
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                _ = rx.changed() => break,
            }

            let started = Instant::now();
            let removed = store.sweep();
            metrics.set_cleanup_duration(started.elapsed());

            interval = next_interval(store.occupancy(), default_interval);
            if removed > 0 {
                debug!(
                    removed,
                    next_interval_secs = interval.as_secs(),
                    "cleanup pass complete"
                );
            }
        }
    });

    CleanerHandle {
        shutdown,
        task: Mutex::new(Some(task)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecorderConfig;
    use std::net::IpAddr;

    #[test]
    fn test_interval_ladder() {
        let default = Duration::from_secs(60);

        assert_eq!(next_interval(0.95, default), Duration::from_secs(10));
        assert_eq!(next_interval(0.75, default), Duration::from_secs(30));
        assert_eq!(next_interval(0.55, default), Duration::from_secs(45));
        assert_eq!(next_interval(0.3, default), default);
        assert_eq!(next_interval(0.0, default), default);
    }

    #[test]
    fn test_interval_ladder_boundaries_inclusive() {
        let default = Duration::from_secs(120);

        // Thresholds are strict: exactly-at stays in the looser tier.
        assert_eq!(next_interval(0.9, default), Duration::from_secs(30));
        assert_eq!(next_interval(0.7, default), Duration::from_secs(45));
        assert_eq!(next_interval(0.5, default), default);
    }

    fn test_store() -> (Arc<ShardedBlockStore>, Arc<RecorderMetrics>) {
        let metrics = Arc::new(RecorderMetrics::default());
        let config = RecorderConfig {
            capacity: 100,
            shard_count: 4,
            ..RecorderConfig::default()
        };
        let store = Arc::new(ShardedBlockStore::new(&config, Arc::clone(&metrics)));
        (store, metrics)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cleaner_sweeps_lapsed_blocks() {
        let (store, metrics) = test_store();
        let ip: IpAddr = "203.0.113.5".parse().unwrap();

        store.record_block(ip, Duration::from_millis(10));
        assert_eq!(store.len(), 1);

        let handle = start_cleaner_task(
            Arc::clone(&store),
            Arc::clone(&metrics),
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(store.len(), 0);
        assert_eq!(metrics.snapshot().total_expired, 1);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_cleaner_stop_is_idempotent() {
        let (store, metrics) = test_store();

        let handle = start_cleaner_task(store, metrics, Duration::from_millis(10));

        handle.stop().await;
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_cleaner_stops_promptly_during_long_interval() {
        let (store, metrics) = test_store();

        let handle = start_cleaner_task(store, metrics, Duration::from_secs(3600));

        // stop() must not wait for the hour-long sleep to elapse.
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("cleaner did not stop in time");
    }
}
