//! Sharded in-memory store of active blocks.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::RecorderConfig;
use crate::expiry::{EntryHandle, ExpiryHeap};
use crate::metrics::RecorderMetrics;
use crate::record::BlockRecord;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn ip_hash(ip: &IpAddr) -> u32 {
    match ip {
        IpAddr::V4(v4) => fnv1a(&v4.octets()),
        IpAddr::V6(v6) => fnv1a(&v6.octets()),
    }
}

#[derive(Debug)]
struct StoredBlock {
    blocked_until: DateTime<Utc>,
    expires_at: Instant,
    handle: EntryHandle,
}

#[derive(Debug)]
struct ShardInner {
    blocks: HashMap<IpAddr, StoredBlock>,
    heap: ExpiryHeap,
    /// Scratch buffer reused across sweep passes.
    to_delete: Vec<IpAddr>,
}

impl ShardInner {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            blocks: HashMap::with_capacity(capacity),
            heap: ExpiryHeap::with_capacity(capacity),
            to_delete: Vec::with_capacity(64),
        }
    }

    /// Make room for one more block if the shard is at capacity.
    ///
    /// Already-lapsed entries go first; if none have lapsed, the entry that
    /// would free itself soonest is evicted regardless of expiry status.
    fn ensure_capacity(&mut self, per_shard_capacity: usize) {
        if self.blocks.len() < per_shard_capacity {
            return;
        }

        let now = Instant::now();
        while self.blocks.len() >= per_shard_capacity {
            match self.heap.peek() {
                Some((ip, expires_at)) if expires_at <= now => {
                    self.heap.pop();
                    self.blocks.remove(&ip);
                }
                _ => break,
            }
        }

        while self.blocks.len() >= per_shard_capacity {
            let Some((ip, _)) = self.heap.pop() else { break };
            if let Some(stored) = self.blocks.remove(&ip) {
                debug!(
                    ip = %ip,
                    until = %stored.blocked_until,
                    "shard full, evicting earliest-expiring block"
                );
            }
        }
    }
}

#[derive(Debug)]
struct Shard {
    inner: RwLock<ShardInner>,
}

/// Sharded map of currently-blocked IPs with per-shard expiry heaps.
///
/// Each shard owns its map, heap, and lock; a given IP always hashes to the
/// same shard, so its history is serialized even though shards never
/// coordinate. The lookup path takes the shard's read lock only.
#[derive(Debug)]
pub struct ShardedBlockStore {
    shards: Vec<Shard>,
    shard_mask: u32,
    capacity: usize,
    per_shard_capacity: usize,
    metrics: Arc<RecorderMetrics>,
}

impl ShardedBlockStore {
    /// Create a store from a normalized configuration.
    #[must_use]
    pub fn new(config: &RecorderConfig, metrics: Arc<RecorderMetrics>) -> Self {
        let shard_count = config.shard_count.max(1).next_power_of_two();
        let capacity = config.capacity.max(1);
        let per_shard_capacity = (capacity / shard_count).max(1);

        let shards = (0..shard_count)
            .map(|_| Shard {
                inner: RwLock::new(ShardInner::with_capacity(per_shard_capacity)),
            })
            .collect();

        Self {
            shards,
            shard_mask: (shard_count - 1) as u32,
            capacity,
            per_shard_capacity,
            metrics,
        }
    }

    fn shard(&self, ip: &IpAddr) -> &Shard {
        &self.shards[(ip_hash(ip) & self.shard_mask) as usize]
    }

    /// Insert a block for `ip`, or refresh the existing one.
    ///
    /// A refresh replaces the expiry in place and re-balances the heap; it
    /// never creates a second entry. Returns `true` for a genuinely new
    /// insert.
    pub fn record_block(&self, ip: IpAddr, duration: Duration) -> bool {
        let blocked_until = Utc::now() + chrono::Duration::milliseconds(duration.as_millis() as i64);
        let expires_at = Instant::now() + duration;

        let mut inner = self.shard(&ip).inner.write();

        if let Some(existing) = inner.blocks.get_mut(&ip) {
            existing.blocked_until = blocked_until;
            existing.expires_at = expires_at;
            let handle = existing.handle;
            inner.heap.update(handle, expires_at);
            debug!(ip = %ip, until = %blocked_until, "refreshed existing block");
            return false;
        }

        inner.ensure_capacity(self.per_shard_capacity);

        let handle = inner.heap.push(ip, expires_at);
        inner.blocks.insert(
            ip,
            StoredBlock {
                blocked_until,
                expires_at,
                handle,
            },
        );
        drop(inner);

        self.metrics.record_block();
        info!(ip = %ip, until = %blocked_until, "IP blocked");
        true
    }

    /// Look up an active block for `ip`.
    ///
    /// Lapsed-but-unswept entries read as not blocked; deleting them is the
    /// sweeper's job, which keeps this path free of write-lock traffic.
    #[must_use]
    pub fn is_blocked(&self, ip: &IpAddr) -> Option<BlockRecord> {
        let inner = self.shard(ip).inner.read();

        let Some(stored) = inner.blocks.get(ip) else {
            drop(inner);
            self.metrics.record_miss();
            return None;
        };

        if Instant::now() > stored.expires_at {
            drop(inner);
            self.metrics.record_miss();
            return None;
        }

        let record = BlockRecord {
            ip: *ip,
            blocked_until: stored.blocked_until,
        };
        drop(inner);
        self.metrics.record_hit();
        Some(record)
    }

    /// Remove every lapsed entry across all shards.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;

        for shard in &self.shards {
            let mut inner = shard.inner.write();
            let now = Instant::now();

            let mut scratch = std::mem::take(&mut inner.to_delete);
            scratch.clear();

            while let Some((ip, expires_at)) = inner.heap.peek() {
                if expires_at > now {
                    break;
                }
                inner.heap.pop();
                scratch.push(ip);
            }

            for ip in &scratch {
                inner.blocks.remove(ip);
            }

            removed += scratch.len();
            inner.to_delete = scratch;
        }

        if removed > 0 {
            self.metrics.record_expired(removed as u64);
            debug!(removed, "swept lapsed blocks");
        }
        removed
    }

    /// Export every currently-active block, for administrative listing.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BlockRecord> {
        let now = Instant::now();
        let mut records = Vec::with_capacity(self.capacity / 10);

        for shard in &self.shards {
            let inner = shard.inner.read();
            for (ip, stored) in &inner.blocks {
                if now <= stored.expires_at {
                    records.push(BlockRecord {
                        ip: *ip,
                        blocked_until: stored.blocked_until,
                    });
                }
            }
        }

        records
    }

    /// Total entries across all shards, lapsed-but-unswept included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.inner.read().blocks.len())
            .sum()
    }

    /// Check whether the store tracks no blocks at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.inner.read().blocks.is_empty())
    }

    /// Fraction of total capacity in use, in `0.0..=1.0`.
    #[must_use]
    pub fn occupancy(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    /// Configured total capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Per-shard `(map, heap)` sizes, for invariant checks.
    #[cfg(test)]
    pub(crate) fn shard_sizes(&self) -> Vec<(usize, usize)> {
        self.shards
            .iter()
            .map(|shard| {
                let inner = shard.inner.read();
                (inner.blocks.len(), inner.heap.len())
            })
            .collect()
    }
}
