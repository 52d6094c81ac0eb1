//! # rampart-blocklist
//!
//! Sharded, TTL-evicting blocklist cache with best-effort write-behind
//! persistence. This is the authoritative "who is currently blocked" state
//! behind Rampart's request-admission layer.
//!
//! ## Hot path
//!
//! - [`BlockedIpRecorder::is_blocked`] - shard-local read-locked lookup
//! - [`BlockedIpRecorder::record`] - insert/refresh plus a queued durable event
//!
//! ## Background machinery
//!
//! - [`ShardedBlockStore`] - per-shard map + expiry heap, capacity-bounded
//! - [`CleanerHandle`] - adaptive sweeper; the sweep interval shrinks as
//!   occupancy rises
//! - [`WriteBehindQueue`] - bounded ring buffer, drop-on-full
//! - [`CircuitBreaker`] - gates the durable path on consecutive failures
//! - [`WriterHandle`] - batch writer with adaptive sizing, retries, and
//!   exponential backoff
//!
//! ## Durable boundary
//!
//! - [`BlockSink`] - append-only event-log destination
//! - [`JsonlBlockSink`] - JSON-lines file implementation
//! - [`MemoryBlockSink`] - in-memory implementation for tests
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use rampart_blocklist::{BlockReason, BlockedIpRecorder, MemoryBlockSink, RecorderConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let sink = Arc::new(MemoryBlockSink::new());
//! let recorder = BlockedIpRecorder::new(RecorderConfig::default(), sink);
//!
//! let ip: std::net::IpAddr = "192.0.2.7".parse().unwrap();
//! recorder.record(ip, BlockReason::HighFrequencyVisit, "/login", Duration::from_secs(600));
//! assert!(recorder.is_blocked(&ip).is_some());
//!
//! recorder.close().await;
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod breaker;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod record;
pub mod recorder;
pub mod sink;
pub mod store;
pub mod writer;

mod expiry;

// Re-export main types
pub use breaker::{BreakerState, CircuitBreaker};
pub use cleaner::CleanerHandle;
pub use config::{BreakerConfig, RecorderConfig};
pub use error::{BlocklistError, BlocklistResult};
pub use metrics::{MetricsSnapshot, RecorderMetrics};
pub use queue::WriteBehindQueue;
pub use record::{BlockReason, BlockRecord, BlockRecordFull};
pub use recorder::BlockedIpRecorder;
pub use sink::{BlockSink, JsonlBlockSink, MemoryBlockSink, SinkFuture};
pub use store::ShardedBlockStore;
pub use writer::WriterHandle;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::breaker::{BreakerState, CircuitBreaker};
    pub use crate::config::{BreakerConfig, RecorderConfig};
    pub use crate::error::{BlocklistError, BlocklistResult};
    pub use crate::metrics::MetricsSnapshot;
    pub use crate::record::{BlockReason, BlockRecord, BlockRecordFull};
    pub use crate::recorder::BlockedIpRecorder;
    pub use crate::sink::{BlockSink, JsonlBlockSink, MemoryBlockSink};
}
