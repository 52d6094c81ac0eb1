//! Durable-store boundary for block records.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::BlocklistResult;
use crate::record::BlockRecordFull;

/// Boxed future alias for sink operations.
pub type SinkFuture<'a, T> = Pin<Box<dyn Future<Output = BlocklistResult<T>> + Send + 'a>>;

/// Durable destination for full block records.
///
/// The durable store is an append-only event log: batches are inserted
/// unordered, records are never updated, and repeated blocks of the same IP
/// produce multiple rows. Implementations must tolerate duplicate and
/// out-of-order batches.
pub trait BlockSink: Send + Sync {
    /// Append a batch of records to the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be written; the caller retries
    /// with backoff and eventually gives the batch up.
    fn insert_many<'a>(&'a self, records: &'a [BlockRecordFull]) -> SinkFuture<'a, ()>;
}

/// Append-only JSON-lines file sink.
///
/// One JSON document per line, appended per batch. Readable with standard
/// line-oriented tooling and trivially compacted offline.
#[derive(Debug)]
pub struct JsonlBlockSink {
    path: PathBuf,
}

impl JsonlBlockSink {
    /// Create a sink appending to `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The log file path.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl BlockSink for JsonlBlockSink {
    fn insert_many<'a>(&'a self, records: &'a [BlockRecordFull]) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            if records.is_empty() {
                return Ok(());
            }

            let mut out = Vec::with_capacity(records.len() * 128);
            for record in records {
                serde_json::to_writer(&mut out, record)?;
                out.push(b'\n');
            }

            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(&out).await?;
            file.flush().await?;

            debug!(batch = records.len(), path = %self.path.display(), "appended block records");
            Ok(())
        })
    }
}

/// In-memory sink for tests and examples.
///
/// Counts every insert attempt and can be toggled to fail, which is how the
/// circuit-breaker path is exercised without a real store.
#[derive(Debug, Default)]
pub struct MemoryBlockSink {
    records: Mutex<Vec<BlockRecordFull>>,
    failing: AtomicBool,
    attempts: AtomicU64,
}

impl MemoryBlockSink {
    /// Create an empty, succeeding sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent inserts fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of insert attempts seen, failures included.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Copy of everything successfully inserted.
    #[must_use]
    pub fn records(&self) -> Vec<BlockRecordFull> {
        self.records.lock().clone()
    }

    /// Number of records successfully inserted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check whether nothing has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl BlockSink for MemoryBlockSink {
    fn insert_many<'a>(&'a self, records: &'a [BlockRecordFull]) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(crate::error::BlocklistError::Sink("injected failure".into()));
            }
            self.records.lock().extend_from_slice(records);
            Ok(())
        })
    }
}
