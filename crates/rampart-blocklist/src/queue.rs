//! Bounded ring buffer feeding the persistence writer.

use parking_lot::Mutex;

use crate::record::BlockRecordFull;

#[derive(Debug)]
struct QueueInner {
    buf: Box<[Option<BlockRecordFull>]>,
    head: usize,
    len: usize,
}

/// Bounded FIFO of block records awaiting durable write.
///
/// `push` never blocks: a full queue rejects the record and the block stays
/// in-memory only. Capacity is rounded up to a power of two.
#[derive(Debug)]
pub struct WriteBehindQueue {
    inner: Mutex<QueueInner>,
    mask: usize,
    capacity: usize,
}

impl WriteBehindQueue {
    /// Create a queue holding at least `size` records.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let capacity = size.max(1).next_power_of_two();
        let buf = (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice();

        Self {
            inner: Mutex::new(QueueInner { buf, head: 0, len: 0 }),
            mask: capacity - 1,
            capacity,
        }
    }

    /// Enqueue a record. Returns `false` (record dropped) when full.
    pub fn push(&self, record: BlockRecordFull) -> bool {
        let mut inner = self.inner.lock();
        if inner.len == self.capacity {
            return false;
        }

        let slot = (inner.head + inner.len) & self.mask;
        inner.buf[slot] = Some(record);
        inner.len += 1;
        true
    }

    /// Dequeue up to `max` records in arrival order.
    pub fn pop_batch(&self, max: usize) -> Vec<BlockRecordFull> {
        let mut inner = self.inner.lock();
        let count = max.min(inner.len);
        let mut batch = Vec::with_capacity(count);

        for _ in 0..count {
            let slot = inner.head;
            if let Some(record) = inner.buf[slot].take() {
                batch.push(record);
            }
            inner.head = (slot + 1) & self.mask;
            inner.len -= 1;
        }

        batch
    }

    /// Number of records currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    /// Check whether the queue holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().len == 0
    }

    /// Usable capacity after power-of-two rounding.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
