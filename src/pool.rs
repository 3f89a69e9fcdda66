//! Byte-buffer recycling pool
//!
//! Buffers crossing the FFI boundary are short-lived and allocation-heavy,
//! so the bridge keeps a small set of size-bucketed free lists. Acquisition
//! picks the smallest bucket that fits; release pools a buffer only when
//! its capacity exactly matches a bucket boundary. The exact-match rule
//! keeps a buffer whose capacity drifted to a non-boundary value from being
//! filed under the wrong bucket.

use crossbeam::queue::ArrayQueue;

/// Bucket boundaries, ascending. A request above the largest bucket is
/// served by a one-off allocation that is never pooled.
pub const BUCKET_SIZES: [usize; 5] = [128, 512, 1024, 2048, 4096];

/// Buffers retained per bucket before further releases are dropped.
const BUCKET_DEPTH: usize = 64;

/// Size-bucketed pool of reusable byte buffers.
pub struct BytePool {
    /// One bounded lock-free free list per bucket.
    buckets: Vec<ArrayQueue<Vec<u8>>>,
}

impl BytePool {
    /// Create a pool with empty free lists.
    pub fn new() -> Self {
        Self {
            buckets: BUCKET_SIZES
                .iter()
                .map(|_| ArrayQueue::new(BUCKET_DEPTH))
                .collect(),
        }
    }

    /// Acquire a buffer with length 0 and capacity of the smallest bucket
    /// that can hold `size`.
    ///
    /// Requests larger than the biggest bucket allocate exactly `size`;
    /// such buffers are simply dropped on release.
    pub fn acquire(&self, size: usize) -> Vec<u8> {
        match BUCKET_SIZES.iter().position(|&b| b >= size) {
            Some(i) => match self.buckets[i].pop() {
                Some(buf) => buf,
                None => Vec::with_capacity(BUCKET_SIZES[i]),
            },
            None => Vec::with_capacity(size),
        }
    }

    /// Return a buffer to the pool.
    ///
    /// Pooled only when the capacity exactly equals a bucket boundary and
    /// that bucket's free list has room; otherwise the buffer is dropped
    /// and collected normally.
    pub fn release(&self, mut buf: Vec<u8>) {
        if let Some(i) = BUCKET_SIZES.iter().position(|&b| b == buf.capacity()) {
            buf.clear();
            let _ = self.buckets[i].push(buf);
        }
    }

    /// Number of buffers currently held in free lists.
    pub fn pooled(&self) -> usize {
        self.buckets.iter().map(|q| q.len()).sum()
    }
}

impl Default for BytePool {
    fn default() -> Self {
        Self::new()
    }
}
