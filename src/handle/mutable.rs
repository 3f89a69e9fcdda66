//! Mutable handle registry
//!
//! Backs the short-lived handle space: result callbacks and per-call
//! objects that live for exactly one foreign-call round trip. The table
//! sees heavy insert/remove churn, so it is sharded 32 ways with a
//! multiplicative hash of the handle picking the shard. Released slot
//! indices are recycled through a free list with a bumped generation
//! (see [`Handle`]), which keeps reuse safe against stale native-side
//! references.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use super::Handle;

/// Number of shards; must be a power of two.
const SHARD_COUNT: usize = 32;

/// Fibonacci multiplier for the shard hash (2^64 / golden ratio).
const HASH_MULT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Pick a shard from a raw handle id.
#[inline]
fn shard_index(raw: u64) -> usize {
    // Top bits of the multiplicative hash are the well-mixed ones.
    (raw.wrapping_mul(HASH_MULT) >> (64 - SHARD_COUNT.trailing_zeros())) as usize
}

/// Registry for short-lived objects exposed across the FFI boundary.
///
/// All operations are safe under arbitrary concurrent callers; operations
/// on the same handle are linearized by the owning shard's lock.
pub struct MutableRegistry<T> {
    /// Sharded storage, keyed by raw handle id.
    shards: Vec<RwLock<HashMap<u64, T>>>,
    /// Next never-used slot index.
    next_slot: AtomicU64,
    /// Released slots awaiting reuse, each paired with its next generation.
    free: Mutex<Vec<(u64, u64)>>,
}

impl<T> MutableRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            // Slot 0 is reserved so a zero raw id is never a valid handle.
            next_slot: AtomicU64::new(1),
            free: Mutex::new(Vec::new()),
        }
    }

    /// Store a value and return its freshly assigned handle.
    pub fn register(&self, value: T) -> Handle {
        let handle = match self.free.lock().pop() {
            Some((slot, generation)) => Handle::pack(slot, generation),
            None => Handle::pack(self.next_slot.fetch_add(1, Ordering::Relaxed), 0),
        };

        let prev = self.shards[shard_index(handle.raw())]
            .write()
            .insert(handle.raw(), value);
        debug_assert!(prev.is_none(), "mutable handle collision: {}", handle);

        handle
    }

    /// Look up a value without removing it, applying `f` under the shard
    /// lock. Returns `None` if the handle is absent or stale.
    pub fn resolve_with<F, R>(&self, handle: Handle, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        self.shards[shard_index(handle.raw())]
            .read()
            .get(&handle.raw())
            .map(f)
    }

    /// Look up and clone a value without removing it.
    pub fn resolve(&self, handle: Handle) -> Option<T>
    where
        T: Clone,
    {
        self.resolve_with(handle, T::clone)
    }

    /// Atomically look up and remove a value in one step.
    ///
    /// The combined operation is what makes concurrent release safe: of N
    /// racing callers exactly one observes the value, so a double-free on
    /// the native resource behind it is impossible. The released slot is
    /// recycled with a bumped generation.
    pub fn release(&self, handle: Handle) -> Option<T> {
        let removed = self.shards[shard_index(handle.raw())]
            .write()
            .remove(&handle.raw());

        if removed.is_some() {
            self.free
                .lock()
                .push((handle.slot(), handle.generation().wrapping_add(1)));
        }

        removed
    }

    /// Number of live entries across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// Check whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }
}

impl<T> Default for MutableRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
