//! Immutable handle registry
//!
//! Backs the long-lived handle space: extensions, apps, and environment
//! handles that are registered once and removed at most once, at
//! shutdown. Ids come from a separate monotonic counter and are never
//! recycled. Double-registration is a protocol violation and panics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::Handle;

/// Registry for long-lived objects exposed across the FFI boundary.
///
/// Churn on this table is negligible (one insert per extension lifetime),
/// so a single read-write lock over a plain map is sufficient.
pub struct ImmutableRegistry<T> {
    /// Storage keyed by raw handle id.
    entries: RwLock<HashMap<u64, T>>,
    /// Next handle id; ids are never reused.
    next_id: AtomicU64,
}

impl<T> ImmutableRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            // Id 0 is reserved so a zero raw id is never a valid handle.
            next_id: AtomicU64::new(1),
        }
    }

    /// Store a value and return its freshly assigned handle.
    ///
    /// Handles are unique for the lifetime of the registry, even under
    /// concurrent registration from many callers.
    pub fn register(&self, value: T) -> Handle {
        let handle = Handle::pack(self.next_id.fetch_add(1, Ordering::Relaxed), 0);
        let prev = self.entries.write().insert(handle.raw(), value);
        assert!(
            prev.is_none(),
            "immutable handle {} registered twice",
            handle
        );
        handle
    }

    /// Store a value under a caller-supplied handle.
    ///
    /// Used when the native side dictates the identity. Panics if the
    /// handle is already occupied: immutable entries are never silently
    /// overwritten.
    pub fn register_at(&self, handle: Handle, value: T) {
        let prev = self.entries.write().insert(handle.raw(), value);
        assert!(
            prev.is_none(),
            "immutable handle {} registered twice",
            handle
        );
    }

    /// Look up a value without removing it, applying `f` under the lock.
    pub fn resolve_with<F, R>(&self, handle: Handle, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        self.entries.read().get(&handle.raw()).map(f)
    }

    /// Look up and clone a value without removing it.
    pub fn resolve(&self, handle: Handle) -> Option<T>
    where
        T: Clone,
    {
        self.resolve_with(handle, T::clone)
    }

    /// Atomically look up and remove a value in one step.
    pub fn release(&self, handle: Handle) -> Option<T> {
        self.entries.write().remove(&handle.raw())
    }

    /// Remove every entry, invoking `on_each` with the value as it goes.
    ///
    /// Teardown-only: sweeps the table at process or extension shutdown
    /// so leaks surface deterministically. The table lock is held for the
    /// whole sweep, so a concurrent reader observes either the pre-sweep
    /// table or the fully swept one and can never see an entry gone
    /// before its cleanup ran. `on_each` must not call back into the
    /// registry. Returns the number of entries swept.
    pub fn clear_all<F>(&self, mut on_each: F) -> usize
    where
        F: FnMut(T),
    {
        let mut entries = self.entries.write();
        let count = entries.len();
        for (_, value) in entries.drain() {
            on_each(value);
        }
        count
    }

    /// Raw ids of all live entries, for leak reporting.
    pub fn live_handles(&self) -> Vec<Handle> {
        self.entries.read().keys().map(|&k| Handle::from_raw(k)).collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T> Default for ImmutableRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
