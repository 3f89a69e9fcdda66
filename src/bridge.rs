//! Process-scoped bridge assembly
//!
//! One [`Bridge`] instance owns every shared piece of the boundary: the
//! two handle registries, the bounded-call gate, the executor pool, and
//! the byte pool. It is constructed once, explicitly, and installed into
//! a process-wide cell so the `extern "C"` entry points can reach it.
//! Installation must happen before the native runtime can invoke any
//! entry point; an entry before install is a protocol violation and
//! panics.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::config::BridgeConfig;
use crate::executor::{ExecutorPool, ExecutorPoolBuilder};
use crate::gate::CallGate;
use crate::handle::{Handle, ImmutableRegistry, MutableRegistry};
use crate::pool::BytePool;
use crate::value::PropertyValue;

/// A one-shot result callback registered for a pending foreign call.
pub type Callback = Box<dyn FnOnce(PropertyValue) + Send + 'static>;

/// Registry cell for a callback. `FnOnce` closures are `Send` but not
/// `Sync`; the mutex makes the shared table sound while the closure
/// itself is only ever taken out once.
type CallbackCell = Mutex<Option<Callback>>;

/// A long-lived object exposed to the native runtime through the
/// immutable table.
pub type BridgedAny = Arc<dyn Any + Send + Sync>;

static INSTANCE: OnceCell<Bridge> = OnceCell::new();

/// The process-scoped bridge state.
pub struct Bridge {
    /// Mutable table: pending one-shot callbacks.
    callbacks: MutableRegistry<CallbackCell>,
    /// Immutable table: extensions, apps, environment handles.
    objects: ImmutableRegistry<BridgedAny>,
    /// Bounds concurrently in-flight foreign calls.
    gate: CallGate,
    /// Serializes per-owner foreign calls.
    pool: ExecutorPool,
    /// Recycles FFI-crossing buffers.
    buffers: BytePool,
    /// Leak check runs at most once.
    leak_checked: AtomicBool,
}

impl Bridge {
    /// Assemble a bridge from configuration.
    pub fn new(config: &BridgeConfig) -> Self {
        let gate = match config.gate_permits {
            Some(permits) => CallGate::new(permits),
            None => CallGate::with_default_permits(),
        };

        let mut builder = ExecutorPoolBuilder::new(config.executors);
        if let Some(bound) = config.queue_bound {
            builder = builder.queue_bound(bound);
        }

        Self {
            callbacks: MutableRegistry::new(),
            objects: ImmutableRegistry::new(),
            gate,
            pool: builder.build(),
            buffers: BytePool::new(),
            leak_checked: AtomicBool::new(false),
        }
    }

    /// Install a bridge as the process instance.
    ///
    /// Must run before the native runtime can fire any callback entry
    /// point. Returns the installed reference, or the bridge back as an
    /// error if one is already installed.
    pub fn install(config: &BridgeConfig) -> Result<&'static Bridge, Bridge> {
        INSTANCE.try_insert(Bridge::new(config)).map_err(|(_, b)| b)
    }

    /// The installed process instance.
    ///
    /// # Panics
    ///
    /// Panics if no bridge has been installed: an FFI entry point has
    /// fired before initialization, which means the two sides disagree
    /// about process state.
    pub fn get() -> &'static Bridge {
        INSTANCE
            .get()
            .expect("bridge entry point fired before Bridge::install")
    }

    /// The installed process instance, if any.
    pub fn try_get() -> Option<&'static Bridge> {
        INSTANCE.get()
    }

    // ---- mutable table -----------------------------------------------

    /// Register a one-shot callback for a pending foreign call and
    /// return the handle to hand to the native side.
    pub fn register_callback(&self, callback: Callback) -> Handle {
        self.callbacks.register(Mutex::new(Some(callback)))
    }

    /// Fire a registered callback exactly once.
    ///
    /// The handle is looked up and removed in one step before invoking
    /// the closure, so a double fire cannot invoke it twice.
    ///
    /// # Panics
    ///
    /// Panics on an unknown or already-fired handle: a callback firing
    /// for a handle that was released is a lifetime protocol violation.
    pub fn dispatch_callback(&self, handle: Handle, value: PropertyValue) {
        let callback = self
            .callbacks
            .release(handle)
            .and_then(Mutex::into_inner)
            .unwrap_or_else(|| panic!("callback {} fired after release", handle));
        callback(value);
    }

    /// Drop a registered callback without firing it (e.g. the foreign
    /// call was never issued). Returns whether the handle was live.
    pub fn cancel_callback(&self, handle: Handle) -> bool {
        self.callbacks.release(handle).is_some()
    }

    /// Number of callbacks still awaiting their foreign result.
    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    // ---- immutable table ---------------------------------------------

    /// Expose a long-lived object to the native runtime.
    pub fn register_object(&self, object: BridgedAny) -> Handle {
        self.objects.register(object)
    }

    /// Resolve a long-lived object, downcast to its concrete type.
    ///
    /// `None` when the handle is unknown or the type does not match.
    pub fn resolve_object<T: Any + Send + Sync>(&self, handle: Handle) -> Option<Arc<T>> {
        self.objects
            .resolve(handle)
            .and_then(|any| any.downcast::<T>().ok())
    }

    /// Remove a long-lived object, returning it to the caller.
    pub fn release_object(&self, handle: Handle) -> Option<BridgedAny> {
        self.objects.release(handle)
    }

    /// Sweep the immutable table at teardown, invoking `on_each` per
    /// entry. Returns the number of entries swept.
    pub fn clear_objects<F>(&self, on_each: F) -> usize
    where
        F: FnMut(BridgedAny),
    {
        self.objects.clear_all(on_each)
    }

    // ---- shared resources --------------------------------------------

    /// The bounded-call gate.
    pub fn gate(&self) -> &CallGate {
        &self.gate
    }

    /// The executor pool.
    pub fn pool(&self) -> &ExecutorPool {
        &self.pool
    }

    /// The byte-buffer pool.
    pub fn buffers(&self) -> &BytePool {
        &self.buffers
    }

    // ---- teardown ----------------------------------------------------

    /// Stop the executor pool and block until it has terminated.
    pub fn shutdown(&self, graceful: bool) {
        self.pool.release(graceful);
    }

    /// Process-teardown leak detector.
    ///
    /// Enumerates immutable handles still outstanding, logs each one,
    /// and returns the leak count. Idempotent: the check runs once; any
    /// later call reports zero. It detects contract violations, it does
    /// not release anything.
    pub fn leak_check(&self) -> usize {
        if self
            .leak_checked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return 0;
        }

        let live = self.objects.live_handles();
        for handle in &live {
            log::error!("immutable handle {} still registered at teardown", handle);
        }
        live.len()
    }
}
