//! Bridged object model
//!
//! Every object that crosses the boundary embeds exactly one
//! [`NativeRef`] plus at most one handle identity, and funnels its
//! foreign calls through the shared gate and its assigned executor.
//!
//! User-facing behavior plugs in through the [`ExtensionHandler`]
//! capability trait; the framework-owned [`ExtensionWrapper`] holds a
//! reference to the user's implementation and forwards callbacks to it.
//! This is the explicit replacement for the source pattern of embedding
//! a user interface value inside a framework struct.

use std::sync::{Arc, OnceLock};

use crossbeam_channel::bounded;

use crate::bridge::Bridge;
use crate::ffi::ForeignError;
use crate::handle::Handle;
use crate::lifetime::{NativeRef, ReleaseFn};
use crate::value::PropertyValue;

/// Implemented by every object owning a native-side counterpart.
pub trait BridgedObject {
    /// The owned native reference.
    fn native_ref(&self) -> &NativeRef;

    /// The object's handle identity, if it has been exposed to the
    /// native runtime.
    fn handle(&self) -> Option<Handle>;
}

/// Capability interface implemented by extension authors.
///
/// All hooks default to no-ops, so an implementation only overrides what
/// it needs.
pub trait ExtensionHandler: Send + Sync {
    /// Called once before the extension starts receiving messages.
    fn on_configure(&self, env: &Arc<RuntimeEnv>) {
        let _ = env;
    }

    /// Called when the native runtime starts the extension.
    fn on_start(&self, env: &Arc<RuntimeEnv>) {
        let _ = env;
    }

    /// Called for every inbound message payload.
    fn on_message(&self, env: &Arc<RuntimeEnv>, payload: PropertyValue) {
        let _ = (env, payload);
    }

    /// Called when the native runtime stops the extension.
    fn on_stop(&self, env: &Arc<RuntimeEnv>) {
        let _ = env;
    }
}

/// Framework wrapper binding a user handler to its native counterpart.
pub struct ExtensionWrapper {
    handler: Arc<dyn ExtensionHandler>,
    native: NativeRef,
    handle: OnceLock<Handle>,
}

impl ExtensionWrapper {
    /// Bind a user handler to its native counterpart and expose it
    /// through the bridge's immutable table.
    pub fn attach(
        bridge: &'static Bridge,
        handler: Arc<dyn ExtensionHandler>,
        raw_native: usize,
        release: ReleaseFn,
    ) -> Arc<Self> {
        let wrapper = Arc::new(Self {
            handler,
            native: NativeRef::new(raw_native, release),
            handle: OnceLock::new(),
        });
        let handle = bridge.register_object(wrapper.clone());
        wrapper
            .handle
            .set(handle)
            .expect("extension wrapper attached twice");
        wrapper
    }

    /// Forward the configure hook.
    pub fn configure(&self, env: &Arc<RuntimeEnv>) {
        self.handler.on_configure(env);
    }

    /// Forward the start hook.
    pub fn start(&self, env: &Arc<RuntimeEnv>) {
        self.handler.on_start(env);
    }

    /// Forward one inbound message.
    pub fn deliver(&self, env: &Arc<RuntimeEnv>, payload: PropertyValue) {
        self.handler.on_message(env, payload);
    }

    /// Forward the stop hook.
    pub fn stop(&self, env: &Arc<RuntimeEnv>) {
        self.handler.on_stop(env);
    }
}

impl BridgedObject for ExtensionWrapper {
    fn native_ref(&self) -> &NativeRef {
        &self.native
    }

    fn handle(&self) -> Option<Handle> {
        self.handle.get().copied()
    }
}

/// A foreign call: receives the owner's raw native ref and performs the
/// actual boundary crossing. Supplied by the host, since the native
/// runtime is opaque to this crate.
pub type ForeignCall = Box<dyn FnOnce(usize) -> Result<(), ForeignError> + Send + 'static>;

/// Per-owner environment handle.
///
/// All foreign calls issued through one `RuntimeEnv` run on its assigned
/// executor, so they observe a consistent relative order and never
/// re-enter the native runtime from arbitrary threads. Each call takes a
/// gate permit around the boundary crossing.
pub struct RuntimeEnv {
    bridge: &'static Bridge,
    native: NativeRef,
    /// Index of the executor all of this owner's calls are pinned to.
    executor: usize,
    handle: OnceLock<Handle>,
}

impl RuntimeEnv {
    /// Bind an environment handle to its native counterpart and expose
    /// it through the bridge's immutable table.
    pub fn attach(
        bridge: &'static Bridge,
        raw_native: usize,
        executor: usize,
        release: ReleaseFn,
    ) -> Arc<Self> {
        let env = Arc::new(Self {
            bridge,
            native: NativeRef::new(raw_native, release),
            executor,
            handle: OnceLock::new(),
        });
        let handle = bridge.register_object(env.clone());
        env.handle.set(handle).expect("runtime env attached twice");
        env
    }

    /// The bridge this environment belongs to.
    pub fn bridge(&self) -> &'static Bridge {
        self.bridge
    }

    /// Issue a foreign call on this owner's executor and block until it
    /// has completed.
    ///
    /// The task clones the `Arc` for itself, which keeps the environment
    /// (and its native ref) alive for the whole foreign call even if the
    /// caller drops its own reference mid-flight.
    ///
    /// # Deadlock
    ///
    /// Must not be called from a task already running on this owner's
    /// executor, such as an [`ExtensionHandler`] hook delivered on it:
    /// the submitted call can never start while its caller blocks the
    /// executor thread waiting for it.
    pub fn call_blocking(self: &Arc<Self>, call: ForeignCall) -> Result<(), ForeignError> {
        let (tx, rx) = bounded(1);
        let env = Arc::clone(self);

        self.bridge
            .pool()
            .submit_to(
                self.executor,
                Box::new(move || {
                    let result = {
                        let _permit = env.bridge.gate().acquire();
                        call(env.native.raw())
                    };
                    let _ = tx.send(result);
                }),
            )
            .map_err(ForeignError::from_submit)?;

        rx.recv().map_err(|_| ForeignError::call_lost())?
    }

    /// Issue a foreign call whose result arrives later through the
    /// callback convention.
    ///
    /// `on_result` is registered in the mutable table and its handle is
    /// passed to `call`; the native runtime completes the round trip by
    /// firing the callback entry point with that handle, which removes
    /// and invokes the closure exactly once. If the call itself fails,
    /// the callback is cancelled before the error is returned.
    ///
    /// Blocks until `call` itself has run on the owner's executor (the
    /// result is what arrives later), so the same deadlock caveat as
    /// [`RuntimeEnv::call_blocking`] applies.
    pub fn call_async<F>(
        self: &Arc<Self>,
        call: impl FnOnce(usize, Handle) -> Result<(), ForeignError> + Send + 'static,
        on_result: F,
    ) -> Result<(), ForeignError>
    where
        F: FnOnce(PropertyValue) + Send + 'static,
    {
        let callback_handle = self.bridge.register_callback(Box::new(on_result));
        let (tx, rx) = bounded(1);
        let env = Arc::clone(self);

        let submitted = self.bridge.pool().submit_to(
            self.executor,
            Box::new(move || {
                let result = {
                    let _permit = env.bridge.gate().acquire();
                    call(env.native.raw(), callback_handle)
                };
                if result.is_err() {
                    env.bridge.cancel_callback(callback_handle);
                }
                let _ = tx.send(result);
            }),
        );

        if let Err(err) = submitted {
            self.bridge.cancel_callback(callback_handle);
            return Err(ForeignError::from_submit(err));
        }

        rx.recv().map_err(|_| ForeignError::call_lost())?
    }
}

impl BridgedObject for RuntimeEnv {
    fn native_ref(&self) -> &NativeRef {
        &self.native
    }

    fn handle(&self) -> Option<Handle> {
        self.handle.get().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use once_cell::sync::Lazy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Object tests share one installed-style bridge; leaking it gives the
    // 'static lifetime the env API requires.
    static TEST_BRIDGE: Lazy<&'static Bridge> =
        Lazy::new(|| Box::leak(Box::new(Bridge::new(&BridgeConfig::default()))));

    fn noop_release(_raw: usize) {}

    #[test]
    fn test_extension_wrapper_identity() {
        let bridge = *TEST_BRIDGE;

        struct Quiet;
        impl ExtensionHandler for Quiet {}

        let wrapper = ExtensionWrapper::attach(bridge, Arc::new(Quiet), 0x1000, noop_release);

        let handle = wrapper.handle().expect("wrapper must carry a handle");
        assert_eq!(wrapper.native_ref().raw(), 0x1000);

        let resolved = bridge
            .resolve_object::<ExtensionWrapper>(handle)
            .expect("wrapper must resolve through the immutable table");
        assert!(Arc::ptr_eq(&resolved, &wrapper));

        bridge.release_object(handle).unwrap();
    }

    #[test]
    fn test_wrapper_forwards_message() {
        let bridge = *TEST_BRIDGE;

        struct Counting(AtomicUsize);
        impl ExtensionHandler for Counting {
            fn on_message(&self, _env: &Arc<RuntimeEnv>, payload: PropertyValue) {
                assert_eq!(payload, PropertyValue::Uint32(7));
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let handler = Arc::new(Counting(AtomicUsize::new(0)));
        let wrapper =
            ExtensionWrapper::attach(bridge, handler.clone(), 0x2000, noop_release);
        let env = RuntimeEnv::attach(bridge, 0x3000, 0, noop_release);

        wrapper.deliver(&env, PropertyValue::Uint32(7));
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);

        bridge.release_object(wrapper.handle().unwrap()).unwrap();
        bridge.release_object(env.handle().unwrap()).unwrap();
    }

    #[test]
    fn test_call_blocking_runs_with_native_ref() {
        let bridge = *TEST_BRIDGE;
        let env = RuntimeEnv::attach(bridge, 0x4000, 0, noop_release);

        let result = env.call_blocking(Box::new(|raw| {
            assert_eq!(raw, 0x4000);
            Ok(())
        }));
        assert!(result.is_ok());

        bridge.release_object(env.handle().unwrap()).unwrap();
    }

    #[test]
    fn test_call_async_round_trip() {
        let bridge = *TEST_BRIDGE;
        let env = RuntimeEnv::attach(bridge, 0x5000, 0, noop_release);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let (handle_tx, handle_rx) = bounded(1);

        env.call_async(
            move |raw, callback| {
                assert_eq!(raw, 0x5000);
                // The native side would stash the callback handle and
                // fire it later; the test smuggles it out instead.
                handle_tx.send(callback).unwrap();
                Ok(())
            },
            move |value| {
                assert_eq!(value, PropertyValue::Int64(11));
                fired2.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        let callback = handle_rx.recv().unwrap();
        bridge.dispatch_callback(callback, PropertyValue::Int64(11));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        bridge.release_object(env.handle().unwrap()).unwrap();
    }

    #[test]
    fn test_call_async_failure_cancels_callback() {
        let bridge = *TEST_BRIDGE;
        let env = RuntimeEnv::attach(bridge, 0x6000, 0, noop_release);

        let (handle_tx, handle_rx) = bounded(1);
        let result = env.call_async(
            move |_raw, callback| {
                handle_tx.send(callback).unwrap();
                Err(ForeignError::new(3, "native rejected the call"))
            },
            |_value| panic!("must not fire"),
        );

        assert!(result.is_err());
        // The callback was already cancelled on the failure path.
        let callback = handle_rx.recv().unwrap();
        assert!(!bridge.cancel_callback(callback));

        bridge.release_object(env.handle().unwrap()).unwrap();
    }
}
