//! Rtbridge - Cross-Language Runtime Bridge
//!
//! The language-side half of an FFI bridge for embedding a native (C)
//! agent/media runtime: lets host code author extensions and apps that
//! are driven by, and drive, a native event loop without either side
//! violating the other's memory-safety rules.
//!
//! # Components
//!
//! - **Handle registries**: opaque integer identities standing in for
//!   managed references across the boundary - a sharded mutable table
//!   for short-lived callback handles and an append-mostly immutable
//!   table for extensions and environment handles
//! - **Bounded-call gate**: a counting semaphore that keeps blocking
//!   foreign calls from exhausting OS threads
//! - **Executor pool**: single-consumer FIFO queues with panic isolation
//!   and graceful/immediate shutdown, serializing per-owner calls
//! - **Native-ref lifetime protocol**: destructor-driven release paired
//!   with explicit escape invalidation and optional strict-mode
//!   use-after-send detection
//! - **Byte-buffer pool**: size-bucketed free lists for FFI-crossing
//!   buffers
//! - **Property values**: the exhaustive sum of shapes that may cross
//!   the boundary, with total tag/payload conversion
//!
//! # Example
//!
//! ```rust
//! use rtbridge::handle::MutableRegistry;
//! use rtbridge::gate::CallGate;
//!
//! let registry = MutableRegistry::new();
//! let handle = registry.register("pending-callback");
//! assert_eq!(registry.resolve(handle), Some("pending-callback"));
//!
//! // Atomic lookup-and-remove: of N racing releasers, exactly one wins.
//! assert_eq!(registry.release(handle), Some("pending-callback"));
//! assert_eq!(registry.resolve(handle), None);
//!
//! let gate = CallGate::new(2);
//! {
//!     let _permit = gate.acquire();
//!     // ... foreign call runs here, bounded to 2 in flight ...
//! }
//! assert_eq!(gate.available(), 2);
//! ```
//!
//! # Error philosophy
//!
//! Lifetime protocol violations (a callback firing twice, an immutable
//! handle registered twice, use of an escaped native ref) panic: the two
//! sides of the boundary disagree about object lifetime and continuing
//! risks use of freed native resources. Everything else - foreign-call
//! failures, submission races with shutdown, unsupported value shapes -
//! is an ordinary `Result` propagated to the caller.

#![warn(clippy::all)]

pub mod bridge;
pub mod config;
pub mod executor;
pub mod ffi;
pub mod gate;
pub mod handle;
pub mod lifetime;
pub mod object;
pub mod pool;
pub mod value;

// Re-export commonly used types
pub use bridge::{Bridge, BridgedAny, Callback};
pub use config::{BridgeConfig, ConfigError, ConfigResult};
pub use executor::{
    Executor, ExecutorPool, ExecutorPoolBuilder, ExecutorState, PanicHandler, StartHook,
    SubmitError, Task,
};
pub use ffi::{ForeignError, FreeFn, RawStatus};
pub use gate::{CallGate, CallPermit};
pub use handle::{Handle, ImmutableRegistry, MutableRegistry};
pub use lifetime::{NativeRef, ReleaseFn};
pub use object::{BridgedObject, ExtensionHandler, ExtensionWrapper, ForeignCall, RuntimeEnv};
pub use pool::{BytePool, BUCKET_SIZES};
pub use value::{PropertyValue, ValueError, ValueTag};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
