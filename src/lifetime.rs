//! Native reference lifetime protocol
//!
//! Every bridged object owns exactly one native-side counterpart, stored
//! as an address-sized integer rather than a typed pointer: the bit
//! pattern is always safe to pass across the boundary and costs nothing
//! to copy, while a typed pointer would invite pointer arithmetic on the
//! far side.
//!
//! Release discipline: [`NativeRef`] is an owning wrapper whose destructor
//! releases the native resource, unless ownership was first transferred
//! to the foreign runtime with [`NativeRef::escape`]. Dropping the owner
//! is therefore the last legal access point. No explicit keep-alive
//! marker is needed: [`NativeRef::raw`] borrows the ref for the duration
//! of the foreign-call expression, so the owner cannot be dropped while
//! the call is still executing.
//!
//! With the `strict-lifetime` feature enabled, every [`NativeRef::raw`]
//! access fatals if the ref has already escaped or been released. That
//! catches use-after-send bugs during testing; relaxed builds skip the
//! check and rely on caller discipline.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Release callback invoked with the raw native ref exactly once, either
/// from the destructor or never (after an escape).
pub type ReleaseFn = fn(usize);

/// An owned, address-sized reference to a native-side resource.
pub struct NativeRef {
    /// The raw bit pattern; zero once escaped or released.
    raw: AtomicUsize,
    /// Frees the native resource on drop.
    release: ReleaseFn,
}

impl NativeRef {
    /// Wrap a raw native ref.
    ///
    /// # Panics
    ///
    /// Panics if `raw` is zero: a bridged object must never be
    /// constructed without its native counterpart already established.
    pub fn new(raw: usize, release: ReleaseFn) -> Self {
        assert!(raw != 0, "native ref must be non-zero at construction");
        Self {
            raw: AtomicUsize::new(raw),
            release,
        }
    }

    /// The raw bit pattern, for passing to a foreign call.
    ///
    /// The borrow taken here keeps the owner alive for the duration of
    /// the call expression. In strict mode this panics if the ref has
    /// already escaped or been released (use-after-send).
    pub fn raw(&self) -> usize {
        let raw = self.raw.load(Ordering::Acquire);
        #[cfg(feature = "strict-lifetime")]
        assert!(raw != 0, "use of native ref after escape or release");
        raw
    }

    /// Transfer ownership of the native resource to the foreign runtime.
    ///
    /// Returns the raw ref for the handoff call and clears it, so the
    /// destructor will not release it a second time. Further operations
    /// on the wrapper are undefined (strict mode turns them into panics).
    ///
    /// # Panics
    ///
    /// Panics on a second escape: the two sides of the boundary would
    /// disagree about who owns the resource.
    pub fn escape(&self) -> usize {
        let raw = self.raw.swap(0, Ordering::AcqRel);
        assert!(raw != 0, "native ref escaped twice");
        raw
    }

    /// Whether ownership has been transferred (or already released).
    pub fn is_escaped(&self) -> bool {
        self.raw.load(Ordering::Acquire) == 0
    }
}

impl Drop for NativeRef {
    fn drop(&mut self) {
        // The destructor must not touch any other field of the owning
        // object; only the integer and the release callback are safe
        // here.
        let raw = self.raw.swap(0, Ordering::AcqRel);
        if raw != 0 {
            (self.release)(raw);
        }
    }
}

impl std::fmt::Debug for NativeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRef")
            .field("raw", &self.raw.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static DROP_RELEASED: AtomicUsize = AtomicUsize::new(0);
    static ESCAPE_RELEASED: AtomicUsize = AtomicUsize::new(0);

    fn record_drop_release(raw: usize) {
        DROP_RELEASED.store(raw, Ordering::SeqCst);
    }

    fn record_escape_release(raw: usize) {
        ESCAPE_RELEASED.store(raw, Ordering::SeqCst);
    }

    fn ignore_release(_raw: usize) {}

    #[test]
    #[should_panic(expected = "non-zero")]
    fn test_zero_ref_is_fatal() {
        let _ = NativeRef::new(0, ignore_release);
    }

    #[test]
    fn test_drop_releases_exactly_once() {
        {
            let r = NativeRef::new(0xBEEF, record_drop_release);
            assert_eq!(r.raw(), 0xBEEF);
        }
        assert_eq!(DROP_RELEASED.load(Ordering::SeqCst), 0xBEEF);
    }

    #[test]
    fn test_escape_skips_release() {
        {
            let r = NativeRef::new(0xCAFE, record_escape_release);
            assert_eq!(r.escape(), 0xCAFE);
            assert!(r.is_escaped());
        }
        // Ownership went to the foreign side; no release on drop.
        assert_eq!(ESCAPE_RELEASED.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[should_panic(expected = "escaped twice")]
    fn test_double_escape_is_fatal() {
        let r = NativeRef::new(1, ignore_release);
        r.escape();
        r.escape();
    }

    #[cfg(feature = "strict-lifetime")]
    #[test]
    #[should_panic(expected = "after escape")]
    fn test_strict_mode_rejects_use_after_escape() {
        let r = NativeRef::new(1, ignore_release);
        r.escape();
        let _ = r.raw();
    }
}
