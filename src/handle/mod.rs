//! Opaque handle identities for objects crossing the FFI boundary
//!
//! Native code can never hold a managed pointer, so every object exposed to
//! the foreign runtime is represented by an integer handle resolved through
//! one of two registries: the [`mutable::MutableRegistry`] for short-lived
//! entries (pending callbacks, per-call objects) and the
//! [`immutable::ImmutableRegistry`] for long-lived entries (extensions,
//! apps, environment handles). The two handle spaces are independently
//! numbered.

pub mod immutable;
pub mod mutable;

pub use immutable::ImmutableRegistry;
pub use mutable::MutableRegistry;

/// Number of bits reserved for the slot index in a handle.
const SLOT_BITS: u32 = 40;

/// Mask selecting the slot index.
const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;

/// Mask selecting the generation after shifting.
const GEN_MASK: u64 = (1 << (64 - SLOT_BITS)) - 1;

/// Opaque integer identity standing in for a managed object reference
/// across the FFI boundary.
///
/// A handle packs a slot index (low 40 bits) and a generation counter
/// (high 24 bits). Mutable handles recycle slot indices through a free
/// list; each reuse bumps the generation, so a stale handle held by a
/// delayed native callback can never resolve to the slot's new occupant.
/// Immutable handles never recycle and always carry generation zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// Pack a slot index and generation into a handle.
    pub(crate) fn pack(slot: u64, generation: u64) -> Self {
        debug_assert!(slot <= SLOT_MASK, "slot index overflow");
        Handle((generation & GEN_MASK) << SLOT_BITS | (slot & SLOT_MASK))
    }

    /// Reconstruct a handle from the raw integer that crossed the boundary.
    pub fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    /// The raw integer passed across the FFI boundary.
    ///
    /// The receiving side must treat this as an opaque lookup key, never
    /// as a pointer.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// The slot index portion of the handle.
    pub(crate) fn slot(&self) -> u64 {
        self.0 & SLOT_MASK
    }

    /// The generation portion of the handle.
    pub(crate) fn generation(&self) -> u64 {
        (self.0 >> SLOT_BITS) & GEN_MASK
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
