//! Component type registration and the blittable/managed tier split.

use std::fmt;

/// Globally registered component (or event) type identifier.
///
/// Shared between the component and event registries; each registry keeps
/// its own id space, but both use this newtype and fit in a [`crate::bitmask::ComponentMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u16);

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage discipline for a component type — not a data domain, see GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentTier {
    Blittable,
    Managed,
}

/// A component type, identified globally and belonging to exactly one tier.
pub trait Component: Send + Sync + 'static {
    const TYPE_ID: ComponentTypeId;
    const TYPE_NAME: &'static str;
    const TIER: ComponentTier;
}

/// Marker for the blittable tier: fixed-size, trivially-copyable records
/// stored in contiguous chunks and synchronized with a raw `memcpy`.
///
/// # Safety
/// Implementors must have a stable, `repr(C)` (or otherwise POD) layout with
/// no padding that would expose uninitialized bytes, and must be safe to
/// duplicate byte-for-byte (no destructors, no interior pointers).
pub unsafe trait Blittable: Component + Copy {}

/// Marker for the managed tier: deeply-immutable records held behind shared
/// references, synchronized with a shallow array copy of the references
/// themselves.
///
/// Mutation must only be possible by constructing a new record and replacing
/// the slot — there must be no post-construction setter, no public mutable
/// field, and no non-persistent collection field. Implementations in a
/// language without enforceable value semantics are expected to pair this
/// trait with a three-layer gate: a registration-time
/// check (`assert_immutable`), serializer-generation review, and optional
/// static analysis. Rust's type system enforces most of this already (no
/// `&mut self` setters reachable through `&T`); `assert_immutable` exists for
/// types whose immutability can't be expressed purely through the type
/// system (e.g. a field that is itself an interior-mutability wrapper).
pub trait Managed: Component + Clone {
    /// Registration-time immutability check. The default accepts; override
    /// to reject (see [`crate::error::KernelError::ImmutabilityViolation`]).
    fn assert_immutable() -> crate::error::Result<()> {
        Ok(())
    }
}
