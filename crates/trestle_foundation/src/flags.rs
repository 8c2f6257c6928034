//! Flags describing ids, relations, and tables.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Behavior flags of a component id or relation.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IdFlags {
    /// The relation may be walked transitively when propagating
    /// notifications (IsA, ChildOf). Non-acyclic relations never propagate.
    pub acyclic: bool,
    /// The id is never copied or forwarded across an inheritance edge.
    pub dont_inherit: bool,
}

impl IdFlags {
    /// Flags for a relation that participates in propagation.
    #[must_use]
    pub const fn acyclic() -> Self {
        Self {
            acyclic: true,
            dont_inherit: false,
        }
    }

    /// Flags for an id that is excluded from inheritance.
    #[must_use]
    pub const fn dont_inherit() -> Self {
        Self {
            acyclic: false,
            dont_inherit: true,
        }
    }
}

/// Flags of a table, derived from its component set.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableFlags {
    /// The table holds prototype entities (the Prefab tag is present).
    pub is_prefab: bool,
    /// The table holds disabled entities (the Disabled tag is present).
    pub is_disabled: bool,
    /// The table's type contains at least one IsA pair.
    pub has_is_a: bool,
}
