//! Entity identifiers with generational indices.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Entity identifier with generational index for stale reference detection.
///
/// The generation counter increments when an entity index is reused after
/// destruction, allowing detection of stale references to destroyed entities.
/// The id fits in 64 bits: a 32-bit index and a 32-bit generation.
///
/// Components, tags, relations and user-declared events are entities too;
/// a handful of well-known entities are reserved below
/// [`EntityId::FIRST_USER_INDEX`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityId {
    /// Index into entity storage.
    pub index: u32,
    /// Generation counter for stale reference detection.
    pub generation: u32,
}

impl EntityId {
    /// Matches every concrete id in a slot.
    pub const WILDCARD: Self = Self::new(0, 1);
    /// Matches one unspecified id.
    pub const ANY: Self = Self::new(1, 1);
    /// Builtin acyclic relation linking an instance to its prototype.
    pub const IS_A: Self = Self::new(2, 1);
    /// Builtin acyclic relation linking a child to its parent. Never inherited.
    pub const CHILD_OF: Self = Self::new(3, 1);
    /// Builtin tag marking prototype entities, excluded from matching by default.
    pub const PREFAB: Self = Self::new(4, 1);
    /// Builtin tag marking disabled entities, excluded from matching by default.
    pub const DISABLED: Self = Self::new(5, 1);

    /// First index handed out to user entities; lower indices are reserved.
    pub const FIRST_USER_INDEX: u32 = 16;

    /// Creates a new entity ID with the given index and generation.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns a sentinel value representing "no entity".
    ///
    /// This uses `u32::MAX` as the index, which is never allocated.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            index: u32::MAX,
            generation: 0,
        }
    }

    /// Returns true if this is the null sentinel value.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == u32::MAX
    }

    /// Returns true if this is one of the reserved builtin entities.
    #[must_use]
    pub const fn is_builtin(self) -> bool {
        self.index < Self::FIRST_USER_INDEX
    }

    /// Returns true if this id is a matching placeholder rather than a
    /// concrete entity.
    #[must_use]
    pub fn is_placeholder(self) -> bool {
        self == Self::WILDCARD || self == Self::ANY
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "EntityId(null)")
        } else if *self == Self::WILDCARD {
            write!(f, "EntityId(*)")
        } else if *self == Self::ANY {
            write!(f, "EntityId(_)")
        } else {
            write!(f, "EntityId({}v{})", self.index, self.generation)
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else {
            write!(f, "Entity({})", self.index)
        }
    }
}
