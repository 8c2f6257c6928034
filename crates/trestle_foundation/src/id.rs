//! Component ids: plain ids and (relation, target) pairs, with wildcards.
//!
//! An [`Id`] names a column in a table type: either a plain component/tag
//! entity, or an encoded pair of a relation and its target. Three wildcard
//! forms exist for matching: [`Id::ANY`] (one unspecified match),
//! [`Id::WILDCARD`] (every concrete plain id), and [`Id::WILDCARD_PAIR`]
//! (every concrete pair). Wildcards may also occupy a single pair slot.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// A component id: a plain entity id or a (relation, target) pair.
///
/// The derived ordering sorts plain ids before pairs and groups pairs by
/// relation, which keeps same-relation pairs adjacent in a sorted table type.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Id {
    /// A plain component or tag id.
    Component(EntityId),
    /// An encoded (relation, target) pair.
    Pair {
        /// The relation entity.
        relation: EntityId,
        /// The target entity.
        target: EntityId,
    },
}

impl Id {
    /// Matches one unspecified id.
    pub const ANY: Self = Self::Component(EntityId::ANY);
    /// Matches every concrete plain id.
    pub const WILDCARD: Self = Self::Component(EntityId::WILDCARD);
    /// Matches every concrete pair.
    pub const WILDCARD_PAIR: Self = Self::Pair {
        relation: EntityId::WILDCARD,
        target: EntityId::WILDCARD,
    };

    /// Creates a plain component id.
    #[must_use]
    pub const fn component(entity: EntityId) -> Self {
        Self::Component(entity)
    }

    /// Creates a (relation, target) pair id.
    #[must_use]
    pub const fn pair(relation: EntityId, target: EntityId) -> Self {
        Self::Pair { relation, target }
    }

    /// Returns true if this id is a pair.
    #[must_use]
    pub const fn is_pair(self) -> bool {
        matches!(self, Self::Pair { .. })
    }

    /// Returns the relation slot of a pair, or `None` for plain ids.
    #[must_use]
    pub const fn relation(self) -> Option<EntityId> {
        match self {
            Self::Pair { relation, .. } => Some(relation),
            Self::Component(_) => None,
        }
    }

    /// Returns the target slot of a pair, or `None` for plain ids.
    #[must_use]
    pub const fn target(self) -> Option<EntityId> {
        match self {
            Self::Pair { target, .. } => Some(target),
            Self::Component(_) => None,
        }
    }

    /// Returns true if any slot of this id is a matching placeholder.
    #[must_use]
    pub fn is_wildcard(self) -> bool {
        match self {
            Self::Component(e) => e.is_placeholder(),
            Self::Pair { relation, target } => {
                relation.is_placeholder() || target.is_placeholder()
            }
        }
    }

    /// Returns true if this id names exactly one column (no placeholders).
    #[must_use]
    pub fn is_concrete(self) -> bool {
        !self.is_wildcard()
    }

    /// Returns this id with `Any` placeholders in pair slots widened to
    /// `Wildcard`, the form under which observers are registered.
    #[must_use]
    pub fn registration_form(self) -> Self {
        match self {
            Self::Component(_) => self,
            Self::Pair { relation, target } => {
                let relation = if relation == EntityId::ANY {
                    EntityId::WILDCARD
                } else {
                    relation
                };
                let target = if target == EntityId::ANY {
                    EntityId::WILDCARD
                } else {
                    target
                };
                Self::Pair { relation, target }
            }
        }
    }

    /// Checks whether this (possibly wildcard) id matches a concrete id.
    ///
    /// `Any` matches everything; `Wildcard` matches every concrete plain id;
    /// a pair slot holding a placeholder matches any entity in that slot.
    #[must_use]
    pub fn matches(self, concrete: Id) -> bool {
        debug_assert!(concrete.is_concrete());
        if self == Self::ANY {
            return true;
        }
        match (self, concrete) {
            (Self::Component(pattern), Self::Component(id)) => {
                pattern == EntityId::WILDCARD || pattern == id
            }
            (
                Self::Pair { relation, target },
                Self::Pair {
                    relation: cr,
                    target: ct,
                },
            ) => {
                (relation.is_placeholder() || relation == cr)
                    && (target.is_placeholder() || target == ct)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Component(e) => write!(f, "Id({e:?})"),
            Self::Pair { relation, target } => write!(f, "Id({relation:?}, {target:?})"),
        }
    }
}
