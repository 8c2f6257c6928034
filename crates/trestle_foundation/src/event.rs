//! Event kinds, term operators, and the polarity flip.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// The kind of change an emit call announces.
///
/// The five builtin kinds have eager fast-path slots in the observable;
/// `Custom` events go through its sparse side.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Event {
    /// A component or tag was added to an entity.
    OnAdd,
    /// A component or tag was removed from an entity.
    OnRemove,
    /// A component value was written or overridden.
    OnSet,
    /// A component value stopped being available.
    UnSet,
    /// Matches every event kind; valid for observers, not for emitting.
    Wildcard,
    /// A user-declared event entity.
    Custom(EntityId),
}

/// Operator of an observer term.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TermOper {
    /// The term must be present.
    #[default]
    And,
    /// The term must be absent. Reverses add/remove polarity: a query-level
    /// "remove" corresponds to a storage-level "add" and vice versa.
    Not,
}

/// Flips add/remove polarity for `Not` terms.
///
/// An observer watching `Not C` on `OnAdd` fires when `C` leaves storage, so
/// its registration and its view of the event are both routed through this
/// flip. Other events and the `And` operator pass through unchanged.
#[must_use]
pub const fn flip_event(oper: TermOper, event: Event) -> Event {
    match (oper, event) {
        (TermOper::Not, Event::OnAdd) => Event::OnRemove,
        (TermOper::Not, Event::OnRemove) => Event::OnAdd,
        _ => event,
    }
}

/// The synthetic value event a structural event retargets to while
/// forwarding inherited components: `OnAdd` announces a new value (`OnSet`),
/// `OnRemove` announces a disappearing one (`UnSet`).
#[must_use]
pub const fn sync_event(event: Event) -> Option<Event> {
    match event {
        Event::OnAdd => Some(Event::OnSet),
        Event::OnRemove => Some(Event::UnSet),
        _ => None,
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnAdd => write!(f, "OnAdd"),
            Self::OnRemove => write!(f, "OnRemove"),
            Self::OnSet => write!(f, "OnSet"),
            Self::UnSet => write!(f, "UnSet"),
            Self::Wildcard => write!(f, "Wildcard"),
            Self::Custom(e) => write!(f, "Custom({e})"),
        }
    }
}
