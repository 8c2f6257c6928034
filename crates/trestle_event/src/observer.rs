//! Observers: filters, callbacks, and their registration in the observable.
//!
//! An observer subscribes to one or more events with an ordered term list;
//! the first term binds the (event, id) registration. The term's traversal
//! scope decides which bucket of the event-id record the observer is filed
//! into: `self` (direct-only), `up` (traversal-only), or `self_up` (either).

use std::any::Any;
use std::cell::Cell;
use std::fmt;

use trestle_foundation::{flip_event, Error, ErrorKind, Event, Id, Result, TermOper};

use crate::iter::EventIter;
use crate::registry::{Observable, ObserverId};

/// Observer callback invoked with the transient event iterator.
pub type IterFn = Box<dyn Fn(&EventIter<'_>)>;

/// Custom run-loop that receives the iterator and drives its own `next`.
pub type RunFn = Box<dyn Fn(&mut EventIter<'_>)>;

/// Source an observer term matches against.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TermSrc {
    /// Match the entities of the emitting table.
    #[default]
    This,
    /// Match one fixed entity only.
    Entity(trestle_foundation::EntityId),
}

/// Traversal scope of an observer term: where a match may come from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Traverse {
    /// Direct matches only.
    #[default]
    SelfOnly,
    /// Matches reached through relationship traversal only.
    Up,
    /// Either.
    SelfUp,
}

/// One term of an observer filter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Term {
    /// The id this term matches.
    pub id: Id,
    /// The source the term matches against.
    pub src: TermSrc,
    /// Term operator; `Not` reverses add/remove polarity.
    pub oper: TermOper,
    /// Traversal scope, selecting the observer bucket.
    pub traverse: Traverse,
}

impl Term {
    /// Creates a direct-match term for an id.
    #[must_use]
    pub fn new(id: Id) -> Self {
        Self {
            id,
            src: TermSrc::This,
            oper: TermOper::And,
            traverse: Traverse::SelfOnly,
        }
    }

    /// Sets the term operator.
    #[must_use]
    pub fn with_oper(mut self, oper: TermOper) -> Self {
        self.oper = oper;
        self
    }

    /// Sets the term source.
    #[must_use]
    pub fn with_src(mut self, src: TermSrc) -> Self {
        self.src = src;
        self
    }

    /// Sets the traversal scope.
    #[must_use]
    pub fn with_traverse(mut self, traverse: Traverse) -> Self {
        self.traverse = traverse;
        self
    }
}

/// Descriptor for registering an observer.
///
/// An observer needs at least one event, at least one term, and exactly one
/// of `callback` or `run`.
#[derive(Default)]
pub struct ObserverDesc {
    pub(crate) events: Vec<Event>,
    pub(crate) terms: Vec<Term>,
    pub(crate) callback: Option<IterFn>,
    pub(crate) run: Option<RunFn>,
    pub(crate) ctx: Option<Box<dyn Any>>,
    pub(crate) match_prefab: bool,
    pub(crate) match_disabled: bool,
    pub(crate) instanced: bool,
}

impl ObserverDesc {
    /// Creates an empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an event to react to.
    #[must_use]
    pub fn event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Adds a filter term. The first term binds the registration.
    #[must_use]
    pub fn term(mut self, term: Term) -> Self {
        self.terms.push(term);
        self
    }

    /// Sets the callback.
    #[must_use]
    pub fn callback(mut self, callback: impl Fn(&EventIter<'_>) + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Sets a custom run-loop instead of a callback.
    #[must_use]
    pub fn run(mut self, run: impl Fn(&mut EventIter<'_>) + 'static) -> Self {
        self.run = Some(Box::new(run));
        self
    }

    /// Attaches an owned opaque context, dropped with the observer.
    #[must_use]
    pub fn ctx<T: 'static>(mut self, ctx: T) -> Self {
        self.ctx = Some(Box::new(ctx));
        self
    }

    /// Opts into matching prefab tables.
    #[must_use]
    pub fn match_prefab(mut self) -> Self {
        self.match_prefab = true;
        self
    }

    /// Opts into matching disabled tables.
    #[must_use]
    pub fn match_disabled(mut self) -> Self {
        self.match_disabled = true;
        self
    }

    /// Requests one batched invocation even for shared-source rows.
    #[must_use]
    pub fn instanced(mut self) -> Self {
        self.instanced = true;
        self
    }
}

/// A registered observer.
pub struct Observer {
    pub(crate) id: ObserverId,
    pub(crate) events: Vec<Event>,
    pub(crate) terms: Vec<Term>,
    pub(crate) callback: Option<IterFn>,
    pub(crate) run: Option<RunFn>,
    pub(crate) ctx: Option<Box<dyn Any>>,
    pub(crate) match_prefab: bool,
    pub(crate) match_disabled: bool,
    pub(crate) instanced: bool,
    /// Id of the last logical emit this observer ran in.
    pub(crate) last_event_id: Cell<u64>,
}

impl Observer {
    /// The observer's id.
    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// The events the observer reacts to, as registered.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The observer's ordered term list.
    #[must_use]
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Borrows the opaque context, if one was attached.
    #[must_use]
    pub fn ctx<T: 'static>(&self) -> Option<&T> {
        self.ctx.as_ref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id)
            .field("events", &self.events)
            .field("terms", &self.terms)
            .finish_non_exhaustive()
    }
}

/// The event an observer term is actually registered (and unregistered)
/// under: `Not` flips polarity, and tag terms trade value events for the
/// structural ones, since a tag's "value" is its presence.
fn registration_event(term: &Term, event: Event, is_tag: bool) -> Event {
    let event = flip_event(term.oper, event);
    if is_tag {
        match event {
            Event::OnSet => Event::OnAdd,
            Event::UnSet => Event::OnRemove,
            other => other,
        }
    } else {
        event
    }
}

impl Observable {
    /// Registers an observer, filing it into the bucket selected by its
    /// first term's traversal scope.
    ///
    /// `is_tag` reports whether an id is known to carry no storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor has no events, no terms, or does
    /// not carry exactly one of callback and run.
    pub fn observe(
        &mut self,
        desc: ObserverDesc,
        is_tag: impl Fn(Id) -> bool,
    ) -> Result<ObserverId> {
        if desc.terms.is_empty() {
            return Err(Error::invalid_observer("at least one term is required"));
        }
        if desc.events.is_empty() {
            return Err(Error::invalid_observer("at least one event is required"));
        }
        match (&desc.callback, &desc.run) {
            (None, None) => {
                return Err(Error::invalid_observer("a callback or a run-loop is required"))
            }
            (Some(_), Some(_)) => {
                return Err(Error::invalid_observer(
                    "callback and run-loop are mutually exclusive",
                ))
            }
            _ => {}
        }

        let id = self.next_observer_id();
        let term = desc.terms[0];
        let register_id = term.id.registration_form();
        let tag = is_tag(register_id);

        for &event in &desc.events {
            let actual = registration_event(&term, event, tag);
            self.record_ensure(actual)
                .id_ensure(register_id)
                .bucket_mut(term.traverse)
                .insert(id);
        }

        self.observers.insert(
            id,
            Observer {
                id,
                events: desc.events,
                terms: desc.terms,
                callback: desc.callback,
                run: desc.run,
                ctx: desc.ctx,
                match_prefab: desc.match_prefab,
                match_disabled: desc.match_disabled,
                instanced: desc.instanced,
                last_event_id: Cell::new(0),
            },
        );

        Ok(id)
    }

    /// Unregisters an observer, erasing event-id records and sparse event
    /// entries that end up empty. Drops the observer's context.
    ///
    /// # Errors
    ///
    /// Returns an error if the id does not name a registered observer.
    pub fn unobserve(&mut self, id: ObserverId, is_tag: impl Fn(Id) -> bool) -> Result<()> {
        let Some(observer) = self.observers.remove(&id) else {
            return Err(Error::new(ErrorKind::ObserverNotFound(id)));
        };

        let term = observer.terms[0];
        let register_id = term.id.registration_form();
        let tag = is_tag(register_id);

        for &event in &observer.events {
            let actual = registration_event(&term, event, tag);
            if let Some(record) = self.record_mut(actual) {
                record.remove_observer(register_id, term.traverse, id);
            }
            self.remove_custom_if_empty(actual);
        }

        Ok(())
    }
}
