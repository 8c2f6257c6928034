//! The transient iterator handed to observer callbacks.
//!
//! One [`EventIter`] exists per emit call. It addresses data by (table,
//! column, row range) instead of borrowing storage, so building it never
//! allocates and never holds a column borrow; values are borrowed on demand
//! inside the callback.

use std::cell::Ref;

use trestle_foundation::{EntityId, Event, Id, Value};
use trestle_storage::TableId;

use crate::emit::EmitFlags;
use crate::registry::ObserverId;
use crate::world::World;

/// Location of the value rows an invocation exposes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DataRef {
    /// Table holding the values.
    pub table: TableId,
    /// Column position within that table's type.
    pub column: usize,
    /// First row.
    pub row: usize,
    /// Number of rows.
    pub len: usize,
}

/// Iterator state bound to an observer invocation.
pub struct EventIter<'w> {
    pub(crate) world: &'w World,
    pub(crate) event: Event,
    pub(crate) id: Id,
    pub(crate) table: TableId,
    pub(crate) other_table: Option<TableId>,
    pub(crate) offset: usize,
    pub(crate) count: usize,
    pub(crate) source: Option<EntityId>,
    pub(crate) data: Option<DataRef>,
    pub(crate) param: Option<&'w Value>,
    pub(crate) observer: Option<ObserverId>,
    pub(crate) flags: EmitFlags,
    pub(crate) interrupted: bool,
}

impl<'w> EventIter<'w> {
    pub(crate) fn new(
        world: &'w World,
        event: Event,
        table: TableId,
        other_table: Option<TableId>,
        offset: usize,
        count: usize,
        param: Option<&'w Value>,
        flags: EmitFlags,
    ) -> Self {
        Self {
            world,
            event,
            id: Id::WILDCARD,
            table,
            other_table,
            offset,
            count,
            source: None,
            data: None,
            param,
            observer: None,
            flags,
            interrupted: false,
        }
    }

    /// The world the event happened in.
    #[must_use]
    pub fn world(&self) -> &'w World {
        self.world
    }

    /// The event, from the invoked observer's point of view (`Not` terms
    /// see flipped polarity; forwarded value changes see `OnSet`/`UnSet`).
    #[must_use]
    pub fn event(&self) -> Event {
        self.event
    }

    /// The id that triggered this invocation.
    #[must_use]
    pub fn id(&self) -> Id {
        self.id
    }

    /// The table the notification is about.
    #[must_use]
    pub fn table(&self) -> TableId {
        self.table
    }

    /// The table the entities came from or moved to, when known.
    #[must_use]
    pub fn other_table(&self) -> Option<TableId> {
        self.other_table
    }

    /// First affected row.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of affected rows.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// The entity providing the matched id, when it is not the entities
    /// themselves (propagated and forwarded notifications).
    #[must_use]
    pub fn source(&self) -> Option<EntityId> {
        self.source
    }

    /// The affected entities.
    #[must_use]
    pub fn entities(&self) -> &'w [EntityId] {
        let table = self.world.tables().get(self.table);
        &table.entities()[self.offset..self.offset + self.count]
    }

    /// The value rows of the triggering id, if it carries storage.
    ///
    /// For propagated or forwarded notifications this is the source
    /// entity's single row.
    #[must_use]
    pub fn values(&self) -> Option<Ref<'w, [Value]>> {
        let data = self.data?;
        let table = self.world.tables().get(data.table);
        let column = table.column(data.column)?;
        Some(Ref::map(column.borrow(), |values| {
            &values[data.row..data.row + data.len]
        }))
    }

    /// The first value row, if the triggering id carries storage.
    #[must_use]
    pub fn value(&self) -> Option<Ref<'w, Value>> {
        let data = self.data?;
        let table = self.world.tables().get(data.table);
        let column = table.column(data.column)?;
        Some(Ref::map(column.borrow(), |values| &values[data.row]))
    }

    /// The opaque parameter the emitter passed along, if any.
    #[must_use]
    pub fn param(&self) -> Option<&'w Value> {
        self.param
    }

    /// The invoked observer.
    #[must_use]
    pub fn observer(&self) -> Option<ObserverId> {
        self.observer
    }

    /// Borrows the invoked observer's opaque context.
    #[must_use]
    pub fn ctx<T: 'static>(&self) -> Option<&'w T> {
        let observer = self.world.observable().observer(self.observer?)?;
        observer.ctx::<T>()
    }

    /// Drives a custom run-loop: yields the single result once.
    pub fn next(&mut self) -> bool {
        if self.interrupted {
            false
        } else {
            self.interrupted = true;
            true
        }
    }
}
