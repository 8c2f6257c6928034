//! The emitter: direct observer invocation, propagation across acyclic
//! relationships, and override resolution while forwarding inherited ids.
//!
//! One emit call runs up to three passes over the changed ids: the primary
//! event, an `UnSet` pass when a removal touched typed ids, and a pass for
//! observers of the `Wildcard` event. The one-shot capabilities
//! (`can_override`, `can_unset`, `can_forward`) are cleared after the first
//! pass so instantiation and override resolution run at most once per
//! logical emit.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use trestle_foundation::{flip_event, sync_event, EntityId, Event, Id, Value};
use trestle_storage::{IdRecord, Table, TableId};

use crate::iter::{DataRef, EventIter};
use crate::observer::{IterFn, Observer, TermSrc};
use crate::registry::{EventRecord, MatchSet, ObserverId};
use crate::world::World;

/// Behavior flags of an emit call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EmitFlags {
    /// The change concerns the table itself; no entity rows are touched.
    pub table_only: bool,
    /// Suppress synthetic `OnSet`/`UnSet` notifications for this emit.
    pub no_on_set: bool,
}

/// Change descriptor handed to [`World::emit`].
#[derive(Clone, Debug)]
pub struct EventDesc<'a> {
    /// The event to emit. Must not be `Wildcard`.
    pub event: Event,
    /// The table whose rows changed.
    pub table: TableId,
    /// First changed row.
    pub offset: usize,
    /// Number of changed rows; 0 means the rest of the table unless
    /// `table_only` is set.
    pub count: usize,
    /// The changed ids, in the order observers should see them. Every id
    /// must be part of the table's type.
    pub ids: &'a [Id],
    /// The table the rows came from or move to, when known.
    pub other_table: Option<TableId>,
    /// Opaque parameter forwarded to observers.
    pub param: Option<&'a Value>,
    /// Behavior flags.
    pub flags: EmitFlags,
}

impl<'a> EventDesc<'a> {
    /// Creates a descriptor covering the whole table.
    #[must_use]
    pub fn new(event: Event, table: TableId, ids: &'a [Id]) -> Self {
        Self {
            event,
            table,
            offset: 0,
            count: 0,
            ids,
            other_table: None,
            param: None,
            flags: EmitFlags::default(),
        }
    }

    /// Restricts the descriptor to a row range.
    #[must_use]
    pub fn rows(mut self, offset: usize, count: usize) -> Self {
        self.offset = offset;
        self.count = count;
        self
    }

    /// Records the table the rows came from or move to.
    #[must_use]
    pub fn other_table(mut self, table: TableId) -> Self {
        self.other_table = Some(table);
        self
    }

    /// Attaches an opaque parameter.
    #[must_use]
    pub fn param(mut self, param: &'a Value) -> Self {
        self.param = Some(param);
        self
    }

    /// Marks the emit as table-only.
    #[must_use]
    pub fn table_only(mut self) -> Self {
        self.flags.table_only = true;
        self
    }

    /// Suppresses synthetic set notifications.
    #[must_use]
    pub fn no_on_set(mut self) -> Self {
        self.flags.no_on_set = true;
        self
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Pass {
    Primary,
    UnSet,
    Wildcard,
}

/// Where an inherited value for an overridable component comes from.
struct OverrideSource {
    base: EntityId,
    data: DataRef,
}

pub(crate) fn emit_passes(world: &World, desc: &EventDesc<'_>, count: usize) {
    let event = desc.event;
    trace!(%event, table = desc.table, count, "emit");

    let observable = world.observable();
    observable.bump_event_id();

    let er = observable.record_if(event);
    let wcer = observable.record_if(Event::Wildcard);
    let er_onset = observable.record_if(Event::OnSet);
    let er_unset = observable.record_if(Event::UnSet);

    let mut it = EventIter::new(
        world,
        event,
        desc.table,
        desc.other_table,
        desc.offset,
        count,
        desc.param,
        desc.flags,
    );

    let table = world.tables().get(desc.table);
    let mut can_override = count > 0
        && table.flags().has_is_a
        && matches!(event, Event::OnAdd | Event::OnRemove);
    let mut can_unset = count > 0 && event == Event::OnRemove && !desc.flags.no_on_set;
    let mut can_forward = event != Event::OnSet;

    let mut unset_count = 0usize;
    let mut pass = Pass::Primary;
    let mut cur_er = er;

    loop {
        for &id in desc.ids {
            let mut idr: Option<&IdRecord> = None;
            let mut override_src: Option<OverrideSource> = None;

            if (can_forward && id.is_pair()) || can_override {
                let record = world
                    .id_index()
                    .get(id)
                    .expect("no id record for emitted id");
                idr = Some(record);

                if id.is_pair() && record.flags().acyclic {
                    let er_fwd = if id.relation() == Some(EntityId::IS_A)
                        && !desc.flags.no_on_set
                    {
                        match event {
                            Event::OnAdd => er_onset,
                            Event::OnRemove => er_unset,
                            _ => None,
                        }
                    } else {
                        None
                    };
                    forward(world, er, er_fwd, desc.ids, &mut it, desc.table, event, id);
                }

                if can_override && !record.flags().dont_inherit && record.has_storage() {
                    override_src = find_override_source(world, desc.table, id);
                }
            }

            let iders = cur_er.map_or_else(MatchSet::empty, |record| record.matching(id));

            if can_unset {
                let has_storage = match idr {
                    Some(record) => record.has_storage(),
                    None => world.id_index().has_storage(id),
                };
                unset_count += usize::from(has_storage);
            }

            if iders.is_empty() && override_src.is_none() {
                continue;
            }

            let tr = world
                .id_index()
                .table_record(id, desc.table)
                .expect("emitted id not in the table's cache");

            it.id = id;
            it.source = None;
            it.data = None;

            if count > 0 {
                if table.column(tr.column).is_some() {
                    let data = DataRef {
                        table: desc.table,
                        column: tr.column,
                        row: desc.offset,
                        len: count,
                    };
                    it.data = Some(data);

                    if let Some(src) = &override_src {
                        if event == Event::OnAdd {
                            // Initialize rows the caller did not write from
                            // the inherited value.
                            override_copy(world, src.data, desc.table, tr.column, desc.offset, count, id);
                        } else if !desc.flags.no_on_set {
                            if let Some(set_er) = er_onset {
                                reexpose_inherited(world, set_er, src, id, &mut it);
                                it.data = Some(data);
                            }
                        }
                    }
                } else if it.event == Event::UnSet {
                    // Only components reach UnSet observers; a tag has no
                    // value to lose.
                    continue;
                }
            }

            for ider in iders.iter() {
                invoke_bucket(world, &ider.self_observers, &mut it);
                invoke_bucket(world, &ider.self_up_observers, &mut it);
            }

            if iders.is_empty() || count == 0 || table.observed_count() == 0 {
                continue;
            }

            let base_record = match idr {
                Some(record) => record,
                None => world
                    .id_index()
                    .get(id)
                    .expect("no id record for emitted id"),
            };
            let (saved_table, saved_offset, saved_count) = (it.table, it.offset, it.count);
            for row in 0..count {
                let entity = table.entities()[desc.offset + row];
                if world
                    .entities()
                    .get(entity)
                    .is_some_and(|record| record.observed)
                {
                    it.source = Some(entity);
                    propagate(world, &mut it, base_record, entity, &iders);
                }
            }
            it.table = saved_table;
            it.offset = saved_offset;
            it.count = saved_count;
            it.other_table = desc.other_table;
            it.source = None;
        }

        can_override = false;
        can_unset = false;
        can_forward = false;

        match pass {
            Pass::Primary => {
                if unset_count > 0 && event != Event::UnSet {
                    if let Some(record) = er_unset {
                        pass = Pass::UnSet;
                        cur_er = Some(record);
                        it.event = Event::UnSet;
                        continue;
                    }
                }
                if let Some(record) = wcer {
                    pass = Pass::Wildcard;
                    cur_er = Some(record);
                    it.event = event;
                    continue;
                }
                break;
            }
            Pass::UnSet => {
                if let Some(record) = wcer {
                    pass = Pass::Wildcard;
                    cur_er = Some(record);
                    it.event = event;
                    continue;
                }
                break;
            }
            Pass::Wildcard => break,
        }
    }
}

fn find_override_source(world: &World, table: TableId, id: Id) -> Option<OverrideSource> {
    let found = world.id_index().search_relation(
        world.tables(),
        world.entities(),
        table,
        id,
        EntityId::IS_A,
    )?;
    Some(OverrideSource {
        base: found.entity,
        data: DataRef {
            table: found.table,
            column: found.column,
            row: found.row,
            len: 1,
        },
    })
}

/// Broadcast-copies one inherited value into every row of the range that
/// holds no caller-written value yet; rows the caller already wrote keep
/// their local value. Uses the component's registered copy hook when one
/// exists.
fn override_copy(
    world: &World,
    src: DataRef,
    dst_table: TableId,
    dst_column: usize,
    offset: usize,
    count: usize,
    id: Id,
) {
    let source = {
        let table = world.tables().get(src.table);
        let column = table
            .column(src.column)
            .expect("override source lost its column");
        let value = column.borrow()[src.row].clone();
        value
    };
    let storage = world
        .id_index()
        .get(id)
        .and_then(|record| record.storage().copied());

    let table = world.tables().get(dst_table);
    let column = table
        .column(dst_column)
        .expect("override target lost its column");
    let mut rows = column.borrow_mut();
    for value in &mut rows[offset..offset + count] {
        if value.is_nil() {
            *value = match &storage {
                Some(info) => info.duplicate(&source),
                None => source.clone(),
            };
        }
    }
}

/// Removing a local override while a prototype still provides the component
/// re-exposes the inherited value: set observers hear about it with the
/// prototype as source.
fn reexpose_inherited(
    world: &World,
    set_er: &EventRecord,
    src: &OverrideSource,
    id: Id,
    it: &mut EventIter<'_>,
) {
    let iders = set_er.matching(id);
    if iders.is_empty() {
        return;
    }
    let prev_event = it.event;
    it.event = Event::OnSet;
    it.source = Some(src.base);
    it.data = Some(src.data);
    for ider in iders.iter() {
        invoke_bucket(world, &ider.self_up_observers, it);
        invoke_bucket(world, &ider.up_observers, it);
    }
    it.source = None;
    it.event = prev_event;
}

/// Forwards the ids visible through an acyclic pair to observers of the
/// emitting row range, walking transitive chains of the same relation.
///
/// Recursion depth is bounded by the relationship hierarchy, which stays
/// within typical game-object-tree depth; cycles are out of contract.
#[allow(clippy::too_many_arguments)]
fn forward(
    world: &World,
    er: Option<&EventRecord>,
    er_fwd: Option<&EventRecord>,
    batch: &[Id],
    it: &mut EventIter<'_>,
    table: TableId,
    event: Event,
    id: Id,
) {
    let mut stack: Vec<TableId> = Vec::new();
    forward_pair_up(world, er, er_fwd, batch, it, table, event, id, &mut stack);
    it.source = None;
}

#[allow(clippy::too_many_arguments)]
fn forward_pair_up(
    world: &World,
    er: Option<&EventRecord>,
    er_fwd: Option<&EventRecord>,
    batch: &[Id],
    it: &mut EventIter<'_>,
    table: TableId,
    event: Event,
    id: Id,
    stack: &mut Vec<TableId>,
) {
    let (Some(relation), Some(target)) = (id.relation(), id.target()) else {
        return;
    };
    // The pair may reference a recycled identity; resolve to whoever owns
    // the index now, and skip targets that vanished mid-walk.
    let Some(target) = world.entities().get_current(target.index) else {
        return;
    };
    let Some(record) = world.entities().get(target) else {
        return;
    };
    forward_table_up(
        world, er, er_fwd, batch, it, table, event, relation, target, record.table, record.row,
        stack,
    );
}

#[allow(clippy::too_many_arguments)]
fn forward_table_up(
    world: &World,
    er: Option<&EventRecord>,
    er_fwd: Option<&EventRecord>,
    batch: &[Id],
    it: &mut EventIter<'_>,
    table: TableId,
    event: Event,
    relation: EntityId,
    target: EntityId,
    target_table: TableId,
    target_row: usize,
    stack: &mut Vec<TableId>,
) {
    let target_ref = world.tables().get(target_table);
    let inherit = relation == EntityId::IS_A;
    let may_override = inherit && event == Event::OnAdd && batch.len() > 1;

    for (position, &forwarded) in target_ref.ids().iter().enumerate() {
        let Some(record) = world.id_index().get(forwarded) else {
            continue;
        };
        if inherit && record.flags().dont_inherit {
            continue;
        }
        if forwarded.relation() == Some(relation) {
            // The target inherits through the same relation; walk deeper.
            stack.push(target_table);
            forward_pair_up(world, er, er_fwd, batch, it, table, event, forwarded, stack);
            stack.pop();
            continue;
        }
        if record.flags().dont_inherit {
            continue;
        }

        let iders = er.map_or_else(MatchSet::empty, |r| r.matching(forwarded));
        let iders_fwd = er_fwd.map_or_else(MatchSet::empty, |r| r.matching(forwarded));
        if !may_override && iders.is_empty() && iders_fwd.is_empty() {
            continue;
        }

        // A table closer to the instance masks this id.
        if stack.iter().any(|&lower| record.has_table(lower)) {
            continue;
        }

        it.id = forwarded;
        it.source = Some(target);
        it.data = target_ref.column(position).map(|_| DataRef {
            table: target_table,
            column: position,
            row: target_row,
            len: 1,
        });

        let owned = record.has_table(table);

        for ider in iders.iter() {
            invoke_bucket(world, &ider.up_observers, it);
            if !owned {
                // Owned takes precedence over inherited.
                invoke_bucket(world, &ider.self_up_observers, it);
            }
        }

        if it.data.is_none() {
            // Tags forward presence only, never values.
            continue;
        }

        // A component added together with the pair overrides the inherited
        // value: it must announce the local value instead of silently
        // inheriting.
        let mut overridden = false;
        if may_override && !it.flags.no_on_set && batch.contains(&forwarded) {
            if let Some(tr) = record.table_record(table) {
                let src = DataRef {
                    table: target_table,
                    column: position,
                    row: target_row,
                    len: 1,
                };
                override_copy(world, src, table, tr.column, it.offset, it.count, forwarded);
                overridden = true;
                it.data = Some(DataRef {
                    table,
                    column: tr.column,
                    row: it.offset,
                    len: it.count,
                });
            }
        }

        if !iders_fwd.is_empty() {
            let prev_event = it.event;
            if let Some(retargeted) = sync_event(event) {
                it.event = retargeted;
            }
            for ider in iders_fwd.iter() {
                invoke_bucket(world, &ider.up_observers, it);
                if !owned {
                    invoke_bucket(world, &ider.self_up_observers, it);
                } else if overridden {
                    let source = it.source.take();
                    invoke_bucket(world, &ider.self_observers, it);
                    invoke_bucket(world, &ider.self_up_observers, it);
                    it.source = source;
                }
            }
            it.event = prev_event;
        }
    }
}

/// Re-notifies `up`/`self_up` observers of every entity related to the
/// changed entity through an acyclic relationship, recursing transitively
/// per observed entity. Each visited table starts a logically distinct emit
/// with its own dedup scope.
///
/// Recursion depth is bounded by the caller's relationship hierarchy;
/// cycles are out of contract.
fn propagate(
    world: &World,
    it: &mut EventIter<'_>,
    base_record: &IdRecord,
    entity: EntityId,
    iders: &MatchSet<'_>,
) {
    let Some(by_target) = world
        .id_index()
        .get(Id::pair(EntityId::WILDCARD, entity))
    else {
        return;
    };

    for relation in by_target.pair_relations() {
        let Some(chain) = world.id_index().get(Id::pair(relation, entity)) else {
            continue;
        };
        if !chain.flags().acyclic {
            // Only hierarchical relationships propagate.
            continue;
        }

        for (table_id, _) in chain.tables() {
            let dependent = world.tables().get(table_id);
            let owned = base_record.has_table(table_id);

            it.table = table_id;
            it.other_table = None;
            it.offset = 0;
            it.count = dependent.len();

            world.observable().bump_event_id();

            for ider in iders.iter() {
                invoke_bucket(world, &ider.up_observers, it);
                if !owned {
                    // Owned takes precedence over inherited.
                    invoke_bucket(world, &ider.self_up_observers, it);
                }
            }

            if dependent.observed_count() == 0 {
                continue;
            }
            for row in 0..dependent.len() {
                let next = dependent.entities()[row];
                if world
                    .entities()
                    .get(next)
                    .is_some_and(|record| record.observed)
                {
                    propagate(world, it, base_record, next, iders);
                }
            }
        }
    }
}

fn invoke_bucket(world: &World, bucket: &BTreeSet<ObserverId>, it: &mut EventIter<'_>) {
    for &observer_id in bucket {
        let observer = world
            .observable()
            .observer(observer_id)
            .expect("bucket references an unregistered observer");
        uni_observer_invoke(world, observer, it);
    }
}

/// Skips observers that already ran in this logical emit, and tables whose
/// prefab/disabled flags the observer did not opt into.
fn ignore_observer(world: &World, observer: &Observer, table: &Table) -> bool {
    if observer.last_event_id.get() == world.observable().event_id() {
        return true;
    }
    let flags = table.flags();
    if flags.is_prefab && !observer.match_prefab {
        return true;
    }
    if flags.is_disabled && !observer.match_disabled {
        return true;
    }
    false
}

fn uni_observer_invoke(world: &World, observer: &Observer, it: &mut EventIter<'_>) {
    let table = world.tables().get(it.table);
    if ignore_observer(world, observer, table) {
        return;
    }
    observer.last_event_id.set(world.observable().event_id());

    let term = observer.terms[0];
    let prev_event = it.event;
    let prev_observer = it.observer;
    it.event = flip_event(term.oper, it.event);
    it.observer = Some(observer.id);

    if let Some(run) = &observer.run {
        debug!(observer = observer.id, event = %it.event, "observer run");
        world.stats().bump_observers_ran();
        it.interrupted = false;
        table.lock();
        run(it);
        table.unlock();
    } else {
        let callback = observer
            .callback
            .as_ref()
            .expect("observer without a run-loop must have a callback");
        observer_invoke(world, observer, callback, it, table);
    }

    it.event = prev_event;
    it.observer = prev_observer;
}

fn observer_invoke(
    world: &World,
    observer: &Observer,
    callback: &IterFn,
    it: &mut EventIter<'_>,
    table: &Table,
) {
    debug!(observer = observer.id, event = %it.event, "observer invoked");
    world.stats().bump_observers_ran();
    table.lock();

    let fixed_src = match observer.terms[0].src {
        TermSrc::Entity(entity) => Some(entity),
        TermSrc::This => None,
    };

    let batched =
        it.count <= 1 || it.data.is_none() || it.source.is_none() || observer.instanced;

    if fixed_src.is_none() && batched {
        callback(it);
    } else {
        let (offset, count, source, data) = (it.offset, it.count, it.source, it.data);
        if let Some(entity) = fixed_src {
            let rows = &table.entities()[offset..offset + count];
            if let Some(position) = rows.iter().position(|&row| row == entity) {
                it.offset = offset + position;
                it.count = 1;
                if it.source.is_none() {
                    it.source = Some(entity);
                    if let Some(narrowed) = &mut it.data {
                        narrowed.row += position;
                        narrowed.len = 1;
                    }
                }
                callback(it);
            }
        } else {
            // Shared-source rows run uninstanced: one row per invocation.
            for row in 0..count {
                it.offset = offset + row;
                it.count = 1;
                callback(it);
            }
        }
        it.offset = offset;
        it.count = count;
        it.source = source;
        it.data = data;
    }

    table.unlock();
}
