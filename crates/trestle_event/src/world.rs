//! The world: storage, id records, and the observable, tied together so
//! that every structural mutation funnels into one emit call per event.

use std::collections::BTreeMap;
use std::time::Instant;

use trestle_foundation::{
    EntityId, Error, ErrorKind, Event, Id, IdFlags, Result, TableFlags, Value,
};
use trestle_storage::{
    CopyFn, EntityIndex, EntityRecord, IdIndex, StorageInfo, TableId, TableStore,
};

use crate::emit::{emit_passes, EventDesc};
use crate::instantiate::instantiate;
use crate::observer::ObserverDesc;
use crate::registry::{Observable, ObserverId};
use crate::stats::WorldStats;

/// A world: entity index, tables, id records, observable, and statistics.
///
/// The world is single-threaded: an emit assumes exclusive access to the
/// observable's maps and the table's row range, with no internal locking.
/// Callers serialize structural changes before mutating.
#[derive(Debug)]
pub struct World {
    entities: EntityIndex,
    tables: TableStore,
    id_index: IdIndex,
    observable: Observable,
    stats: WorldStats,
    names: BTreeMap<String, EntityId>,
    instantiating: Option<EntityId>,
    measure_emit_time: bool,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates a world with the builtin relations and tags registered:
    /// `IsA` (acyclic), `ChildOf` (acyclic, never inherited), and the
    /// `Prefab`/`Disabled` tags (never inherited).
    #[must_use]
    pub fn new() -> Self {
        let mut world = Self {
            entities: EntityIndex::new(),
            tables: TableStore::new(),
            id_index: IdIndex::new(),
            observable: Observable::new(),
            stats: WorldStats::new(),
            names: BTreeMap::new(),
            instantiating: None,
            measure_emit_time: false,
        };
        world.id_index.ensure(
            Id::component(EntityId::IS_A),
            IdFlags::acyclic(),
            None,
        );
        world.id_index.ensure(
            Id::component(EntityId::CHILD_OF),
            IdFlags {
                acyclic: true,
                dont_inherit: true,
            },
            None,
        );
        world.id_index.ensure(
            Id::component(EntityId::PREFAB),
            IdFlags::dont_inherit(),
            None,
        );
        world.id_index.ensure(
            Id::component(EntityId::DISABLED),
            IdFlags::dont_inherit(),
            None,
        );
        world
    }

    // --- Accessors ---

    /// The table store.
    #[must_use]
    pub fn tables(&self) -> &TableStore {
        &self.tables
    }

    /// The entity index.
    #[must_use]
    pub fn entities(&self) -> &EntityIndex {
        &self.entities
    }

    /// The id record index.
    #[must_use]
    pub fn id_index(&self) -> &IdIndex {
        &self.id_index
    }

    /// The observable owning every event record and observer.
    #[must_use]
    pub fn observable(&self) -> &Observable {
        &self.observable
    }

    /// Statistics updated by the emit path.
    #[must_use]
    pub fn stats(&self) -> &WorldStats {
        &self.stats
    }

    /// Enables or disables recording of elapsed emit time.
    pub fn set_measure_emit_time(&mut self, enabled: bool) {
        self.measure_emit_time = enabled;
    }

    /// Returns true if the entity exists and is not stale.
    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.is_alive(entity)
    }

    /// The table and row an entity currently occupies.
    #[must_use]
    pub fn location(&self, entity: EntityId) -> Option<(TableId, usize)> {
        let record = self.entities.get(entity)?;
        Some((record.table, record.row))
    }

    /// Returns true if the entity's own table type contains the id.
    #[must_use]
    pub fn has(&self, entity: EntityId, id: Id) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|record| self.tables.get(record.table).has_id(id))
    }

    /// Reads a component value, falling back to the prototype chain for
    /// inheritable components the entity does not own.
    #[must_use]
    pub fn get(&self, entity: EntityId, component: EntityId) -> Option<Value> {
        let record = self.entities.get(entity)?;
        let id = Id::component(component);
        let table = self.tables.get(record.table);
        if let Some(column) = table.column_for(id) {
            return Some(column.borrow()[record.row].clone());
        }
        if self.id_index.flags_of(id).dont_inherit {
            return None;
        }
        let found =
            self.id_index
                .search_relation(&self.tables, &self.entities, record.table, id, EntityId::IS_A)?;
        let column = self.tables.get(found.table).column(found.column)?;
        Some(column.borrow()[found.row].clone())
    }

    // --- Registration ---

    /// Registers a data-carrying component under a unique name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already registered.
    pub fn component(&mut self, name: &str) -> Result<EntityId> {
        self.register_named(name, IdFlags::default(), Some(StorageInfo::default()))
    }

    /// Registers a component with a copy hook applied when its value is
    /// duplicated across an inheritance edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already registered.
    pub fn component_with_copy(&mut self, name: &str, copy: CopyFn) -> Result<EntityId> {
        self.register_named(
            name,
            IdFlags::default(),
            Some(StorageInfo { copy: Some(copy) }),
        )
    }

    /// Registers a data-carrying component with behavior flags, e.g. one
    /// that is never inherited from a prototype.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already registered.
    pub fn component_with_flags(&mut self, name: &str, flags: IdFlags) -> Result<EntityId> {
        self.register_named(name, flags, Some(StorageInfo::default()))
    }

    /// Registers a tag: presence only, no storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already registered.
    pub fn tag(&mut self, name: &str) -> Result<EntityId> {
        self.register_named(name, IdFlags::default(), None)
    }

    /// Registers a relation with behavior flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already registered.
    pub fn relation(&mut self, name: &str, flags: IdFlags) -> Result<EntityId> {
        self.register_named(name, flags, None)
    }

    /// Declares a custom event entity, usable with [`Event::Custom`].
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already registered.
    pub fn event(&mut self, name: &str) -> Result<EntityId> {
        if self.names.contains_key(name) {
            return Err(Error::new(ErrorKind::AlreadyRegistered(name.to_string())));
        }
        let entity = self.spawn();
        self.names.insert(name.to_string(), entity);
        Ok(entity)
    }

    /// Looks up a registered name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    fn register_named(
        &mut self,
        name: &str,
        flags: IdFlags,
        storage: Option<StorageInfo>,
    ) -> Result<EntityId> {
        if self.names.contains_key(name) {
            return Err(Error::new(ErrorKind::AlreadyRegistered(name.to_string())));
        }
        let entity = self.spawn();
        self.names.insert(name.to_string(), entity);
        self.id_index.ensure(Id::component(entity), flags, storage);
        Ok(entity)
    }

    /// Registers an observer.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is malformed (see
    /// [`Observable::observe`]).
    pub fn observe(&mut self, desc: ObserverDesc) -> Result<ObserverId> {
        let id_index = &self.id_index;
        self.observable.observe(desc, |id| id_index.is_tag(id))
    }

    /// Unregisters an observer, dropping its context.
    ///
    /// # Errors
    ///
    /// Returns an error if the id does not name a registered observer.
    pub fn unobserve(&mut self, observer: ObserverId) -> Result<()> {
        let id_index = &self.id_index;
        self.observable.unobserve(observer, |id| id_index.is_tag(id))
    }

    // --- Structural mutation ---

    /// Spawns an empty entity in the root table.
    pub fn spawn(&mut self) -> EntityId {
        let entity = self.entities.spawn();
        let row = self.tables.get_mut(TableStore::ROOT).push_row(entity);
        self.entities
            .put(entity, EntityRecord::new(TableStore::ROOT, row))
            .expect("fresh entity must accept a record");
        entity
    }

    /// Destroys an entity, notifying removal of its full type first.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is stale or its table is locked.
    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        self.entities.validate(entity)?;
        let record = *self
            .entities
            .get(entity)
            .ok_or_else(|| Error::entity_not_found(entity))?;
        if self.tables.get(record.table).is_locked() {
            return Err(Error::new(ErrorKind::TableLocked(record.table)));
        }

        let type_ids: Vec<Id> = self.tables.get(record.table).ids().to_vec();
        if !type_ids.is_empty() {
            self.emit(
                EventDesc::new(Event::OnRemove, record.table, &type_ids)
                    .rows(record.row, 1),
            );
        }

        let record = *self
            .entities
            .get(entity)
            .ok_or_else(|| Error::entity_not_found(entity))?;
        let displaced = self.tables.get_mut(record.table).swap_remove_row(record.row);
        if record.observed {
            self.tables.get_mut(record.table).add_observed(-1);
        }
        if let Some(moved) = displaced {
            if let Some(moved_record) = self.entities.get_mut(moved) {
                moved_record.row = record.row;
            }
        }
        self.entities.free(entity)
    }

    /// Adds one id to an entity. Adding a present id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is stale, the id is unregistered or a
    /// wildcard, or a table involved is locked.
    pub fn add(&mut self, entity: EntityId, id: Id) -> Result<()> {
        self.apply(entity, &[id], Vec::new())
    }

    /// Adds a batch of ids in one structural move and one add notification.
    ///
    /// # Errors
    ///
    /// See [`World::add`].
    pub fn add_ids(&mut self, entity: EntityId, ids: &[Id]) -> Result<()> {
        self.apply(entity, ids, Vec::new())
    }

    /// Writes a component value, adding the component first if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is stale, the component has no
    /// storage, or a table involved is locked.
    pub fn set(&mut self, entity: EntityId, component: EntityId, value: Value) -> Result<()> {
        self.apply(entity, &[], vec![(component, value)])
    }

    /// Removes one id from an entity, notifying before the value vanishes.
    /// Removing an absent id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is stale or a table involved is
    /// locked.
    pub fn remove(&mut self, entity: EntityId, id: Id) -> Result<()> {
        self.entities.validate(entity)?;
        let record = *self
            .entities
            .get(entity)
            .ok_or_else(|| Error::entity_not_found(entity))?;

        let dst_type: Vec<Id> = {
            let table = self.tables.get(record.table);
            if !table.has_id(id) {
                return Ok(());
            }
            table.ids().iter().copied().filter(|&t| t != id).collect()
        };

        let ids = [id];
        self.emit(EventDesc::new(Event::OnRemove, record.table, &ids).rows(record.row, 1));

        let dst = self.ensure_table(dst_type);
        self.move_entity(entity, dst)
    }

    /// Starts a batched modification: all adds and sets apply with one
    /// structural move and one add notification.
    pub fn modify(&mut self, entity: EntityId) -> EntityModify<'_> {
        EntityModify {
            world: self,
            entity,
            adds: Vec::new(),
            sets: Vec::new(),
        }
    }

    // --- Emission ---

    /// Announces a change to a table's row range.
    ///
    /// This is the single entry point the structural API funnels into; it
    /// resolves matching event-id records, invokes direct observers, and
    /// delegates to propagation and override resolution. It never reports
    /// failure: the only observable difference is whether callbacks ran.
    ///
    /// # Panics
    ///
    /// Panics on contract violations: a `Wildcard` (or null custom) event,
    /// an empty id list, or an unknown table.
    pub fn emit(&mut self, desc: EventDesc<'_>) {
        assert!(
            desc.event != Event::Wildcard,
            "emit: Wildcard is not a valid emit event"
        );
        if let Event::Custom(entity) = desc.event {
            assert!(!entity.is_null(), "emit: null custom event");
        }
        assert!(!desc.ids.is_empty(), "emit: id list must not be empty");
        assert!(self.tables.contains(desc.table), "emit: unknown table");

        let started = self.measure_emit_time.then(Instant::now);

        let table_len = self.tables.get(desc.table).len();
        let count = if desc.count == 0 && !desc.flags.table_only {
            table_len.saturating_sub(desc.offset)
        } else {
            desc.count
        };

        // A fresh IsA addition instantiates the prototype exactly once,
        // before any notification or override handling.
        if desc.event == Event::OnAdd && count > 0 && self.instantiating.is_none() {
            for &id in desc.ids {
                if id.relation() != Some(EntityId::IS_A) {
                    continue;
                }
                let Some(target) = id.target() else { continue };
                let Some(target) = self.entities.get_current(target.index) else {
                    continue;
                };
                self.instantiating = Some(target);
                instantiate(self, target, desc.table, desc.offset, count);
                self.instantiating = None;
            }
        }

        emit_passes(self, &desc, count);

        self.stats.bump_emits();
        if let Some(t0) = started {
            self.stats.add_emit_time(t0.elapsed());
        }
    }

    // --- Internals ---

    pub(crate) fn apply(
        &mut self,
        entity: EntityId,
        add_ids: &[Id],
        sets: Vec<(EntityId, Value)>,
    ) -> Result<()> {
        self.entities.validate(entity)?;

        let mut batch: Vec<Id> = Vec::with_capacity(add_ids.len() + sets.len());
        for &id in add_ids {
            self.validate_id(id)?;
            if !batch.contains(&id) {
                batch.push(id);
            }
        }
        for (component, _) in &sets {
            let id = Id::component(*component);
            if !self.id_index.has_storage(id) {
                return Err(Error::not_a_component(id));
            }
            if !batch.contains(&id) {
                batch.push(id);
            }
        }
        if batch.is_empty() {
            return Ok(());
        }

        let record = *self
            .entities
            .get(entity)
            .ok_or_else(|| Error::entity_not_found(entity))?;
        let src_table = record.table;

        let new_ids: Vec<Id> = {
            let table = self.tables.get(src_table);
            batch
                .iter()
                .copied()
                .filter(|&id| !table.has_id(id))
                .collect()
        };

        if !new_ids.is_empty() {
            let mut dst_type = self.tables.get(src_table).ids().to_vec();
            dst_type.extend_from_slice(&new_ids);
            let dst = self.ensure_table(dst_type);
            self.move_entity(entity, dst)?;

            for &id in &new_ids {
                if let Id::Pair { relation, target } = id {
                    if self.id_index.flags_of(Id::component(relation)).acyclic {
                        self.mark_observed(target);
                    }
                }
            }
        }

        let record = *self
            .entities
            .get(entity)
            .ok_or_else(|| Error::entity_not_found(entity))?;

        // Values land before the add notification so the override resolver
        // can tell caller-written rows from uninitialized ones.
        for (component, value) in &sets {
            let table = self.tables.get(record.table);
            let column = table
                .column_for(Id::component(*component))
                .expect("component column missing after apply");
            column.borrow_mut()[record.row] = value.clone();
        }

        if !new_ids.is_empty() {
            self.emit(
                EventDesc::new(Event::OnAdd, record.table, &new_ids)
                    .rows(record.row, 1)
                    .other_table(src_table),
            );
        }

        if !sets.is_empty() {
            let record = *self
                .entities
                .get(entity)
                .ok_or_else(|| Error::entity_not_found(entity))?;
            let has_is_a = new_ids
                .iter()
                .any(|id| id.relation() == Some(EntityId::IS_A));
            let mut set_ids: Vec<Id> = Vec::with_capacity(sets.len());
            for (component, _) in &sets {
                let id = Id::component(*component);
                if set_ids.contains(&id) {
                    continue;
                }
                // The override resolver already announces components that
                // arrived in the same batch as an IsA pair and shadow an
                // inherited value; announcing them again would double-fire.
                if has_is_a
                    && new_ids.contains(&id)
                    && !self.id_index.flags_of(id).dont_inherit
                    && self
                        .id_index
                        .search_relation(
                            &self.tables,
                            &self.entities,
                            record.table,
                            id,
                            EntityId::IS_A,
                        )
                        .is_some()
                {
                    continue;
                }
                set_ids.push(id);
            }
            if !set_ids.is_empty() {
                self.emit(
                    EventDesc::new(Event::OnSet, record.table, &set_ids).rows(record.row, 1),
                );
            }
        }

        Ok(())
    }

    fn validate_id(&self, id: Id) -> Result<()> {
        if !id.is_concrete() {
            return Err(Error::unknown_id(id).with_context("wildcard ids cannot be added"));
        }
        match id {
            Id::Component(_) => {
                if self.id_index.get(id).is_none() {
                    return Err(Error::unknown_id(id));
                }
            }
            Id::Pair { relation, target } => {
                if self.id_index.get(Id::component(relation)).is_none() {
                    return Err(Error::unknown_id(Id::component(relation)));
                }
                self.entities.validate(target)?;
            }
        }
        Ok(())
    }

    fn ensure_table(&mut self, mut type_ids: Vec<Id>) -> TableId {
        type_ids.sort_unstable();
        type_ids.dedup();
        if let Some(table) = self.tables.lookup(&type_ids) {
            return table;
        }
        let flags = TableFlags {
            is_prefab: type_ids.contains(&Id::component(EntityId::PREFAB)),
            is_disabled: type_ids.contains(&Id::component(EntityId::DISABLED)),
            has_is_a: type_ids
                .iter()
                .any(|id| id.relation() == Some(EntityId::IS_A)),
        };
        let storage: Vec<bool> = type_ids
            .iter()
            .map(|&id| self.id_index.has_storage(id))
            .collect();
        let table = self.tables.insert(type_ids, &storage, flags);
        self.id_index.register_table(self.tables.get(table));
        table
    }

    fn move_entity(&mut self, entity: EntityId, dst: TableId) -> Result<()> {
        let record = *self
            .entities
            .get(entity)
            .ok_or_else(|| Error::entity_not_found(entity))?;
        if record.table == dst {
            return Ok(());
        }
        if self.tables.get(record.table).is_locked() {
            return Err(Error::new(ErrorKind::TableLocked(record.table)));
        }
        if self.tables.get(dst).is_locked() {
            return Err(Error::new(ErrorKind::TableLocked(dst)));
        }

        // Carry values shared by both types.
        let mut carried: Vec<(usize, Value)> = Vec::new();
        {
            let src = self.tables.get(record.table);
            let dst_table = self.tables.get(dst);
            for (position, &id) in dst_table.ids().iter().enumerate() {
                if dst_table.column(position).is_none() {
                    continue;
                }
                if let Some(column) = src.column_for(id) {
                    carried.push((position, column.borrow()[record.row].clone()));
                }
            }
        }

        let displaced = self.tables.get_mut(record.table).swap_remove_row(record.row);
        if record.observed {
            self.tables.get_mut(record.table).add_observed(-1);
        }
        if let Some(moved) = displaced {
            if let Some(moved_record) = self.entities.get_mut(moved) {
                moved_record.row = record.row;
            }
        }

        let row = {
            let table = self.tables.get_mut(dst);
            let row = table.push_row(entity);
            for (position, value) in carried {
                let column = table.column(position).expect("carried column vanished");
                column.borrow_mut()[row] = value;
            }
            row
        };
        if record.observed {
            self.tables.get_mut(dst).add_observed(1);
        }
        self.entities.put(
            entity,
            EntityRecord {
                table: dst,
                row,
                observed: record.observed,
            },
        )
    }

    /// Marks an entity as a relationship target that propagation must walk.
    /// Sticky: the mark outlives the relationship, which only costs an
    /// empty-cache lookup per emit afterwards.
    fn mark_observed(&mut self, target: EntityId) {
        let Some(target) = self.entities.get_current(target.index) else {
            return;
        };
        let Some(record) = self.entities.get_mut(target) else {
            return;
        };
        if record.observed {
            return;
        }
        record.observed = true;
        let table = record.table;
        self.tables.get_mut(table).add_observed(1);
    }
}

/// Batched entity modification: adds and sets applied with one structural
/// move and one add notification.
pub struct EntityModify<'w> {
    world: &'w mut World,
    entity: EntityId,
    adds: Vec<Id>,
    sets: Vec<(EntityId, Value)>,
}

impl EntityModify<'_> {
    /// Queues an id to add.
    #[must_use]
    pub fn add(mut self, id: Id) -> Self {
        self.adds.push(id);
        self
    }

    /// Queues a (relation, target) pair to add.
    #[must_use]
    pub fn add_pair(mut self, relation: EntityId, target: EntityId) -> Self {
        self.adds.push(Id::pair(relation, target));
        self
    }

    /// Queues a component value write.
    #[must_use]
    pub fn set(mut self, component: EntityId, value: Value) -> Self {
        self.sets.push((component, value));
        self
    }

    /// Applies the batch.
    ///
    /// # Errors
    ///
    /// See [`World::add`] and [`World::set`].
    pub fn apply(self) -> Result<()> {
        let Self {
            world,
            entity,
            adds,
            sets,
        } = self;
        world.apply(entity, &adds, sets)
    }
}
