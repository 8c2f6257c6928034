//! Per-id metadata: which tables hold an id, storage info, and flags.
//!
//! Every id in use has an [`IdRecord`] with a cache of the tables whose type
//! contains it. Pairs additionally maintain records for their wildcard
//! variants: `(R, *)`, `(*, T)`, and the full wildcard pair. The `(*, T)`
//! record remembers which relations target `T`, which is what the event
//! propagator walks to find an entity's dependents.

use std::collections::{BTreeMap, BTreeSet};

use trestle_foundation::{EntityId, Id, IdFlags, Value};

use crate::entity_index::EntityIndex;
use crate::table::{Table, TableId, TableStore};

/// Registered copy hook for a component, used when a prototype value is
/// copied onto an instance. Components without a hook are cloned.
pub type CopyFn = fn(&Value) -> Value;

/// Storage description of a data-carrying component.
///
/// Tags and pairs have no `StorageInfo`; their presence is their state.
#[derive(Copy, Clone, Debug, Default)]
pub struct StorageInfo {
    /// Copy hook applied when duplicating values across an inheritance edge.
    pub copy: Option<CopyFn>,
}

impl StorageInfo {
    /// Duplicates a value through the registered hook, or by cloning.
    #[must_use]
    pub fn duplicate(&self, value: &Value) -> Value {
        match self.copy {
            Some(copy) => copy(value),
            None => value.clone(),
        }
    }
}

/// Entry of an id record's table cache.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TableRecord {
    /// Position of the id in the table's type.
    pub column: usize,
}

/// Per-id metadata and table cache.
#[derive(Debug, Default)]
pub struct IdRecord {
    flags: IdFlags,
    storage: Option<StorageInfo>,
    cache: BTreeMap<TableId, TableRecord>,
    pair_relations: BTreeSet<EntityId>,
}

impl IdRecord {
    fn new(flags: IdFlags, storage: Option<StorageInfo>) -> Self {
        Self {
            flags,
            storage,
            cache: BTreeMap::new(),
            pair_relations: BTreeSet::new(),
        }
    }

    /// Behavior flags of this id.
    #[must_use]
    pub fn flags(&self) -> IdFlags {
        self.flags
    }

    /// Storage info, present only for data-carrying components.
    #[must_use]
    pub fn storage(&self) -> Option<&StorageInfo> {
        self.storage.as_ref()
    }

    /// Returns true if the id carries a value column.
    #[must_use]
    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    /// Returns the cache entry for a table, if its type contains the id.
    #[must_use]
    pub fn table_record(&self, table: TableId) -> Option<&TableRecord> {
        self.cache.get(&table)
    }

    /// Returns true if the table's type contains the id.
    #[must_use]
    pub fn has_table(&self, table: TableId) -> bool {
        self.cache.contains_key(&table)
    }

    /// Iterates the tables whose type contains this id.
    pub fn tables(&self) -> impl Iterator<Item = (TableId, &TableRecord)> {
        self.cache.iter().map(|(&table, record)| (table, record))
    }

    /// Number of tables in the cache.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.cache.len()
    }

    /// On a `(Wildcard, T)` record: the relations that currently target `T`.
    pub fn pair_relations(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.pair_relations.iter().copied()
    }
}

/// Source of an inherited component found by [`IdIndex::search_relation`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RelationMatch {
    /// The entity providing the component.
    pub entity: EntityId,
    /// The table holding that entity.
    pub table: TableId,
    /// Column position of the component in that table.
    pub column: usize,
    /// Row of the providing entity.
    pub row: usize,
}

/// The id record index for a world.
#[derive(Debug, Default)]
pub struct IdIndex {
    records: BTreeMap<Id, IdRecord>,
}

impl IdIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for an id, if it is in use.
    #[must_use]
    pub fn get(&self, id: Id) -> Option<&IdRecord> {
        self.records.get(&id)
    }

    /// Returns the record for an id, creating it on first use.
    ///
    /// Flags and storage only apply to a newly created record; an existing
    /// record is returned untouched.
    pub fn ensure(&mut self, id: Id, flags: IdFlags, storage: Option<StorageInfo>) -> &mut IdRecord {
        self.records
            .entry(id)
            .or_insert_with(|| IdRecord::new(flags, storage))
    }

    /// Returns true if the id is registered with a value column.
    #[must_use]
    pub fn has_storage(&self, id: Id) -> bool {
        match id {
            Id::Component(_) => self.get(id).is_some_and(IdRecord::has_storage),
            Id::Pair { .. } => false,
        }
    }

    /// Returns true if the id is known to carry no storage.
    ///
    /// Wildcard ids and unregistered components are not tags: their storage
    /// is unknown until matched against concrete ids.
    #[must_use]
    pub fn is_tag(&self, id: Id) -> bool {
        if id.is_wildcard() {
            return false;
        }
        match id {
            Id::Pair { .. } => true,
            Id::Component(_) => self.get(id).is_some_and(|record| !record.has_storage()),
        }
    }

    /// Behavior flags of an id. Pairs take their relation's flags.
    #[must_use]
    pub fn flags_of(&self, id: Id) -> IdFlags {
        let key = match id.relation() {
            Some(relation) => Id::component(relation),
            None => id,
        };
        self.get(key).map(IdRecord::flags).unwrap_or_default()
    }

    /// Returns the cache entry of `id` for `table`.
    #[must_use]
    pub fn table_record(&self, id: Id, table: TableId) -> Option<&TableRecord> {
        self.get(id)?.table_record(table)
    }

    /// Registers a freshly created table in the records of every id in its
    /// type, including the wildcard variants of pairs.
    pub fn register_table(&mut self, table: &Table) {
        let table_id = table.id();
        for (column, &id) in table.ids().iter().enumerate() {
            let record = TableRecord { column };
            let flags = self.flags_of(id);
            self.ensure(id, flags, None).cache.insert(table_id, record);

            if let Id::Pair { relation, target } = id {
                self.ensure(Id::pair(relation, EntityId::WILDCARD), flags, None)
                    .cache
                    .insert(table_id, record);

                let by_target = self.ensure(
                    Id::pair(EntityId::WILDCARD, target),
                    IdFlags::default(),
                    None,
                );
                by_target.cache.insert(table_id, record);
                by_target.pair_relations.insert(relation);

                self.ensure(Id::WILDCARD_PAIR, IdFlags::default(), None)
                    .cache
                    .insert(table_id, record);
            }
        }
    }

    /// Finds the entity providing `id` through `relation`, walking targets
    /// upward from `table` (the starting table itself is not considered).
    ///
    /// Only data-carrying matches are reported. Recursion depth is bounded
    /// by the relationship hierarchy, which callers keep acyclic.
    #[must_use]
    pub fn search_relation(
        &self,
        tables: &TableStore,
        entities: &EntityIndex,
        table: TableId,
        id: Id,
        relation: EntityId,
    ) -> Option<RelationMatch> {
        for &tid in tables.get(table).ids() {
            if tid.relation() != Some(relation) {
                continue;
            }
            let Some(target) = tid.target() else {
                continue;
            };
            let Some(target) = entities.get_current(target.index) else {
                continue;
            };
            let Some(record) = entities.get(target) else {
                continue;
            };

            if let Some(tr) = self.table_record(id, record.table) {
                if tables.get(record.table).column(tr.column).is_some() {
                    return Some(RelationMatch {
                        entity: target,
                        table: record.table,
                        column: tr.column,
                        row: record.row,
                    });
                }
            }

            if let Some(found) = self.search_relation(tables, entities, record.table, id, relation)
            {
                return Some(found);
            }
        }
        None
    }
}
