//! Entity lifecycle management with generational indices.
//!
//! The `EntityIndex` allocates entity ids, tracks generations to detect
//! stale references, and maps each live entity to its table and row.

use trestle_foundation::{EntityId, Error, Result};

use crate::table::TableId;

/// Location of a live entity, plus propagation bookkeeping.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EntityRecord {
    /// Table currently holding the entity.
    pub table: TableId,
    /// Row within the table.
    pub row: usize,
    /// The entity is the target of an acyclic pair and must be walked when
    /// notifications propagate.
    pub observed: bool,
}

impl EntityRecord {
    /// Creates a record at the given location.
    #[must_use]
    pub fn new(table: TableId, row: usize) -> Self {
        Self {
            table,
            row,
            observed: false,
        }
    }
}

/// Manages entity lifecycle, generation tracking, and entity records.
///
/// Indices are reused from a free list; the generation increments on every
/// transition, so even generations are free and odd generations are alive.
/// Indices below [`EntityId::FIRST_USER_INDEX`] are reserved for builtin
/// entities, which are alive from the start and carry no record.
#[derive(Debug, Clone)]
pub struct EntityIndex {
    /// Generation counter for each entity index.
    /// Even generations are free, odd generations are alive.
    generations: Vec<u32>,
    /// Table location per index, `None` for entities outside any table.
    records: Vec<Option<EntityRecord>>,
    /// Free list of indices available for reuse.
    free_list: Vec<u32>,
    /// Count of live non-builtin entities.
    live_count: usize,
}

impl Default for EntityIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityIndex {
    /// Creates a new index with the builtin entities alive.
    #[must_use]
    pub fn new() -> Self {
        let reserved = EntityId::FIRST_USER_INDEX as usize;
        Self {
            generations: vec![1; reserved],
            records: vec![None; reserved],
            free_list: Vec::new(),
            live_count: 0,
        }
    }

    /// Spawns a new entity, returns its ID.
    ///
    /// Reuses indices from the free list when available.
    pub fn spawn(&mut self) -> EntityId {
        self.live_count += 1;

        if let Some(index) = self.free_list.pop() {
            let idx = index as usize;
            // Was even/free, now odd/alive.
            self.generations[idx] += 1;
            self.records[idx] = None;
            EntityId::new(index, self.generations[idx])
        } else {
            let index = u32::try_from(self.generations.len()).expect("entity index overflow");
            self.generations.push(1);
            self.records.push(None);
            EntityId::new(index, 1)
        }
    }

    /// Frees an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is stale, never existed, or is one of
    /// the reserved builtin entities.
    pub fn free(&mut self, id: EntityId) -> Result<()> {
        self.validate(id)?;
        if id.is_builtin() {
            return Err(Error::internal(format!("cannot free builtin entity {id}")));
        }

        let idx = id.index as usize;
        // Was odd/alive, now even/free.
        self.generations[idx] += 1;
        self.records[idx] = None;
        self.free_list.push(id.index);
        self.live_count -= 1;

        Ok(())
    }

    /// Checks if an entity exists and is not stale.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        let idx = id.index as usize;
        if idx >= self.generations.len() {
            return false;
        }
        self.generations[idx] == id.generation && id.generation % 2 == 1
    }

    /// Validates that an entity is live.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is stale or never existed.
    pub fn validate(&self, id: EntityId) -> Result<()> {
        let idx = id.index as usize;

        if idx >= self.generations.len() {
            return Err(Error::entity_not_found(id));
        }

        let current = self.generations[idx];
        if current != id.generation {
            return Err(Error::stale_entity(id));
        }
        if current % 2 == 0 {
            return Err(Error::entity_not_found(id));
        }

        Ok(())
    }

    /// Returns the record of a live entity, if it occupies a table.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        if !self.is_alive(id) {
            return None;
        }
        self.records[id.index as usize].as_ref()
    }

    /// Mutable access to the record of a live entity.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        if !self.is_alive(id) {
            return None;
        }
        self.records[id.index as usize].as_mut()
    }

    /// Installs or replaces the record of a live entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not alive.
    pub fn put(&mut self, id: EntityId, record: EntityRecord) -> Result<()> {
        self.validate(id)?;
        self.records[id.index as usize] = Some(record);
        Ok(())
    }

    /// Resolves an index to its currently live entity, if any.
    ///
    /// Emit-time pair targets may reference a recycled identity; this
    /// returns whoever owns the index now.
    #[must_use]
    pub fn get_current(&self, index: u32) -> Option<EntityId> {
        let generation = *self.generations.get(index as usize)?;
        (generation % 2 == 1).then(|| EntityId::new(index, generation))
    }

    /// Returns the number of live non-builtin entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if no user entities are alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }
}
