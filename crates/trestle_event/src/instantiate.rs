//! Prototype instantiation.
//!
//! When an IsA pair is added to a row range, the prototype's `ChildOf`
//! sub-tree is copied onto each fresh instance: every prefab child is
//! spawned again with the same ids and values, parented to the instance.
//! Runs exactly once per fresh IsA addition, before override handling; the
//! copies' own notifications flow through the normal emit path while the
//! instantiation guard suppresses re-entry.

use trestle_foundation::{EntityId, Id, Value};
use trestle_storage::TableId;

use crate::world::World;

pub(crate) fn instantiate(
    world: &mut World,
    prototype: EntityId,
    table: TableId,
    offset: usize,
    count: usize,
) {
    let instances: Vec<EntityId> = {
        let table = world.tables().get(table);
        let end = (offset + count).min(table.len());
        table.entities()[offset..end].to_vec()
    };
    for instance in instances {
        copy_children(world, prototype, instance);
    }
}

/// One child to duplicate: its tag/pair ids and its component values.
struct ChildCopy {
    source: EntityId,
    adds: Vec<Id>,
    sets: Vec<(EntityId, Value)>,
}

fn copy_children(world: &mut World, from: EntityId, to: EntityId) {
    let child_of_from = Id::pair(EntityId::CHILD_OF, from);
    let Some(record) = world.id_index().get(child_of_from) else {
        return;
    };

    let child_tables: Vec<TableId> = record.tables().map(|(table, _)| table).collect();
    let mut jobs: Vec<ChildCopy> = Vec::new();

    for table_id in child_tables {
        let table = world.tables().get(table_id);
        for row in 0..table.len() {
            let mut copy = ChildCopy {
                source: table.entities()[row],
                adds: Vec::new(),
                sets: Vec::new(),
            };
            for (position, &id) in table.ids().iter().enumerate() {
                if id == child_of_from {
                    continue;
                }
                // Prefab markers and other non-inheritable ids stay behind;
                // the copies are live entities.
                if world.id_index().flags_of(id).dont_inherit {
                    continue;
                }
                if let Some(column) = table.column(position) {
                    if let Id::Component(component) = id {
                        copy.sets.push((component, column.borrow()[row].clone()));
                    }
                } else {
                    copy.adds.push(id);
                }
            }
            jobs.push(copy);
        }
    }

    for job in jobs {
        let spawned = world.spawn();
        let mut modify = world.modify(spawned);
        for id in job.adds {
            modify = modify.add(id);
        }
        modify = modify.add_pair(EntityId::CHILD_OF, to);
        for (component, value) in job.sets {
            modify = modify.set(component, value);
        }
        modify
            .apply()
            .expect("instantiated child copy must apply cleanly");

        copy_children(world, job.source, spawned);
    }
}
