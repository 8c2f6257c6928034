//! Integration tests for prototype instantiation.

use trestle_event::World;
use trestle_foundation::{EntityId, Id, Value};

fn children_of(world: &World, parent: EntityId) -> Vec<EntityId> {
    let Some(record) = world.id_index().get(Id::pair(EntityId::CHILD_OF, parent)) else {
        return Vec::new();
    };
    record
        .tables()
        .flat_map(|(table, _)| world.tables().get(table).entities().to_vec())
        .collect()
}

#[test]
fn instancing_copies_the_prototype_child_tree() {
    let mut world = World::new();
    let health = world.component("health").unwrap();
    let mana = world.component("mana").unwrap();

    // A prefab turret with a barrel child and a sight grandchild.
    let turret = world.spawn();
    world.add(turret, Id::component(EntityId::PREFAB)).unwrap();

    let barrel = world.spawn();
    world
        .modify(barrel)
        .add(Id::component(EntityId::PREFAB))
        .add_pair(EntityId::CHILD_OF, turret)
        .set(health, Value::Int(10))
        .apply()
        .unwrap();

    let sight = world.spawn();
    world
        .modify(sight)
        .add(Id::component(EntityId::PREFAB))
        .add_pair(EntityId::CHILD_OF, barrel)
        .set(mana, Value::Int(3))
        .apply()
        .unwrap();

    let instance = world.spawn();
    world.add(instance, Id::pair(EntityId::IS_A, turret)).unwrap();

    // One barrel copy, parented to the instance, carrying the value but
    // not the prefab tag.
    let copies = children_of(&world, instance);
    assert_eq!(copies.len(), 1);
    let barrel_copy = copies[0];
    assert_ne!(barrel_copy, barrel);
    assert_eq!(world.get(barrel_copy, health), Some(Value::Int(10)));
    assert!(!world.has(barrel_copy, Id::component(EntityId::PREFAB)));

    // The grandchild came along, one level down.
    let grandcopies = children_of(&world, barrel_copy);
    assert_eq!(grandcopies.len(), 1);
    assert_eq!(world.get(grandcopies[0], mana), Some(Value::Int(3)));

    // The prototype tree itself is untouched.
    assert_eq!(children_of(&world, turret), vec![barrel]);
}

#[test]
fn instantiation_runs_once_per_fresh_is_a_addition() {
    let mut world = World::new();
    let health = world.component("health").unwrap();

    let prototype = world.spawn();
    let child = world.spawn();
    world
        .modify(child)
        .add_pair(EntityId::CHILD_OF, prototype)
        .set(health, Value::Int(1))
        .apply()
        .unwrap();

    let a = world.spawn();
    let b = world.spawn();
    world.add(a, Id::pair(EntityId::IS_A, prototype)).unwrap();
    world.add(b, Id::pair(EntityId::IS_A, prototype)).unwrap();

    assert_eq!(children_of(&world, a).len(), 1);
    assert_eq!(children_of(&world, b).len(), 1);
    // The prototype still has exactly its original child.
    assert_eq!(children_of(&world, prototype).len(), 1);
}

#[test]
fn despawning_a_prototype_leaves_instances_detached() {
    let mut world = World::new();
    let armor = world.component("armor").unwrap();

    let prototype = world.spawn();
    world.set(prototype, armor, Value::Int(4)).unwrap();

    let instance = world.spawn();
    world
        .add(instance, Id::pair(EntityId::IS_A, prototype))
        .unwrap();
    assert_eq!(world.get(instance, armor), Some(Value::Int(4)));

    world.despawn(prototype).unwrap();

    // The dangling pair resolves to nothing; reads and further mutation
    // stay silent rather than failing.
    assert_eq!(world.get(instance, armor), None);
    world.set(instance, armor, Value::Int(6)).unwrap();
    assert_eq!(world.get(instance, armor), Some(Value::Int(6)));
}
