//! Integration tests for table storage through the world API.

use trestle_event::World;
use trestle_foundation::{EntityId, Id, Value};

#[test]
fn adding_components_moves_entities_between_tables() {
    let mut world = World::new();
    let position = world.component("position").unwrap();
    let velocity = world.component("velocity").unwrap();

    let e = world.spawn();
    let (root, _) = world.location(e).unwrap();

    world.set(e, position, Value::Int(1)).unwrap();
    let (with_position, _) = world.location(e).unwrap();
    assert_ne!(root, with_position);

    world.set(e, velocity, Value::Int(2)).unwrap();
    let (with_both, _) = world.location(e).unwrap();
    assert_ne!(with_position, with_both);

    // Values survive the moves.
    assert_eq!(world.get(e, position), Some(Value::Int(1)));
    assert_eq!(world.get(e, velocity), Some(Value::Int(2)));
}

#[test]
fn tables_are_interned_by_exact_type() {
    let mut world = World::new();
    let position = world.component("position").unwrap();

    let e1 = world.spawn();
    let e2 = world.spawn();
    world.set(e1, position, Value::Int(1)).unwrap();
    world.set(e2, position, Value::Int(2)).unwrap();

    let (t1, r1) = world.location(e1).unwrap();
    let (t2, r2) = world.location(e2).unwrap();
    assert_eq!(t1, t2);
    assert_ne!(r1, r2);
}

#[test]
fn swap_remove_keeps_rows_dense() {
    let mut world = World::new();
    let position = world.component("position").unwrap();

    let e1 = world.spawn();
    let e2 = world.spawn();
    let e3 = world.spawn();
    for (i, e) in [e1, e2, e3].into_iter().enumerate() {
        world.set(e, position, Value::Int(i64::try_from(i).unwrap())).unwrap();
    }

    // Removing the first row moves the last entity into its place.
    world.despawn(e1).unwrap();

    let (table, row) = world.location(e3).unwrap();
    assert_eq!(row, 0);
    assert_eq!(world.tables().get(table).len(), 2);
    assert_eq!(world.get(e3, position), Some(Value::Int(2)));
    assert_eq!(world.get(e2, position), Some(Value::Int(1)));
}

#[test]
fn table_flags_derive_from_the_component_set() {
    let mut world = World::new();
    let position = world.component("position").unwrap();

    let prototype = world.spawn();
    world
        .modify(prototype)
        .add(Id::component(EntityId::PREFAB))
        .set(position, Value::Int(0))
        .apply()
        .unwrap();
    let (table, _) = world.location(prototype).unwrap();
    assert!(world.tables().get(table).flags().is_prefab);

    let instance = world.spawn();
    world
        .add(instance, Id::pair(EntityId::IS_A, prototype))
        .unwrap();
    let (table, _) = world.location(instance).unwrap();
    assert!(world.tables().get(table).flags().has_is_a);

    let disabled = world.spawn();
    world
        .add(disabled, Id::component(EntityId::DISABLED))
        .unwrap();
    let (table, _) = world.location(disabled).unwrap();
    assert!(world.tables().get(table).flags().is_disabled);
}

#[test]
fn removing_an_absent_id_is_a_no_op() {
    let mut world = World::new();
    let position = world.component("position").unwrap();

    let e = world.spawn();
    let before = world.location(e).unwrap();
    world.remove(e, Id::component(position)).unwrap();
    assert_eq!(world.location(e).unwrap(), before);
}

#[test]
fn wildcard_ids_cannot_be_added() {
    let mut world = World::new();
    let e = world.spawn();
    assert!(world.add(e, Id::WILDCARD).is_err());
    assert!(world.add(e, Id::ANY).is_err());
}

#[test]
fn unregistered_components_cannot_be_added() {
    let mut world = World::new();
    let e = world.spawn();
    let bogus = EntityId::new(4000, 1);
    assert!(world.add(e, Id::component(bogus)).is_err());
}
