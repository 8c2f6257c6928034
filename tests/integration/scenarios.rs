//! End-to-end scenarios combining observers, instancing, propagation, and
//! override resolution.

use std::cell::RefCell;
use std::rc::Rc;

use trestle_event::{ObserverDesc, Term, Traverse, World};
use trestle_foundation::{EntityId, Event, Id, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn a_spawned_unit_hears_about_its_whole_loadout() {
    init_tracing();
    let mut world = World::new();
    let armor = world.component("armor").unwrap();
    let speed = world.component("speed").unwrap();

    // Prototype with two components; prefab so regular observers skip it.
    let prototype = world.spawn();
    world
        .modify(prototype)
        .add(Id::component(EntityId::PREFAB))
        .set(armor, Value::Int(2))
        .set(speed, Value::Int(10))
        .apply()
        .unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    for component in [armor, speed] {
        let log = Rc::clone(&seen);
        world
            .observe(
                ObserverDesc::new()
                    .event(Event::OnSet)
                    .term(Term::new(Id::component(component)).with_traverse(Traverse::SelfUp))
                    .callback(move |it| {
                        let value = it.value().expect("value event").clone();
                        log.borrow_mut().push((it.id(), value));
                    }),
            )
            .unwrap();
    }

    // Instancing with one local override announces both components: the
    // local armor and the inherited speed.
    let unit = world.spawn();
    world
        .modify(unit)
        .add_pair(EntityId::IS_A, prototype)
        .set(armor, Value::Int(7))
        .apply()
        .unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&(Id::component(armor), Value::Int(7))));
    assert!(seen.contains(&(Id::component(speed), Value::Int(10))));

    assert_eq!(world.get(unit, armor), Some(Value::Int(7)));
    assert_eq!(world.get(unit, speed), Some(Value::Int(10)));
}

#[test]
fn prototype_edits_ripple_through_a_squad() {
    let mut world = World::new();
    let speed = world.component("speed").unwrap();

    let prototype = world.spawn();
    world.set(prototype, speed, Value::Int(10)).unwrap();

    let squad: Vec<_> = (0..3)
        .map(|_| {
            let unit = world.spawn();
            world
                .add(unit, Id::pair(EntityId::IS_A, prototype))
                .unwrap();
            unit
        })
        .collect();

    let notified = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&notified);
    world
        .observe(
            ObserverDesc::new()
                .event(Event::OnSet)
                .term(Term::new(Id::component(speed)).with_traverse(Traverse::Up))
                .callback(move |it| {
                    for &entity in it.entities() {
                        log.borrow_mut().push(entity);
                    }
                }),
        )
        .unwrap();

    world.set(prototype, speed, Value::Int(12)).unwrap();

    // Every squad member was notified once, and all of them read the new
    // value through the prototype.
    let mut notified = notified.borrow().clone();
    notified.sort_by_key(|e| e.index);
    let mut expected = squad.clone();
    expected.sort_by_key(|e| e.index);
    assert_eq!(notified, expected);
    for unit in &squad {
        assert_eq!(world.get(*unit, speed), Some(Value::Int(12)));
    }
}

#[test]
fn observer_lifecycle_across_a_session() {
    let mut world = World::new();
    let health = world.component("health").unwrap();
    let id = Id::component(health);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let observer = world
        .observe(
            ObserverDesc::new()
                .event(Event::Wildcard)
                .term(Term::new(id))
                .callback(move |it| log.borrow_mut().push(it.event())),
        )
        .unwrap();

    let e = world.spawn();
    world.set(e, health, Value::Int(3)).unwrap();
    world.remove(e, id).unwrap();

    assert_eq!(
        seen.borrow().as_slice(),
        &[Event::OnAdd, Event::OnSet, Event::OnRemove]
    );

    // After unregistration the world goes quiet and the registry is empty
    // again.
    world.unobserve(observer).unwrap();
    world.set(e, health, Value::Int(4)).unwrap();
    assert_eq!(seen.borrow().len(), 3);
    assert!(world.observable().record_if(Event::Wildcard).is_none());
}
