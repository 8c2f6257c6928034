//! Integration tests for the (event, id) → observer registry.

use std::cell::Cell;
use std::rc::Rc;

use trestle_event::{EventDesc, ObserverDesc, Term, World};
use trestle_foundation::{EntityId, Event, Id, IdFlags, Value};

fn counter() -> (Rc<Cell<u32>>, impl Fn() -> u32) {
    let count = Rc::new(Cell::new(0));
    let reader = Rc::clone(&count);
    (count, move || reader.get())
}

fn counting_observer(count: &Rc<Cell<u32>>, event: Event, term: Term) -> ObserverDesc {
    let count = Rc::clone(count);
    ObserverDesc::new()
        .event(event)
        .term(term)
        .callback(move |_| count.set(count.get() + 1))
}

// =============================================================================
// Sparsity
// =============================================================================

#[test]
fn unobserved_emits_invoke_nothing() {
    let mut world = World::new();
    let position = world.component("position").unwrap();

    let e = world.spawn();
    world.set(e, position, Value::Int(1)).unwrap();
    world.set(e, position, Value::Int(2)).unwrap();
    world.remove(e, Id::component(position)).unwrap();

    assert_eq!(world.stats().observers_ran(), 0);
    for event in [Event::OnAdd, Event::OnRemove, Event::OnSet, Event::UnSet] {
        assert!(world.observable().record_if(event).is_none());
    }
}

#[test]
fn records_are_erased_when_the_last_observer_leaves() {
    let mut world = World::new();
    let position = world.component("position").unwrap();
    let id = Id::component(position);

    let (count, _) = counter();
    let a = world
        .observe(counting_observer(&count, Event::OnAdd, Term::new(id)))
        .unwrap();
    let b = world
        .observe(counting_observer(&count, Event::OnAdd, Term::new(id)))
        .unwrap();

    let record = world.observable().record(Event::OnAdd).unwrap();
    assert_eq!(record.id_get(id).unwrap().observer_count(), 2);

    world.unobserve(a).unwrap();
    assert!(world
        .observable()
        .record(Event::OnAdd)
        .unwrap()
        .id_get_if(id)
        .is_some());

    world.unobserve(b).unwrap();
    assert!(world
        .observable()
        .record(Event::OnAdd)
        .unwrap()
        .id_get(id)
        .is_none());
    assert!(world.observable().record_if(Event::OnAdd).is_none());
    assert_eq!(world.observable().observer_count(), 0);
}

// =============================================================================
// Wildcard matching
// =============================================================================

#[test]
fn wildcard_observers_match_every_plain_id() {
    let mut world = World::new();
    let position = world.component("position").unwrap();
    let health = world.component("health").unwrap();

    let (count, fired) = counter();
    world
        .observe(counting_observer(&count, Event::OnAdd, Term::new(Id::WILDCARD)))
        .unwrap();

    let e = world.spawn();
    world.set(e, position, Value::Int(1)).unwrap();
    world.set(e, health, Value::Int(2)).unwrap();
    assert_eq!(fired(), 2);
}

#[test]
fn pair_wildcards_match_slot_by_slot() {
    let mut world = World::new();
    let likes = world.relation("likes", IdFlags::default()).unwrap();
    let hates = world.relation("hates", IdFlags::default()).unwrap();

    let alice = world.spawn();
    let bob = world.spawn();
    let carol = world.spawn();

    let (by_relation, relation_fired) = counter();
    world
        .observe(counting_observer(
            &by_relation,
            Event::OnAdd,
            Term::new(Id::pair(likes, EntityId::WILDCARD)),
        ))
        .unwrap();

    let (by_target, target_fired) = counter();
    world
        .observe(counting_observer(
            &by_target,
            Event::OnAdd,
            Term::new(Id::pair(EntityId::WILDCARD, bob)),
        ))
        .unwrap();

    let (any_pair, pair_fired) = counter();
    world
        .observe(counting_observer(
            &any_pair,
            Event::OnAdd,
            Term::new(Id::WILDCARD_PAIR),
        ))
        .unwrap();

    world.add(alice, Id::pair(likes, bob)).unwrap();
    world.add(alice, Id::pair(likes, carol)).unwrap();
    world.add(alice, Id::pair(hates, bob)).unwrap();

    assert_eq!(relation_fired(), 2); // (likes, bob) and (likes, carol)
    assert_eq!(target_fired(), 2); // (likes, bob) and (hates, bob)
    assert_eq!(pair_fired(), 3);
}

#[test]
fn any_observers_match_pairs_and_plain_ids() {
    let mut world = World::new();
    let position = world.component("position").unwrap();
    let likes = world.relation("likes", IdFlags::default()).unwrap();

    let (count, fired) = counter();
    world
        .observe(counting_observer(&count, Event::OnAdd, Term::new(Id::ANY)))
        .unwrap();

    let e = world.spawn();
    let other = world.spawn();
    world.set(e, position, Value::Int(1)).unwrap();
    world.add(e, Id::pair(likes, other)).unwrap();
    assert_eq!(fired(), 2);
}

#[test]
fn all_applicable_records_fire_for_one_id() {
    let mut world = World::new();
    let likes = world.relation("likes", IdFlags::default()).unwrap();
    let alice = world.spawn();
    let bob = world.spawn();

    // Four observers on four different record specificities, all matching
    // the same concrete pair.
    let (count, fired) = counter();
    for pattern in [
        Id::ANY,
        Id::pair(likes, bob),
        Id::pair(EntityId::WILDCARD, bob),
        Id::WILDCARD_PAIR,
    ] {
        world
            .observe(counting_observer(&count, Event::OnAdd, Term::new(pattern)))
            .unwrap();
    }

    world.add(alice, Id::pair(likes, bob)).unwrap();
    assert_eq!(fired(), 4);
}

#[test]
fn one_observer_fires_once_per_batch_even_across_matching_ids() {
    let mut world = World::new();
    let position = world.component("position").unwrap();
    let health = world.component("health").unwrap();

    let (count, fired) = counter();
    world
        .observe(counting_observer(&count, Event::OnAdd, Term::new(Id::WILDCARD)))
        .unwrap();

    // Both ids match the same wildcard record within one logical emit;
    // the dedup counter allows only the first.
    let e = world.spawn();
    world
        .add_ids(e, &[Id::component(position), Id::component(health)])
        .unwrap();
    assert_eq!(fired(), 1);
}

// =============================================================================
// Emit counters
// =============================================================================

#[test]
fn emits_are_counted() {
    let mut world = World::new();
    let position = world.component("position").unwrap();
    world.set_measure_emit_time(true);

    let e = world.spawn();
    world.set(e, position, Value::Int(1)).unwrap();
    let (table, row) = world.location(e).unwrap();
    let ids = [Id::component(position)];
    world.emit(EventDesc::new(Event::OnSet, table, &ids).rows(row, 1));

    // set() emits OnAdd + OnSet, plus the explicit emit.
    assert_eq!(world.stats().emits(), 3);
}
