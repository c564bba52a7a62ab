//! Port dependency and state-machine specs.

use crate::prelude::World;
use pal_core::{PortId, PortStatus};

#[test]
fn dependency_cycle_is_rejected_without_side_effects() {
    let world = World::new();
    let ports = world.ports();
    for id in ["a", "b", "c"] {
        ports.create(&PortId::new(id), None, None).unwrap();
    }
    // a -> b means "a depends on b"; build a depends-on chain a -> b -> c.
    ports.add_dependency(&PortId::new("a"), &PortId::new("b")).unwrap();
    ports.add_dependency(&PortId::new("b"), &PortId::new("c")).unwrap();

    let err = ports
        .add_dependency(&PortId::new("c"), &PortId::new("a"))
        .unwrap_err();
    assert_eq!(err.kind(), "would_cycle");
    assert!(ports.dependencies(&PortId::new("c")).unwrap().is_empty());
}

#[test]
fn a_failed_dependency_never_readies_the_dependent() {
    let world = World::new();
    let ports = world.ports();
    let session = world.sessions().start(Default::default()).unwrap();

    ports.create(&PortId::new("base"), None, None).unwrap();
    ports.create(&PortId::new("tower"), None, None).unwrap();
    ports
        .add_dependency(&PortId::new("tower"), &PortId::new("base"))
        .unwrap();

    ports.activate(&PortId::new("base"), &session.id, None).unwrap();
    ports
        .update_status(&PortId::new("base"), PortStatus::Failed)
        .unwrap();

    assert!(!ports.ready(&PortId::new("tower")).unwrap());
    assert_eq!(
        ports.get(&PortId::new("tower")).unwrap().status,
        PortStatus::Pending,
        "failure does not cascade to dependents"
    );
}

#[test]
fn one_running_port_per_session() {
    let world = World::new();
    let ports = world.ports();
    let session = world.sessions().start(Default::default()).unwrap();

    ports.create(&PortId::new("one"), None, None).unwrap();
    ports.create(&PortId::new("two"), None, None).unwrap();
    ports.activate(&PortId::new("one"), &session.id, None).unwrap();

    let err = ports
        .activate(&PortId::new("two"), &session.id, None)
        .unwrap_err();
    assert_eq!(err.kind(), "port_busy");
}

#[test]
fn completion_is_atomic_and_idempotent() {
    let world = World::new();
    let ports = world.ports();
    let session = world.sessions().start(Default::default()).unwrap();

    ports.create(&PortId::new("auth"), None, None).unwrap();
    ports.activate(&PortId::new("auth"), &session.id, None).unwrap();
    world.clock.advance_secs(45);

    let done = ports
        .record_completion(&PortId::new("auth"), 500, 120, 0.03)
        .unwrap();
    assert_eq!(done.status, PortStatus::Complete);
    assert_eq!(done.duration_secs, 45);

    // Replayed port-end hook: same terminal state, usage not double-counted.
    let again = ports
        .record_completion(&PortId::new("auth"), 500, 120, 0.03)
        .unwrap();
    assert_eq!(again.input_tokens, 500);
    assert_eq!(again.duration_secs, 45);
}
