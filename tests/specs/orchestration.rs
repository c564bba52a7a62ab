//! Orchestration end-to-end runs: the happy pair, retries, exhaustion.

use crate::prelude::World;
use pal_core::{MessageSubtype, OrchestrationStatus, PortId, PortStatus, SessionStatus};
use pal_storage::queries;
use serde_json::json;

fn two_port_chain(world: &World) -> pal_core::OrchestrationId {
    let ports = world.ports();
    ports.create(&PortId::new("a"), Some("first"), None).unwrap();
    ports.create(&PortId::new("b"), Some("second"), None).unwrap();
    let executor = world.executor();
    let orch = executor.create(Some("o1"), "chain", None).unwrap();
    executor.add_port(&orch.id, &PortId::new("a"), Some(1), &[]).unwrap();
    executor
        .add_port(&orch.id, &PortId::new("b"), Some(2), &[PortId::new("a")])
        .unwrap();
    orch.id
}

fn pass_port(world: &World, executor: &pal_engine::Executor<'_>, operator: &pal_core::SessionId, port: &str) {
    let worker = world.active_worker(port);
    world.worker_says(
        executor,
        worker.impl_session_id.as_ref().unwrap(),
        operator,
        MessageSubtype::TaskComplete,
        json!({}),
    );
    let worker = world.active_worker(port);
    world.worker_says(
        executor,
        worker.test_session_id.as_ref().unwrap(),
        operator,
        MessageSubtype::TestPass,
        json!({}),
    );
}

#[test]
fn happy_pair_completes_the_chain() {
    let world = World::new();
    let executor = world.executor();
    let operator = world.operator();
    let orch = two_port_chain(&world);

    let state = executor
        .start(&orch, &operator, Some(world.project.path()))
        .unwrap();
    assert_eq!(state.active_workers.len(), 1, "only level zero spawns");

    pass_port(&world, &executor, &operator, "a");

    // A is complete and B's pair spawned without any further nudge.
    assert_eq!(
        world.ports().get(&PortId::new("a")).unwrap().status,
        PortStatus::Complete
    );
    assert_eq!(
        world.ports().get(&PortId::new("b")).unwrap().status,
        PortStatus::Running
    );

    pass_port(&world, &executor, &operator, "b");

    let done = executor.get(&orch).unwrap();
    assert_eq!(done.status, OrchestrationStatus::Complete);
    assert_eq!(done.progress_percent, 100);
}

#[test]
fn retry_then_succeed() {
    let world = World::new();
    let executor = world.executor();
    let operator = world.operator();
    let orch = two_port_chain(&world);
    executor.start(&orch, &operator, None).unwrap();

    pass_port(&world, &executor, &operator, "a");

    // B's first test run fails: a fix_request flows back to the impl half.
    let worker_b = world.active_worker("b");
    world.worker_says(
        &executor,
        worker_b.test_session_id.as_ref().unwrap(),
        &operator,
        MessageSubtype::TestFail,
        json!({"failures": ["TestX"]}),
    );

    let worker_b = world.active_worker("b");
    assert_eq!(worker_b.substatus.as_deref(), Some("fixing"));
    let state = executor.state(&orch).unwrap();
    assert_eq!(state.retry_count.get("b.test"), Some(&1));

    let impl_inbox = world
        .store
        .with_conn(|conn| {
            Ok(queries::messages::list_to_after(
                conn,
                worker_b.impl_session_id.as_ref().unwrap().as_str(),
                0,
                20,
            )?)
        })
        .unwrap();
    assert!(impl_inbox
        .iter()
        .any(|m| m.subtype == MessageSubtype::FixRequest));

    // The fix lands and tests pass.
    world.worker_says(
        &executor,
        worker_b.test_session_id.as_ref().unwrap(),
        &operator,
        MessageSubtype::TestPass,
        json!({}),
    );
    let done = executor.get(&orch).unwrap();
    assert_eq!(done.status, OrchestrationStatus::Complete);
    assert_eq!(done.progress_percent, 100);
}

#[test]
fn max_retries_exhausted_fails_port_and_orchestration() {
    let world = World::new();
    let executor = world.executor();
    let operator = world.operator();
    let orch = two_port_chain(&world);
    executor.start(&orch, &operator, None).unwrap();

    pass_port(&world, &executor, &operator, "a");

    for _ in 0..3 {
        let worker = world.active_worker("b");
        world.worker_says(
            &executor,
            worker.test_session_id.as_ref().unwrap(),
            &operator,
            MessageSubtype::TestFail,
            json!({"failures": ["TestX"]}),
        );
    }

    assert_eq!(
        world.ports().get(&PortId::new("b")).unwrap().status,
        PortStatus::Failed
    );
    let state = executor.state(&orch).unwrap();
    assert_eq!(state.status, OrchestrationStatus::Failed);
    assert!(state.active_workers.is_empty());
    assert_eq!(state.failed, vec![PortId::new("b")]);
}

#[test]
fn cancel_is_idempotent_and_ends_workers_once() {
    let world = World::new();
    let executor = world.executor();
    let operator = world.operator();
    let orch = two_port_chain(&world);
    executor.start(&orch, &operator, None).unwrap();

    let worker = world.active_worker("a");
    let impl_session = worker.impl_session_id.clone().unwrap();

    executor.cancel(&orch).unwrap();
    executor.cancel(&orch).unwrap();

    assert_eq!(
        executor.get(&orch).unwrap().status,
        OrchestrationStatus::Cancelled
    );
    let session = world
        .store
        .with_conn(|conn| Ok(queries::sessions::get(conn, impl_session.as_str())?))
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);

    let end_events = world
        .store
        .with_conn(|conn| {
            Ok(queries::events::list(
                conn,
                impl_session.as_str(),
                Some(pal_core::SessionEventType::SessionEnd),
                10,
            )?)
        })
        .unwrap();
    assert_eq!(end_events.len(), 1, "workers are not double-ended");
}

#[test]
fn progress_tracks_completed_over_total() {
    let world = World::new();
    let executor = world.executor();
    let operator = world.operator();

    let ports = world.ports();
    for id in ["x", "y", "z"] {
        ports.create(&PortId::new(id), None, None).unwrap();
    }
    let orch = executor.create(Some("o1"), "triple", None).unwrap();
    for (i, id) in ["x", "y", "z"].iter().enumerate() {
        executor
            .add_port(&orch.id, &PortId::new(*id), Some(i as u32 + 1), &[])
            .unwrap();
    }
    executor.start(&orch.id, &operator, None).unwrap();

    // All three are independent: everything spawns at once.
    let state = executor.state(&orch.id).unwrap();
    assert_eq!(state.active_workers.len(), 3);

    pass_port(&world, &executor, &operator, "x");
    assert_eq!(executor.get(&orch.id).unwrap().progress_percent, 33);
    pass_port(&world, &executor, &operator, "y");
    assert_eq!(executor.get(&orch.id).unwrap().progress_percent, 67);
    pass_port(&world, &executor, &operator, "z");

    let done = executor.get(&orch.id).unwrap();
    assert_eq!(done.progress_percent, 100);
    assert_eq!(done.status, OrchestrationStatus::Complete);
}
