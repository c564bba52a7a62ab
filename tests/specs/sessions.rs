//! Session lifecycle specs: zombie reaping, lock release, usage invariants.

use std::time::Duration;

use crate::prelude::World;
use pal_core::{HookInput, SessionEventType, SessionStatus, UsageDelta};
use pal_engine::HookHandlers;
use pal_storage::queries;

fn handlers(world: &World) -> HookHandlers<'_> {
    HookHandlers::new(
        &world.store,
        &world.clock,
        &world.ids,
        &world.config,
        world.project.path(),
    )
}

fn hook_input(world: &World, external: &str) -> HookInput {
    HookInput {
        session_id: Some(external.to_string()),
        cwd: Some(world.project.path().display().to_string()),
        ..HookInput::default()
    }
}

#[test]
fn session_start_reaps_forty_eight_hour_zombie() {
    let world = World::new();
    let hooks = handlers(&world);

    let old = hooks
        .session_start(&hook_input(&world, "ext-old"))
        .unwrap()
        .session_id
        .unwrap();
    world.clock.advance_secs(48 * 3600);

    let fresh = hooks
        .session_start(&hook_input(&world, "ext-new"))
        .unwrap()
        .session_id
        .unwrap();
    assert_ne!(old, fresh);

    let old_session = world.sessions().get(&old).unwrap();
    assert_eq!(old_session.status, SessionStatus::Failed);
    let fresh_session = world.sessions().get(&fresh).unwrap();
    assert_eq!(fresh_session.status, SessionStatus::Running);

    let cleanup = world
        .store
        .with_conn(|conn| {
            Ok(queries::events::list(
                conn,
                old.as_str(),
                Some(SessionEventType::ZombieCleanup),
                10,
            )?)
        })
        .unwrap();
    assert_eq!(cleanup.len(), 1);
    assert_eq!(cleanup[0].event_data["cleaned"], 1);
}

#[test]
fn zombie_sweep_spares_sessions_inside_ttl() {
    let world = World::new();
    let sessions = world.sessions();

    let fresh = sessions.start(Default::default()).unwrap();
    world.clock.advance_secs(23 * 3600);

    let reaped = sessions
        .cleanup_zombies(Duration::from_secs(24 * 3600))
        .unwrap();
    assert_eq!(reaped, 0);
    assert_eq!(
        sessions.get(&fresh.id).unwrap().status,
        SessionStatus::Running
    );
}

#[test]
fn ending_a_session_releases_every_lock_it_held() {
    let world = World::new();
    let sessions = world.sessions();
    let session = sessions.start(Default::default()).unwrap();

    world
        .store
        .with_tx(|tx| {
            queries::locks::try_acquire(tx, "schema", session.id.as_str(), &pal_core::Clock::now(&world.clock))?;
            queries::locks::try_acquire(tx, "deploy", session.id.as_str(), &pal_core::Clock::now(&world.clock))?;
            Ok(())
        })
        .unwrap();

    sessions.end(&session.id, "done").unwrap();

    let leftover = world
        .store
        .with_conn(|conn| Ok(queries::locks::list_for_session(conn, session.id.as_str())?))
        .unwrap();
    assert!(leftover.is_empty());
}

#[test]
fn session_usage_covers_its_ports_usage() {
    let world = World::new();
    let sessions = world.sessions();
    let ports = world.ports();
    let session = sessions.start(Default::default()).unwrap();

    ports
        .create(&pal_core::PortId::new("auth"), None, None)
        .unwrap();
    ports
        .activate(&pal_core::PortId::new("auth"), &session.id, None)
        .unwrap();
    ports
        .record_completion(&pal_core::PortId::new("auth"), 800, 200, 0.1)
        .unwrap();
    sessions
        .update_usage(
            &session.id,
            &UsageDelta {
                input_tokens: 1000,
                output_tokens: 300,
                ..UsageDelta::default()
            },
        )
        .unwrap();

    let session = sessions.get(&session.id).unwrap();
    let port = ports.get(&pal_core::PortId::new("auth")).unwrap();
    assert!(
        session.input_tokens + session.output_tokens
            >= port.input_tokens + port.output_tokens
    );
}
