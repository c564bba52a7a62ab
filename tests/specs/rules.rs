//! Rules materialization specs: sync reconciliation and idempotence.

use crate::prelude::World;
use pal_core::{HookInput, PortId};
use pal_engine::HookHandlers;

fn handlers(world: &World) -> HookHandlers<'_> {
    HookHandlers::new(
        &world.store,
        &world.clock,
        &world.ids,
        &world.config,
        world.project.path(),
    )
}

fn input(world: &World) -> HookInput {
    HookInput {
        session_id: Some("ext-1".to_string()),
        cwd: Some(world.project.path().display().to_string()),
        ..HookInput::default()
    }
}

#[test]
fn sync_recreates_an_externally_deleted_rule_file() {
    let world = World::new();
    let hooks = handlers(&world);
    hooks.session_start(&input(&world)).unwrap();

    world
        .ports()
        .create(&PortId::new("p1"), Some("Port one"), None)
        .unwrap();
    let executor = world.executor();
    hooks
        .port_start(&input(&world), &PortId::new("p1"), &executor)
        .unwrap();

    let rule = world.project.path().join(".claude/rules/p1.md");
    assert!(rule.exists());

    // Someone deletes the file behind our back.
    std::fs::remove_file(&rule).unwrap();

    let outcome = hooks.sync(&input(&world)).unwrap();
    let counts = outcome.response.hook_specific_output.unwrap();
    assert_eq!(counts["activated"], 1);
    assert_eq!(counts["deactivated"], 0);

    let content = std::fs::read_to_string(&rule).unwrap();
    assert!(content.starts_with("<!-- pal:rule p1 -->"));
}

#[test]
fn sync_twice_with_no_changes_is_a_no_op() {
    let world = World::new();
    let hooks = handlers(&world);
    hooks.session_start(&input(&world)).unwrap();

    world.ports().create(&PortId::new("p1"), None, None).unwrap();
    let executor = world.executor();
    hooks
        .port_start(&input(&world), &PortId::new("p1"), &executor)
        .unwrap();

    let first = hooks.sync(&input(&world)).unwrap();
    let counts = first.response.hook_specific_output.unwrap();
    assert_eq!(counts["activated"], 0);
    assert_eq!(counts["deactivated"], 0);

    let listing_before = std::fs::read_dir(world.project.path().join(".claude/rules"))
        .unwrap()
        .count();
    let second = hooks.sync(&input(&world)).unwrap();
    let counts = second.response.hook_specific_output.unwrap();
    assert_eq!(counts["activated"], 0);
    assert_eq!(counts["deactivated"], 0);
    let listing_after = std::fs::read_dir(world.project.path().join(".claude/rules"))
        .unwrap()
        .count();
    assert_eq!(listing_before, listing_after);
}

#[test]
fn repeated_port_start_is_one_activation() {
    let world = World::new();
    let hooks = handlers(&world);
    let session = hooks
        .session_start(&input(&world))
        .unwrap()
        .session_id
        .unwrap();

    world.ports().create(&PortId::new("p1"), None, None).unwrap();
    let executor = world.executor();
    hooks
        .port_start(&input(&world), &PortId::new("p1"), &executor)
        .unwrap();
    hooks
        .port_start(&input(&world), &PortId::new("p1"), &executor)
        .unwrap();

    assert!(world.project.path().join(".claude/rules/p1.md").exists());
    let events = world
        .store
        .with_conn(|conn| {
            Ok(pal_storage::queries::events::list(
                conn,
                session.as_str(),
                Some(pal_core::SessionEventType::PortStart),
                10,
            )?)
        })
        .unwrap();
    assert_eq!(events.len(), 1, "no duplicated port_start events");
}
