// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::Store;
use pal_core::{Clock, FixedClock};

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

fn snapshot(session: &str, loaded: i64, clock: &impl Clock) -> AttentionSnapshot {
    AttentionSnapshot {
        session_id: SessionId::new(session),
        port_id: None,
        loaded_tokens: loaded,
        available_tokens: 200_000 - loaded,
        focus_score: pal_core::focus_score(loaded, 200_000, 0),
        compact_count: 0,
        created_at: clock.now(),
    }
}

fn checkpoint(id: &str, session: &str, trigger: CheckpointTrigger, clock: &impl Clock) -> Checkpoint {
    Checkpoint {
        id: id.to_string(),
        session_id: SessionId::new(session),
        port_id: Some(PortId::new("p1")),
        trigger_type: trigger,
        tokens_used: 160_000,
        token_budget: 200_000,
        summary: "switched to cursor-based delivery".to_string(),
        active_files: vec!["src/bus.rs".to_string()],
        key_points: vec!["cursors dedupe on id".to_string()],
        created_at: clock.now(),
    }
}

#[test]
fn latest_snapshot_wins() {
    let store = store();
    let clock = FixedClock::new(1_000_000);
    store
        .with_tx(|tx| {
            insert_snapshot(tx, &snapshot("s1", 10_000, &clock))?;
            clock.advance_secs(10);
            insert_snapshot(tx, &snapshot("s1", 50_000, &clock))?;
            Ok(())
        })
        .unwrap();

    let latest = store
        .with_conn(|conn| Ok(latest_snapshot(conn, "s1")?))
        .unwrap()
        .unwrap();
    assert_eq!(latest.loaded_tokens, 50_000);
}

#[test]
fn missing_snapshot_is_none() {
    let store = store();
    assert!(store
        .with_conn(|conn| Ok(latest_snapshot(conn, "nope")?))
        .unwrap()
        .is_none());
}

#[test]
fn checkpoint_roundtrip_preserves_lists() {
    let store = store();
    let clock = FixedClock::new(1_000_000);
    store
        .with_tx(|tx| {
            Ok(insert_checkpoint(
                tx,
                &checkpoint("cp1", "s1", CheckpointTrigger::Auto80, &clock),
            )?)
        })
        .unwrap();

    let cp = store
        .with_conn(|conn| Ok(latest_checkpoint(conn, "s1", CheckpointTrigger::Auto80)?))
        .unwrap()
        .unwrap();
    assert_eq!(cp.active_files, vec!["src/bus.rs"]);
    assert_eq!(cp.key_points, vec!["cursors dedupe on id"]);
    assert_eq!(cp.port_id.as_ref().map(|p| p.as_str()), Some("p1"));
}

#[test]
fn latest_checkpoint_is_per_trigger() {
    let store = store();
    let clock = FixedClock::new(1_000_000);
    store
        .with_tx(|tx| {
            insert_checkpoint(tx, &checkpoint("cp1", "s1", CheckpointTrigger::Auto80, &clock))?;
            clock.advance_secs(60);
            insert_checkpoint(tx, &checkpoint("cp2", "s1", CheckpointTrigger::Auto90, &clock))?;
            Ok(())
        })
        .unwrap();

    let eighty = store
        .with_conn(|conn| Ok(latest_checkpoint(conn, "s1", CheckpointTrigger::Auto80)?))
        .unwrap()
        .unwrap();
    assert_eq!(eighty.id, "cp1");

    let all = store
        .with_conn(|conn| Ok(list_checkpoints(conn, "s1")?))
        .unwrap();
    assert_eq!(all.len(), 2);
}
