// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pal_core::{FixedClock, SequentialIdGen, SessionStatus};
use pal_storage::queries;
use std::io::Write as _;

struct Fixture {
    store: Store,
    clock: FixedClock,
    ids: SequentialIdGen,
    config: PalConfig,
    project: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: Store::open_in_memory().unwrap(),
            clock: FixedClock::new(1_700_000_000_000),
            ids: SequentialIdGen::new("sess"),
            config: PalConfig::default(),
            project: tempfile::tempdir().unwrap(),
        }
    }

    fn handlers(&self) -> HookHandlers<'_> {
        HookHandlers::new(
            &self.store,
            &self.clock,
            &self.ids,
            &self.config,
            self.project.path(),
        )
    }

    fn input(&self, external: &str) -> HookInput {
        HookInput {
            session_id: Some(external.to_string()),
            cwd: Some(self.project.path().display().to_string()),
            ..HookInput::default()
        }
    }

    fn events_of(
        &self,
        session: &SessionId,
        event_type: SessionEventType,
    ) -> Vec<pal_core::SessionEvent> {
        self.store
            .with_conn(|conn| {
                Ok(queries::events::list(
                    conn,
                    session.as_str(),
                    Some(event_type),
                    50,
                )?)
            })
            .unwrap()
    }
}

#[test]
fn session_start_creates_then_finds_the_same_session() {
    let f = Fixture::new();
    let handlers = f.handlers();

    let first = handlers.session_start(&f.input("ext-1")).unwrap();
    let second = handlers.session_start(&f.input("ext-1")).unwrap();
    assert_eq!(first.session_id, second.session_id);

    let briefing = f.project.path().join(".pal/context/session-briefing.md");
    assert!(briefing.exists());
}

#[test]
fn session_start_reaps_zombies_first() {
    let f = Fixture::new();
    let handlers = f.handlers();

    let old = handlers.session_start(&f.input("ext-old")).unwrap();
    let old_id = old.session_id.unwrap();
    f.clock.advance_secs(48 * 3600);

    let fresh = handlers.session_start(&f.input("ext-new")).unwrap();
    let fresh_id = fresh.session_id.unwrap();
    assert_ne!(old_id, fresh_id);

    let old_session = f
        .store
        .with_conn(|conn| Ok(queries::sessions::get(conn, old_id.as_str())?))
        .unwrap()
        .unwrap();
    assert_eq!(old_session.status, SessionStatus::Failed);

    let cleanup = f.events_of(&old_id, SessionEventType::ZombieCleanup);
    assert_eq!(cleanup.len(), 1);
    assert_eq!(cleanup[0].event_data["cleaned"], 1);
}

#[test]
fn session_start_captures_first_user_message() {
    let f = Fixture::new();
    let handlers = f.handlers();

    let mut transcript = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        transcript,
        r#"{{"type":"user","message":{{"content":"wire the attention tracker"}}}}"#
    )
    .unwrap();

    let mut input = f.input("ext-1");
    input.transcript_path = Some(transcript.path().display().to_string());
    let outcome = handlers.session_start(&input).unwrap();

    let requests = f.events_of(
        outcome.session_id.as_ref().unwrap(),
        SessionEventType::UserRequest,
    );
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].event_data["message"], "wire the attention tracker");
}

#[test]
fn session_end_updates_usage_and_writes_summary() {
    let f = Fixture::new();
    let handlers = f.handlers();
    let started = handlers.session_start(&f.input("ext-1")).unwrap();
    let session_id = started.session_id.unwrap();

    let mut transcript = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        transcript,
        r#"{{"type":"assistant","message":{{"usage":{{"input_tokens":1200,"output_tokens":340}}}}}}"#
    )
    .unwrap();

    let mut input = f.input("ext-1");
    input.transcript_path = Some(transcript.path().display().to_string());
    input.reason = Some("clear".to_string());
    f.clock.advance_secs(600);
    handlers.session_end(&input).unwrap();

    let session = f
        .store
        .with_conn(|conn| Ok(queries::sessions::get(conn, session_id.as_str())?))
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.input_tokens, 1200);
    assert_eq!(session.output_tokens, 340);

    let date = session.started_at.format("%Y-%m-%d").to_string();
    let summary = f
        .project
        .path()
        .join(".pal/sessions")
        .join(format!("{date}-{session_id}.md"));
    assert!(summary.exists());
}

#[test]
fn heavy_session_end_leaves_a_checkpoint_behind() {
    let f = Fixture::new();
    let handlers = f.handlers();
    handlers.session_start(&f.input("ext-1")).unwrap();

    // 170k of 200k crosses the warn threshold when the session closes.
    let mut transcript = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        transcript,
        r#"{{"type":"assistant","message":{{"usage":{{"input_tokens":150000,"output_tokens":20000}}}}}}"#
    )
    .unwrap();

    let mut input = f.input("ext-1");
    input.transcript_path = Some(transcript.path().display().to_string());
    let outcome = handlers.session_end(&input).unwrap();
    let session_id = outcome.session_id.unwrap();

    let checkpoints = f
        .store
        .with_conn(|conn| Ok(queries::attention::list_checkpoints(conn, session_id.as_str())?))
        .unwrap();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(
        checkpoints[0].trigger_type,
        pal_core::CheckpointTrigger::Auto80
    );
}

#[test]
fn pre_compact_records_an_attention_snapshot() {
    let f = Fixture::new();
    let handlers = f.handlers();
    let started = handlers.session_start(&f.input("ext-1")).unwrap();
    let session_id = started.session_id.unwrap();

    handlers.pre_compact(&f.input("ext-1")).unwrap();

    let snapshot = f
        .store
        .with_conn(|conn| Ok(queries::attention::latest_snapshot(conn, session_id.as_str())?))
        .unwrap();
    assert!(snapshot.is_some());
}

#[test]
fn session_end_without_active_session_warns() {
    let f = Fixture::new();
    let outcome = f.handlers().session_end(&f.input("ghost")).unwrap();
    assert!(outcome.warning.is_some());
    assert!(outcome.session_id.is_none());
}

#[test]
fn session_end_reconciles_running_port_to_blocked() {
    let f = Fixture::new();
    let handlers = f.handlers();
    let started = handlers.session_start(&f.input("ext-1")).unwrap();
    let session_id = started.session_id.unwrap();

    let ports = PortManager::new(&f.store, &f.clock);
    ports.create(&PortId::new("auth"), None, None).unwrap();
    ports.activate(&PortId::new("auth"), &session_id, None).unwrap();
    RulesMaterializer::activate_port(
        f.project.path(),
        &RuleSpec::new(PortId::new("auth")),
    )
    .unwrap();

    handlers.session_end(&f.input("ext-1")).unwrap();

    let port = ports.get(&PortId::new("auth")).unwrap();
    assert_eq!(port.status, PortStatus::Blocked);
    assert!(!f.project.path().join(".claude/rules/auth.md").exists());

    let escalations = f.events_of(&session_id, SessionEventType::Escalation);
    assert_eq!(escalations.len(), 1);
}

#[test]
fn pre_tool_use_tracks_edits_against_the_running_port() {
    let f = Fixture::new();
    let handlers = f.handlers();
    let started = handlers.session_start(&f.input("ext-1")).unwrap();
    let session_id = started.session_id.unwrap();

    let ports = PortManager::new(&f.store, &f.clock);
    ports.create(&PortId::new("auth"), None, None).unwrap();
    ports.activate(&PortId::new("auth"), &session_id, None).unwrap();

    let mut input = f.input("ext-1");
    input.tool_name = Some("Edit".to_string());
    input.tool_input = Some(serde_json::json!({"file_path": "src/login.rs"}));
    let outcome = handlers.pre_tool_use(&input).unwrap();
    assert!(outcome.warning.is_none());

    let edits = f.events_of(&session_id, SessionEventType::FileEdit);
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].event_data["file"], "src/login.rs");
    assert_eq!(edits[0].event_data["port_id"], "auth");
}

#[test]
fn pre_tool_use_without_port_warns_untracked() {
    let f = Fixture::new();
    let handlers = f.handlers();
    let started = handlers.session_start(&f.input("ext-1")).unwrap();
    let session_id = started.session_id.unwrap();

    let mut input = f.input("ext-1");
    input.tool_name = Some("Write".to_string());
    input.tool_input = Some(serde_json::json!({"file_path": "README.md"}));
    let outcome = handlers.pre_tool_use(&input).unwrap();
    assert!(outcome.warning.unwrap().contains("not tracked"));

    assert_eq!(f.events_of(&session_id, SessionEventType::UntrackedEdit).len(), 1);
}

#[test]
fn pre_tool_use_ignores_non_edit_tools() {
    let f = Fixture::new();
    let handlers = f.handlers();
    handlers.session_start(&f.input("ext-1")).unwrap();

    let mut input = f.input("ext-1");
    input.tool_name = Some("Bash".to_string());
    let outcome = handlers.pre_tool_use(&input).unwrap();
    assert!(outcome.session_id.is_none());
}

#[test]
fn pre_compact_counts_and_logs() {
    let f = Fixture::new();
    let handlers = f.handlers();
    let started = handlers.session_start(&f.input("ext-1")).unwrap();
    let session_id = started.session_id.unwrap();

    let mut input = f.input("ext-1");
    input.trigger = Some("manual".to_string());
    handlers.pre_compact(&input).unwrap();
    handlers.pre_compact(&input).unwrap();

    let session = f
        .store
        .with_conn(|conn| Ok(queries::sessions::get(conn, session_id.as_str())?))
        .unwrap()
        .unwrap();
    assert_eq!(session.compact_count, 2);
    assert_eq!(f.events_of(&session_id, SessionEventType::Compact).len(), 2);
}

#[test]
fn port_start_twice_is_one_activation() {
    let f = Fixture::new();
    let handlers = f.handlers();
    let started = handlers.session_start(&f.input("ext-1")).unwrap();
    let session_id = started.session_id.unwrap();

    PortManager::new(&f.store, &f.clock)
        .create(&PortId::new("auth"), Some("Auth"), None)
        .unwrap();

    let executor = Executor::new(&f.store, &f.clock, &f.ids, &f.config);
    let input = f.input("ext-1");
    handlers.port_start(&input, &PortId::new("auth"), &executor).unwrap();
    handlers.port_start(&input, &PortId::new("auth"), &executor).unwrap();

    assert!(f.project.path().join(".claude/rules/auth.md").exists());
    assert_eq!(f.events_of(&session_id, SessionEventType::PortStart).len(), 1);
}

#[test]
fn port_end_completes_and_removes_rules() {
    let f = Fixture::new();
    let handlers = f.handlers();
    handlers.session_start(&f.input("ext-1")).unwrap();

    PortManager::new(&f.store, &f.clock)
        .create(&PortId::new("auth"), None, None)
        .unwrap();
    let executor = Executor::new(&f.store, &f.clock, &f.ids, &f.config);
    let input = f.input("ext-1");
    handlers.port_start(&input, &PortId::new("auth"), &executor).unwrap();
    f.clock.advance_secs(60);
    handlers
        .port_end(&input, &PortId::new("auth"), 500, 100, 0.05)
        .unwrap();

    let port = PortManager::new(&f.store, &f.clock)
        .get(&PortId::new("auth"))
        .unwrap();
    assert_eq!(port.status, PortStatus::Complete);
    assert_eq!(port.duration_secs, 60);
    assert!(!f.project.path().join(".claude/rules/auth.md").exists());
}

#[test]
fn sync_twice_is_idempotent() {
    let f = Fixture::new();
    let handlers = f.handlers();
    let started = handlers.session_start(&f.input("ext-1")).unwrap();
    let session_id = started.session_id.unwrap();

    let ports = PortManager::new(&f.store, &f.clock);
    ports.create(&PortId::new("auth"), None, None).unwrap();
    ports.activate(&PortId::new("auth"), &session_id, None).unwrap();

    // Rule file was never written (activation happened outside the hook);
    // the first sync creates it, the second changes nothing.
    let input = f.input("ext-1");
    let first = handlers.sync(&input).unwrap();
    assert_eq!(
        first.response.hook_specific_output.unwrap()["activated"],
        1
    );
    let second = handlers.sync(&input).unwrap();
    assert_eq!(
        second.response.hook_specific_output.unwrap()["activated"],
        0
    );
}

#[test]
fn event_hook_accepts_only_recordable_types() {
    let f = Fixture::new();
    let handlers = f.handlers();
    let started = handlers.session_start(&f.input("ext-1")).unwrap();
    let session_id = started.session_id.unwrap();

    handlers
        .event(&f.input("ext-1"), "decision", Some("go with cursors"))
        .unwrap();
    let decisions = f.events_of(&session_id, SessionEventType::Decision);
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].event_data["message"], "go with cursors");

    let err = handlers
        .event(&f.input("ext-1"), "compact", None)
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_state");
}
