// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bus::{MessageBus, SendSpec};
use crate::ports::PortManager;
use crate::sessions::{SessionManager, StartSession};
use pal_core::{FixedClock, SequentialIdGen};
use pal_storage::queries;
use serde_json::json;

struct Fixture {
    store: Store,
    clock: FixedClock,
    ids: SequentialIdGen,
    config: PalConfig,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: Store::open_in_memory().unwrap(),
            clock: FixedClock::new(1_700_000_000_000),
            ids: SequentialIdGen::new("id"),
            config: PalConfig::default(),
        }
    }

    fn executor(&self) -> Executor<'_> {
        Executor::new(&self.store, &self.clock, &self.ids, &self.config)
    }

    fn operator(&self) -> SessionId {
        SessionManager::new(&self.store, &self.clock, &self.ids)
            .start(StartSession {
                kind: Some(SessionKind::Operator),
                ..StartSession::default()
            })
            .unwrap()
            .id
    }

    /// Orchestration with ports `a` then `b` (b depends on a).
    fn chain(&self, executor: &Executor<'_>) -> OrchestrationId {
        let ports = PortManager::new(&self.store, &self.clock);
        ports.create(&PortId::new("a"), Some("Port A"), None).unwrap();
        ports.create(&PortId::new("b"), Some("Port B"), None).unwrap();
        let orch = executor.create(Some("o1"), "chain", None).unwrap();
        executor.add_port(&orch.id, &PortId::new("a"), Some(1), &[]).unwrap();
        executor
            .add_port(&orch.id, &PortId::new("b"), Some(2), &[PortId::new("a")])
            .unwrap();
        orch.id
    }

    fn active_worker(&self, port: &str) -> WorkerSession {
        self.store
            .with_conn(|conn| Ok(queries::workers::active_for_port(conn, port)?))
            .unwrap()
            .unwrap_or_else(|| panic!("no active worker for {port}"))
    }

    fn port_status(&self, port: &str) -> PortStatus {
        self.store
            .with_conn(|conn| Ok(queries::ports::get(conn, port)?))
            .unwrap()
            .unwrap()
            .status
    }

    fn message_from(
        &self,
        from: &SessionId,
        to: &SessionId,
        subtype: MessageSubtype,
        payload: serde_json::Value,
    ) -> Message {
        let bus = MessageBus::new(&self.store, &self.clock);
        let spec = SendSpec {
            from_session: from.clone(),
            to_session: to.clone(),
            message_type: MessageType::Report,
            subtype,
            port_id: None,
            payload,
            token_count: None,
            conversation_id: None,
        };
        let id = bus.send(&spec).unwrap();
        bus.get(id).unwrap()
    }
}

#[test]
fn start_spawns_only_the_ready_level() {
    let f = Fixture::new();
    let executor = f.executor();
    let operator = f.operator();
    let orch = f.chain(&executor);

    let state = executor.start(&orch, &operator, None).unwrap();
    assert_eq!(state.status, OrchestrationStatus::Running);
    assert_eq!(state.active_workers.len(), 1);

    assert_eq!(f.port_status("a"), PortStatus::Running);
    assert_eq!(f.port_status("b"), PortStatus::Pending);

    let worker = f.active_worker("a");
    assert_eq!(worker.worker_type, WorkerType::ImplTestPair);
    let impl_session = worker.impl_session_id.clone().unwrap();
    let test_session = worker.test_session_id.clone().unwrap();

    // Both halves received task_assign.
    for member in [&impl_session, &test_session] {
        let inbox = f
            .store
            .with_conn(|conn| Ok(queries::messages::list_to_after(conn, member.as_str(), 0, 10)?))
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].subtype, MessageSubtype::TaskAssign);
        assert_eq!(inbox[0].payload["port_id"], "a");
    }
}

#[test]
fn happy_pair_runs_the_chain_to_completion() {
    let f = Fixture::new();
    let executor = f.executor();
    let operator = f.operator();
    let orch = f.chain(&executor);
    executor.start(&orch, &operator, None).unwrap();

    // Impl half of A reports done; the pair moves to testing.
    let worker_a = f.active_worker("a");
    let msg = f.message_from(
        worker_a.impl_session_id.as_ref().unwrap(),
        &operator,
        MessageSubtype::TaskComplete,
        json!({}),
    );
    executor.handle_message(&msg).unwrap();

    let worker_a = f.active_worker("a");
    assert_eq!(worker_a.substatus.as_deref(), Some("testing"));
    let test_inbox = f
        .store
        .with_conn(|conn| {
            Ok(queries::messages::list_to_after(
                conn,
                worker_a.test_session_id.as_ref().unwrap().as_str(),
                0,
                10,
            )?)
        })
        .unwrap();
    assert!(test_inbox
        .iter()
        .any(|m| m.subtype == MessageSubtype::ImplReady));

    // Tests pass: A completes, the next level (B) spawns.
    let msg = f.message_from(
        worker_a.test_session_id.as_ref().unwrap(),
        &operator,
        MessageSubtype::TestPass,
        json!({"input_tokens": 800, "output_tokens": 150}),
    );
    executor.handle_message(&msg).unwrap();

    assert_eq!(f.port_status("a"), PortStatus::Complete);
    assert_eq!(f.port_status("b"), PortStatus::Running);
    let state = executor.state(&orch).unwrap();
    assert_eq!(state.progress_percent, 50);
    assert_eq!(state.completed, vec![PortId::new("a")]);

    // A's member sessions ended with the pair.
    let impl_a = f
        .store
        .with_conn(|conn| {
            Ok(queries::sessions::get(
                conn,
                worker_a.impl_session_id.as_ref().unwrap().as_str(),
            )?)
        })
        .unwrap()
        .unwrap();
    assert_eq!(impl_a.status, SessionStatus::Complete);

    // B passes too: the orchestration completes at 100%.
    let worker_b = f.active_worker("b");
    let msg = f.message_from(
        worker_b.test_session_id.as_ref().unwrap(),
        &operator,
        MessageSubtype::TestPass,
        json!({}),
    );
    executor.handle_message(&msg).unwrap();

    let state = executor.state(&orch).unwrap();
    assert_eq!(state.status, OrchestrationStatus::Complete);
    assert_eq!(state.progress_percent, 100);
    assert!(state.active_workers.is_empty());

    // Port A picked up the usage reported with test_pass.
    let port_a = f
        .store
        .with_conn(|conn| Ok(queries::ports::get(conn, "a")?))
        .unwrap()
        .unwrap();
    assert_eq!(port_a.input_tokens, 800);
}

#[test]
fn test_fail_under_budget_sends_fix_request() {
    let f = Fixture::new();
    let executor = f.executor();
    let operator = f.operator();
    let orch = f.chain(&executor);
    executor.start(&orch, &operator, None).unwrap();

    let worker = f.active_worker("a");
    let msg = f.message_from(
        worker.test_session_id.as_ref().unwrap(),
        &operator,
        MessageSubtype::TestFail,
        json!({"failures": ["TestX"]}),
    );
    executor.handle_message(&msg).unwrap();

    let worker = f.active_worker("a");
    assert_eq!(worker.substatus.as_deref(), Some("fixing"));
    assert_eq!(worker.status, WorkerStatus::Running);

    let impl_inbox = f
        .store
        .with_conn(|conn| {
            Ok(queries::messages::list_to_after(
                conn,
                worker.impl_session_id.as_ref().unwrap().as_str(),
                0,
                10,
            )?)
        })
        .unwrap();
    let fix = impl_inbox
        .iter()
        .find(|m| m.subtype == MessageSubtype::FixRequest)
        .expect("fix_request sent to impl");
    assert_eq!(fix.payload["failures"][0], "TestX");

    let state = executor.state(&orch).unwrap();
    assert_eq!(state.retry_count.get("a.test"), Some(&1));

    // A later pass still completes the port.
    let msg = f.message_from(
        worker.test_session_id.as_ref().unwrap(),
        &operator,
        MessageSubtype::TestPass,
        json!({}),
    );
    executor.handle_message(&msg).unwrap();
    assert_eq!(f.port_status("a"), PortStatus::Complete);
}

#[test]
fn exhausted_test_retries_fail_the_port_and_orchestration() {
    let f = Fixture::new();
    let executor = f.executor();
    let operator = f.operator();

    let ports = PortManager::new(&f.store, &f.clock);
    ports.create(&PortId::new("only"), None, None).unwrap();
    let orch = executor.create(Some("o1"), "solo", None).unwrap();
    executor.add_port(&orch.id, &PortId::new("only"), Some(1), &[]).unwrap();
    executor.start(&orch.id, &operator, None).unwrap();

    for round in 0..3 {
        let worker = f.active_worker("only");
        let msg = f.message_from(
            worker.test_session_id.as_ref().unwrap(),
            &operator,
            MessageSubtype::TestFail,
            json!({"failures": [format!("Round{round}")]}),
        );
        executor.handle_message(&msg).unwrap();
    }

    assert_eq!(f.port_status("only"), PortStatus::Failed);
    let state = executor.state(&orch.id).unwrap();
    assert_eq!(state.status, OrchestrationStatus::Failed);
    assert!(state.active_workers.is_empty());
    assert_eq!(state.failed, vec![PortId::new("only")]);
}

#[test]
fn failed_dependency_leaves_dependent_pending_and_orchestration_failed() {
    let f = Fixture::new();
    let executor = f.executor();
    let operator = f.operator();
    let orch = f.chain(&executor);
    executor.start(&orch, &operator, None).unwrap();

    // A's tests fail three times; B never becomes ready.
    for _ in 0..3 {
        let worker = f.active_worker("a");
        let msg = f.message_from(
            worker.test_session_id.as_ref().unwrap(),
            &operator,
            MessageSubtype::TestFail,
            json!({}),
        );
        executor.handle_message(&msg).unwrap();
    }

    assert_eq!(f.port_status("a"), PortStatus::Failed);
    assert_eq!(f.port_status("b"), PortStatus::Pending);
    let state = executor.state(&orch).unwrap();
    assert_eq!(state.status, OrchestrationStatus::Failed);
}

#[test]
fn task_failed_resets_port_for_retry_with_a_fresh_pair() {
    let f = Fixture::new();
    let executor = f.executor();
    let operator = f.operator();

    let ports = PortManager::new(&f.store, &f.clock);
    ports.create(&PortId::new("only"), None, None).unwrap();
    let orch = executor.create(Some("o1"), "solo", None).unwrap();
    executor.add_port(&orch.id, &PortId::new("only"), Some(1), &[]).unwrap();
    executor.start(&orch.id, &operator, None).unwrap();

    let first = f.active_worker("only");
    let msg = f.message_from(
        first.impl_session_id.as_ref().unwrap(),
        &operator,
        MessageSubtype::TaskFailed,
        json!({"error": "build broke"}),
    );
    executor.handle_message(&msg).unwrap();

    // A fresh pair covers the port; the old worker is terminal.
    let second = f.active_worker("only");
    assert_ne!(first.id, second.id);
    assert_eq!(f.port_status("only"), PortStatus::Running);

    let state = executor.state(&orch.id).unwrap();
    assert_eq!(state.retry_count.get("only"), Some(&1));
    assert_eq!(state.status, OrchestrationStatus::Running);
}

#[test]
fn task_blocked_marks_the_worker() {
    let f = Fixture::new();
    let executor = f.executor();
    let operator = f.operator();
    let orch = f.chain(&executor);
    executor.start(&orch, &operator, None).unwrap();

    let worker = f.active_worker("a");
    let msg = f.message_from(
        worker.impl_session_id.as_ref().unwrap(),
        &operator,
        MessageSubtype::TaskBlocked,
        json!({"reason": "needs credentials"}),
    );
    executor.handle_message(&msg).unwrap();

    let worker = f.active_worker("a");
    assert_eq!(worker.status, WorkerStatus::Blocked);
}

#[test]
fn pause_holds_scheduling_and_resume_releases_it() {
    let f = Fixture::new();
    let executor = f.executor();
    let operator = f.operator();
    let orch = f.chain(&executor);
    executor.start(&orch, &operator, None).unwrap();

    executor.pause(&orch).unwrap();

    // A completes while paused; B must not spawn.
    let worker = f.active_worker("a");
    let msg = f.message_from(
        worker.test_session_id.as_ref().unwrap(),
        &operator,
        MessageSubtype::TestPass,
        json!({}),
    );
    executor.handle_message(&msg).unwrap();
    assert_eq!(f.port_status("a"), PortStatus::Complete);
    assert_eq!(f.port_status("b"), PortStatus::Pending);

    executor.resume(&orch).unwrap();
    assert_eq!(f.port_status("b"), PortStatus::Running);
}

#[test]
fn cancel_twice_does_not_double_end_workers() {
    let f = Fixture::new();
    let executor = f.executor();
    let operator = f.operator();
    let orch = f.chain(&executor);
    executor.start(&orch, &operator, None).unwrap();
    let worker = f.active_worker("a");
    let impl_session = worker.impl_session_id.clone().unwrap();

    executor.cancel(&orch).unwrap();
    let state = executor.state(&orch).unwrap();
    assert_eq!(state.status, OrchestrationStatus::Cancelled);
    assert!(state.active_workers.is_empty());

    let session = f
        .store
        .with_conn(|conn| Ok(queries::sessions::get(conn, impl_session.as_str())?))
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);

    // Second cancel: no-op, still exactly one session_end event.
    executor.cancel(&orch).unwrap();
    let end_events = f
        .store
        .with_conn(|conn| {
            Ok(queries::events::list(
                conn,
                impl_session.as_str(),
                Some(SessionEventType::SessionEnd),
                10,
            )?)
        })
        .unwrap();
    assert_eq!(end_events.len(), 1);
}

#[test]
fn rules_files_follow_worker_lifecycles() {
    let f = Fixture::new();
    let executor = f.executor();
    let dir = tempfile::tempdir().unwrap();
    let operator = f.operator();
    let orch = f.chain(&executor);
    executor.start(&orch, &operator, Some(dir.path())).unwrap();

    let rule_a = dir.path().join(".claude/rules/a.md");
    assert!(rule_a.exists(), "rule materialized on spawn");

    let worker = f.active_worker("a");
    let msg = f.message_from(
        worker.test_session_id.as_ref().unwrap(),
        &operator,
        MessageSubtype::TestPass,
        json!({}),
    );
    executor.handle_message(&msg).unwrap();

    assert!(!rule_a.exists(), "rule removed on completion");
    assert!(dir.path().join(".claude/rules/b.md").exists());
}

#[test]
fn add_port_rejects_cycles_and_duplicates() {
    let f = Fixture::new();
    let executor = f.executor();
    let ports = PortManager::new(&f.store, &f.clock);
    ports.create(&PortId::new("a"), None, None).unwrap();
    ports.create(&PortId::new("b"), None, None).unwrap();
    let orch = executor.create(None, "demo", None).unwrap();

    executor
        .add_port(&orch.id, &PortId::new("a"), None, &[PortId::new("b")])
        .unwrap();
    let err = executor
        .add_port(&orch.id, &PortId::new("b"), None, &[PortId::new("a")])
        .unwrap_err();
    assert_eq!(err.kind(), "would_cycle");

    let err = executor
        .add_port(&orch.id, &PortId::new("a"), None, &[])
        .unwrap_err();
    assert_eq!(err.kind(), "already_exists");
}
