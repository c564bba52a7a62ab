// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration executor.
//!
//! Drives an orchestration's atomic ports to completion: discovers ready
//! ports level by level, spawns impl/test worker session pairs, brokers
//! their messages, and applies the retry policy. The store is authoritative;
//! the in-memory map here only caches per-orchestration metadata and
//! provides the critical section that serializes `process_next_ports` and
//! `handle_worker_complete` for the same orchestration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use pal_core::{
    Clock, Error, IdGen, Message, MessageSubtype, MessageType, Orchestration, OrchestrationId,
    OrchestrationStatus, PalConfig, PortId, PortStatus, Result, Session, SessionEventType,
    SessionId, SessionKind, SessionStatus, WorkerId, WorkerResult, WorkerSession, WorkerStatus,
    WorkerType,
};
use pal_storage::queries::{events, locks, messages, orchestrations, ports, sessions, workers};
use pal_storage::{Store, Transaction};

use crate::graph::DependencyGraph;
use crate::rules::{RuleSpec, RulesMaterializer};

/// Cached per-orchestration execution metadata.
#[derive(Debug, Clone)]
struct OrchMeta {
    operator_session_id: SessionId,
    project_root: Option<PathBuf>,
}

/// Snapshot of an orchestration's execution, for `show` and tests.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionState {
    pub orchestration_id: OrchestrationId,
    pub operator_session_id: Option<SessionId>,
    pub status: OrchestrationStatus,
    pub progress_percent: u32,
    pub active_workers: Vec<WorkerId>,
    pub completed: Vec<PortId>,
    pub failed: Vec<PortId>,
    /// Retry counters keyed `<port>` (impl) and `<port>.test`.
    pub retry_count: HashMap<String, u32>,
}

pub struct Executor<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    ids: &'a dyn IdGen,
    config: &'a PalConfig,
    sections: Mutex<HashMap<String, Arc<Mutex<Option<OrchMeta>>>>>,
}

impl<'a> Executor<'a> {
    pub fn new(
        store: &'a Store,
        clock: &'a dyn Clock,
        ids: &'a dyn IdGen,
        config: &'a PalConfig,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            config,
            sections: Mutex::new(HashMap::new()),
        }
    }

    // ── authoring ───────────────────────────────────────────────────────────

    /// Create an orchestration in `pending`.
    pub fn create(
        &self,
        id: Option<&str>,
        title: &str,
        description: Option<&str>,
    ) -> Result<Orchestration> {
        let now = self.clock.now();
        let id = OrchestrationId::new(match id {
            Some(explicit) => explicit.to_string(),
            None => format!("orch-{}", self.ids.next_short()),
        });
        self.store.with_tx(|tx| {
            if orchestrations::get(tx, id.as_str())?.is_some() {
                return Err(Error::already_exists("orchestration", id.as_str()));
            }
            let orchestration = Orchestration {
                id: id.clone(),
                title: title.to_string(),
                description: description.map(str::to_string),
                status: OrchestrationStatus::Pending,
                current_port_id: None,
                progress_percent: 0,
                atomic_ports: vec![],
                created_at: now,
                updated_at: now,
            };
            orchestrations::insert(tx, &orchestration)?;
            tracing::info!(orchestration = %id, "orchestration created");
            Ok(orchestration)
        })
    }

    /// Append an atomic port with ordering and dependencies. The port must
    /// already exist; edges are checked for cycles.
    pub fn add_port(
        &self,
        orchestration_id: &OrchestrationId,
        port_id: &PortId,
        order: Option<u32>,
        depends_on: &[PortId],
    ) -> Result<Orchestration> {
        self.store.with_tx(|tx| {
            let orchestration = orchestrations::get(tx, orchestration_id.as_str())?
                .ok_or_else(|| Error::not_found("orchestration", orchestration_id.as_str()))?;
            if orchestration.status.is_terminal() {
                return Err(Error::InvalidState(format!(
                    "orchestration {orchestration_id} is {}",
                    orchestration.status
                )));
            }
            if !ports::exists(tx, port_id.as_str())? {
                return Err(Error::not_found("port", port_id.as_str()));
            }
            if orchestration
                .atomic_ports
                .iter()
                .any(|p| p.port_id == *port_id)
            {
                return Err(Error::already_exists("atomic port", port_id.as_str()));
            }

            let position = order.unwrap_or_else(|| {
                orchestration
                    .atomic_ports
                    .iter()
                    .map(|p| p.order)
                    .max()
                    .map(|m| m + 1)
                    .unwrap_or(1)
            });
            orchestrations::add_atomic_port(tx, orchestration_id.as_str(), port_id.as_str(), position)?;

            for dep in depends_on {
                if !ports::exists(tx, dep.as_str())? {
                    return Err(Error::not_found("port", dep.as_str()));
                }
                let edges = ports::all_dependencies(tx)?;
                if crate::graph::would_cycle(&edges, port_id, dep) {
                    return Err(Error::WouldCycle {
                        port: port_id.to_string(),
                        depends_on: dep.to_string(),
                    });
                }
                ports::add_dependency(tx, port_id.as_str(), dep.as_str())?;
            }

            orchestrations::get(tx, orchestration_id.as_str())?
                .ok_or_else(|| Error::not_found("orchestration", orchestration_id.as_str()))
        })
    }

    pub fn get(&self, id: &OrchestrationId) -> Result<Orchestration> {
        self.store.with_conn(|conn| {
            orchestrations::get(conn, id.as_str())?
                .ok_or_else(|| Error::not_found("orchestration", id.as_str()))
        })
    }

    pub fn list(&self) -> Result<Vec<Orchestration>> {
        self.store.with_conn(|conn| Ok(orchestrations::list(conn)?))
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    /// Transition to `running` under the given operator session and spawn
    /// the first wave of workers.
    pub fn start(
        &self,
        id: &OrchestrationId,
        operator_session_id: &SessionId,
        project_root: Option<&std::path::Path>,
    ) -> Result<ExecutionState> {
        let now = self.clock.now();
        self.store.with_tx(|tx| {
            let operator = sessions::get(tx, operator_session_id.as_str())?
                .ok_or_else(|| Error::not_found("session", operator_session_id.as_str()))?;
            if operator.status != SessionStatus::Running {
                return Err(Error::InvalidState(format!(
                    "operator session {operator_session_id} is {}",
                    operator.status
                )));
            }
            let orchestration = orchestrations::get(tx, id.as_str())?
                .ok_or_else(|| Error::not_found("orchestration", id.as_str()))?;
            match orchestration.status {
                OrchestrationStatus::Pending => {
                    orchestrations::set_status(tx, id.as_str(), OrchestrationStatus::Running, &now)?;
                }
                OrchestrationStatus::Running => {}
                other => {
                    return Err(Error::InvalidState(format!(
                        "orchestration {id} is {other}"
                    )))
                }
            }
            Ok(())
        })?;

        {
            let section = self.section(id);
            let mut meta = section.lock();
            *meta = Some(OrchMeta {
                operator_session_id: operator_session_id.clone(),
                project_root: project_root.map(PathBuf::from).or_else(|| {
                    self.operator_project_root(operator_session_id).ok().flatten()
                }),
            });
        }

        self.process_next_ports(id)?;
        self.state(id)
    }

    /// Discover every ready, uncovered port and spawn a worker pair for
    /// each. Does not block on completion. Returns the spawned port ids.
    pub fn process_next_ports(&self, id: &OrchestrationId) -> Result<Vec<PortId>> {
        let section = self.section(id);
        let mut meta_slot = section.lock();
        let meta = match self.resolve_meta(id, &mut meta_slot)? {
            Some(meta) => meta,
            None => return Ok(vec![]),
        };

        let now = self.clock.now();
        let mut spawned: Vec<(PortId, RuleSpec)> = Vec::new();

        self.store.with_tx(|tx| {
            let orchestration = orchestrations::get(tx, id.as_str())?
                .ok_or_else(|| Error::not_found("orchestration", id.as_str()))?;
            if orchestration.status != OrchestrationStatus::Running {
                return Ok(());
            }

            let graph = DependencyGraph::from_atomic_ports(&orchestration.atomic_ports);
            let order = graph.scheduling_order().ok_or_else(|| Error::WouldCycle {
                port: id.to_string(),
                depends_on: "<graph>".to_string(),
            })?;

            for port_id in order {
                let Some(atomic) = orchestration
                    .atomic_ports
                    .iter()
                    .find(|p| p.port_id == port_id)
                else {
                    continue;
                };
                if atomic.status != PortStatus::Pending {
                    continue;
                }
                let Some(port) = ports::get(tx, port_id.as_str())? else {
                    continue;
                };
                if port.status != PortStatus::Pending {
                    continue;
                }
                if !dependencies_complete(tx, &port_id)? {
                    continue;
                }
                if workers::active_for_port(tx, port_id.as_str())?.is_some() {
                    continue;
                }

                let worker =
                    self.spawn_pair_tx(tx, &orchestration, &meta, &port_id, &now)?;
                tracing::info!(
                    orchestration = %id,
                    port = %port_id,
                    worker = %worker.id,
                    "worker pair spawned"
                );
                spawned.push((
                    port_id.clone(),
                    RuleSpec {
                        port_id: port_id.clone(),
                        title: port.title.clone(),
                        spec_path: port.file_path.clone(),
                        related_docs: vec![],
                    },
                ));
            }
            Ok(())
        })?;

        if let Some(root) = &meta.project_root {
            for (_, spec) in &spawned {
                RulesMaterializer::activate_port(root, spec)?;
            }
        }
        Ok(spawned.into_iter().map(|(p, _)| p).collect())
    }

    /// Apply a worker's terminal outcome: complete the port on success, or
    /// run the retry policy on failure. Then discover newly-ready ports and
    /// re-evaluate the orchestration's terminal state.
    pub fn handle_worker_complete(
        &self,
        worker_id: &WorkerId,
        result: WorkerResult,
    ) -> Result<()> {
        let worker = self.store.with_conn(|conn| {
            workers::get(conn, worker_id.as_str())?
                .ok_or_else(|| Error::not_found("worker", worker_id.as_str()))
        })?;
        if worker.status.is_terminal() {
            return Ok(());
        }
        let orchestration_id = worker.orchestration_id.clone();

        let mut orch_root = None;
        {
            let section = orchestration_id.as_ref().map(|oid| self.section(oid));
            let mut held = section.as_ref().map(|s| s.lock());
            if let (Some(oid), Some(guard)) = (&orchestration_id, held.as_mut()) {
                orch_root = self
                    .resolve_meta(oid, guard)?
                    .and_then(|meta| meta.project_root);
            }

            let now = self.clock.now();
            let success = result.success;
            self.store.with_tx(|tx| {
                if success {
                    self.complete_worker_tx(tx, &worker, &result, &now)
                } else {
                    self.fail_worker_tx(tx, &worker, &result, &now).map(|_| ())
                }
            })?;
        }

        // Rules for the port are stale either way: completed ports are done,
        // unbound ports are no longer running.
        if let Some(root) = orch_root {
            RulesMaterializer::deactivate_port(&root, &worker.port_id)?;
        }

        if let Some(oid) = &orchestration_id {
            self.process_next_ports(oid)?;
            self.evaluate_terminal(oid)?;
        }
        Ok(())
    }

    /// Dispatch a worker-emitted bus message.
    pub fn handle_message(&self, msg: &Message) -> Result<()> {
        let Some(worker) = self.store.with_conn(|conn| {
            Ok(workers::get_by_member_session(conn, msg.from_session.as_str())?)
        })?
        else {
            tracing::debug!(from = %msg.from_session, "message from unknown worker ignored");
            return Ok(());
        };
        if worker.status.is_terminal() {
            return Ok(());
        }
        let now = self.clock.now();

        match msg.subtype {
            MessageSubtype::TaskComplete => {
                // Impl half is done; hand the port to the test half.
                let Some(test_session) = worker.test_session_id.clone() else {
                    // Single worker: a completed task completes the pair.
                    return self.handle_worker_complete(&worker.id, WorkerResult::ok());
                };
                self.store.with_tx(|tx| {
                    workers::set_substatus(tx, worker.id.as_str(), Some("testing"), &now)?;
                    messages::insert(
                        tx,
                        &pal_core::conversation_id(
                            &msg.to_session,
                            &test_session,
                            Some(&worker.port_id),
                        ),
                        msg.to_session.as_str(),
                        test_session.as_str(),
                        MessageType::Request,
                        &MessageSubtype::ImplReady,
                        Some(worker.port_id.as_str()),
                        &json!({"port_id": worker.port_id.as_str()}),
                        None,
                        &now,
                    )?;
                    Ok(())
                })
            }
            MessageSubtype::TestPass => {
                let mut result = WorkerResult::ok();
                result.input_tokens = msg
                    .payload
                    .get("input_tokens")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                result.output_tokens = msg
                    .payload
                    .get("output_tokens")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                result.cost_usd = msg
                    .payload
                    .get("cost_usd")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                self.handle_worker_complete(&worker.id, result)
            }
            MessageSubtype::TestFail => self.handle_test_fail(&worker, msg, &now),
            MessageSubtype::TaskFailed => {
                let detail = msg
                    .payload
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("task failed");
                self.handle_worker_complete(&worker.id, WorkerResult::failed(detail))
            }
            MessageSubtype::TaskBlocked => self.store.with_tx(|tx| {
                workers::set_status(
                    tx,
                    worker.id.as_str(),
                    WorkerStatus::Blocked,
                    worker.substatus.as_deref(),
                    &now,
                )?;
                Ok(())
            }),
            _ => Ok(()),
        }
    }

    /// Test failures retry the impl half up to the budget, then fail the
    /// pair.
    fn handle_test_fail(
        &self,
        worker: &WorkerSession,
        msg: &Message,
        now: &chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let max_retries = self.config.orchestration.max_retries;
        let Some(oid) = &worker.orchestration_id else {
            return self.handle_worker_complete(&worker.id, WorkerResult::failed("tests failed"));
        };

        let exhausted = self.store.with_tx(|tx| {
            let attempts =
                orchestrations::increment_retry(tx, oid.as_str(), worker.port_id.as_str(), true)?;
            if attempts >= max_retries {
                return Ok(true);
            }
            let Some(impl_session) = worker.impl_session_id.clone() else {
                return Ok(true);
            };
            workers::set_substatus(tx, worker.id.as_str(), Some("fixing"), now)?;
            messages::insert(
                tx,
                &pal_core::conversation_id(&msg.to_session, &impl_session, Some(&worker.port_id)),
                msg.to_session.as_str(),
                impl_session.as_str(),
                MessageType::Request,
                &MessageSubtype::FixRequest,
                Some(worker.port_id.as_str()),
                &msg.payload,
                None,
                now,
            )?;
            Ok(false)
        })?;

        if exhausted {
            let failures = msg
                .payload
                .get("failures")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let mut result = WorkerResult::failed("test retries exhausted");
            if let Some(list) = failures.as_array() {
                result.failures = list
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
            }
            self.handle_worker_complete(&worker.id, result)?;
        }
        Ok(())
    }

    pub fn pause(&self, id: &OrchestrationId) -> Result<Orchestration> {
        self.transition(id, OrchestrationStatus::Paused)
    }

    pub fn resume(&self, id: &OrchestrationId) -> Result<Orchestration> {
        let orchestration = self.transition(id, OrchestrationStatus::Running)?;
        self.process_next_ports(id)?;
        Ok(orchestration)
    }

    /// Cooperative cancel: the orchestration is marked `cancelled`, every
    /// active worker completes with failure, and their sessions end. Safe to
    /// call twice.
    pub fn cancel(&self, id: &OrchestrationId) -> Result<Orchestration> {
        let now = self.clock.now();
        let root = self.project_root_for(&Some(id.clone()));
        let cancelled_ports = self.store.with_tx(|tx| {
            let orchestration = orchestrations::get(tx, id.as_str())?
                .ok_or_else(|| Error::not_found("orchestration", id.as_str()))?;
            if orchestration.status == OrchestrationStatus::Cancelled {
                return Ok(vec![]);
            }
            if !orchestration
                .status
                .can_transition(OrchestrationStatus::Cancelled)
            {
                return Err(Error::InvalidState(format!(
                    "orchestration {id} is {}",
                    orchestration.status
                )));
            }
            orchestrations::set_status(tx, id.as_str(), OrchestrationStatus::Cancelled, &now)?;
            orchestrations::set_current_port(tx, id.as_str(), None, &now)?;

            let mut cancelled_ports = Vec::new();
            for worker in workers::list_active_for_orchestration(tx, id.as_str())? {
                workers::set_status(tx, worker.id.as_str(), WorkerStatus::Failed, None, &now)?;
                workers::set_result(
                    tx,
                    worker.id.as_str(),
                    &WorkerResult::failed("cancelled"),
                    &now,
                )?;
                for session in worker.session_ids() {
                    end_session_tx(tx, session, SessionStatus::Cancelled, "cancelled", &now)?;
                }
                if let Some(port) = ports::get(tx, worker.port_id.as_str())? {
                    if port.status == PortStatus::Running {
                        ports::unbind_session(tx, port.id.as_str(), PortStatus::Pending)?;
                        orchestrations::set_port_status(
                            tx,
                            id.as_str(),
                            port.id.as_str(),
                            PortStatus::Pending,
                        )?;
                    }
                }
                cancelled_ports.push(worker.port_id.clone());
            }
            tracing::info!(orchestration = %id, workers = cancelled_ports.len(), "orchestration cancelled");
            Ok(cancelled_ports)
        })?;

        if let Some(root) = root {
            for port in &cancelled_ports {
                RulesMaterializer::deactivate_port(&root, port)?;
            }
        }
        self.get(id)
    }

    /// Current execution snapshot for `show`.
    pub fn state(&self, id: &OrchestrationId) -> Result<ExecutionState> {
        let orchestration = self.get(id)?;
        let active = self.store.with_conn(|conn| {
            Ok(workers::list_active_for_orchestration(conn, id.as_str())?)
        })?;

        let mut retry_count = HashMap::new();
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for atomic in &orchestration.atomic_ports {
            if atomic.retry_count > 0 {
                retry_count.insert(atomic.port_id.to_string(), atomic.retry_count);
            }
            if atomic.test_retry_count > 0 {
                retry_count.insert(format!("{}.test", atomic.port_id), atomic.test_retry_count);
            }
            match atomic.status {
                PortStatus::Complete => completed.push(atomic.port_id.clone()),
                PortStatus::Failed => failed.push(atomic.port_id.clone()),
                _ => {}
            }
        }

        let operator = self
            .sections
            .lock()
            .get(id.as_str())
            .and_then(|slot| slot.lock().as_ref().map(|m| m.operator_session_id.clone()));

        Ok(ExecutionState {
            orchestration_id: orchestration.id.clone(),
            operator_session_id: operator,
            status: orchestration.status,
            progress_percent: orchestration.progress_percent,
            active_workers: active.into_iter().map(|w| w.id).collect(),
            completed,
            failed,
            retry_count,
        })
    }

    // ── internals ───────────────────────────────────────────────────────────

    fn section(&self, id: &OrchestrationId) -> Arc<Mutex<Option<OrchMeta>>> {
        let mut sections = self.sections.lock();
        sections
            .entry(id.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Rebuild cached metadata from the store when this process has none
    /// (restart case): the operator is the parent of any spawned worker
    /// session.
    fn resolve_meta(
        &self,
        id: &OrchestrationId,
        slot: &mut Option<OrchMeta>,
    ) -> Result<Option<OrchMeta>> {
        if let Some(meta) = slot.as_ref() {
            return Ok(Some(meta.clone()));
        }
        let rebuilt = self.store.with_conn(|conn| {
            let orchestration = orchestrations::get(conn, id.as_str())?
                .ok_or_else(|| Error::not_found("orchestration", id.as_str()))?;
            if orchestration.status != OrchestrationStatus::Running {
                return Ok(None);
            }
            for atomic in &orchestration.atomic_ports {
                if let Some(worker) = workers::active_for_port(conn, atomic.port_id.as_str())? {
                    if let Some(impl_session) = worker.impl_session_id {
                        if let Some(session) = sessions::get(conn, impl_session.as_str())? {
                            if let Some(parent) = session.parent_id {
                                let root = sessions::get(conn, parent.as_str())?
                                    .and_then(|s| s.project_root);
                                return Ok(Some(OrchMeta {
                                    operator_session_id: parent,
                                    project_root: root,
                                }));
                            }
                        }
                    }
                }
            }
            Ok(None)
        })?;
        if let Some(meta) = &rebuilt {
            *slot = Some(meta.clone());
        }
        Ok(rebuilt)
    }

    fn operator_project_root(&self, operator: &SessionId) -> Result<Option<PathBuf>> {
        self.store.with_conn(|conn| {
            Ok(sessions::get(conn, operator.as_str())?.and_then(|s| s.project_root))
        })
    }

    fn project_root_for(&self, orchestration_id: &Option<OrchestrationId>) -> Option<PathBuf> {
        let oid = orchestration_id.as_ref()?;
        let section = self.section(oid);
        let slot = section.lock();
        slot.as_ref().and_then(|m| m.project_root.clone())
    }

    /// Create the impl/test session pair, the worker record, bind the port,
    /// and send `task_assign` to both halves. All in the caller's
    /// transaction.
    fn spawn_pair_tx(
        &self,
        tx: &Transaction<'_>,
        orchestration: &Orchestration,
        meta: &OrchMeta,
        port_id: &PortId,
        now: &chrono::DateTime<chrono::Utc>,
    ) -> Result<WorkerSession> {
        let operator = sessions::get(tx, meta.operator_session_id.as_str())?
            .ok_or_else(|| Error::not_found("session", meta.operator_session_id.as_str()))?;

        let impl_session = self.child_session_tx(tx, &operator, SessionKind::Worker, now)?;
        let test_session = self.child_session_tx(tx, &operator, SessionKind::Test, now)?;

        let worker = WorkerSession {
            id: WorkerId::new(format!("wrk-{}", self.ids.next_short())),
            orchestration_id: Some(orchestration.id.clone()),
            port_id: port_id.clone(),
            worker_type: WorkerType::ImplTestPair,
            impl_session_id: Some(impl_session.id.clone()),
            test_session_id: Some(test_session.id.clone()),
            status: WorkerStatus::Running,
            substatus: None,
            result: None,
            created_at: *now,
            updated_at: *now,
        };
        workers::insert(tx, &worker)?;

        ports::bind_session(tx, port_id.as_str(), impl_session.id.as_str(), None, now)?;
        events::append(
            tx,
            impl_session.id.as_str(),
            SessionEventType::PortStart,
            &json!({"port_id": port_id.as_str(), "worker_id": worker.id.as_str()}),
            now,
        )?;
        orchestrations::set_port_status(
            tx,
            orchestration.id.as_str(),
            port_id.as_str(),
            PortStatus::Running,
        )?;
        orchestrations::set_current_port(tx, orchestration.id.as_str(), Some(port_id.as_str()), now)?;

        let port = ports::get(tx, port_id.as_str())?;
        let assign_payload = json!({
            "port_id": port_id.as_str(),
            "title": port.as_ref().and_then(|p| p.title.clone()),
            "spec_path": port
                .as_ref()
                .and_then(|p| p.file_path.as_ref())
                .map(|p| p.display().to_string()),
        });
        for target in [&impl_session.id, &test_session.id] {
            messages::insert(
                tx,
                &pal_core::conversation_id(&operator.id, target, Some(port_id)),
                operator.id.as_str(),
                target.as_str(),
                MessageType::Request,
                &MessageSubtype::TaskAssign,
                Some(port_id.as_str()),
                &assign_payload,
                None,
                now,
            )?;
        }
        Ok(worker)
    }

    fn child_session_tx(
        &self,
        tx: &Transaction<'_>,
        operator: &Session,
        kind: SessionKind,
        now: &chrono::DateTime<chrono::Utc>,
    ) -> Result<Session> {
        let session = Session {
            id: SessionId::new(self.ids.next_short()),
            kind,
            parent_id: Some(operator.id.clone()),
            depth: operator.depth + 1,
            status: SessionStatus::Running,
            project_root: operator.project_root.clone(),
            cwd: operator.cwd.clone(),
            external_session_id: None,
            transcript_path: None,
            started_at: *now,
            ended_at: None,
            last_heartbeat_at: *now,
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            cache_create_tokens: 0,
            cost_usd: 0.0,
            compact_count: 0,
        };
        sessions::insert(tx, &session)?;
        events::append(
            tx,
            session.id.as_str(),
            SessionEventType::SessionStart,
            &json!({"kind": kind.as_str(), "spawned_by": operator.id.as_str()}),
            now,
        )?;
        Ok(session)
    }

    /// Success path: port completes with the worker's usage, progress is
    /// recomputed, and both member sessions end.
    fn complete_worker_tx(
        &self,
        tx: &Transaction<'_>,
        worker: &WorkerSession,
        result: &WorkerResult,
        now: &chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let port = ports::get(tx, worker.port_id.as_str())?
            .ok_or_else(|| Error::not_found("port", worker.port_id.as_str()))?;
        if port.status != PortStatus::Complete {
            let duration_secs = port
                .started_at
                .map(|s| (*now - s).num_seconds().max(0))
                .unwrap_or(0);
            ports::complete(
                tx,
                port.id.as_str(),
                PortStatus::Complete,
                now,
                duration_secs,
                result.input_tokens,
                result.output_tokens,
                result.cost_usd,
            )?;
            if let Some(owner) = &port.session_id {
                locks::release_all_for_session(tx, owner.as_str())?;
                events::append(
                    tx,
                    owner.as_str(),
                    SessionEventType::PortEnd,
                    &json!({"port_id": port.id.as_str(), "status": "complete"}),
                    now,
                )?;
            }
        }

        workers::set_status(tx, worker.id.as_str(), WorkerStatus::Complete, None, now)?;
        workers::set_result(tx, worker.id.as_str(), result, now)?;
        for session in worker.session_ids() {
            end_session_tx(tx, session, SessionStatus::Complete, "worker complete", now)?;
        }

        if let Some(oid) = &worker.orchestration_id {
            orchestrations::set_port_status(
                tx,
                oid.as_str(),
                worker.port_id.as_str(),
                PortStatus::Complete,
            )?;
            refresh_progress_tx(tx, oid, now)?;
        }
        Ok(())
    }

    /// Failure path: under the retry budget the port resets to `pending`
    /// for a fresh pair; past it the port fails. Returns whether the port
    /// was unbound for retry.
    fn fail_worker_tx(
        &self,
        tx: &Transaction<'_>,
        worker: &WorkerSession,
        result: &WorkerResult,
        now: &chrono::DateTime<chrono::Utc>,
    ) -> Result<bool> {
        workers::set_status(tx, worker.id.as_str(), WorkerStatus::Failed, None, now)?;
        workers::set_result(tx, worker.id.as_str(), result, now)?;
        for session in worker.session_ids() {
            end_session_tx(tx, session, SessionStatus::Failed, "worker failed", now)?;
        }

        let Some(oid) = &worker.orchestration_id else {
            if let Some(port) = ports::get(tx, worker.port_id.as_str())? {
                if port.status == PortStatus::Running {
                    ports::set_status(tx, port.id.as_str(), PortStatus::Failed)?;
                }
            }
            return Ok(false);
        };

        // A pair that died because its test retries ran out does not get a
        // port-level retry on top; the port fails outright.
        let (_, test_retries) =
            orchestrations::get_retries(tx, oid.as_str(), worker.port_id.as_str())?;
        let test_exhausted = test_retries >= self.config.orchestration.max_retries;
        let attempts = if test_exhausted {
            self.config.orchestration.max_retries
        } else {
            orchestrations::increment_retry(tx, oid.as_str(), worker.port_id.as_str(), false)?
        };
        let port = ports::get(tx, worker.port_id.as_str())?
            .ok_or_else(|| Error::not_found("port", worker.port_id.as_str()))?;

        if attempts < self.config.orchestration.max_retries {
            if port.status == PortStatus::Running {
                ports::unbind_session(tx, port.id.as_str(), PortStatus::Pending)?;
            }
            orchestrations::set_port_status(
                tx,
                oid.as_str(),
                worker.port_id.as_str(),
                PortStatus::Pending,
            )?;
            tracing::info!(
                orchestration = %oid,
                port = %worker.port_id,
                attempts,
                "port reset for retry"
            );
            Ok(true)
        } else {
            if port.status == PortStatus::Running {
                ports::set_status(tx, port.id.as_str(), PortStatus::Failed)?;
                if let Some(owner) = &port.session_id {
                    events::append(
                        tx,
                        owner.as_str(),
                        SessionEventType::PortEnd,
                        &json!({"port_id": port.id.as_str(), "status": "failed"}),
                        now,
                    )?;
                }
            }
            orchestrations::set_port_status(
                tx,
                oid.as_str(),
                worker.port_id.as_str(),
                PortStatus::Failed,
            )?;
            refresh_progress_tx(tx, oid, now)?;
            tracing::warn!(
                orchestration = %oid,
                port = %worker.port_id,
                attempts,
                "retry budget exhausted; port failed"
            );
            Ok(false)
        }
    }

    /// An orchestration completes when every atomic port is complete; it
    /// fails once a port has failed, nothing further is ready, and no
    /// workers remain.
    fn evaluate_terminal(&self, id: &OrchestrationId) -> Result<()> {
        let now = self.clock.now();
        self.store.with_tx(|tx| {
            let orchestration = orchestrations::get(tx, id.as_str())?
                .ok_or_else(|| Error::not_found("orchestration", id.as_str()))?;
            if orchestration.status != OrchestrationStatus::Running {
                return Ok(());
            }

            if orchestration.all_ports_complete() {
                orchestrations::set_status(tx, id.as_str(), OrchestrationStatus::Complete, &now)?;
                orchestrations::set_current_port(tx, id.as_str(), None, &now)?;
                orchestrations::set_progress(tx, id.as_str(), 100, &now)?;
                tracing::info!(orchestration = %id, "orchestration complete");
                return Ok(());
            }

            if orchestration.any_port_failed() {
                let workers_active =
                    !workers::list_active_for_orchestration(tx, id.as_str())?.is_empty();
                let mut any_ready = false;
                for atomic in &orchestration.atomic_ports {
                    if atomic.status == PortStatus::Pending
                        && dependencies_complete(tx, &atomic.port_id)?
                    {
                        any_ready = true;
                        break;
                    }
                }
                if !workers_active && !any_ready {
                    orchestrations::set_status(tx, id.as_str(), OrchestrationStatus::Failed, &now)?;
                    orchestrations::set_current_port(tx, id.as_str(), None, &now)?;
                    tracing::warn!(orchestration = %id, "no progress possible; orchestration failed");
                }
            }
            Ok(())
        })
    }

    fn transition(&self, id: &OrchestrationId, to: OrchestrationStatus) -> Result<Orchestration> {
        let now = self.clock.now();
        self.store.with_tx(|tx| {
            let orchestration = orchestrations::get(tx, id.as_str())?
                .ok_or_else(|| Error::not_found("orchestration", id.as_str()))?;
            if orchestration.status == to {
                return Ok(orchestration);
            }
            if !orchestration.status.can_transition(to) {
                return Err(Error::InvalidState(format!(
                    "orchestration {id}: {} -> {to} not allowed",
                    orchestration.status
                )));
            }
            orchestrations::set_status(tx, id.as_str(), to, &now)?;
            orchestrations::get(tx, id.as_str())?
                .ok_or_else(|| Error::not_found("orchestration", id.as_str()))
        })
    }
}

/// True iff every dependency of `port_id` is complete.
fn dependencies_complete(tx: &Transaction<'_>, port_id: &PortId) -> Result<bool> {
    for dep in ports::dependencies_of(tx, port_id.as_str())? {
        match ports::get(tx, dep.as_str())? {
            Some(dep_port) if dep_port.status == PortStatus::Complete => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Recompute and store `progress_percent` from the atomic-port statuses, in
/// the same transaction that changed them.
fn refresh_progress_tx(
    tx: &Transaction<'_>,
    id: &OrchestrationId,
    now: &chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    let orchestration = orchestrations::get(tx, id.as_str())?
        .ok_or_else(|| Error::not_found("orchestration", id.as_str()))?;
    let progress = Orchestration::compute_progress(&orchestration.atomic_ports);
    orchestrations::set_progress(tx, id.as_str(), progress, now)?;
    Ok(())
}

/// Terminal-status a session, releasing its locks, inside the caller's
/// transaction. Ended sessions are left alone.
fn end_session_tx(
    tx: &Transaction<'_>,
    session_id: &SessionId,
    status: SessionStatus,
    reason: &str,
    now: &chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    let Some(session) = sessions::get(tx, session_id.as_str())? else {
        return Ok(());
    };
    if session.status.is_terminal() {
        return Ok(());
    }
    sessions::update_status(tx, session_id.as_str(), status, Some(now))?;
    locks::release_all_for_session(tx, session_id.as_str())?;
    events::append(
        tx,
        session_id.as_str(),
        SessionEventType::SessionEnd,
        &json!({"reason": reason}),
        now,
    )?;
    Ok(())
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
