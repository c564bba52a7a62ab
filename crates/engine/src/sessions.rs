// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle and hierarchical integrity.
//!
//! The assistant runtime owns its session id; we reconcile it to our rows
//! through the `find_active` fallback chain (external id, then cwd, then
//! project root). That chain lives here and nowhere else.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pal_core::{
    Clock, Error, IdGen, PortId, Result, Session, SessionEventType, SessionId, SessionKind,
    SessionStatus, UsageDelta,
};
use pal_storage::queries::{events, locks, ports, sessions};
use pal_storage::Store;
use serde_json::json;

/// Options for starting a session.
#[derive(Debug, Clone, Default)]
pub struct StartSession {
    pub kind: Option<SessionKind>,
    pub parent_id: Option<SessionId>,
    pub project_root: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub external_session_id: Option<String>,
    pub transcript_path: Option<PathBuf>,
    /// Port this session was spawned for, recorded on the start event.
    pub port_id: Option<PortId>,
}

/// Hierarchical session view.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionTree {
    pub session: Session,
    pub children: Vec<SessionTree>,
}

pub struct SessionManager<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    ids: &'a dyn IdGen,
}

impl<'a> SessionManager<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock, ids: &'a dyn IdGen) -> Self {
        Self { store, clock, ids }
    }

    /// Create a session, checking parent-kind compatibility.
    pub fn start(&self, opts: StartSession) -> Result<Session> {
        let kind = opts.kind.unwrap_or(SessionKind::Main);
        let now = self.clock.now();
        let id = SessionId::new(self.ids.next_short());

        self.store.with_tx(|tx| {
            let (parent_id, depth) = match &opts.parent_id {
                Some(pid) => {
                    let parent = sessions::get(tx, pid.as_str())?
                        .ok_or_else(|| Error::not_found("session", pid.as_str()))?;
                    if !parent.kind.can_parent(kind) {
                        return Err(Error::InvalidParent {
                            parent: parent.kind.to_string(),
                            child: kind.to_string(),
                        });
                    }
                    (Some(parent.id), parent.depth + 1)
                }
                None => (None, 0),
            };

            let session = Session {
                id: id.clone(),
                kind,
                parent_id,
                depth,
                status: SessionStatus::Running,
                project_root: opts.project_root.clone(),
                cwd: opts.cwd.clone(),
                external_session_id: opts.external_session_id.clone(),
                transcript_path: opts.transcript_path.clone(),
                started_at: now,
                ended_at: None,
                last_heartbeat_at: now,
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
                &json!({
                    "kind": kind.as_str(),
                    "external_session_id": opts.external_session_id,
                    "port_id": opts.port_id.as_ref().map(|p| p.as_str()),
                }),
                &now,
            )?;
            tracing::info!(session = %session.id, kind = %kind, "session started");
            Ok(session)
        })
    }

    /// Resolve the active session via the fallback chain:
    /// external id, then cwd, then project root; most recent wins.
    pub fn find_active(
        &self,
        external_session_id: Option<&str>,
        cwd: Option<&Path>,
        project_root: Option<&Path>,
    ) -> Result<Session> {
        self.store.with_conn(|conn| {
            if let Some(ext) = external_session_id {
                if let Some(session) = sessions::find_running_by_external(conn, ext)? {
                    return Ok(session);
                }
            }
            if let Some(cwd) = cwd {
                if let Some(session) =
                    sessions::find_running_by_cwd(conn, &cwd.display().to_string())?
                {
                    return Ok(session);
                }
            }
            if let Some(root) = project_root {
                if let Some(session) =
                    sessions::find_running_by_root(conn, &root.display().to_string())?
                {
                    return Ok(session);
                }
            }
            Err(Error::not_found(
                "session",
                external_session_id.unwrap_or("<active>"),
            ))
        })
    }

    pub fn get(&self, id: &SessionId) -> Result<Session> {
        self.store.with_conn(|conn| {
            sessions::get(conn, id.as_str())?.ok_or_else(|| Error::not_found("session", id.as_str()))
        })
    }

    pub fn list_recent(&self, limit: u32) -> Result<Vec<Session>> {
        self.store.with_conn(|conn| Ok(sessions::list_recent(conn, limit)?))
    }

    pub fn list_running(&self) -> Result<Vec<Session>> {
        self.store.with_conn(|conn| Ok(sessions::list_running(conn)?))
    }

    /// End a session as `complete`. Idempotent: ending an ended session is a
    /// no-op success. Closes running worker/test children and releases every
    /// lock held, all in one transaction.
    pub fn end(&self, id: &SessionId, reason: &str) -> Result<Session> {
        self.end_with_status(id, SessionStatus::Complete, reason)
    }

    /// End a session with an explicit terminal status.
    pub fn end_with_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
        reason: &str,
    ) -> Result<Session> {
        if !status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "cannot end session with non-terminal status {status}"
            )));
        }
        let now = self.clock.now();
        self.store.with_tx(|tx| {
            let session = sessions::get(tx, id.as_str())?
                .ok_or_else(|| Error::not_found("session", id.as_str()))?;
            if session.status.is_terminal() {
                return Ok(session);
            }
            if !session.status.can_transition(status) {
                return Err(Error::InvalidState(format!(
                    "session {id}: {} -> {status} not allowed",
                    session.status
                )));
            }

            sessions::update_status(tx, id.as_str(), status, Some(&now))?;

            // Worker/test children spawned for this session go down with it.
            for child in sessions::list_children(tx, id.as_str())? {
                let closeable = matches!(child.kind, SessionKind::Worker | SessionKind::Test);
                if closeable && !child.status.is_terminal() {
                    sessions::update_status(tx, child.id.as_str(), status, Some(&now))?;
                    locks::release_all_for_session(tx, child.id.as_str())?;
                    events::append(
                        tx,
                        child.id.as_str(),
                        SessionEventType::SessionEnd,
                        &json!({"reason": "parent_ended"}),
                        &now,
                    )?;
                }
            }

            let released = locks::release_all_for_session(tx, id.as_str())?;
            events::append(
                tx,
                id.as_str(),
                SessionEventType::SessionEnd,
                &json!({"reason": reason, "locks_released": released}),
                &now,
            )?;
            tracing::info!(session = %id, %reason, "session ended");
            sessions::get(tx, id.as_str())?.ok_or_else(|| Error::not_found("session", id.as_str()))
        })
    }

    /// Monotonic usage rollup; negative deltas are rejected.
    pub fn update_usage(&self, id: &SessionId, delta: &UsageDelta) -> Result<()> {
        delta.validate()?;
        self.store.with_tx(|tx| {
            if sessions::get(tx, id.as_str())?.is_none() {
                return Err(Error::not_found("session", id.as_str()));
            }
            sessions::add_usage(tx, id.as_str(), delta)?;
            Ok(())
        })
    }

    pub fn increment_compact(&self, id: &SessionId) -> Result<u32> {
        self.store.with_tx(|tx| {
            if sessions::get(tx, id.as_str())?.is_none() {
                return Err(Error::not_found("session", id.as_str()));
            }
            Ok(sessions::increment_compact(tx, id.as_str())?)
        })
    }

    /// Refresh the heartbeat; called on every hook that resolves a session.
    pub fn heartbeat(&self, id: &SessionId) -> Result<()> {
        let now = self.clock.now();
        self.store
            .with_tx(|tx| Ok(sessions::touch_heartbeat(tx, id.as_str(), &now)?))
    }

    /// Merge project context discovered at hook time onto the session row.
    pub fn update_context(
        &self,
        id: &SessionId,
        project_root: Option<&Path>,
        cwd: Option<&Path>,
        external_session_id: Option<&str>,
        transcript_path: Option<&Path>,
    ) -> Result<()> {
        self.store.with_tx(|tx| {
            sessions::update_context(
                tx,
                id.as_str(),
                project_root.map(|p| p.display().to_string()).as_deref(),
                cwd.map(|p| p.display().to_string()).as_deref(),
                external_session_id,
                transcript_path.map(|p| p.display().to_string()).as_deref(),
            )?;
            Ok(())
        })
    }

    /// Fail every running session whose heartbeat is older than `ttl`,
    /// releasing its locks and freeing any port it still held. Returns the
    /// number of sessions reaped.
    pub fn cleanup_zombies(&self, ttl: Duration) -> Result<u32> {
        let now = self.clock.now();
        self.store.with_tx(|tx| {
            let zombies: Vec<Session> = sessions::list_running(tx)?
                .into_iter()
                .filter(|s| s.is_zombie(now, ttl))
                .collect();
            let count = zombies.len() as u32;
            for zombie in &zombies {
                sessions::update_status(tx, zombie.id.as_str(), SessionStatus::Failed, Some(&now))?;
                locks::release_all_for_session(tx, zombie.id.as_str())?;
                if let Some(port) = ports::running_for_session(tx, zombie.id.as_str())? {
                    ports::unbind_session(tx, port.id.as_str(), pal_core::PortStatus::Blocked)?;
                }
                events::append(
                    tx,
                    zombie.id.as_str(),
                    SessionEventType::ZombieCleanup,
                    &json!({"cleaned": count}),
                    &now,
                )?;
                tracing::warn!(session = %zombie.id, "reaped zombie session");
            }
            Ok(count)
        })
    }

    /// The session subtree rooted at `root_id`.
    pub fn tree(&self, root_id: &SessionId) -> Result<SessionTree> {
        self.store.with_conn(|conn| {
            let root = sessions::get(conn, root_id.as_str())?
                .ok_or_else(|| Error::not_found("session", root_id.as_str()))?;
            build_tree(conn, root)
        })
    }
}

fn build_tree(conn: &pal_storage::Connection, session: Session) -> Result<SessionTree> {
    let mut children = Vec::new();
    for child in sessions::list_children(conn, session.id.as_str())? {
        children.push(build_tree(conn, child)?);
    }
    Ok(SessionTree { session, children })
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
