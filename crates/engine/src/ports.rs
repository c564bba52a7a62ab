// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port lifecycle, dependency edges, and session binding.

use std::path::PathBuf;

use pal_core::{
    Clock, Error, Port, PortId, PortStatus, Result, SessionEventType, SessionId,
};
use pal_storage::queries::{events, locks, ports, sessions};
use pal_storage::Store;
use serde_json::json;

pub struct PortManager<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> PortManager<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Create a port in `pending`. The id is the author's slug and must be
    /// unique.
    pub fn create(
        &self,
        id: &PortId,
        title: Option<&str>,
        file_path: Option<&std::path::Path>,
    ) -> Result<Port> {
        let now = self.clock.now();
        self.store.with_tx(|tx| {
            if ports::exists(tx, id.as_str())? {
                return Err(Error::already_exists("port", id.as_str()));
            }
            let port = Port {
                id: id.clone(),
                title: title.map(str::to_string),
                status: PortStatus::Pending,
                file_path: file_path.map(PathBuf::from),
                session_id: None,
                agent_id: None,
                created_at: now,
                started_at: None,
                completed_at: None,
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: 0.0,
                duration_secs: 0,
            };
            ports::insert(tx, &port)?;
            tracing::info!(port = %id, "port created");
            Ok(port)
        })
    }

    pub fn get(&self, id: &PortId) -> Result<Port> {
        self.store.with_conn(|conn| {
            ports::get(conn, id.as_str())?.ok_or_else(|| Error::not_found("port", id.as_str()))
        })
    }

    pub fn list(&self) -> Result<Vec<Port>> {
        self.store.with_conn(|conn| Ok(ports::list(conn)?))
    }

    pub fn list_by_status(&self, status: PortStatus) -> Result<Vec<Port>> {
        self.store
            .with_conn(|conn| Ok(ports::list_by_status(conn, status)?))
    }

    pub fn running_for_session(&self, session_id: &SessionId) -> Result<Option<Port>> {
        self.store
            .with_conn(|conn| Ok(ports::running_for_session(conn, session_id.as_str())?))
    }

    /// Bind a port to a session and mark it running.
    ///
    /// Idempotent for the same session (a repeated `port-start` hook is a
    /// no-op). Fails with `AlreadyActive` when another session owns the
    /// port, and `PortBusy` when the session already runs a different port.
    pub fn activate(
        &self,
        id: &PortId,
        session_id: &SessionId,
        agent_id: Option<&str>,
    ) -> Result<Port> {
        let now = self.clock.now();
        self.store.with_tx(|tx| {
            let port = ports::get(tx, id.as_str())?
                .ok_or_else(|| Error::not_found("port", id.as_str()))?;

            if port.status == PortStatus::Running {
                return match &port.session_id {
                    Some(owner) if owner == session_id => Ok(port),
                    Some(owner) => Err(Error::AlreadyActive {
                        port: id.to_string(),
                        session: owner.to_string(),
                    }),
                    None => Err(Error::InvalidState(format!(
                        "port {id} running without a session"
                    ))),
                };
            }
            if !port.status.can_transition(PortStatus::Running) {
                return Err(Error::InvalidState(format!(
                    "port {id}: {} -> running not allowed",
                    port.status
                )));
            }
            if let Some(busy) = ports::running_for_session(tx, session_id.as_str())? {
                return Err(Error::PortBusy {
                    session: session_id.to_string(),
                    port: busy.id.to_string(),
                });
            }
            if sessions::get(tx, session_id.as_str())?.is_none() {
                return Err(Error::not_found("session", session_id.as_str()));
            }

            ports::bind_session(tx, id.as_str(), session_id.as_str(), agent_id, &now)?;
            events::append(
                tx,
                session_id.as_str(),
                SessionEventType::PortStart,
                &json!({"port_id": id.as_str(), "agent_id": agent_id}),
                &now,
            )?;
            tracing::info!(port = %id, session = %session_id, "port activated");
            ports::get(tx, id.as_str())?.ok_or_else(|| Error::not_found("port", id.as_str()))
        })
    }

    /// Unbind a running port back to `pending` without completing it.
    pub fn deactivate(&self, id: &PortId) -> Result<Port> {
        self.store.with_tx(|tx| {
            let port = ports::get(tx, id.as_str())?
                .ok_or_else(|| Error::not_found("port", id.as_str()))?;
            match port.status {
                PortStatus::Pending => Ok(port),
                PortStatus::Running | PortStatus::Blocked => {
                    ports::unbind_session(tx, id.as_str(), PortStatus::Pending)?;
                    tracing::info!(port = %id, "port deactivated");
                    ports::get(tx, id.as_str())?
                        .ok_or_else(|| Error::not_found("port", id.as_str()))
                }
                other => Err(Error::InvalidState(format!(
                    "port {id}: cannot deactivate from {other}"
                ))),
            }
        })
    }

    /// Enforced status transition; terminal transitions emit `port_end`.
    pub fn update_status(&self, id: &PortId, status: PortStatus) -> Result<Port> {
        let now = self.clock.now();
        self.store.with_tx(|tx| {
            let port = ports::get(tx, id.as_str())?
                .ok_or_else(|| Error::not_found("port", id.as_str()))?;
            if port.status == status {
                return Ok(port);
            }
            if !port.status.can_transition(status) {
                return Err(Error::InvalidState(format!(
                    "port {id}: {} -> {status} not allowed",
                    port.status
                )));
            }
            ports::set_status(tx, id.as_str(), status)?;
            if status.is_terminal() {
                if let Some(session) = &port.session_id {
                    events::append(
                        tx,
                        session.as_str(),
                        SessionEventType::PortEnd,
                        &json!({"port_id": id.as_str(), "status": status.as_str()}),
                        &now,
                    )?;
                }
            }
            ports::get(tx, id.as_str())?.ok_or_else(|| Error::not_found("port", id.as_str()))
        })
    }

    /// Atomically complete a port: terminal status, `completed_at`,
    /// duration, usage accounting, owner's lock release, and the `port_end`
    /// event all land in one transaction. Idempotent once complete.
    pub fn record_completion(
        &self,
        id: &PortId,
        input_tokens: i64,
        output_tokens: i64,
        cost_usd: f64,
    ) -> Result<Port> {
        let now = self.clock.now();
        self.store.with_tx(|tx| {
            let port = ports::get(tx, id.as_str())?
                .ok_or_else(|| Error::not_found("port", id.as_str()))?;
            if port.status == PortStatus::Complete {
                return Ok(port);
            }
            if !port.status.can_transition(PortStatus::Complete) {
                return Err(Error::InvalidState(format!(
                    "port {id}: {} -> complete not allowed",
                    port.status
                )));
            }

            let duration_secs = port
                .started_at
                .map(|started| (now - started).num_seconds().max(0))
                .unwrap_or(0);
            ports::complete(
                tx,
                id.as_str(),
                PortStatus::Complete,
                &now,
                duration_secs,
                input_tokens,
                output_tokens,
                cost_usd,
            )?;

            if let Some(session) = &port.session_id {
                locks::release_all_for_session(tx, session.as_str())?;
                events::append(
                    tx,
                    session.as_str(),
                    SessionEventType::PortEnd,
                    &json!({
                        "port_id": id.as_str(),
                        "status": "complete",
                        "duration_secs": duration_secs,
                    }),
                    &now,
                )?;
            }
            tracing::info!(port = %id, duration_secs, "port completed");
            ports::get(tx, id.as_str())?.ok_or_else(|| Error::not_found("port", id.as_str()))
        })
    }

    /// Add a dependency edge, refusing cycles.
    pub fn add_dependency(&self, id: &PortId, depends_on: &PortId) -> Result<()> {
        if id == depends_on {
            return Err(Error::WouldCycle {
                port: id.to_string(),
                depends_on: depends_on.to_string(),
            });
        }
        self.store.with_tx(|tx| {
            for port in [id, depends_on] {
                if !ports::exists(tx, port.as_str())? {
                    return Err(Error::not_found("port", port.as_str()));
                }
            }
            let edges = ports::all_dependencies(tx)?;
            if crate::graph::would_cycle(&edges, id, depends_on) {
                return Err(Error::WouldCycle {
                    port: id.to_string(),
                    depends_on: depends_on.to_string(),
                });
            }
            ports::add_dependency(tx, id.as_str(), depends_on.as_str())?;
            Ok(())
        })
    }

    pub fn dependencies(&self, id: &PortId) -> Result<Vec<PortId>> {
        self.store
            .with_conn(|conn| Ok(ports::dependencies_of(conn, id.as_str())?))
    }

    /// True iff every dependency of the port is complete.
    pub fn ready(&self, id: &PortId) -> Result<bool> {
        self.store.with_conn(|conn| {
            if !ports::exists(conn, id.as_str())? {
                return Err(Error::not_found("port", id.as_str()));
            }
            for dep in ports::dependencies_of(conn, id.as_str())? {
                let dep_port = ports::get(conn, dep.as_str())?
                    .ok_or_else(|| Error::not_found("port", dep.as_str()))?;
                if dep_port.status != PortStatus::Complete {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod tests;
