// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port rows and dependency edges.

use chrono::{DateTime, Utc};
use pal_core::{Port, PortId, PortStatus, SessionId};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;

use super::{parse_opt_ts, parse_ts, ts};
use crate::store::StoreError;

const COLUMNS: &str = "id, title, status, file_path, session_id, agent_id, created_at, \
    started_at, completed_at, input_tokens, output_tokens, cost_usd, duration_secs";

fn from_row(row: &Row<'_>) -> Result<Port, StoreError> {
    let status_raw: String = row.get(2)?;
    let created_at: String = row.get(6)?;
    Ok(Port {
        id: PortId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        status: PortStatus::parse(&status_raw)
            .ok_or_else(|| StoreError::corrupt("ports", format!("bad status: {status_raw}")))?,
        file_path: row.get::<_, Option<String>>(3)?.map(PathBuf::from),
        session_id: row.get::<_, Option<String>>(4)?.map(SessionId::new),
        agent_id: row.get(5)?,
        created_at: parse_ts("ports", &created_at)?,
        started_at: parse_opt_ts("ports", row.get(7)?)?,
        completed_at: parse_opt_ts("ports", row.get(8)?)?,
        input_tokens: row.get(9)?,
        output_tokens: row.get(10)?,
        cost_usd: row.get(11)?,
        duration_secs: row.get(12)?,
    })
}

pub fn insert(conn: &Connection, port: &Port) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO ports (id, title, status, file_path, session_id, agent_id, created_at, \
         started_at, completed_at, input_tokens, output_tokens, cost_usd, duration_secs) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            port.id.as_str(),
            port.title,
            port.status.as_str(),
            port.file_path.as_ref().map(|p| p.display().to_string()),
            port.session_id.as_ref().map(|s| s.as_str()),
            port.agent_id,
            ts(&port.created_at),
            port.started_at.as_ref().map(ts),
            port.completed_at.as_ref().map(ts),
            port.input_tokens,
            port.output_tokens,
            port.cost_usd,
            port.duration_secs,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Port>, StoreError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM ports WHERE id = ?1"),
        [id],
        |row| Ok(from_row(row)),
    )
    .optional()?
    .transpose()
}

pub fn exists(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM ports WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    Ok(found)
}

pub fn list(conn: &Connection) -> Result<Vec<Port>, StoreError> {
    let mut stmt =
        conn.prepare(&format!("SELECT {COLUMNS} FROM ports ORDER BY created_at, id"))?;
    let rows = stmt.query_map([], |row| Ok(from_row(row)))?;
    let mut ports = Vec::new();
    for row in rows {
        ports.push(row??);
    }
    Ok(ports)
}

pub fn list_by_status(conn: &Connection, status: PortStatus) -> Result<Vec<Port>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM ports WHERE status = ?1 ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map([status.as_str()], |row| Ok(from_row(row)))?;
    let mut ports = Vec::new();
    for row in rows {
        ports.push(row??);
    }
    Ok(ports)
}

/// The running port owned by a session, if any (single-worker discipline
/// means there is at most one).
pub fn running_for_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<Port>, StoreError> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM ports WHERE session_id = ?1 AND status = 'running' LIMIT 1"
        ),
        [session_id],
        |row| Ok(from_row(row)),
    )
    .optional()?
    .transpose()
}

/// Raw status write; the manager validates the transition first.
pub fn set_status(conn: &Connection, id: &str, status: PortStatus) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE ports SET status = ?2 WHERE id = ?1",
        params![id, status.as_str()],
    )?;
    Ok(())
}

/// Bind a port to its owning session and stamp `started_at`.
pub fn bind_session(
    conn: &Connection,
    id: &str,
    session_id: &str,
    agent_id: Option<&str>,
    started_at: &DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE ports SET status = 'running', session_id = ?2, agent_id = ?3, \
         started_at = COALESCE(started_at, ?4) WHERE id = ?1",
        params![id, session_id, agent_id, ts(started_at)],
    )?;
    Ok(())
}

/// Unbind a port from its session, returning it to the given status.
pub fn unbind_session(conn: &Connection, id: &str, status: PortStatus) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE ports SET status = ?2, session_id = NULL, agent_id = NULL, started_at = NULL \
         WHERE id = ?1",
        params![id, status.as_str()],
    )?;
    Ok(())
}

/// Terminal completion write: status, timestamps, duration, and usage in one
/// statement.
#[allow(clippy::too_many_arguments)]
pub fn complete(
    conn: &Connection,
    id: &str,
    status: PortStatus,
    completed_at: &DateTime<Utc>,
    duration_secs: i64,
    input_tokens: i64,
    output_tokens: i64,
    cost_usd: f64,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE ports SET status = ?2, completed_at = ?3, duration_secs = ?4, \
         input_tokens = input_tokens + ?5, output_tokens = output_tokens + ?6, \
         cost_usd = cost_usd + ?7 WHERE id = ?1",
        params![
            id,
            status.as_str(),
            ts(completed_at),
            duration_secs,
            input_tokens,
            output_tokens,
            cost_usd,
        ],
    )?;
    Ok(())
}

// ── dependency edges ────────────────────────────────────────────────────────

pub fn add_dependency(conn: &Connection, port_id: &str, depends_on: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO port_dependencies (port_id, depends_on) VALUES (?1, ?2)",
        params![port_id, depends_on],
    )?;
    Ok(())
}

/// Direct dependencies of one port.
pub fn dependencies_of(conn: &Connection, port_id: &str) -> Result<Vec<PortId>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT depends_on FROM port_dependencies WHERE port_id = ?1 ORDER BY depends_on",
    )?;
    let rows = stmt.query_map([port_id], |row| row.get::<_, String>(0))?;
    let mut deps = Vec::new();
    for row in rows {
        deps.push(PortId::new(row?));
    }
    Ok(deps)
}

/// Every edge in the store, for cycle checks.
pub fn all_dependencies(conn: &Connection) -> Result<Vec<(PortId, PortId)>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT port_id, depends_on FROM port_dependencies ORDER BY port_id")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut edges = Vec::new();
    for row in rows {
        let (a, b) = row?;
        edges.push((PortId::new(a), PortId::new(b)));
    }
    Ok(edges)
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod tests;
