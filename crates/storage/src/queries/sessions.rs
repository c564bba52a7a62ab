// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session rows.

use pal_core::{Session, SessionId, SessionKind, SessionStatus, UsageDelta};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;

use super::{parse_opt_ts, parse_ts, ts};
use crate::store::StoreError;

const COLUMNS: &str = "id, kind, parent_id, depth, status, project_root, cwd, \
    external_session_id, transcript_path, started_at, ended_at, last_heartbeat_at, \
    input_tokens, output_tokens, cache_read_tokens, cache_create_tokens, cost_usd, compact_count";

fn from_row(row: &Row<'_>) -> Result<Session, StoreError> {
    let kind_raw: String = row.get(1)?;
    let status_raw: String = row.get(4)?;
    let started_at: String = row.get(9)?;
    let ended_at: Option<String> = row.get(10)?;
    let heartbeat: String = row.get(11)?;
    Ok(Session {
        id: SessionId::new(row.get::<_, String>(0)?),
        kind: SessionKind::parse(&kind_raw)
            .ok_or_else(|| StoreError::corrupt("sessions", format!("bad kind: {kind_raw}")))?,
        parent_id: row.get::<_, Option<String>>(2)?.map(SessionId::new),
        depth: row.get(3)?,
        status: SessionStatus::parse(&status_raw)
            .ok_or_else(|| StoreError::corrupt("sessions", format!("bad status: {status_raw}")))?,
        project_root: row.get::<_, Option<String>>(5)?.map(PathBuf::from),
        cwd: row.get::<_, Option<String>>(6)?.map(PathBuf::from),
        external_session_id: row.get(7)?,
        transcript_path: row.get::<_, Option<String>>(8)?.map(PathBuf::from),
        started_at: parse_ts("sessions", &started_at)?,
        ended_at: parse_opt_ts("sessions", ended_at)?,
        last_heartbeat_at: parse_ts("sessions", &heartbeat)?,
        input_tokens: row.get(12)?,
        output_tokens: row.get(13)?,
        cache_read_tokens: row.get(14)?,
        cache_create_tokens: row.get(15)?,
        cost_usd: row.get(16)?,
        compact_count: row.get(17)?,
    })
}

pub fn insert(conn: &Connection, session: &Session) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO sessions (id, kind, parent_id, depth, status, project_root, cwd, \
         external_session_id, transcript_path, started_at, ended_at, last_heartbeat_at, \
         input_tokens, output_tokens, cache_read_tokens, cache_create_tokens, cost_usd, compact_count) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            session.id.as_str(),
            session.kind.as_str(),
            session.parent_id.as_ref().map(|p| p.as_str()),
            session.depth,
            session.status.as_str(),
            session.project_root.as_ref().map(|p| p.display().to_string()),
            session.cwd.as_ref().map(|p| p.display().to_string()),
            session.external_session_id,
            session.transcript_path.as_ref().map(|p| p.display().to_string()),
            ts(&session.started_at),
            session.ended_at.as_ref().map(ts),
            ts(&session.last_heartbeat_at),
            session.input_tokens,
            session.output_tokens,
            session.cache_read_tokens,
            session.cache_create_tokens,
            session.cost_usd,
            session.compact_count,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Session>, StoreError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM sessions WHERE id = ?1"),
        [id],
        |row| Ok(from_row(row)),
    )
    .optional()?
    .transpose()
}

/// Most recent running session with the given external runtime id.
pub fn find_running_by_external(
    conn: &Connection,
    external_id: &str,
) -> Result<Option<Session>, StoreError> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM sessions \
             WHERE external_session_id = ?1 AND status = 'running' \
             ORDER BY started_at DESC, id DESC LIMIT 1"
        ),
        [external_id],
        |row| Ok(from_row(row)),
    )
    .optional()?
    .transpose()
}

/// Most recent running session with the given cwd.
pub fn find_running_by_cwd(conn: &Connection, cwd: &str) -> Result<Option<Session>, StoreError> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM sessions \
             WHERE cwd = ?1 AND status = 'running' \
             ORDER BY started_at DESC, id DESC LIMIT 1"
        ),
        [cwd],
        |row| Ok(from_row(row)),
    )
    .optional()?
    .transpose()
}

/// Most recent running session under the given project root.
pub fn find_running_by_root(conn: &Connection, root: &str) -> Result<Option<Session>, StoreError> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM sessions \
             WHERE project_root = ?1 AND status = 'running' \
             ORDER BY started_at DESC, id DESC LIMIT 1"
        ),
        [root],
        |row| Ok(from_row(row)),
    )
    .optional()?
    .transpose()
}

pub fn list_running(conn: &Connection) -> Result<Vec<Session>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM sessions WHERE status = 'running' ORDER BY started_at, id"
    ))?;
    let rows = stmt.query_map([], |row| Ok(from_row(row)))?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row??);
    }
    Ok(sessions)
}

pub fn list_recent(conn: &Connection, limit: u32) -> Result<Vec<Session>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM sessions ORDER BY started_at DESC, id DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map([limit], |row| Ok(from_row(row)))?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row??);
    }
    Ok(sessions)
}

pub fn list_children(conn: &Connection, parent_id: &str) -> Result<Vec<Session>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM sessions WHERE parent_id = ?1 ORDER BY started_at, id"
    ))?;
    let rows = stmt.query_map([parent_id], |row| Ok(from_row(row)))?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row??);
    }
    Ok(sessions)
}

pub fn update_status(
    conn: &Connection,
    id: &str,
    status: SessionStatus,
    ended_at: Option<&chrono::DateTime<chrono::Utc>>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE sessions SET status = ?2, ended_at = COALESCE(?3, ended_at) WHERE id = ?1",
        params![id, status.as_str(), ended_at.map(ts)],
    )?;
    Ok(())
}

/// Merge project context onto an existing row; None leaves a field alone.
pub fn update_context(
    conn: &Connection,
    id: &str,
    project_root: Option<&str>,
    cwd: Option<&str>,
    external_session_id: Option<&str>,
    transcript_path: Option<&str>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE sessions SET \
         project_root = COALESCE(?2, project_root), \
         cwd = COALESCE(?3, cwd), \
         external_session_id = COALESCE(?4, external_session_id), \
         transcript_path = COALESCE(?5, transcript_path) \
         WHERE id = ?1",
        params![id, project_root, cwd, external_session_id, transcript_path],
    )?;
    Ok(())
}

pub fn touch_heartbeat(
    conn: &Connection,
    id: &str,
    at: &chrono::DateTime<chrono::Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE sessions SET last_heartbeat_at = ?2 WHERE id = ?1",
        params![id, ts(at)],
    )?;
    Ok(())
}

pub fn add_usage(conn: &Connection, id: &str, delta: &UsageDelta) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE sessions SET \
         input_tokens = input_tokens + ?2, \
         output_tokens = output_tokens + ?3, \
         cache_read_tokens = cache_read_tokens + ?4, \
         cache_create_tokens = cache_create_tokens + ?5, \
         cost_usd = cost_usd + ?6 \
         WHERE id = ?1",
        params![
            id,
            delta.input_tokens,
            delta.output_tokens,
            delta.cache_read_tokens,
            delta.cache_create_tokens,
            delta.cost_usd,
        ],
    )?;
    Ok(())
}

pub fn increment_compact(conn: &Connection, id: &str) -> Result<u32, StoreError> {
    conn.execute(
        "UPDATE sessions SET compact_count = compact_count + 1 WHERE id = ?1",
        [id],
    )?;
    let count: u32 = conn.query_row(
        "SELECT compact_count FROM sessions WHERE id = ?1",
        [id],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
