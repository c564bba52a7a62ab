// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker session rows.

use chrono::{DateTime, Utc};
use pal_core::{
    OrchestrationId, PortId, SessionId, WorkerId, WorkerResult, WorkerSession, WorkerStatus,
    WorkerType,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_ts, ts};
use crate::store::StoreError;

const COLUMNS: &str = "id, orchestration_id, port_id, worker_type, impl_session_id, \
    test_session_id, status, substatus, result, created_at, updated_at";

fn from_row(row: &Row<'_>) -> Result<WorkerSession, StoreError> {
    let type_raw: String = row.get(3)?;
    let status_raw: String = row.get(6)?;
    let result_raw: Option<String> = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    Ok(WorkerSession {
        id: WorkerId::new(row.get::<_, String>(0)?),
        orchestration_id: row.get::<_, Option<String>>(1)?.map(OrchestrationId::new),
        port_id: PortId::new(row.get::<_, String>(2)?),
        worker_type: WorkerType::parse(&type_raw).ok_or_else(|| {
            StoreError::corrupt("worker_sessions", format!("bad worker type: {type_raw}"))
        })?,
        impl_session_id: row.get::<_, Option<String>>(4)?.map(SessionId::new),
        test_session_id: row.get::<_, Option<String>>(5)?.map(SessionId::new),
        status: WorkerStatus::parse(&status_raw).ok_or_else(|| {
            StoreError::corrupt("worker_sessions", format!("bad status: {status_raw}"))
        })?,
        substatus: row.get(7)?,
        result: result_raw
            .map(|raw| {
                serde_json::from_str::<WorkerResult>(&raw).map_err(|e| {
                    StoreError::corrupt("worker_sessions", format!("bad result json: {e}"))
                })
            })
            .transpose()?,
        created_at: parse_ts("worker_sessions", &created_at)?,
        updated_at: parse_ts("worker_sessions", &updated_at)?,
    })
}

pub fn insert(conn: &Connection, worker: &WorkerSession) -> Result<(), StoreError> {
    let result_json = worker
        .result
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::corrupt("worker_sessions", format!("bad result json: {e}")))?;
    conn.execute(
        "INSERT INTO worker_sessions (id, orchestration_id, port_id, worker_type, \
         impl_session_id, test_session_id, status, substatus, result, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            worker.id.as_str(),
            worker.orchestration_id.as_ref().map(|o| o.as_str()),
            worker.port_id.as_str(),
            worker.worker_type.as_str(),
            worker.impl_session_id.as_ref().map(|s| s.as_str()),
            worker.test_session_id.as_ref().map(|s| s.as_str()),
            worker.status.as_str(),
            worker.substatus,
            result_json,
            ts(&worker.created_at),
            ts(&worker.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<WorkerSession>, StoreError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM worker_sessions WHERE id = ?1"),
        [id],
        |row| Ok(from_row(row)),
    )
    .optional()?
    .transpose()
}

/// The worker owning either half of a pair, by member session id.
pub fn get_by_member_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<WorkerSession>, StoreError> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM worker_sessions \
             WHERE impl_session_id = ?1 OR test_session_id = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ),
        [session_id],
        |row| Ok(from_row(row)),
    )
    .optional()?
    .transpose()
}

/// Non-terminal worker covering a port, if one exists.
pub fn active_for_port(conn: &Connection, port_id: &str) -> Result<Option<WorkerSession>, StoreError> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM worker_sessions \
             WHERE port_id = ?1 AND status IN ('running', 'blocked') \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ),
        [port_id],
        |row| Ok(from_row(row)),
    )
    .optional()?
    .transpose()
}

pub fn list_active_for_orchestration(
    conn: &Connection,
    orchestration_id: &str,
) -> Result<Vec<WorkerSession>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM worker_sessions \
         WHERE orchestration_id = ?1 AND status IN ('running', 'blocked') \
         ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map([orchestration_id], |row| Ok(from_row(row)))?;
    let mut workers = Vec::new();
    for row in rows {
        workers.push(row??);
    }
    Ok(workers)
}

pub fn set_status(
    conn: &Connection,
    id: &str,
    status: WorkerStatus,
    substatus: Option<&str>,
    at: &DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE worker_sessions SET status = ?2, substatus = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, status.as_str(), substatus, ts(at)],
    )?;
    Ok(())
}

pub fn set_substatus(
    conn: &Connection,
    id: &str,
    substatus: Option<&str>,
    at: &DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE worker_sessions SET substatus = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, substatus, ts(at)],
    )?;
    Ok(())
}

pub fn set_result(
    conn: &Connection,
    id: &str,
    result: &WorkerResult,
    at: &DateTime<Utc>,
) -> Result<(), StoreError> {
    let json = serde_json::to_string(result)
        .map_err(|e| StoreError::corrupt("worker_sessions", format!("bad result json: {e}")))?;
    conn.execute(
        "UPDATE worker_sessions SET result = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, json, ts(at)],
    )?;
    Ok(())
}

#[cfg(test)]
#[path = "workers_tests.rs"]
mod tests;
