// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration rows and their atomic-port lists.

use chrono::{DateTime, Utc};
use pal_core::{AtomicPort, Orchestration, OrchestrationId, OrchestrationStatus, PortId, PortStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_ts, ts};
use crate::store::StoreError;

fn from_row(row: &Row<'_>) -> Result<Orchestration, StoreError> {
    let status_raw: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(Orchestration {
        id: OrchestrationId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        status: OrchestrationStatus::parse(&status_raw).ok_or_else(|| {
            StoreError::corrupt("orchestrations", format!("bad status: {status_raw}"))
        })?,
        current_port_id: row.get::<_, Option<String>>(4)?.map(PortId::new),
        progress_percent: row.get(5)?,
        atomic_ports: Vec::new(),
        created_at: parse_ts("orchestrations", &created_at)?,
        updated_at: parse_ts("orchestrations", &updated_at)?,
    })
}

pub fn insert(conn: &Connection, orchestration: &Orchestration) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO orchestrations (id, title, description, status, current_port_id, \
         progress_percent, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            orchestration.id.as_str(),
            orchestration.title,
            orchestration.description,
            orchestration.status.as_str(),
            orchestration.current_port_id.as_ref().map(|p| p.as_str()),
            orchestration.progress_percent,
            ts(&orchestration.created_at),
            ts(&orchestration.updated_at),
        ],
    )?;
    Ok(())
}

/// Load an orchestration with its atomic ports (ordered by position) and
/// their dependency edges.
pub fn get(conn: &Connection, id: &str) -> Result<Option<Orchestration>, StoreError> {
    let base = conn
        .query_row(
            "SELECT id, title, description, status, current_port_id, progress_percent, \
             created_at, updated_at FROM orchestrations WHERE id = ?1",
            [id],
            |row| Ok(from_row(row)),
        )
        .optional()?
        .transpose()?;
    let Some(mut orchestration) = base else {
        return Ok(None);
    };
    orchestration.atomic_ports = atomic_ports(conn, id)?;
    Ok(Some(orchestration))
}

pub fn list(conn: &Connection) -> Result<Vec<Orchestration>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, description, status, current_port_id, progress_percent, \
         created_at, updated_at FROM orchestrations ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map([], |row| Ok(from_row(row)))?;
    let mut all = Vec::new();
    for row in rows {
        let mut orchestration = row??;
        orchestration.atomic_ports = atomic_ports(conn, orchestration.id.as_str())?;
        all.push(orchestration);
    }
    Ok(all)
}

fn atomic_ports(conn: &Connection, orchestration_id: &str) -> Result<Vec<AtomicPort>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT port_id, position, status, retry_count, test_retry_count \
         FROM orchestration_ports WHERE orchestration_id = ?1 ORDER BY position, port_id",
    )?;
    let rows = stmt.query_map([orchestration_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, u32>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, u32>(3)?,
            row.get::<_, u32>(4)?,
        ))
    })?;
    let mut ports = Vec::new();
    for row in rows {
        let (port_id, position, status_raw, retry_count, test_retry_count) = row?;
        let status = PortStatus::parse(&status_raw).ok_or_else(|| {
            StoreError::corrupt("orchestration_ports", format!("bad status: {status_raw}"))
        })?;
        let depends_on = super::ports::dependencies_of(conn, &port_id)?;
        ports.push(AtomicPort {
            port_id: PortId::new(port_id),
            order: position,
            depends_on,
            status,
            retry_count,
            test_retry_count,
        });
    }
    Ok(ports)
}

pub fn add_atomic_port(
    conn: &Connection,
    orchestration_id: &str,
    port_id: &str,
    position: u32,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO orchestration_ports (orchestration_id, port_id, position, status) \
         VALUES (?1, ?2, ?3, 'pending')",
        params![orchestration_id, port_id, position],
    )?;
    Ok(())
}

pub fn set_status(
    conn: &Connection,
    id: &str,
    status: OrchestrationStatus,
    at: &DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE orchestrations SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status.as_str(), ts(at)],
    )?;
    Ok(())
}

pub fn set_current_port(
    conn: &Connection,
    id: &str,
    port_id: Option<&str>,
    at: &DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE orchestrations SET current_port_id = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, port_id, ts(at)],
    )?;
    Ok(())
}

pub fn set_progress(
    conn: &Connection,
    id: &str,
    progress_percent: u32,
    at: &DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE orchestrations SET progress_percent = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, progress_percent, ts(at)],
    )?;
    Ok(())
}

pub fn set_port_status(
    conn: &Connection,
    orchestration_id: &str,
    port_id: &str,
    status: PortStatus,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE orchestration_ports SET status = ?3 \
         WHERE orchestration_id = ?1 AND port_id = ?2",
        params![orchestration_id, port_id, status.as_str()],
    )?;
    Ok(())
}

/// Bump the impl or test retry counter and return the new value.
pub fn increment_retry(
    conn: &Connection,
    orchestration_id: &str,
    port_id: &str,
    test_retry: bool,
) -> Result<u32, StoreError> {
    let column = if test_retry {
        "test_retry_count"
    } else {
        "retry_count"
    };
    conn.execute(
        &format!(
            "UPDATE orchestration_ports SET {column} = {column} + 1 \
             WHERE orchestration_id = ?1 AND port_id = ?2"
        ),
        params![orchestration_id, port_id],
    )?;
    let count: u32 = conn.query_row(
        &format!(
            "SELECT {column} FROM orchestration_ports \
             WHERE orchestration_id = ?1 AND port_id = ?2"
        ),
        params![orchestration_id, port_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Current (impl, test) retry counters for an atomic port.
pub fn get_retries(
    conn: &Connection,
    orchestration_id: &str,
    port_id: &str,
) -> Result<(u32, u32), StoreError> {
    let counts = conn.query_row(
        "SELECT retry_count, test_retry_count FROM orchestration_ports \
         WHERE orchestration_id = ?1 AND port_id = ?2",
        params![orchestration_id, port_id],
        |row| Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?)),
    )?;
    Ok(counts)
}

/// Orchestration containing this port, if any.
pub fn containing_port(
    conn: &Connection,
    port_id: &str,
) -> Result<Option<OrchestrationId>, StoreError> {
    let id: Option<String> = conn
        .query_row(
            "SELECT orchestration_id FROM orchestration_ports WHERE port_id = ?1 LIMIT 1",
            [port_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id.map(OrchestrationId::new))
}

#[cfg(test)]
#[path = "orchestrations_tests.rs"]
mod tests;
