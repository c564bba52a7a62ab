// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Escalation rows.

use chrono::{DateTime, Utc};
use pal_core::{Escalation, EscalationId, EscalationStatus, PortId, SessionId};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_opt_ts, parse_ts, ts};
use crate::store::StoreError;

const COLUMNS: &str = "id, from_session, from_port, issue, status, created_at, resolved_at";

fn from_row(row: &Row<'_>) -> Result<Escalation, StoreError> {
    let status_raw: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(Escalation {
        id: EscalationId::new(row.get::<_, String>(0)?),
        from_session: row.get::<_, Option<String>>(1)?.map(SessionId::new),
        from_port: row.get::<_, Option<String>>(2)?.map(PortId::new),
        issue: row.get(3)?,
        status: EscalationStatus::parse(&status_raw).ok_or_else(|| {
            StoreError::corrupt("escalations", format!("bad status: {status_raw}"))
        })?,
        created_at: parse_ts("escalations", &created_at)?,
        resolved_at: parse_opt_ts("escalations", row.get(6)?)?,
    })
}

pub fn insert(conn: &Connection, escalation: &Escalation) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO escalations (id, from_session, from_port, issue, status, created_at, \
         resolved_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            escalation.id.as_str(),
            escalation.from_session.as_ref().map(|s| s.as_str()),
            escalation.from_port.as_ref().map(|p| p.as_str()),
            escalation.issue,
            escalation.status.as_str(),
            ts(&escalation.created_at),
            escalation.resolved_at.as_ref().map(ts),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Escalation>, StoreError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM escalations WHERE id = ?1"),
        [id],
        |row| Ok(from_row(row)),
    )
    .optional()?
    .transpose()
}

pub fn set_status(
    conn: &Connection,
    id: &str,
    status: EscalationStatus,
    resolved_at: Option<&DateTime<Utc>>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE escalations SET status = ?2, resolved_at = ?3 WHERE id = ?1",
        params![id, status.as_str(), resolved_at.map(ts)],
    )?;
    Ok(())
}

pub fn list(
    conn: &Connection,
    status: Option<EscalationStatus>,
) -> Result<Vec<Escalation>, StoreError> {
    let mut escalations = Vec::new();
    match status {
        Some(s) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM escalations WHERE status = ?1 ORDER BY created_at, id"
            ))?;
            let rows = stmt.query_map([s.as_str()], |row| Ok(from_row(row)))?;
            for row in rows {
                escalations.push(row??);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM escalations ORDER BY created_at, id"
            ))?;
            let rows = stmt.query_map([], |row| Ok(from_row(row)))?;
            for row in rows {
                escalations.push(row??);
            }
        }
    }
    Ok(escalations)
}

#[cfg(test)]
#[path = "escalations_tests.rs"]
mod tests;
