// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session event log rows. Append-only; events are immutable.

use chrono::{DateTime, Utc};
use pal_core::{SessionEvent, SessionEventType, SessionId};
use rusqlite::{params, Connection, Row};

use super::{parse_ts, ts};
use crate::store::StoreError;

fn from_row(row: &Row<'_>) -> Result<SessionEvent, StoreError> {
    let type_raw: String = row.get(2)?;
    let data_raw: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    Ok(SessionEvent {
        id: row.get(0)?,
        session_id: SessionId::new(row.get::<_, String>(1)?),
        event_type: SessionEventType::parse(&type_raw).ok_or_else(|| {
            StoreError::corrupt("session_events", format!("bad event type: {type_raw}"))
        })?,
        event_data: serde_json::from_str(&data_raw).unwrap_or(serde_json::Value::Null),
        created_at: parse_ts("session_events", &created_at)?,
    })
}

pub fn append(
    conn: &Connection,
    session_id: &str,
    event_type: SessionEventType,
    event_data: &serde_json::Value,
    at: &DateTime<Utc>,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO session_events (session_id, event_type, event_data, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            session_id,
            event_type.as_str(),
            event_data.to_string(),
            ts(at)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Newest-first listing, optionally filtered by type.
pub fn list(
    conn: &Connection,
    session_id: &str,
    type_filter: Option<SessionEventType>,
    limit: u32,
) -> Result<Vec<SessionEvent>, StoreError> {
    let mut events = Vec::new();
    match type_filter {
        Some(t) => {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, event_type, event_data, created_at \
                 FROM session_events WHERE session_id = ?1 AND event_type = ?2 \
                 ORDER BY created_at DESC, id DESC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![session_id, t.as_str(), limit], |row| {
                Ok(from_row(row))
            })?;
            for row in rows {
                events.push(row??);
            }
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, event_type, event_data, created_at \
                 FROM session_events WHERE session_id = ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![session_id, limit], |row| Ok(from_row(row)))?;
            for row in rows {
                events.push(row??);
            }
        }
    }
    Ok(events)
}

/// Count events of a given type for a session.
pub fn count(
    conn: &Connection,
    session_id: &str,
    event_type: SessionEventType,
) -> Result<u32, StoreError> {
    let n: u32 = conn.query_row(
        "SELECT COUNT(*) FROM session_events WHERE session_id = ?1 AND event_type = ?2",
        params![session_id, event_type.as_str()],
        |row| row.get(0),
    )?;
    Ok(n)
}

/// Events of a given type since a timestamp, oldest first.
pub fn list_since(
    conn: &Connection,
    session_id: &str,
    event_type: SessionEventType,
    since: &DateTime<Utc>,
) -> Result<Vec<SessionEvent>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, event_type, event_data, created_at \
         FROM session_events \
         WHERE session_id = ?1 AND event_type = ?2 AND created_at >= ?3 \
         ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map(params![session_id, event_type.as_str(), ts(since)], |row| {
        Ok(from_row(row))
    })?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row??);
    }
    Ok(events)
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
