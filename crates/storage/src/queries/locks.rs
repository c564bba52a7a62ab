// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory lock rows. Exclusive per resource.

use chrono::{DateTime, Utc};
use pal_core::{Lock, SessionId};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_ts, ts};
use crate::store::StoreError;

fn from_row(row: &Row<'_>) -> Result<Lock, StoreError> {
    let acquired_at: String = row.get(2)?;
    Ok(Lock {
        resource: row.get(0)?,
        session_id: SessionId::new(row.get::<_, String>(1)?),
        acquired_at: parse_ts("locks", &acquired_at)?,
    })
}

/// Insert the lock row if the resource is free. Returns whether the insert
/// happened; an existing row (any owner) leaves the table untouched.
pub fn try_acquire(
    conn: &Connection,
    resource: &str,
    session_id: &str,
    at: &DateTime<Utc>,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO locks (resource, session_id, acquired_at) VALUES (?1, ?2, ?3)",
        params![resource, session_id, ts(at)],
    )?;
    Ok(changed > 0)
}

pub fn get(conn: &Connection, resource: &str) -> Result<Option<Lock>, StoreError> {
    conn.query_row(
        "SELECT resource, session_id, acquired_at FROM locks WHERE resource = ?1",
        [resource],
        |row| Ok(from_row(row)),
    )
    .optional()?
    .transpose()
}

/// Delete the lock row if owned by `session_id`. Returns whether a row was
/// removed.
pub fn release(conn: &Connection, resource: &str, session_id: &str) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "DELETE FROM locks WHERE resource = ?1 AND session_id = ?2",
        params![resource, session_id],
    )?;
    Ok(changed > 0)
}

/// Release every lock held by a session; returns how many were dropped.
pub fn release_all_for_session(conn: &Connection, session_id: &str) -> Result<u32, StoreError> {
    let changed = conn.execute("DELETE FROM locks WHERE session_id = ?1", [session_id])?;
    Ok(changed as u32)
}

pub fn list(conn: &Connection) -> Result<Vec<Lock>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT resource, session_id, acquired_at FROM locks ORDER BY resource")?;
    let rows = stmt.query_map([], |row| Ok(from_row(row)))?;
    let mut locks = Vec::new();
    for row in rows {
        locks.push(row??);
    }
    Ok(locks)
}

pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<Lock>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT resource, session_id, acquired_at FROM locks WHERE session_id = ?1 \
         ORDER BY resource",
    )?;
    let rows = stmt.query_map([session_id], |row| Ok(from_row(row)))?;
    let mut locks = Vec::new();
    for row in rows {
        locks.push(row??);
    }
    Ok(locks)
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
