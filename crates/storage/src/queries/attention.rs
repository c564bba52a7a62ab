// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attention snapshots and checkpoints.

use pal_core::{AttentionSnapshot, Checkpoint, CheckpointTrigger, PortId, SessionId};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_ts, ts};
use crate::store::StoreError;

fn snapshot_from_row(row: &Row<'_>) -> Result<AttentionSnapshot, StoreError> {
    let created_at: String = row.get(6)?;
    Ok(AttentionSnapshot {
        session_id: SessionId::new(row.get::<_, String>(1)?),
        port_id: row.get::<_, Option<String>>(2)?.map(PortId::new),
        loaded_tokens: row.get(3)?,
        available_tokens: row.get(4)?,
        focus_score: row.get(5)?,
        compact_count: 0,
        created_at: parse_ts("attention_snapshots", &created_at)?,
    })
}

pub fn insert_snapshot(
    conn: &Connection,
    snapshot: &AttentionSnapshot,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO attention_snapshots (session_id, port_id, loaded_tokens, \
         available_tokens, focus_score, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            snapshot.session_id.as_str(),
            snapshot.port_id.as_ref().map(|p| p.as_str()),
            snapshot.loaded_tokens,
            snapshot.available_tokens,
            snapshot.focus_score,
            ts(&snapshot.created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent snapshot for a session.
pub fn latest_snapshot(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<AttentionSnapshot>, StoreError> {
    conn.query_row(
        "SELECT id, session_id, port_id, loaded_tokens, available_tokens, focus_score, \
         created_at FROM attention_snapshots WHERE session_id = ?1 \
         ORDER BY id DESC LIMIT 1",
        [session_id],
        |row| Ok(snapshot_from_row(row)),
    )
    .optional()?
    .transpose()
}

fn checkpoint_from_row(row: &Row<'_>) -> Result<Checkpoint, StoreError> {
    let trigger_raw: String = row.get(3)?;
    let files_raw: String = row.get(7)?;
    let points_raw: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    Ok(Checkpoint {
        id: row.get(0)?,
        session_id: SessionId::new(row.get::<_, String>(1)?),
        port_id: row.get::<_, Option<String>>(2)?.map(PortId::new),
        trigger_type: CheckpointTrigger::parse(&trigger_raw).ok_or_else(|| {
            StoreError::corrupt("checkpoints", format!("bad trigger: {trigger_raw}"))
        })?,
        tokens_used: row.get(4)?,
        token_budget: row.get(5)?,
        summary: row.get(6)?,
        active_files: serde_json::from_str(&files_raw).unwrap_or_default(),
        key_points: serde_json::from_str(&points_raw).unwrap_or_default(),
        created_at: parse_ts("checkpoints", &created_at)?,
    })
}

pub fn insert_checkpoint(conn: &Connection, checkpoint: &Checkpoint) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO checkpoints (id, session_id, port_id, trigger_type, tokens_used, \
         token_budget, summary, active_files, key_points, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            checkpoint.id,
            checkpoint.session_id.as_str(),
            checkpoint.port_id.as_ref().map(|p| p.as_str()),
            checkpoint.trigger_type.as_str(),
            checkpoint.tokens_used,
            checkpoint.token_budget,
            checkpoint.summary,
            serde_json::to_string(&checkpoint.active_files).unwrap_or_else(|_| "[]".to_string()),
            serde_json::to_string(&checkpoint.key_points).unwrap_or_else(|_| "[]".to_string()),
            ts(&checkpoint.created_at),
        ],
    )?;
    Ok(())
}

/// Most recent checkpoint for a (session, trigger) pair, for debouncing.
pub fn latest_checkpoint(
    conn: &Connection,
    session_id: &str,
    trigger: CheckpointTrigger,
) -> Result<Option<Checkpoint>, StoreError> {
    conn.query_row(
        "SELECT id, session_id, port_id, trigger_type, tokens_used, token_budget, summary, \
         active_files, key_points, created_at FROM checkpoints \
         WHERE session_id = ?1 AND trigger_type = ?2 \
         ORDER BY created_at DESC, id DESC LIMIT 1",
        params![session_id, trigger.as_str()],
        |row| Ok(checkpoint_from_row(row)),
    )
    .optional()?
    .transpose()
}

pub fn list_checkpoints(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<Checkpoint>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, port_id, trigger_type, tokens_used, token_budget, summary, \
         active_files, key_points, created_at FROM checkpoints \
         WHERE session_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map([session_id], |row| Ok(checkpoint_from_row(row)))?;
    let mut checkpoints = Vec::new();
    for row in rows {
        checkpoints.push(row??);
    }
    Ok(checkpoints)
}

#[cfg(test)]
#[path = "attention_tests.rs"]
mod tests;
