// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus message rows. Append-only; the rowid is both the message id and the
//! read cursor.

use chrono::{DateTime, Utc};
use pal_core::{Message, MessageSubtype, MessageType, PortId, SessionId};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_ts, ts};
use crate::store::StoreError;

const COLUMNS: &str = "id, conversation_id, from_session, to_session, msg_type, subtype, \
    port_id, payload, token_count, created_at";

fn from_row(row: &Row<'_>) -> Result<Message, StoreError> {
    let type_raw: String = row.get(4)?;
    let subtype_raw: String = row.get(5)?;
    let payload_raw: String = row.get(7)?;
    let created_at: String = row.get(9)?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        from_session: SessionId::new(row.get::<_, String>(2)?),
        to_session: SessionId::new(row.get::<_, String>(3)?),
        message_type: MessageType::parse(&type_raw)
            .ok_or_else(|| StoreError::corrupt("messages", format!("bad type: {type_raw}")))?,
        subtype: MessageSubtype::parse(&subtype_raw),
        port_id: row.get::<_, Option<String>>(6)?.map(PortId::new),
        payload: serde_json::from_str(&payload_raw).unwrap_or(serde_json::Value::Null),
        token_count: row.get(8)?,
        created_at: parse_ts("messages", &created_at)?,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn insert(
    conn: &Connection,
    conversation_id: &str,
    from_session: &str,
    to_session: &str,
    message_type: MessageType,
    subtype: &MessageSubtype,
    port_id: Option<&str>,
    payload: &serde_json::Value,
    token_count: Option<i64>,
    at: &DateTime<Utc>,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO messages (conversation_id, from_session, to_session, msg_type, subtype, \
         port_id, payload, token_count, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            conversation_id,
            from_session,
            to_session,
            message_type.as_str(),
            subtype.as_str(),
            port_id,
            payload.to_string(),
            token_count,
            ts(at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Message>, StoreError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"),
        [id],
        |row| Ok(from_row(row)),
    )
    .optional()?
    .transpose()
}

/// Messages addressed to a session past a cursor, oldest first.
pub fn list_to_after(
    conn: &Connection,
    to_session: &str,
    after: i64,
    limit: u32,
) -> Result<Vec<Message>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM messages WHERE to_session = ?1 AND id > ?2 \
         ORDER BY created_at, id LIMIT ?3"
    ))?;
    let rows = stmt.query_map(params![to_session, after, limit], |row| Ok(from_row(row)))?;
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row??);
    }
    Ok(messages)
}

/// Full conversation history, oldest first.
pub fn list_conversation(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Vec<Message>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM messages WHERE conversation_id = ?1 ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map([conversation_id], |row| Ok(from_row(row)))?;
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row??);
    }
    Ok(messages)
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
