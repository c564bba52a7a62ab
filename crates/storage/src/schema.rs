// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema migrations.
//!
//! The ladder is monotone: the current version is recorded in the `metadata`
//! table and every migration numbered at or below it is a no-op. New
//! versions may add tables or `ALTER TABLE ADD COLUMN` nullable/defaulted
//! columns; destructive migrations are disallowed.

use rusqlite::Connection;

use crate::store::StoreError;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 7;

/// Read the recorded schema version (0 before any migration ran).
pub fn current_version(conn: &Connection) -> Result<u32, StoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'metadata')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }
    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    match version {
        Some(v) => v
            .parse()
            .map_err(|_| StoreError::corrupt("metadata", format!("bad schema_version: {v}"))),
        None => Ok(0),
    }
}

/// Apply all migrations above the recorded version, in order, each in its
/// own transaction with the version bump.
pub fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    let mut version = current_version(conn)?;
    while version < SCHEMA_VERSION {
        let next = version + 1;
        let tx = conn.transaction()?;
        apply(&tx, next)?;
        tx.execute(
            "INSERT INTO metadata (key, value) VALUES ('schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = ?1",
            [next.to_string()],
        )?;
        tx.commit()?;
        tracing::debug!(version = next, "applied schema migration");
        version = next;
    }
    Ok(())
}

fn apply(tx: &rusqlite::Transaction<'_>, version: u32) -> Result<(), StoreError> {
    match version {
        1 => tx.execute_batch(
            r#"
            CREATE TABLE metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE sessions (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                parent_id TEXT,
                depth INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                project_root TEXT,
                cwd TEXT,
                external_session_id TEXT,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                last_heartbeat_at TEXT NOT NULL,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                cache_read_tokens INTEGER NOT NULL DEFAULT 0,
                cache_create_tokens INTEGER NOT NULL DEFAULT 0,
                cost_usd REAL NOT NULL DEFAULT 0,
                compact_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_sessions_status ON sessions(status);
            CREATE INDEX idx_sessions_external ON sessions(external_session_id);
            CREATE INDEX idx_sessions_parent ON sessions(parent_id);

            CREATE TABLE session_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                event_data TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            CREATE INDEX idx_events_session ON session_events(session_id, created_at, id);
            CREATE INDEX idx_events_type ON session_events(session_id, event_type);
            "#,
        )?,
        2 => tx.execute_batch(
            r#"
            CREATE TABLE ports (
                id TEXT PRIMARY KEY,
                title TEXT,
                status TEXT NOT NULL,
                file_path TEXT,
                session_id TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                cost_usd REAL NOT NULL DEFAULT 0,
                duration_secs INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_ports_status ON ports(status);
            CREATE INDEX idx_ports_session ON ports(session_id);

            CREATE TABLE port_dependencies (
                port_id TEXT NOT NULL,
                depends_on TEXT NOT NULL,
                PRIMARY KEY (port_id, depends_on)
            );
            "#,
        )?,
        3 => tx.execute_batch(
            r#"
            CREATE TABLE locks (
                resource TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                acquired_at TEXT NOT NULL
            );

            CREATE INDEX idx_locks_session ON locks(session_id);
            "#,
        )?,
        4 => tx.execute_batch(
            r#"
            CREATE TABLE orchestrations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                current_port_id TEXT,
                progress_percent INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE orchestration_ports (
                orchestration_id TEXT NOT NULL,
                port_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                test_retry_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (orchestration_id, port_id)
            );

            CREATE TABLE worker_sessions (
                id TEXT PRIMARY KEY,
                orchestration_id TEXT,
                port_id TEXT NOT NULL,
                worker_type TEXT NOT NULL,
                impl_session_id TEXT,
                test_session_id TEXT,
                status TEXT NOT NULL,
                substatus TEXT,
                result TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX idx_workers_orchestration ON worker_sessions(orchestration_id);
            CREATE INDEX idx_workers_port ON worker_sessions(port_id);
            "#,
        )?,
        5 => tx.execute_batch(
            r#"
            CREATE TABLE messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                from_session TEXT NOT NULL,
                to_session TEXT NOT NULL,
                msg_type TEXT NOT NULL,
                subtype TEXT NOT NULL,
                port_id TEXT,
                payload TEXT NOT NULL DEFAULT '{}',
                token_count INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE INDEX idx_messages_to ON messages(to_session, id);
            CREATE INDEX idx_messages_conversation ON messages(conversation_id, id);
            "#,
        )?,
        6 => tx.execute_batch(
            r#"
            CREATE TABLE attention_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                port_id TEXT,
                loaded_tokens INTEGER NOT NULL,
                available_tokens INTEGER NOT NULL,
                focus_score REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX idx_snapshots_session ON attention_snapshots(session_id, id);

            CREATE TABLE checkpoints (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                port_id TEXT,
                trigger_type TEXT NOT NULL,
                tokens_used INTEGER NOT NULL,
                token_budget INTEGER NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                active_files TEXT NOT NULL DEFAULT '[]',
                key_points TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            );

            CREATE INDEX idx_checkpoints_session ON checkpoints(session_id, trigger_type, created_at);

            CREATE TABLE escalations (
                id TEXT PRIMARY KEY,
                from_session TEXT,
                from_port TEXT,
                issue TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                resolved_at TEXT
            );

            CREATE INDEX idx_escalations_status ON escalations(status);
            "#,
        )?,
        7 => tx.execute_batch(
            r#"
            ALTER TABLE sessions ADD COLUMN transcript_path TEXT;
            ALTER TABLE ports ADD COLUMN agent_id TEXT;
            "#,
        )?,
        other => {
            return Err(StoreError::corrupt(
                "metadata",
                format!("unknown migration version {other}"),
            ))
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
