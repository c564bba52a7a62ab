// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session event log vocabulary.
//!
//! Events are the append-only audit substrate. They are immutable once
//! written; readers sort by `(created_at, id)`.

use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed event names recorded against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventType {
    SessionStart,
    SessionEnd,
    PortStart,
    PortEnd,
    FileEdit,
    UntrackedEdit,
    Compact,
    Decision,
    Escalation,
    UserRequest,
    ZombieCleanup,
}

impl SessionEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionEventType::SessionStart => "session_start",
            SessionEventType::SessionEnd => "session_end",
            SessionEventType::PortStart => "port_start",
            SessionEventType::PortEnd => "port_end",
            SessionEventType::FileEdit => "file_edit",
            SessionEventType::UntrackedEdit => "untracked_edit",
            SessionEventType::Compact => "compact",
            SessionEventType::Decision => "decision",
            SessionEventType::Escalation => "escalation",
            SessionEventType::UserRequest => "user_request",
            SessionEventType::ZombieCleanup => "zombie_cleanup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "session_start" => Some(SessionEventType::SessionStart),
            "session_end" => Some(SessionEventType::SessionEnd),
            "port_start" => Some(SessionEventType::PortStart),
            "port_end" => Some(SessionEventType::PortEnd),
            "file_edit" => Some(SessionEventType::FileEdit),
            "untracked_edit" => Some(SessionEventType::UntrackedEdit),
            "compact" => Some(SessionEventType::Compact),
            "decision" => Some(SessionEventType::Decision),
            "escalation" => Some(SessionEventType::Escalation),
            "user_request" => Some(SessionEventType::UserRequest),
            "zombie_cleanup" => Some(SessionEventType::ZombieCleanup),
            _ => None,
        }
    }
}

impl fmt::Display for SessionEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row in the session event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: i64,
    pub session_id: SessionId,
    pub event_type: SessionEventType,
    /// JSON payload; shape varies by event type.
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
