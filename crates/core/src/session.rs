// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identity, roles, and state machine.
//!
//! Sessions form a tree by `parent_id`. The tree is traversed by id through
//! the store; no session holds a native reference to another. `depth` is
//! stored, not computed, to bound tree operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

crate::define_id! {
    /// Unique identifier for a coordinator session.
    ///
    /// Distinct from the assistant runtime's own session id, which is kept
    /// in `external_session_id` and reconciled at hook time.
    pub struct SessionId;
}

/// Role of a session in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Top-level interactive session.
    Main,
    /// Delegated subtask of a main session.
    Sub,
    /// Long-lived build/maintenance session.
    Builder,
    /// Orchestration operator; spawns worker pairs.
    Operator,
    /// Implementation worker spawned by an operator.
    Worker,
    /// Test worker paired with an implementation worker.
    Test,
}

impl SessionKind {
    /// Whether a session of this kind may parent a child of `child` kind.
    ///
    /// Workers and tests are leaves; builders delegate only to subs;
    /// operators own their worker/test pairs.
    pub fn can_parent(self, child: SessionKind) -> bool {
        match self {
            SessionKind::Main => matches!(
                child,
                SessionKind::Sub | SessionKind::Builder | SessionKind::Operator
            ),
            SessionKind::Builder => matches!(child, SessionKind::Sub),
            SessionKind::Operator => matches!(child, SessionKind::Worker | SessionKind::Test),
            SessionKind::Sub | SessionKind::Worker | SessionKind::Test => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Main => "main",
            SessionKind::Sub => "sub",
            SessionKind::Builder => "builder",
            SessionKind::Operator => "operator",
            SessionKind::Worker => "worker",
            SessionKind::Test => "test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "main" => Some(SessionKind::Main),
            "sub" => Some(SessionKind::Sub),
            "builder" => Some(SessionKind::Builder),
            "operator" => Some(SessionKind::Operator),
            "worker" => Some(SessionKind::Worker),
            "test" => Some(SessionKind::Test),
            _ => None,
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Blocked,
    Complete,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Terminal states are irreversible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Complete | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    /// Whether the state machine permits `self -> to`.
    ///
    /// `running <-> blocked` (escalation); `running -> complete|failed|cancelled`;
    /// `blocked -> failed|cancelled` (reaping a blocked session is allowed).
    pub fn can_transition(self, to: SessionStatus) -> bool {
        if self == to {
            return false;
        }
        match self {
            SessionStatus::Running => true,
            SessionStatus::Blocked => matches!(
                to,
                SessionStatus::Running | SessionStatus::Failed | SessionStatus::Cancelled
            ),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Blocked => "blocked",
            SessionStatus::Complete => "complete",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SessionStatus::Running),
            "blocked" => Some(SessionStatus::Blocked),
            "complete" => Some(SessionStatus::Complete),
            "failed" => Some(SessionStatus::Failed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage counters rolled up onto a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageDelta {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_create_tokens: i64,
    pub cost_usd: f64,
}

impl UsageDelta {
    /// Usage accounting is monotone; negative deltas are rejected.
    pub fn validate(&self) -> crate::Result<()> {
        if self.input_tokens < 0
            || self.output_tokens < 0
            || self.cache_read_tokens < 0
            || self.cache_create_tokens < 0
            || self.cost_usd < 0.0
        {
            return Err(crate::Error::InvalidState(
                "usage deltas must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0
            && self.output_tokens == 0
            && self.cache_read_tokens == 0
            && self.cache_create_tokens == 0
            && self.cost_usd == 0.0
    }
}

/// A coordinator session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub kind: SessionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<SessionId>,
    pub depth: u32,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_create_tokens: i64,
    pub cost_usd: f64,
    pub compact_count: u32,
}

impl Session {
    /// A session is active iff running and its heartbeat is within `ttl`.
    pub fn is_active(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        if self.status != SessionStatus::Running {
            return false;
        }
        let age = now.signed_duration_since(self.last_heartbeat_at);
        age.num_milliseconds() >= 0 && (age.num_milliseconds() as u128) < ttl.as_millis()
    }

    /// A running session whose heartbeat is older than `ttl` is a zombie.
    pub fn is_zombie(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.status == SessionStatus::Running && !self.is_active(now, ttl)
    }

    pub fn apply_usage(&mut self, delta: &UsageDelta) {
        self.input_tokens += delta.input_tokens;
        self.output_tokens += delta.output_tokens;
        self.cache_read_tokens += delta.cache_read_tokens;
        self.cache_create_tokens += delta.cache_create_tokens;
        self.cost_usd += delta.cost_usd;
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
