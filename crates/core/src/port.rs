// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port identity and state machine.
//!
//! A port is a unit of work with an author-chosen slug id, an optional spec
//! file, and usage accounting. At most one port per session is `running` at
//! any time (single-worker discipline, enforced by the port manager).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// Author-chosen slug identifying a port (e.g. `auth-login`).
    pub struct PortId;
}

/// Lifecycle status of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Blocked,
}

impl PortStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PortStatus::Complete | PortStatus::Failed)
    }

    /// Whether the state machine permits `self -> to`.
    ///
    /// `pending -> running`; `running -> complete|failed|blocked|pending`
    /// (the last is deactivation for retry); `blocked <-> running`.
    pub fn can_transition(self, to: PortStatus) -> bool {
        if self == to {
            return false;
        }
        match self {
            PortStatus::Pending => matches!(to, PortStatus::Running),
            PortStatus::Running => true,
            PortStatus::Blocked => matches!(to, PortStatus::Running | PortStatus::Pending),
            PortStatus::Complete | PortStatus::Failed => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PortStatus::Pending => "pending",
            PortStatus::Running => "running",
            PortStatus::Complete => "complete",
            PortStatus::Failed => "failed",
            PortStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PortStatus::Pending),
            "running" => Some(PortStatus::Running),
            "complete" => Some(PortStatus::Complete),
            "failed" => Some(PortStatus::Failed),
            "blocked" => Some(PortStatus::Blocked),
            _ => None,
        }
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A port row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: PortStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Session currently owning this port, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<crate::SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub duration_secs: i64,
}

impl Port {
    /// Display title, falling back to the id.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(self.id.as_str())
    }

    /// Candidate-ADR ports carry an architecture-flavored id prefix.
    pub fn is_adr_candidate(&self) -> bool {
        ["arch-", "design-", "refactor-"]
            .iter()
            .any(|p| self.id.as_str().starts_with(p))
    }
}

/// True when a port id looks like an ADR candidate, for callers that only
/// have the id at hand.
pub fn adr_candidate_id(id: &str) -> bool {
    ["arch-", "design-", "refactor-"]
        .iter()
        .any(|p| id.starts_with(p))
}

#[cfg(test)]
#[path = "port_tests.rs"]
mod tests;
