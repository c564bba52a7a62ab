// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Escalations: issues raised for human attention.

use crate::port::PortId;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for an escalation.
    pub struct EscalationId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Open,
    Resolved,
    Dismissed,
}

impl EscalationStatus {
    pub fn is_closed(self) -> bool {
        matches!(self, EscalationStatus::Resolved | EscalationStatus::Dismissed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EscalationStatus::Open => "open",
            EscalationStatus::Resolved => "resolved",
            EscalationStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(EscalationStatus::Open),
            "resolved" => Some(EscalationStatus::Resolved),
            "dismissed" => Some(EscalationStatus::Dismissed),
            _ => None,
        }
    }
}

impl fmt::Display for EscalationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An escalation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub id: EscalationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_session: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<PortId>,
    pub issue: String,
    pub status: EscalationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[path = "escalation_tests.rs"]
mod tests;
